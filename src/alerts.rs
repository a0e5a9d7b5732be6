//! Fatigue alert evaluation and lifecycle
//!
//! Each (client, alert type) pair runs an independent episode:
//! `none -> unread -> read -> resolved -> none`. A new alert of a type is only
//! raised when no alert of that type is open for the client, and (when a
//! cooldown is configured) the last one was resolved long enough ago.
//!
//! Streak rules look at the stored analyses in timeline order, one per
//! analysis date (the latest run of a date wins). An analysis
//! flagged `insufficient_data` breaks every streak and never raises alerts.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{FatigueError, Result, TransitionError};
use crate::models::{
    AlertSeverity, AlertState, AlertType, FatigueAlert, FatigueAnalysis, RiskLevel, UserId,
};
use crate::store::NewAlert;

/// Alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// ACWR above this raises `acwr_spike`
    pub acwr_spike_threshold: Decimal,
    /// ACWR at or above this makes the spike critical
    pub acwr_critical_threshold: Decimal,
    pub monotony_threshold: Decimal,
    /// Consecutive analyses above the monotony threshold
    pub monotony_consecutive: usize,
    pub strain_threshold: Decimal,
    /// Consecutive analyses above the strain threshold
    pub strain_consecutive: usize,
    /// Days after a resolution during which the same type stays quiet
    pub retrigger_cooldown_days: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            acwr_spike_threshold: dec!(1.5),
            acwr_critical_threshold: dec!(2.0),
            monotony_threshold: dec!(2.0),
            monotony_consecutive: 2,
            strain_threshold: dec!(10000),
            strain_consecutive: 3,
            retrigger_cooldown_days: 0,
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<()> {
        if self.acwr_spike_threshold <= Decimal::ZERO {
            return Err(FatigueError::Configuration(
                "acwr_spike_threshold must be positive".to_string(),
            ));
        }
        if self.acwr_critical_threshold < self.acwr_spike_threshold {
            return Err(FatigueError::Configuration(
                "acwr_critical_threshold must not be below acwr_spike_threshold".to_string(),
            ));
        }
        if self.monotony_threshold <= Decimal::ZERO || self.strain_threshold <= Decimal::ZERO {
            return Err(FatigueError::Configuration(
                "monotony and strain thresholds must be positive".to_string(),
            ));
        }
        if self.monotony_consecutive == 0 || self.strain_consecutive == 0 {
            return Err(FatigueError::Configuration(
                "consecutive analysis counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl AlertState {
    /// `unread -> read`; reading a read alert keeps the first read stamp
    pub fn mark_read(
        &self,
        by: UserId,
        at: DateTime<Utc>,
    ) -> std::result::Result<AlertState, TransitionError> {
        match self {
            AlertState::Unread => Ok(AlertState::Read {
                read_at: at,
                read_by: by,
            }),
            AlertState::Read { .. } => Ok(self.clone()),
            AlertState::Resolved { .. } => Err(TransitionError::AlreadyResolved),
        }
    }

    /// `unread|read -> resolved`; an unread alert is read at the same instant
    pub fn resolve(
        &self,
        by: UserId,
        at: DateTime<Utc>,
        notes: Option<String>,
    ) -> std::result::Result<AlertState, TransitionError> {
        let (read_at, read_by) = match self.mark_read(by, at)? {
            AlertState::Read { read_at, read_by } => (read_at, read_by),
            _ => return Err(TransitionError::AlreadyResolved),
        };
        Ok(AlertState::Resolved {
            read_at,
            read_by,
            resolved_at: at,
            resolved_by: by,
            resolution_notes: notes,
        })
    }
}

/// Where a (client, alert type) episode currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    None,
    Unread,
    Read,
    Resolved { resolved_at: DateTime<Utc> },
}

impl EpisodeState {
    /// Episode state from the latest alert of `alert_type` in `alerts`
    pub fn of(alerts: &[FatigueAlert], alert_type: AlertType) -> Self {
        let latest = alerts
            .iter()
            .filter(|a| a.alert_type == alert_type)
            .max_by_key(|a| (a.created_at, a.id));

        match latest.map(|a| &a.state) {
            None => EpisodeState::None,
            Some(AlertState::Unread) => EpisodeState::Unread,
            Some(AlertState::Read { .. }) => EpisodeState::Read,
            Some(AlertState::Resolved { resolved_at, .. }) => EpisodeState::Resolved {
                resolved_at: *resolved_at,
            },
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, EpisodeState::Unread | EpisodeState::Read)
    }
}

/// Threshold evaluation over new analyses
pub struct AlertEngine {
    config: AlertConfig,
}

impl AlertEngine {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Decide which alerts `analysis` raises
    ///
    /// `prior` holds the client's earlier analyses and `existing` the client's
    /// alerts. Nothing is persisted here.
    pub fn evaluate(
        &self,
        analysis: &FatigueAnalysis,
        prior: &[FatigueAnalysis],
        existing: &[FatigueAlert],
        now: DateTime<Utc>,
    ) -> Vec<NewAlert> {
        let assessment = &analysis.assessment;
        if assessment.insufficient_data {
            debug!(
                client_id = %analysis.client_id,
                analysis_id = %analysis.id,
                "Insufficient data, skipping alert evaluation"
            );
            return Vec::new();
        }

        if prior
            .iter()
            .any(|a| a.assessment.analysis_date > assessment.analysis_date)
        {
            warn!(
                client_id = %analysis.client_id,
                analysis_id = %analysis.id,
                analysis_date = %assessment.analysis_date,
                "Back-dated analysis, skipping alert evaluation"
            );
            return Vec::new();
        }

        let timeline = daily_timeline(prior, analysis);

        let mut raised = Vec::new();
        for alert_type in AlertType::ALL {
            let Some(candidate) = self.check(alert_type, analysis, &timeline) else {
                continue;
            };

            match EpisodeState::of(existing, alert_type) {
                episode if episode.is_open() => {
                    debug!(
                        client_id = %analysis.client_id,
                        alert_type = %alert_type,
                        "Alert already open, not duplicating"
                    );
                    continue;
                }
                EpisodeState::Resolved { resolved_at } if self.in_cooldown(resolved_at, now) => {
                    debug!(
                        client_id = %analysis.client_id,
                        alert_type = %alert_type,
                        resolved_at = %resolved_at,
                        "Alert type in re-trigger cooldown"
                    );
                    continue;
                }
                _ => {}
            }

            info!(
                client_id = %analysis.client_id,
                analysis_id = %analysis.id,
                alert_type = %alert_type,
                severity = %candidate.severity,
                "Raising fatigue alert"
            );
            raised.push(NewAlert {
                client_id: analysis.client_id,
                trainer_id: analysis.trainer_id,
                analysis_id: analysis.id,
                alert_type,
                severity: candidate.severity,
                title: candidate.title,
                message: candidate.message,
                recommendations: Some(candidate.recommendations),
                created_at: now,
            });
        }
        raised
    }

    fn in_cooldown(&self, resolved_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.config.retrigger_cooldown_days > 0
            && now < resolved_at + Duration::days(self.config.retrigger_cooldown_days as i64)
    }

    fn check(
        &self,
        alert_type: AlertType,
        analysis: &FatigueAnalysis,
        timeline: &[&FatigueAnalysis],
    ) -> Option<Candidate> {
        let assessment = &analysis.assessment;
        let cfg = &self.config;

        match alert_type {
            AlertType::AcwrSpike => {
                let acwr = assessment.acwr.filter(|v| *v > cfg.acwr_spike_threshold)?;
                let severity = if acwr >= cfg.acwr_critical_threshold {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::High
                };
                Some(Candidate {
                    severity,
                    title: "ACWR spike detected".to_string(),
                    message: format!(
                        "Acute:chronic workload ratio of {} exceeds {} (acute load {}, chronic load {}).",
                        acwr.normalize(),
                        cfg.acwr_spike_threshold.normalize(),
                        assessment.acute_load.round_dp(1).normalize(),
                        assessment.chronic_load.round_dp(1).normalize()
                    ),
                    recommendations: "Reduce training volume by 20-30% over the next week and prioritize recovery sessions.".to_string(),
                })
            }
            AlertType::HighMonotony => {
                let monotony = assessment.monotony?;
                let streak = streak(timeline, |a| {
                    a.assessment.monotony.is_some_and(|m| m > cfg.monotony_threshold)
                });
                if streak < cfg.monotony_consecutive {
                    return None;
                }
                let severity = if assessment.risk_level >= RiskLevel::High {
                    AlertSeverity::High
                } else {
                    AlertSeverity::Medium
                };
                Some(Candidate {
                    severity,
                    title: "High training monotony".to_string(),
                    message: format!(
                        "Training monotony has stayed above {} for {} consecutive analyses (latest {}).",
                        cfg.monotony_threshold.normalize(),
                        streak,
                        monotony.normalize()
                    ),
                    recommendations: "Vary session intensity and schedule lighter days to break up the load pattern.".to_string(),
                })
            }
            AlertType::SustainedHighStrain => {
                let strain = assessment.strain?;
                let streak = streak(timeline, |a| {
                    a.assessment.strain.is_some_and(|s| s > cfg.strain_threshold)
                });
                if streak < cfg.strain_consecutive {
                    return None;
                }
                let severity = if assessment.risk_level >= RiskLevel::Critical {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::High
                };
                Some(Candidate {
                    severity,
                    title: "Sustained high training strain".to_string(),
                    message: format!(
                        "Training strain has exceeded {} for {} consecutive analyses (latest {}).",
                        cfg.strain_threshold.normalize(),
                        streak,
                        strain.round_dp(0).normalize()
                    ),
                    recommendations: "Plan a deload period and monitor sleep, soreness and energy closely.".to_string(),
                })
            }
        }
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

struct Candidate {
    severity: AlertSeverity,
    title: String,
    message: String,
    recommendations: String,
}

/// One analysis per date, the latest run winning, ending with `analysis`
///
/// Re-running the pipeline for a date replaces the earlier run instead of
/// extending a streak.
fn daily_timeline<'a>(
    prior: &'a [FatigueAnalysis],
    analysis: &'a FatigueAnalysis,
) -> Vec<&'a FatigueAnalysis> {
    let mut by_date: BTreeMap<NaiveDate, &FatigueAnalysis> = BTreeMap::new();
    for earlier in prior.iter().filter(|a| a.id != analysis.id) {
        let kept = by_date
            .entry(earlier.assessment.analysis_date)
            .or_insert(earlier);
        if earlier.id > kept.id {
            *kept = earlier;
        }
    }
    by_date.insert(analysis.assessment.analysis_date, analysis);
    by_date.into_values().collect()
}

/// Trailing run of analyses matching `predicate`; insufficient data breaks it
fn streak(timeline: &[&FatigueAnalysis], predicate: impl Fn(&FatigueAnalysis) -> bool) -> usize {
    timeline
        .iter()
        .rev()
        .take_while(|a| !a.assessment.insufficient_data && predicate(a))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertId, AnalysisId, ClientId, FatigueAssessment, TrainerId};
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 30, 12, 0, 0).unwrap()
    }

    fn analysis(id: u64, day: u32) -> FatigueAnalysis {
        FatigueAnalysis {
            id: AnalysisId(id),
            client_id: ClientId(1),
            trainer_id: TrainerId(10),
            session_id: None,
            assessment: FatigueAssessment {
                analysis_date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
                acute_load: dec!(700),
                chronic_load: dec!(700),
                acwr: Some(dec!(1)),
                acwr_zone: None,
                monotony: None,
                strain: None,
                fatigue_score: Some(dec!(10)),
                risk_level: RiskLevel::Low,
                insufficient_data: false,
                subjective: None,
                recommendation: String::new(),
                next_session_adjustment: String::new(),
            },
            created_at: now(),
            correction: None,
        }
    }

    fn with_acwr(mut a: FatigueAnalysis, acwr: Decimal) -> FatigueAnalysis {
        a.assessment.acwr = Some(acwr);
        a
    }

    fn with_monotony(mut a: FatigueAnalysis, monotony: Decimal, strain: Decimal) -> FatigueAnalysis {
        a.assessment.monotony = Some(monotony);
        a.assessment.strain = Some(strain);
        a
    }

    fn stored(alert: NewAlert, id: u64) -> FatigueAlert {
        FatigueAlert {
            id: AlertId(id),
            client_id: alert.client_id,
            trainer_id: alert.trainer_id,
            analysis_id: alert.analysis_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            title: alert.title,
            message: alert.message,
            recommendations: alert.recommendations,
            state: AlertState::Unread,
            created_at: alert.created_at,
        }
    }

    #[test]
    fn test_resolve_from_unread_equals_read_then_resolve() {
        let by = UserId(7);
        let at = now();

        let direct = AlertState::Unread.resolve(by, at, None).unwrap();
        let stepwise = AlertState::Unread
            .mark_read(by, at)
            .unwrap()
            .resolve(by, at, None)
            .unwrap();
        assert_eq!(direct, stepwise);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let first_read = now();
        let read = AlertState::Unread.mark_read(UserId(1), first_read).unwrap();

        // Re-reading keeps the original stamp
        let again = read.mark_read(UserId(2), first_read + Duration::hours(1)).unwrap();
        assert_eq!(read, again);

        let resolved = read
            .resolve(UserId(2), first_read + Duration::hours(2), Some("Deload scheduled".into()))
            .unwrap();
        match &resolved {
            AlertState::Resolved {
                read_at, read_by, resolved_by, resolution_notes, ..
            } => {
                assert_eq!(*read_at, first_read);
                assert_eq!(*read_by, UserId(1));
                assert_eq!(*resolved_by, UserId(2));
                assert_eq!(resolution_notes.as_deref(), Some("Deload scheduled"));
            }
            other => panic!("expected resolved, got {:?}", other),
        }

        assert_eq!(
            resolved.resolve(UserId(1), now(), None),
            Err(TransitionError::AlreadyResolved)
        );
        assert_eq!(
            resolved.mark_read(UserId(1), now()),
            Err(TransitionError::AlreadyResolved)
        );
    }

    #[test]
    fn test_acwr_spike_is_not_duplicated_while_open() {
        let engine = AlertEngine::default();
        let first = with_acwr(analysis(1, 20), dec!(1.8));

        let raised = engine.evaluate(&first, &[], &[], now());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::AcwrSpike);
        assert_eq!(raised[0].severity, AlertSeverity::High);

        let mut existing = vec![stored(raised[0].clone(), 1)];
        let second = with_acwr(analysis(2, 21), dec!(2.1));
        assert!(engine.evaluate(&second, &[first.clone()], &existing, now()).is_empty());

        // Read is still open
        existing[0].state = existing[0].state.mark_read(UserId(1), now()).unwrap();
        assert!(engine.evaluate(&second, &[first.clone()], &existing, now()).is_empty());

        // Resolved frees the episode
        existing[0].state = existing[0].state.resolve(UserId(1), now(), None).unwrap();
        let raised = engine.evaluate(&second, &[first], &existing, now());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_acwr_at_threshold_does_not_trigger() {
        let engine = AlertEngine::default();
        let at_threshold = with_acwr(analysis(1, 20), dec!(1.5));
        assert!(engine.evaluate(&at_threshold, &[], &[], now()).is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_retrigger() {
        let engine = AlertEngine::new(AlertConfig {
            retrigger_cooldown_days: 3,
            ..AlertConfig::default()
        });
        let spike = with_acwr(analysis(1, 20), dec!(1.8));
        let mut alert = stored(engine.evaluate(&spike, &[], &[], now())[0].clone(), 1);
        alert.state = alert.state.resolve(UserId(1), now(), None).unwrap();
        let existing = vec![alert];

        let next = with_acwr(analysis(2, 21), dec!(1.8));
        assert!(engine
            .evaluate(&next, &[spike.clone()], &existing, now() + Duration::days(2))
            .is_empty());
        assert_eq!(
            engine
                .evaluate(&next, &[spike], &existing, now() + Duration::days(3))
                .len(),
            1
        );
    }

    #[test]
    fn test_monotony_needs_consecutive_analyses() {
        let engine = AlertEngine::default();
        let first = with_monotony(analysis(1, 20), dec!(2.4), dec!(5000));
        assert!(engine.evaluate(&first, &[], &[], now()).is_empty());

        let second = with_monotony(analysis(2, 21), dec!(2.2), dec!(5000));
        let raised = engine.evaluate(&second, &[first], &[], now());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::HighMonotony);
        assert_eq!(raised[0].severity, AlertSeverity::Medium);
    }

    #[test]
    fn test_rerun_of_same_date_does_not_extend_streaks() {
        let engine = AlertEngine::default();
        let first = with_monotony(analysis(1, 20), dec!(2.4), dec!(12000));
        let retry = with_monotony(analysis(2, 20), dec!(2.4), dec!(12000));
        let again = with_monotony(analysis(3, 20), dec!(2.4), dec!(12000));

        assert!(engine
            .evaluate(&retry, &[first.clone()], &[], now())
            .is_empty());
        assert!(engine
            .evaluate(&again, &[first.clone(), retry.clone()], &[], now())
            .is_empty());

        // The next day still completes the monotony streak
        let next_day = with_monotony(analysis(4, 21), dec!(2.4), dec!(12000));
        let raised = engine.evaluate(&next_day, &[first, retry, again], &[], now());
        let types: Vec<AlertType> = raised.iter().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::HighMonotony]);
    }

    #[test]
    fn test_insufficient_data_breaks_streaks() {
        let engine = AlertEngine::default();
        let a = with_monotony(analysis(1, 18), dec!(2.5), dec!(12000));
        let b = with_monotony(analysis(2, 19), dec!(2.5), dec!(12000));
        let mut gap = analysis(3, 20);
        gap.assessment.insufficient_data = true;
        gap.assessment.acwr = None;
        let c = with_monotony(analysis(4, 21), dec!(2.5), dec!(12000));

        assert!(engine.evaluate(&gap, &[a.clone(), b.clone()], &[], now()).is_empty());

        // Only one analysis since the break: neither streak is long enough
        let raised = engine.evaluate(&c, &[a.clone(), b.clone(), gap.clone()], &[], now());
        assert!(raised.is_empty());

        let d = with_monotony(analysis(5, 22), dec!(2.5), dec!(12000));
        let raised = engine.evaluate(&d, &[a, b, gap, c], &[], now());
        let types: Vec<AlertType> = raised.iter().map(|r| r.alert_type).collect();
        assert_eq!(types, vec![AlertType::HighMonotony]);
    }

    #[test]
    fn test_sustained_strain_after_three_analyses() {
        let engine = AlertEngine::default();
        let history: Vec<FatigueAnalysis> = (1..=2)
            .map(|i| with_monotony(analysis(i, 18 + i as u32), dec!(1.5), dec!(11000)))
            .collect();
        let latest = with_monotony(analysis(3, 21), dec!(1.5), dec!(10500));

        let raised = engine.evaluate(&latest, &history, &[], now());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::SustainedHighStrain);
        assert!(raised[0].message.contains("3 consecutive"));
    }

    #[test]
    fn test_back_dated_analysis_raises_nothing() {
        let engine = AlertEngine::default();
        let later = analysis(1, 25);
        let back_dated = with_acwr(analysis(2, 20), dec!(1.9));
        assert!(engine.evaluate(&back_dated, &[later], &[], now()).is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(AlertConfig::default().validate().is_ok());
        let bad = AlertConfig {
            strain_consecutive: 0,
            ..AlertConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_episode_state_tracks_latest_alert() {
        assert_eq!(EpisodeState::of(&[], AlertType::AcwrSpike), EpisodeState::None);

        let engine = AlertEngine::default();
        let spike = with_acwr(analysis(1, 20), dec!(1.8));
        let alert = stored(engine.evaluate(&spike, &[], &[], now())[0].clone(), 1);
        assert_eq!(
            EpisodeState::of(&[alert.clone()], AlertType::AcwrSpike),
            EpisodeState::Unread
        );
        assert_eq!(
            EpisodeState::of(&[alert], AlertType::HighMonotony),
            EpisodeState::None
        );
    }
}
