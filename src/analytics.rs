//! Fatigue trend analytics
//!
//! Composes stored analyses and alerts into a period summary. Nothing is
//! recomputed here, so a trend is a historical view and never the source of
//! truth for a client's current risk.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{FatigueError, Result};
use crate::models::{
    AlertSeverity, AnalysisId, ClientId, FatigueAlert, FatigueAnalysis, RiskLevel, SubjectiveInputs,
};
use crate::rollup::WorkloadRollup;

/// Inclusive date range for trend queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AnalysisPeriod {
    pub const MIN_DAYS: u32 = 7;
    pub const MAX_DAYS: u32 = 365;
    pub const DEFAULT_DAYS: u32 = 30;

    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(FatigueError::invalid(
                "period",
                "start date must not be after end date",
            ));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending on `end` (inclusive)
    pub fn last_days(end: NaiveDate, days: u32) -> Result<Self> {
        if !(Self::MIN_DAYS..=Self::MAX_DAYS).contains(&days) {
            return Err(FatigueError::invalid(
                "days",
                format!(
                    "must be between {} and {}, got {}",
                    Self::MIN_DAYS,
                    Self::MAX_DAYS,
                    days
                ),
            ));
        }
        let start = end
            .checked_sub_days(Days::new(days as u64 - 1))
            .ok_or_else(|| FatigueError::invalid("days", "period starts before the calendar"))?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Direction of the fatigue score across a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    pub low: usize,
    pub moderate: usize,
    pub high: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl RiskCounts {
    fn add(&mut self, risk: RiskLevel) {
        match risk {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Moderate => self.moderate += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
            RiskLevel::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: AlertSeverity) {
        match severity {
            AlertSeverity::Low => self.low += 1,
            AlertSeverity::Medium => self.medium += 1,
            AlertSeverity::High => self.high += 1,
            AlertSeverity::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

/// Aggregate figures for a trend period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub analysis_count: usize,
    pub insufficient_data_count: usize,
    pub min_score: Option<Decimal>,
    pub max_score: Option<Decimal>,
    pub average_score: Option<Decimal>,
    pub average_acwr: Option<Decimal>,
    pub score_trend: Option<TrendDirection>,
    pub risk_counts: RiskCounts,
    pub alerts_by_severity: SeverityCounts,
    pub latest_risk: Option<RiskLevel>,
    /// Mean reported fatigue before and after sessions in the period
    pub average_pre_fatigue: Option<Decimal>,
    pub average_post_fatigue: Option<Decimal>,
    pub average_fatigue_delta: Option<Decimal>,
    pub average_pre_energy: Option<Decimal>,
    pub average_post_energy: Option<Decimal>,
    pub average_energy_delta: Option<Decimal>,
}

/// Self-reported fatigue and energy around one analysed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectivePoint {
    pub date: NaiveDate,
    pub analysis_id: AnalysisId,
    pub risk_level: RiskLevel,
    pub pre_fatigue: Option<Decimal>,
    pub post_fatigue: Option<Decimal>,
    pub fatigue_delta: Option<Decimal>,
    pub pre_energy: Option<Decimal>,
    pub post_energy: Option<Decimal>,
    pub energy_delta: Option<Decimal>,
}

impl SubjectivePoint {
    fn from_analysis(analysis: &FatigueAnalysis) -> Self {
        let inputs = analysis.assessment.subjective.clone().unwrap_or_default();
        SubjectivePoint {
            date: analysis.assessment.analysis_date,
            analysis_id: analysis.id,
            risk_level: analysis.assessment.risk_level,
            pre_fatigue: inputs.pre_fatigue_level,
            post_fatigue: inputs.post_fatigue_level,
            fatigue_delta: inputs.fatigue_delta(),
            pre_energy: inputs.pre_energy_level,
            post_energy: inputs.post_energy_level,
            energy_delta: inputs.energy_delta(),
        }
    }
}

/// Trend view over a client's stored analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueTrend {
    pub client_id: ClientId,
    pub period: AnalysisPeriod,
    pub analyses: Vec<FatigueAnalysis>,
    pub summary: TrendSummary,
    /// One point per analysis, oldest first
    pub subjective: Vec<SubjectivePoint>,
    pub workload: Vec<WorkloadRollup>,
}

/// Builds trend views from stored records
pub struct AnalyticsAggregator {
    /// Relative score change that counts as a trend
    trend_threshold: Decimal,
}

impl AnalyticsAggregator {
    pub fn new() -> Self {
        Self {
            trend_threshold: dec!(0.05),
        }
    }

    pub fn trend(
        &self,
        client_id: ClientId,
        period: AnalysisPeriod,
        analyses: &[FatigueAnalysis],
        alerts: &[FatigueAlert],
        workload: Vec<WorkloadRollup>,
    ) -> FatigueTrend {
        let mut in_period: Vec<FatigueAnalysis> = analyses
            .iter()
            .filter(|a| a.client_id == client_id && period.contains(a.assessment.analysis_date))
            .cloned()
            .collect();
        in_period.sort_by_key(|a| (a.assessment.analysis_date, a.id));

        let alerts_in_period: Vec<&FatigueAlert> = alerts
            .iter()
            .filter(|a| a.client_id == client_id && period.contains(a.created_at.date_naive()))
            .collect();

        let summary = self.summarize(&in_period, &alerts_in_period);
        let subjective = in_period.iter().map(SubjectivePoint::from_analysis).collect();
        FatigueTrend {
            client_id,
            period,
            analyses: in_period,
            summary,
            subjective,
            workload,
        }
    }

    /// Summary over analyses already ordered by date
    pub fn summarize(&self, analyses: &[FatigueAnalysis], alerts: &[&FatigueAlert]) -> TrendSummary {
        let scores: Vec<Decimal> = analyses
            .iter()
            .filter_map(|a| a.assessment.fatigue_score)
            .collect();
        let acwrs: Vec<Decimal> = analyses.iter().filter_map(|a| a.assessment.acwr).collect();
        let reported = |field: fn(&SubjectiveInputs) -> Option<Decimal>| -> Vec<Decimal> {
            analyses
                .iter()
                .filter_map(|a| field(a.assessment.subjective.as_ref()?))
                .collect()
        };

        let mut risk_counts = RiskCounts::default();
        for analysis in analyses {
            risk_counts.add(analysis.assessment.risk_level);
        }

        let mut alerts_by_severity = SeverityCounts::default();
        for alert in alerts {
            alerts_by_severity.add(alert.severity);
        }

        TrendSummary {
            analysis_count: analyses.len(),
            insufficient_data_count: analyses
                .iter()
                .filter(|a| a.assessment.insufficient_data)
                .count(),
            min_score: scores.iter().min().copied(),
            max_score: scores.iter().max().copied(),
            average_score: mean(&scores),
            average_acwr: mean(&acwrs),
            score_trend: self.direction(&scores),
            risk_counts,
            alerts_by_severity,
            latest_risk: analyses.last().map(|a| a.assessment.risk_level),
            average_pre_fatigue: mean(&reported(|s| s.pre_fatigue_level)),
            average_post_fatigue: mean(&reported(|s| s.post_fatigue_level)),
            average_fatigue_delta: mean(&reported(SubjectiveInputs::fatigue_delta)),
            average_pre_energy: mean(&reported(|s| s.pre_energy_level)),
            average_post_energy: mean(&reported(|s| s.post_energy_level)),
            average_energy_delta: mean(&reported(SubjectiveInputs::energy_delta)),
        }
    }

    fn direction(&self, scores: &[Decimal]) -> Option<TrendDirection> {
        if scores.len() < 2 {
            return None;
        }
        let start = scores[0];
        let end = scores[scores.len() - 1];
        let change = (end - start) / start.abs().max(Decimal::ONE);

        Some(if change > self.trend_threshold {
            TrendDirection::Increasing
        } else if change < -self.trend_threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        })
    }
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let total: Decimal = values.iter().sum();
    Some((total / Decimal::from(values.len())).round_dp(2).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertId, AlertState, AlertType, FatigueAssessment, TrainerId};
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn analysis(id: u64, d: u32, score: Option<Decimal>, risk: RiskLevel) -> FatigueAnalysis {
        FatigueAnalysis {
            id: AnalysisId(id),
            client_id: ClientId(1),
            trainer_id: TrainerId(1),
            session_id: None,
            assessment: FatigueAssessment {
                analysis_date: day(d),
                acute_load: dec!(700),
                chronic_load: dec!(700),
                acwr: score.map(|_| dec!(1.2)),
                acwr_zone: None,
                monotony: None,
                strain: None,
                fatigue_score: score,
                risk_level: risk,
                insufficient_data: score.is_none(),
                subjective: None,
                recommendation: String::new(),
                next_session_adjustment: String::new(),
            },
            created_at: Utc.with_ymd_and_hms(2024, 9, d, 18, 0, 0).unwrap(),
            correction: None,
        }
    }

    fn alert(id: u64, d: u32, severity: AlertSeverity) -> FatigueAlert {
        FatigueAlert {
            id: AlertId(id),
            client_id: ClientId(1),
            trainer_id: TrainerId(1),
            analysis_id: AnalysisId(1),
            alert_type: AlertType::AcwrSpike,
            severity,
            title: String::new(),
            message: String::new(),
            recommendations: None,
            state: AlertState::Unread,
            created_at: Utc.with_ymd_and_hms(2024, 9, d, 18, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_last_days_bounds() {
        let end = day(30);
        let period = AnalysisPeriod::last_days(end, 30).unwrap();
        assert_eq!(period.start, day(1));
        assert_eq!(period.days(), 30);

        assert!(AnalysisPeriod::last_days(end, 6).is_err());
        assert!(AnalysisPeriod::last_days(end, 366).is_err());
        assert!(AnalysisPeriod::last_days(end, 7).is_ok());
        assert!(AnalysisPeriod::new(day(10), day(9)).is_err());
    }

    #[test]
    fn test_trend_summary() {
        let mut with_feedback = analysis(3, 12, Some(dec!(70)), RiskLevel::High);
        with_feedback.assessment.subjective = Some(SubjectiveInputs {
            pre_fatigue_level: Some(dec!(3)),
            post_fatigue_level: Some(dec!(8)),
            ..Default::default()
        });

        let analyses = vec![
            analysis(1, 5, Some(dec!(20)), RiskLevel::Low),
            analysis(2, 8, None, RiskLevel::Unknown),
            with_feedback,
            // Outside the period
            analysis(4, 2, Some(dec!(99)), RiskLevel::Critical),
        ];
        let alerts = vec![
            alert(1, 12, AlertSeverity::High),
            alert(2, 13, AlertSeverity::Critical),
            alert(3, 1, AlertSeverity::Medium),
        ];

        let period = AnalysisPeriod::new(day(4), day(20)).unwrap();
        let trend = AnalyticsAggregator::new().trend(ClientId(1), period, &analyses, &alerts, Vec::new());
        let summary = &trend.summary;

        assert_eq!(trend.analyses.len(), 3);
        assert_eq!(summary.analysis_count, 3);
        assert_eq!(summary.insufficient_data_count, 1);
        assert_eq!(summary.min_score, Some(dec!(20)));
        assert_eq!(summary.max_score, Some(dec!(70)));
        assert_eq!(summary.average_score, Some(dec!(45)));
        assert_eq!(summary.score_trend, Some(TrendDirection::Increasing));
        assert_eq!(summary.risk_counts.low, 1);
        assert_eq!(summary.risk_counts.high, 1);
        assert_eq!(summary.risk_counts.unknown, 1);
        assert_eq!(summary.risk_counts.critical, 0);
        assert_eq!(summary.alerts_by_severity.high, 1);
        assert_eq!(summary.alerts_by_severity.critical, 1);
        assert_eq!(summary.alerts_by_severity.total(), 2);
        assert_eq!(summary.latest_risk, Some(RiskLevel::High));
        assert_eq!(summary.average_pre_fatigue, Some(dec!(3)));
        assert_eq!(summary.average_post_fatigue, Some(dec!(8)));
        assert_eq!(summary.average_fatigue_delta, Some(dec!(5)));
    }

    #[test]
    fn test_energy_trend_follows_each_analysis() {
        let mut first = analysis(1, 5, Some(dec!(30)), RiskLevel::Low);
        first.assessment.subjective = Some(SubjectiveInputs {
            pre_energy_level: Some(dec!(8)),
            post_energy_level: Some(dec!(5)),
            pre_fatigue_level: Some(dec!(2)),
            ..Default::default()
        });
        let mut second = analysis(2, 9, Some(dec!(60)), RiskLevel::High);
        second.assessment.subjective = Some(SubjectiveInputs {
            pre_energy_level: Some(dec!(6)),
            post_energy_level: Some(dec!(2)),
            ..Default::default()
        });
        let third = analysis(3, 11, Some(dec!(40)), RiskLevel::Moderate);

        let period = AnalysisPeriod::new(day(1), day(30)).unwrap();
        let trend = AnalyticsAggregator::new().trend(
            ClientId(1),
            period,
            &[third, second, first],
            &[],
            Vec::new(),
        );

        let dates: Vec<NaiveDate> = trend.subjective.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(5), day(9), day(11)]);
        assert_eq!(trend.subjective[0].energy_delta, Some(dec!(-3)));
        assert_eq!(trend.subjective[1].energy_delta, Some(dec!(-4)));
        assert_eq!(trend.subjective[1].risk_level, RiskLevel::High);
        // No feedback recorded for the last session
        assert_eq!(trend.subjective[2].pre_energy, None);
        assert_eq!(trend.subjective[2].energy_delta, None);

        let summary = &trend.summary;
        assert_eq!(summary.average_pre_energy, Some(dec!(7)));
        assert_eq!(summary.average_post_energy, Some(dec!(3.5)));
        assert_eq!(summary.average_energy_delta, Some(dec!(-3.5)));
        assert_eq!(summary.average_pre_fatigue, Some(dec!(2)));
        assert_eq!(summary.average_fatigue_delta, None);
    }

    #[test]
    fn test_empty_period() {
        let period = AnalysisPeriod::last_days(day(30), 7).unwrap();
        let trend = AnalyticsAggregator::new().trend(ClientId(1), period, &[], &[], Vec::new());
        assert_eq!(trend.summary.analysis_count, 0);
        assert_eq!(trend.summary.average_score, None);
        assert_eq!(trend.summary.score_trend, None);
        assert_eq!(trend.summary.latest_risk, None);
    }
}
