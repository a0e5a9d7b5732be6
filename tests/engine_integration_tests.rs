//! End-to-end tests of the analysis pipeline over the in-memory store
//!
//! Every test drives the engine with a fixed clock so analysis dates and
//! alert timestamps are reproducible.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use fatiguers::analytics::AnalysisPeriod;
use fatiguers::engine::{AnalysisCorrection, AnalysisRequest, EngineConfig, FatigueEngine, FixedClock};
use fatiguers::error::FatigueError;
use fatiguers::models::{
    AlertSeverity, AlertState, AlertType, ClientId, ClientRef, NewWorkloadEntry, Page, RiskLevel,
    SubjectiveInputs, TrainerId, UserId, WorkloadUpdate,
};
use fatiguers::scope::AccessScope;
use fatiguers::store::MemoryStore;
use fatiguers::AcwrZone;

const TRAINER: TrainerId = TrainerId(10);
const COACH: UserId = UserId(10);

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

fn noon(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

fn days_ago(n: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(n)).unwrap()
}

fn engine() -> (FatigueEngine<MemoryStore>, Arc<FixedClock>) {
    engine_with(EngineConfig::default())
}

fn engine_with(config: EngineConfig) -> (FatigueEngine<MemoryStore>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(noon(today())));
    let engine = FatigueEngine::with_clock(MemoryStore::new(), config, clock.clone()).unwrap();
    (engine, clock)
}

fn register(engine: &FatigueEngine<MemoryStore>, id: u64) -> ClientId {
    let client_id = ClientId(id);
    engine
        .register_client(
            &AccessScope::Admin,
            ClientRef {
                id: client_id,
                trainer_id: TRAINER,
                name: Some(format!("Client {}", id)),
            },
        )
        .unwrap();
    client_id
}

fn record(engine: &FatigueEngine<MemoryStore>, client_id: ClientId, date: NaiveDate, load: Decimal) {
    engine
        .record_workload(
            &AccessScope::Admin,
            NewWorkloadEntry {
                client_id,
                timestamp: Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap()),
                volume_load: load,
                subjective_load: None,
                session_id: None,
                notes: None,
            },
        )
        .unwrap();
}

/// 28 days at 100 ending today
fn constant_history(engine: &FatigueEngine<MemoryStore>, client_id: ClientId) {
    for n in 0..28 {
        record(engine, client_id, days_ago(n), dec!(100));
    }
}

/// 21 days at 100 followed by 7 days at 300 ending today
fn spike_history(engine: &FatigueEngine<MemoryStore>, client_id: ClientId) {
    for n in 0..28 {
        let load = if n < 7 { dec!(300) } else { dec!(100) };
        record(engine, client_id, days_ago(n), load);
    }
}

/// 28 days alternating 100 and 110 ending today (monotony 21)
fn alternating_history(engine: &FatigueEngine<MemoryStore>, client_id: ClientId) {
    for n in 0..28 {
        let load = if n % 2 == 0 { dec!(100) } else { dec!(110) };
        record(engine, client_id, days_ago(n), load);
    }
}

fn analyze(engine: &FatigueEngine<MemoryStore>, client_id: ClientId) -> fatiguers::AnalysisOutcome {
    engine
        .run_analysis(&AccessScope::Admin, AnalysisRequest::new(client_id))
        .unwrap()
}

#[test]
fn test_constant_load_is_optimal_without_alerts() {
    let (engine, _) = engine();
    let client = register(&engine, 1);
    constant_history(&engine, client);

    let outcome = analyze(&engine, client);
    let assessment = &outcome.analysis.assessment;

    assert_eq!(assessment.analysis_date, today());
    assert_eq!(assessment.acute_load, dec!(700));
    assert_eq!(assessment.chronic_load, dec!(700));
    assert_eq!(assessment.acwr, Some(dec!(1)));
    assert_eq!(assessment.acwr_zone, Some(AcwrZone::Optimal));
    assert_eq!(assessment.monotony, None);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert!(!assessment.insufficient_data);
    assert!(outcome.alerts.is_empty());
}

#[test]
fn test_load_spike_raises_single_unread_alert() {
    let (engine, _) = engine();
    let client = register(&engine, 1);
    spike_history(&engine, client);

    let first = analyze(&engine, client);
    let acwr = first.analysis.assessment.acwr.unwrap();
    assert!(acwr > dec!(2.0), "acwr was {}", acwr);
    assert!(first.analysis.assessment.risk_level >= RiskLevel::High);

    assert_eq!(first.alerts.len(), 1);
    let alert = &first.alerts[0];
    assert_eq!(alert.alert_type, AlertType::AcwrSpike);
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert_eq!(alert.state, AlertState::Unread);
    assert_eq!(alert.analysis_id, first.analysis.id);

    // Same condition again while the first alert is open
    let second = analyze(&engine, client);
    assert!(second.alerts.is_empty());

    let open = engine.list_open(&AccessScope::Admin, client).unwrap();
    assert_eq!(open.len(), 1);
    let unread = engine.list_unread(&AccessScope::Admin, Page::default()).unwrap();
    assert_eq!(unread.len(), 1);
}

#[test]
fn test_resolved_alert_allows_new_episode() {
    let (engine, clock) = engine();
    let client = register(&engine, 1);
    spike_history(&engine, client);

    let first = analyze(&engine, client);
    engine
        .resolve(&AccessScope::Admin, first.alerts[0].id, COACH, None)
        .unwrap();

    clock.advance(chrono::Duration::hours(1));
    let second = analyze(&engine, client);
    assert_eq!(second.alerts.len(), 1);
    assert_ne!(second.alerts[0].id, first.alerts[0].id);
}

#[test]
fn test_no_history_is_insufficient_data() {
    let (engine, _) = engine();
    let client = register(&engine, 1);

    let outcome = analyze(&engine, client);
    let assessment = &outcome.analysis.assessment;

    assert!(assessment.insufficient_data);
    assert_eq!(assessment.risk_level, RiskLevel::Unknown);
    assert_eq!(assessment.fatigue_score, None);
    assert_eq!(assessment.acwr, None);
    assert!(outcome.alerts.is_empty());

    // Persisted all the same
    let stored = engine
        .get_analysis(&AccessScope::Admin, outcome.analysis.id)
        .unwrap();
    assert!(stored.assessment.insufficient_data);
}

#[test]
fn test_subjective_inputs_score_without_history() {
    let (engine, _) = engine();
    let client = register(&engine, 1);

    let request = AnalysisRequest {
        subjective: Some(SubjectiveInputs {
            post_fatigue_level: Some(dec!(9)),
            muscle_soreness: Some(dec!(8)),
            ..SubjectiveInputs::default()
        }),
        ..AnalysisRequest::new(client)
    };
    let outcome = engine.run_analysis(&AccessScope::Admin, request).unwrap();
    let assessment = &outcome.analysis.assessment;

    assert!(!assessment.insufficient_data);
    assert!(assessment.fatigue_score.is_some());
    assert_ne!(assessment.risk_level, RiskLevel::Unknown);
}

#[test]
fn test_out_of_range_subjective_input_is_rejected() {
    let (engine, _) = engine();
    let client = register(&engine, 1);

    let request = AnalysisRequest {
        subjective: Some(SubjectiveInputs {
            session_rpe: Some(dec!(11)),
            ..SubjectiveInputs::default()
        }),
        ..AnalysisRequest::new(client)
    };
    let result = engine.run_analysis(&AccessScope::Admin, request);
    assert!(matches!(result, Err(FatigueError::InvalidInput { .. })));

    // Nothing persisted
    let analyses = engine
        .client_analyses(&AccessScope::Admin, client, Page::default())
        .unwrap();
    assert!(analyses.is_empty());
}

#[test]
fn test_future_analysis_date_is_rejected() {
    let (engine, _) = engine();
    let client = register(&engine, 1);

    let request = AnalysisRequest {
        as_of: today().succ_opt(),
        ..AnalysisRequest::new(client)
    };
    let result = engine.run_analysis(&AccessScope::Admin, request);
    assert!(matches!(result, Err(FatigueError::InvalidInput { .. })));
}

#[test]
fn test_future_entry_beyond_skew_is_rejected() {
    let (engine, _) = engine();
    let client = register(&engine, 1);

    let result = engine.record_workload(
        &AccessScope::Admin,
        NewWorkloadEntry {
            client_id: client,
            timestamp: noon(today()) + chrono::Duration::hours(1),
            volume_load: dec!(100),
            subjective_load: None,
            session_id: None,
            notes: None,
        },
    );
    assert!(matches!(result, Err(FatigueError::InvalidInput { .. })));

    // Within the tolerance
    let ok = engine.record_workload(
        &AccessScope::Admin,
        NewWorkloadEntry {
            client_id: client,
            timestamp: noon(today()) + chrono::Duration::seconds(120),
            volume_load: dec!(100),
            subjective_load: None,
            session_id: None,
            notes: None,
        },
    );
    assert!(ok.is_ok());
}

#[test]
fn test_resolving_twice_is_invalid_transition() {
    let (engine, _) = engine();
    let client = register(&engine, 1);
    spike_history(&engine, client);
    let alert_id = analyze(&engine, client).alerts[0].id;

    engine
        .resolve(&AccessScope::Admin, alert_id, COACH, Some("Deload planned".to_string()))
        .unwrap();
    let again = engine.resolve(&AccessScope::Admin, alert_id, COACH, None);
    assert!(matches!(again, Err(FatigueError::InvalidTransition { .. })));

    let read = engine.mark_read(&AccessScope::Admin, alert_id, COACH);
    assert!(matches!(read, Err(FatigueError::InvalidTransition { .. })));

    // Notes from the first resolution survive
    let alert = engine.get_alert(&AccessScope::Admin, alert_id).unwrap();
    match alert.state {
        AlertState::Resolved { resolution_notes, .. } => {
            assert_eq!(resolution_notes.as_deref(), Some("Deload planned"))
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test]
fn test_resolve_from_unread_matches_read_then_resolve() {
    let (engine, _) = engine();
    let direct = register(&engine, 1);
    let stepped = register(&engine, 2);
    spike_history(&engine, direct);
    spike_history(&engine, stepped);

    let direct_alert = analyze(&engine, direct).alerts[0].id;
    let stepped_alert = analyze(&engine, stepped).alerts[0].id;

    let resolved_direct = engine
        .resolve(&AccessScope::Admin, direct_alert, COACH, None)
        .unwrap();
    engine
        .mark_read(&AccessScope::Admin, stepped_alert, COACH)
        .unwrap();
    let resolved_stepped = engine
        .resolve(&AccessScope::Admin, stepped_alert, COACH, None)
        .unwrap();

    assert_eq!(resolved_direct.state, resolved_stepped.state);
    assert_eq!(resolved_direct.read_at(), resolved_direct.resolved_at());
}

#[test]
fn test_mark_read_keeps_first_read_stamp() {
    let (engine, clock) = engine();
    let client = register(&engine, 1);
    spike_history(&engine, client);
    let alert_id = analyze(&engine, client).alerts[0].id;

    let first = engine.mark_read(&AccessScope::Admin, alert_id, COACH).unwrap();
    clock.advance(chrono::Duration::minutes(30));
    let second = engine
        .mark_read(&AccessScope::Admin, alert_id, UserId(99))
        .unwrap();

    assert_eq!(first.state, second.state);
    assert!(engine
        .list_unread(&AccessScope::Admin, Page::default())
        .unwrap()
        .is_empty());
    assert_eq!(engine.list_open(&AccessScope::Admin, client).unwrap().len(), 1);
}

#[test]
fn test_trainer_scope_is_enforced() {
    let (engine, _) = engine();
    let mine = register(&engine, 1);
    let theirs = register(&engine, 2);
    spike_history(&engine, mine);
    spike_history(&engine, theirs);
    analyze(&engine, mine);
    let other_alert = analyze(&engine, theirs).alerts[0].id;

    let scope = AccessScope::trainer(TRAINER, [mine]);

    assert!(matches!(
        engine.run_analysis(&scope, AnalysisRequest::new(theirs)),
        Err(FatigueError::ScopeViolation { .. })
    ));
    assert!(matches!(
        engine.get_alert(&scope, other_alert),
        Err(FatigueError::ScopeViolation { .. })
    ));
    assert!(matches!(
        engine.resolve(&scope, other_alert, COACH, None),
        Err(FatigueError::ScopeViolation { .. })
    ));
    assert!(matches!(
        engine.workload_history(&scope, theirs, None, None),
        Err(FatigueError::ScopeViolation { .. })
    ));

    let unread = engine.list_unread(&scope, Page::default()).unwrap();
    assert_eq!(unread.len(), 1);
    assert!(unread.iter().all(|a| a.client_id == mine));

    let clients = engine.clients(&scope).unwrap();
    assert_eq!(clients.len(), 1);

    // Registering a client for a different trainer is refused
    let foreign = ClientRef {
        id: mine,
        trainer_id: TrainerId(77),
        name: None,
    };
    assert!(matches!(
        engine.register_client(&scope, foreign),
        Err(FatigueError::ScopeViolation { .. })
    ));
}

#[test]
fn test_unknown_resources_are_not_found() {
    let (engine, _) = engine();

    assert!(matches!(
        engine.run_analysis(&AccessScope::Admin, AnalysisRequest::new(ClientId(404))),
        Err(FatigueError::NotFound { .. })
    ));
    assert!(matches!(
        engine.get_alert(&AccessScope::Admin, fatiguers::AlertId(404)),
        Err(FatigueError::NotFound { .. })
    ));
}

#[test]
fn test_entries_in_consumed_period_are_locked() {
    let (engine, _) = engine();
    let client = register(&engine, 1);
    constant_history(&engine, client);
    analyze(&engine, client);

    let history = engine
        .workload_history(&AccessScope::Admin, client, None, None)
        .unwrap();
    let old = history.iter().find(|e| e.date() == days_ago(10)).unwrap();
    let recent = history.iter().find(|e| e.date() == days_ago(2)).unwrap();

    let locked = engine.update_entry(
        &AccessScope::Admin,
        old.id,
        WorkloadUpdate {
            volume_load: Some(dec!(150)),
            ..WorkloadUpdate::default()
        },
    );
    assert!(matches!(locked, Err(FatigueError::InvalidInput { .. })));

    // Moving a recent entry into the locked period is refused too
    let moved = engine.update_entry(
        &AccessScope::Admin,
        recent.id,
        WorkloadUpdate {
            timestamp: Some(noon(days_ago(20))),
            ..WorkloadUpdate::default()
        },
    );
    assert!(matches!(moved, Err(FatigueError::InvalidInput { .. })));

    let updated = engine
        .update_entry(
            &AccessScope::Admin,
            recent.id,
            WorkloadUpdate {
                volume_load: Some(dec!(150)),
                notes: Some("Extra sets".to_string()),
                ..WorkloadUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.volume_load, dec!(150));

    // Deletion is always allowed
    let removed = engine.delete_entry(&AccessScope::Admin, old.id).unwrap();
    assert_eq!(removed.id, old.id);
    assert_eq!(
        engine
            .workload_history(&AccessScope::Admin, client, None, None)
            .unwrap()
            .len(),
        27
    );
}

#[test]
fn test_rollups_follow_entry_changes() {
    let (engine, _) = engine();
    let client = register(&engine, 1);
    constant_history(&engine, client);

    let before = engine
        .workload_rollups(&AccessScope::Admin, client, days_ago(6), today())
        .unwrap();
    assert_eq!(before.len(), 7);
    assert!(before.iter().all(|r| r.total_volume == dec!(100)));

    record(&engine, client, today(), dec!(50));

    let after = engine
        .workload_rollups(&AccessScope::Admin, client, days_ago(6), today())
        .unwrap();
    let last = after.last().unwrap();
    assert_eq!(last.total_volume, dec!(150));
    assert_eq!(last.entry_count, 2);
}

#[test]
fn test_trainer_correction_is_recorded() {
    let (engine, _) = engine();
    let client = register(&engine, 1);
    constant_history(&engine, client);
    let analysis = analyze(&engine, client).analysis;
    let previous_score = analysis.assessment.fatigue_score;

    let corrected = engine
        .correct_analysis(
            &AccessScope::Admin,
            analysis.id,
            AnalysisCorrection {
                corrected_by: COACH,
                risk_level: Some(RiskLevel::High),
                fatigue_score: Some(dec!(70)),
                notes: Some("Reported knee pain".to_string()),
            },
        )
        .unwrap();

    assert_eq!(corrected.assessment.risk_level, RiskLevel::High);
    assert_eq!(corrected.assessment.fatigue_score, Some(dec!(70)));
    let correction = corrected.correction.as_ref().unwrap();
    assert_eq!(correction.previous_risk, RiskLevel::Low);
    assert_eq!(correction.previous_score, previous_score);
    assert_eq!(correction.corrected_by, COACH);

    let stored = engine.get_analysis(&AccessScope::Admin, analysis.id).unwrap();
    assert_eq!(stored, corrected);

    let unknown = engine.correct_analysis(
        &AccessScope::Admin,
        analysis.id,
        AnalysisCorrection {
            corrected_by: COACH,
            risk_level: Some(RiskLevel::Unknown),
            fatigue_score: None,
            notes: None,
        },
    );
    assert!(matches!(unknown, Err(FatigueError::InvalidInput { .. })));
}

#[test]
fn test_trend_over_period() {
    let (engine, clock) = engine();
    let client = register(&engine, 1);
    spike_history(&engine, client);

    for n in [2, 1, 0] {
        clock.set(noon(days_ago(n)));
        let request = AnalysisRequest {
            as_of: Some(days_ago(n)),
            ..AnalysisRequest::new(client)
        };
        engine.run_analysis(&AccessScope::Admin, request).unwrap();
    }

    let period = AnalysisPeriod::last_days(today(), 30).unwrap();
    let trend = engine
        .fatigue_analytics(&AccessScope::Admin, client, period)
        .unwrap();

    assert_eq!(trend.summary.analysis_count, 3);
    assert_eq!(trend.summary.insufficient_data_count, 0);
    assert_eq!(trend.workload.len(), 30);
    assert_eq!(trend.summary.alerts_by_severity.total(), 1);
    assert!(trend.summary.average_acwr.unwrap() > dec!(1.5));
    assert!(trend
        .analyses
        .windows(2)
        .all(|w| w[0].assessment.analysis_date <= w[1].assessment.analysis_date));
    assert_eq!(trend.subjective.len(), 3);
    assert!(trend.subjective.iter().all(|p| p.energy_delta.is_none()));
    assert_eq!(trend.summary.average_pre_fatigue, None);

    // Listings are newest first
    let listed = engine
        .client_analyses(&AccessScope::Admin, client, Page::default())
        .unwrap();
    assert_eq!(listed[0].assessment.analysis_date, today());
}

#[test]
fn test_recompute_all_respects_scope() {
    let (engine, _) = engine();
    let steady = register(&engine, 1);
    let spiking = register(&engine, 2);
    constant_history(&engine, steady);
    spike_history(&engine, spiking);

    let report = engine
        .recompute_all(&AccessScope::Admin, Some(today()))
        .unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.failures.is_empty());
    assert_eq!(report.alerts_raised(), 1);

    let scoped = engine
        .recompute_all(&AccessScope::trainer(TRAINER, [steady]), None)
        .unwrap();
    assert_eq!(scoped.outcomes.len(), 1);
    assert_eq!(scoped.outcomes[0].analysis.client_id, steady);
}

#[test]
fn test_rerunning_same_date_does_not_complete_streaks() {
    let (engine, clock) = engine();
    let client = register(&engine, 1);
    alternating_history(&engine, client);

    let first = analyze(&engine, client);
    assert_eq!(first.analysis.assessment.monotony, Some(dec!(21)));
    assert!(first.alerts.is_empty());

    // Identical retries for the same date
    for _ in 0..3 {
        clock.advance(chrono::Duration::minutes(5));
        let retry = analyze(&engine, client);
        assert!(retry.alerts.is_empty(), "retry raised {:?}", retry.alerts);
    }
    assert!(engine
        .client_alerts(&AccessScope::Admin, client, Page::default())
        .unwrap()
        .is_empty());

    // A second day of high monotony does complete the streak
    clock.set(noon(today()) + chrono::Duration::days(1));
    record(&engine, client, today().succ_opt().unwrap(), dec!(100));
    let next_day = analyze(&engine, client);
    let types: Vec<AlertType> = next_day.alerts.iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::HighMonotony]);
}

#[test]
fn test_oversized_volume_is_rejected_on_record() {
    let (engine, _) = engine();
    let client = register(&engine, 1);

    let result = engine.record_workload(
        &AccessScope::Admin,
        NewWorkloadEntry {
            client_id: client,
            timestamp: noon(today()),
            volume_load: dec!(1000000000000000),
            subjective_load: None,
            session_id: None,
            notes: None,
        },
    );
    assert!(matches!(result, Err(FatigueError::InvalidInput { .. })));
    assert!(engine
        .workload_history(&AccessScope::Admin, client, None, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_decimal_overflow_fails_analysis_without_poisoning_client() {
    let mut config = EngineConfig::default();
    config.tracker.max_volume_load = dec!(100000000000000000000);
    let (engine, _) = engine_with(config);
    let client = register(&engine, 1);
    record(&engine, client, today(), dec!(1000000000000000));

    let first = engine.run_analysis(&AccessScope::Admin, AnalysisRequest::new(client));
    assert!(matches!(first, Err(FatigueError::InvalidInput { .. })));

    // The client stays usable: the same error again, and writes still work
    let second = engine.run_analysis(&AccessScope::Admin, AnalysisRequest::new(client));
    assert!(matches!(second, Err(FatigueError::InvalidInput { .. })));
    record(&engine, client, days_ago(1), dec!(100));
    assert!(engine
        .client_analyses(&AccessScope::Admin, client, Page::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_trend_reports_energy_around_sessions() {
    let (engine, clock) = engine();
    let client = register(&engine, 1);

    for (n, pre, post) in [(1, dec!(8), dec!(6)), (0, dec!(7), dec!(3))] {
        clock.set(noon(days_ago(n)));
        let request = AnalysisRequest {
            as_of: Some(days_ago(n)),
            subjective: Some(SubjectiveInputs {
                pre_energy_level: Some(pre),
                post_energy_level: Some(post),
                pre_fatigue_level: Some(dec!(4)),
                ..SubjectiveInputs::default()
            }),
            ..AnalysisRequest::new(client)
        };
        engine.run_analysis(&AccessScope::Admin, request).unwrap();
    }

    let period = AnalysisPeriod::last_days(today(), 7).unwrap();
    let trend = engine
        .fatigue_analytics(&AccessScope::Admin, client, period)
        .unwrap();

    let deltas: Vec<Option<Decimal>> = trend.subjective.iter().map(|p| p.energy_delta).collect();
    assert_eq!(deltas, vec![Some(dec!(-2)), Some(dec!(-4))]);
    assert_eq!(trend.summary.average_energy_delta, Some(dec!(-3)));
    assert_eq!(trend.summary.average_pre_fatigue, Some(dec!(4)));
}
