//! Engine facade
//!
//! Wires the tracker, aggregator, analyzer, alert engine and analytics into
//! one pipeline behind a store. Every call takes an [`AccessScope`] decided
//! by the caller's authorization layer; the engine only checks membership.
//!
//! Writes for one client are serialized through [`ClientLocks`], so two
//! analyses of the same client never evaluate alerts against the same stale
//! alert list. Different clients proceed independently.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::alerts::{AlertConfig, AlertEngine};
use crate::analytics::{AnalysisPeriod, AnalyticsAggregator, FatigueTrend};
use crate::analyzer::{AnalyzerConfig, FatigueAnalyzer};
use crate::error::{FatigueError, ResourceKind, Result, TransitionError};
use crate::models::{
    AlertId, AlertState, AnalysisId, ClientId, ClientRef, EntryId, FatigueAlert, FatigueAnalysis,
    NewWorkloadEntry, Page, RiskLevel, SubjectiveInputs, TrainerCorrection, UserId, WorkloadEntry,
    WorkloadUpdate,
};
use crate::rollup::{RollupCache, RollupCacheConfig, WorkloadRollup};
use crate::scope::AccessScope;
use crate::store::Store;
use crate::tracker::{TrackerConfig, WorkloadTracker};
use crate::windows::WindowConfig;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut current = self.now.write().unwrap_or_else(|e| e.into_inner());
        *current = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.now.write().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Registry size past which idle client locks are pruned
const LOCK_PRUNE_THRESHOLD: usize = 256;

/// Keyed lock registry serializing each client's pipeline
///
/// Handles are only handed out under the registry mutex, so an entry whose
/// `Arc` is held by the registry alone has no waiter and can be dropped.
#[derive(Debug)]
pub struct ClientLocks {
    locks: Mutex<HashMap<ClientId, Arc<Mutex<()>>>>,
    prune_threshold: usize,
}

impl Default for ClientLocks {
    fn default() -> Self {
        Self::with_threshold(LOCK_PRUNE_THRESHOLD)
    }
}

impl ClientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(prune_threshold: usize) -> Self {
        ClientLocks {
            locks: Mutex::new(HashMap::new()),
            prune_threshold,
        }
    }

    /// Lock handle for `client_id`, created on first use
    pub fn lock_for(&self, client_id: ClientId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock()?;
        if locks.len() >= self.prune_threshold && !locks.contains_key(&client_id) {
            let before = locks.len();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            debug!(pruned = before - locks.len(), "Pruned idle client locks");
        }
        Ok(locks.entry(client_id).or_default().clone())
    }

    /// Number of client locks currently registered
    pub fn registered(&self) -> Result<usize> {
        Ok(self.locks.lock()?.len())
    }
}

/// Engine configuration, one section per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub windows: WindowConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub rollup_cache: RollupCacheConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.windows.validate()?;
        self.analyzer.validate()?;
        self.alerts.validate()?;
        self.rollup_cache.validate()?;
        Ok(())
    }
}

/// Input for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub client_id: ClientId,
    /// Defaults to today (UTC)
    pub as_of: Option<NaiveDate>,
    pub session_id: Option<u64>,
    pub subjective: Option<SubjectiveInputs>,
}

impl AnalysisRequest {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            as_of: None,
            session_id: None,
            subjective: None,
        }
    }
}

/// Stored analysis plus the alerts it raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analysis: FatigueAnalysis,
    pub alerts: Vec<FatigueAlert>,
}

/// Trainer override of a stored analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCorrection {
    pub corrected_by: UserId,
    pub risk_level: Option<RiskLevel>,
    pub fatigue_score: Option<Decimal>,
    pub notes: Option<String>,
}

/// Result of a batch recomputation
#[derive(Debug, Default)]
pub struct RecomputeReport {
    pub outcomes: Vec<AnalysisOutcome>,
    pub failures: Vec<(ClientId, FatigueError)>,
}

impl RecomputeReport {
    pub fn alerts_raised(&self) -> usize {
        self.outcomes.iter().map(|o| o.alerts.len()).sum()
    }
}

/// Workload and fatigue analytics engine
pub struct FatigueEngine<S: Store> {
    config: EngineConfig,
    store: Mutex<S>,
    tracker: WorkloadTracker,
    analyzer: FatigueAnalyzer,
    alerts: AlertEngine,
    analytics: AnalyticsAggregator,
    rollups: Arc<RollupCache>,
    locks: ClientLocks,
    clock: Arc<dyn Clock>,
}

impl<S: Store> FatigueEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let rollups = Arc::new(RollupCache::with_limits(
            config.windows.clone(),
            config.rollup_cache.clone(),
        ));
        let tracker = WorkloadTracker::new(
            config.tracker.clone(),
            config.windows.clone(),
            Arc::clone(&rollups),
        );
        let analyzer = FatigueAnalyzer::with_config(config.analyzer.clone(), config.windows.clone());
        let alerts = AlertEngine::new(config.alerts.clone());

        Ok(Self {
            config,
            store: Mutex::new(store),
            tracker,
            analyzer,
            alerts,
            analytics: AnalyticsAggregator::new(),
            rollups,
            locks: ClientLocks::new(),
            clock,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rollup_cache(&self) -> &RollupCache {
        &self.rollups
    }

    fn store(&self) -> Result<MutexGuard<'_, S>> {
        Ok(self.store.lock()?)
    }

    fn client_in_scope(&self, scope: &AccessScope, client_id: ClientId) -> Result<ClientRef> {
        scope.check(client_id)?;
        self.store()?
            .client(client_id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::Client, client_id))
    }

    fn clients_in_scope(&self, scope: &AccessScope) -> Result<Vec<ClientRef>> {
        Ok(self
            .store()?
            .clients()?
            .into_iter()
            .filter(|c| scope.permits(c.id))
            .collect())
    }

    /// Register or refresh a client reference supplied by the outer system
    pub fn register_client(&self, scope: &AccessScope, client: ClientRef) -> Result<()> {
        scope.check(client.id)?;
        if let Some(trainer_id) = scope.trainer_id() {
            if trainer_id != client.trainer_id {
                return Err(FatigueError::ScopeViolation {
                    client_id: client.id,
                });
            }
        }
        info!(client_id = %client.id, trainer_id = %client.trainer_id, "Registered client");
        self.store()?.upsert_client(client)
    }

    pub fn clients(&self, scope: &AccessScope) -> Result<Vec<ClientRef>> {
        self.clients_in_scope(scope)
    }

    /// Record one workload observation
    pub fn record_workload(
        &self,
        scope: &AccessScope,
        entry: NewWorkloadEntry,
    ) -> Result<WorkloadEntry> {
        let client = self.client_in_scope(scope, entry.client_id)?;
        let lock = self.locks.lock_for(client.id)?;
        let _guard = lock.lock()?;

        let now = self.clock.now();
        let mut store = self.store()?;
        self.tracker.record(&mut *store, &client, entry, now)
    }

    fn entry_in_scope(&self, scope: &AccessScope, id: EntryId) -> Result<WorkloadEntry> {
        let entry = self
            .store()?
            .entry(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::WorkloadEntry, id))?;
        scope.check(entry.client_id)?;
        Ok(entry)
    }

    /// Update an entry whose period has not been consumed yet
    pub fn update_entry(
        &self,
        scope: &AccessScope,
        id: EntryId,
        update: WorkloadUpdate,
    ) -> Result<WorkloadEntry> {
        let client_id = self.entry_in_scope(scope, id)?.client_id;
        let lock = self.locks.lock_for(client_id)?;
        let _guard = lock.lock()?;

        let now = self.clock.now();
        let mut store = self.store()?;
        // Re-read under the client lock
        let current = store
            .entry(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::WorkloadEntry, id))?;
        self.tracker.update(&mut *store, current, update, now)
    }

    pub fn delete_entry(&self, scope: &AccessScope, id: EntryId) -> Result<WorkloadEntry> {
        let client_id = self.entry_in_scope(scope, id)?.client_id;
        let lock = self.locks.lock_for(client_id)?;
        let _guard = lock.lock()?;

        let mut store = self.store()?;
        self.tracker.delete(&mut *store, id)
    }

    pub fn workload_history(
        &self,
        scope: &AccessScope,
        client_id: ClientId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkloadEntry>> {
        self.client_in_scope(scope, client_id)?;
        let store = self.store()?;
        self.tracker.history(&*store, client_id, from, to)
    }

    /// Daily rollups for `[from, to]`, served from the cache when warm
    pub fn workload_rollups(
        &self,
        scope: &AccessScope,
        client_id: ClientId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkloadRollup>> {
        self.client_in_scope(scope, client_id)?;
        self.rollups(client_id, from, to)
    }

    fn rollups(&self, client_id: ClientId, from: NaiveDate, to: NaiveDate) -> Result<Vec<WorkloadRollup>> {
        let since = self.window_start(from);
        self.rollups.rollups(client_id, from, to, || {
            self.store()?
                .entries_for_client(client_id, Some(since), None)
        })
    }

    /// Earliest instant any window ending on `as_of` can read
    fn window_start(&self, as_of: NaiveDate) -> DateTime<Utc> {
        let reach = self.config.windows.chronic_window_days.saturating_sub(1) as u64;
        as_of
            .checked_sub_days(Days::new(reach))
            .unwrap_or(NaiveDate::MIN)
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    /// Run the full pipeline for one client: aggregate, analyze, persist,
    /// evaluate alerts
    pub fn run_analysis(
        &self,
        scope: &AccessScope,
        request: AnalysisRequest,
    ) -> Result<AnalysisOutcome> {
        let client = self.client_in_scope(scope, request.client_id)?;
        let lock = self.locks.lock_for(client.id)?;
        let _guard = lock.lock()?;

        let now = self.clock.now();
        let today = now.date_naive();
        let as_of = request.as_of.unwrap_or(today);
        if as_of > today {
            return Err(FatigueError::invalid(
                "as_of",
                format!("analysis date {} is after today ({})", as_of, today),
            ));
        }

        let entries = self
            .store()?
            .entries_for_client(client.id, Some(self.window_start(as_of)), None)?;
        let assessment = self
            .analyzer
            .analyze(&entries, as_of, request.subjective.as_ref())?;

        debug!(
            client_id = %client.id,
            as_of = %as_of,
            entries = entries.len(),
            acute_load = %assessment.acute_load,
            chronic_load = %assessment.chronic_load,
            "Aggregated workload windows"
        );

        let mut store = self.store()?;
        let prior = store.analyses_for_client(client.id)?;
        let existing = store.alerts_for_client(client.id)?;
        let (analysis, alerts) = store.insert_analysis_with_alerts(
            &client,
            request.session_id,
            assessment,
            now,
            &mut |analysis| self.alerts.evaluate(analysis, &prior, &existing, now),
        )?;

        let assessment = &analysis.assessment;
        if assessment.insufficient_data {
            info!(
                client_id = %client.id,
                analysis_id = %analysis.id,
                as_of = %as_of,
                "Analysis stored with insufficient data"
            );
        } else {
            info!(
                client_id = %client.id,
                analysis_id = %analysis.id,
                as_of = %as_of,
                acwr = ?assessment.acwr,
                score = ?assessment.fatigue_score,
                risk = %assessment.risk_level,
                alerts = alerts.len(),
                "Fatigue analysis complete"
            );
        }

        Ok(AnalysisOutcome { analysis, alerts })
    }

    /// Analyses across every client in scope, newest first
    pub fn list_analyses(&self, scope: &AccessScope, page: Page) -> Result<Vec<FatigueAnalysis>> {
        let clients = self.clients_in_scope(scope)?;
        let store = self.store()?;
        let mut analyses = Vec::new();
        for client in clients {
            analyses.extend(store.analyses_for_client(client.id)?);
        }
        analyses.sort_by(|a, b| {
            (b.assessment.analysis_date, b.id).cmp(&(a.assessment.analysis_date, a.id))
        });
        Ok(page.apply(analyses))
    }

    /// One client's analyses, newest first
    pub fn client_analyses(
        &self,
        scope: &AccessScope,
        client_id: ClientId,
        page: Page,
    ) -> Result<Vec<FatigueAnalysis>> {
        self.client_in_scope(scope, client_id)?;
        let mut analyses = self.store()?.analyses_for_client(client_id)?;
        analyses.reverse();
        Ok(page.apply(analyses))
    }

    pub fn get_analysis(&self, scope: &AccessScope, id: AnalysisId) -> Result<FatigueAnalysis> {
        let analysis = self
            .store()?
            .analysis(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::Analysis, id))?;
        scope.check(analysis.client_id)?;
        Ok(analysis)
    }

    /// Trainer override of a stored analysis' risk or score
    ///
    /// Alerts already raised are left as they are.
    pub fn correct_analysis(
        &self,
        scope: &AccessScope,
        id: AnalysisId,
        correction: AnalysisCorrection,
    ) -> Result<FatigueAnalysis> {
        if correction.risk_level == Some(RiskLevel::Unknown) {
            return Err(FatigueError::invalid(
                "risk_level",
                "a correction must name a concrete risk level",
            ));
        }
        if let Some(score) = correction.fatigue_score {
            if score < Decimal::ZERO || score > Decimal::ONE_HUNDRED {
                return Err(FatigueError::invalid(
                    "fatigue_score",
                    format!("must be between 0 and 100, got {}", score),
                ));
            }
        }

        let client_id = self.get_analysis(scope, id)?.client_id;
        let lock = self.locks.lock_for(client_id)?;
        let _guard = lock.lock()?;

        let mut store = self.store()?;
        let mut analysis = store
            .analysis(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::Analysis, id))?;

        let previous_risk = analysis.assessment.risk_level;
        let previous_score = analysis.assessment.fatigue_score;
        if let Some(risk) = correction.risk_level {
            analysis.assessment.risk_level = risk;
        }
        if let Some(score) = correction.fatigue_score {
            analysis.assessment.fatigue_score = Some(score);
        }
        analysis.correction = Some(TrainerCorrection {
            corrected_by: correction.corrected_by,
            corrected_at: self.clock.now(),
            previous_risk,
            previous_score,
            notes: correction.notes,
        });
        store.update_analysis(&analysis)?;

        info!(
            client_id = %analysis.client_id,
            analysis_id = %analysis.id,
            previous_risk = %previous_risk,
            risk = %analysis.assessment.risk_level,
            corrected_by = %correction.corrected_by,
            "Analysis corrected by trainer"
        );
        Ok(analysis)
    }

    /// Trend view over the stored analyses of one client
    pub fn fatigue_analytics(
        &self,
        scope: &AccessScope,
        client_id: ClientId,
        period: AnalysisPeriod,
    ) -> Result<FatigueTrend> {
        self.client_in_scope(scope, client_id)?;
        let (analyses, alerts) = {
            let store = self.store()?;
            (
                store.analyses_for_client(client_id)?,
                store.alerts_for_client(client_id)?,
            )
        };
        let workload = self.rollups(client_id, period.start, period.end)?;

        Ok(self
            .analytics
            .trend(client_id, period, &analyses, &alerts, workload))
    }

    fn alerts_in_scope(&self, scope: &AccessScope) -> Result<Vec<FatigueAlert>> {
        let clients = self.clients_in_scope(scope)?;
        let store = self.store()?;
        let mut alerts = Vec::new();
        for client in clients {
            alerts.extend(store.alerts_for_client(client.id)?);
        }
        alerts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(alerts)
    }

    /// Unread alerts across the scope, newest first
    pub fn list_unread(&self, scope: &AccessScope, page: Page) -> Result<Vec<FatigueAlert>> {
        let unread = self
            .alerts_in_scope(scope)?
            .into_iter()
            .filter(FatigueAlert::is_unread)
            .collect();
        Ok(page.apply(unread))
    }

    /// Unread or read alerts of one client
    pub fn list_open(&self, scope: &AccessScope, client_id: ClientId) -> Result<Vec<FatigueAlert>> {
        self.client_in_scope(scope, client_id)?;
        Ok(self
            .store()?
            .alerts_for_client(client_id)?
            .into_iter()
            .filter(FatigueAlert::is_open)
            .collect())
    }

    /// Every alert of one client, newest first
    pub fn client_alerts(
        &self,
        scope: &AccessScope,
        client_id: ClientId,
        page: Page,
    ) -> Result<Vec<FatigueAlert>> {
        self.client_in_scope(scope, client_id)?;
        let mut alerts = self.store()?.alerts_for_client(client_id)?;
        alerts.reverse();
        Ok(page.apply(alerts))
    }

    pub fn get_alert(&self, scope: &AccessScope, id: AlertId) -> Result<FatigueAlert> {
        let alert = self
            .store()?
            .alert(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::Alert, id))?;
        scope.check(alert.client_id)?;
        Ok(alert)
    }

    pub fn mark_read(&self, scope: &AccessScope, id: AlertId, by: UserId) -> Result<FatigueAlert> {
        self.transition(scope, id, |alert, now| alert.state.mark_read(by, now))
    }

    /// Resolve an alert; an unread alert is marked read at the same instant
    pub fn resolve(
        &self,
        scope: &AccessScope,
        id: AlertId,
        by: UserId,
        notes: Option<String>,
    ) -> Result<FatigueAlert> {
        self.transition(scope, id, |alert, now| {
            alert.state.resolve(by, now, notes.clone())
        })
    }

    fn transition<F>(&self, scope: &AccessScope, id: AlertId, step: F) -> Result<FatigueAlert>
    where
        F: Fn(&FatigueAlert, DateTime<Utc>) -> std::result::Result<AlertState, TransitionError>,
    {
        let client_id = self.get_alert(scope, id)?.client_id;
        let lock = self.locks.lock_for(client_id)?;
        let _guard = lock.lock()?;

        let mut store = self.store()?;
        let mut alert = store
            .alert(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::Alert, id))?;

        let now = self.clock.now();
        let next = step(&alert, now).map_err(|source| {
            warn!(alert_id = %id, error = %source, "Rejected alert transition");
            FatigueError::InvalidTransition {
                alert_id: id,
                source,
            }
        })?;

        if next != alert.state {
            alert.state = next;
            store.update_alert(&alert)?;
            info!(
                alert_id = %id,
                client_id = %alert.client_id,
                alert_type = %alert.alert_type,
                read_at = ?alert.read_at(),
                resolved_at = ?alert.resolved_at(),
                "Alert state advanced"
            );
        }
        Ok(alert)
    }

    /// Run the pipeline for every client in scope, clients in parallel
    pub fn recompute_all(&self, scope: &AccessScope, as_of: Option<NaiveDate>) -> Result<RecomputeReport> {
        let clients = self.clients_in_scope(scope)?;
        info!(clients = clients.len(), as_of = ?as_of, "Starting batch recomputation");

        let results: Vec<(ClientId, Result<AnalysisOutcome>)> = clients
            .par_iter()
            .map(|client| {
                let request = AnalysisRequest {
                    as_of,
                    ..AnalysisRequest::new(client.id)
                };
                (client.id, self.run_analysis(scope, request))
            })
            .collect();

        let mut report = RecomputeReport::default();
        for (client_id, result) in results {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    warn!(client_id = %client_id, error = %error, "Recomputation failed");
                    report.failures.push((client_id, error));
                }
            }
        }

        info!(
            analyzed = report.outcomes.len(),
            failed = report.failures.len(),
            alerts = report.alerts_raised(),
            "Batch recomputation complete"
        );
        Ok(report)
    }
}
