//! Storage seam for the engine
//!
//! The engine only needs a handful of keyed reads and appends, so the
//! persistence technology stays behind [`Store`]. [`MemoryStore`] backs tests
//! and embedded use; `database::SqliteStore` backs the CLI.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{
    AlertId, AlertSeverity, AlertState, AlertType, AnalysisId, ClientId, ClientRef, EntryId,
    FatigueAlert, FatigueAnalysis, FatigueAssessment, NewWorkloadEntry, TrainerId, WorkloadEntry,
};

/// Alert fields decided by the alert engine before an id is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub client_id: ClientId,
    pub trainer_id: TrainerId,
    pub analysis_id: AnalysisId,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub recommendations: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence operations the engine relies on
///
/// Implementations assign ids in insertion order; list methods return records
/// ordered by their natural timeline (timestamp or date, then id).
pub trait Store: Send {
    fn upsert_client(&mut self, client: ClientRef) -> Result<()>;
    fn client(&self, id: ClientId) -> Result<Option<ClientRef>>;
    fn clients(&self) -> Result<Vec<ClientRef>>;

    fn insert_entry(
        &mut self,
        trainer_id: TrainerId,
        entry: NewWorkloadEntry,
        now: DateTime<Utc>,
    ) -> Result<WorkloadEntry>;
    fn update_entry(&mut self, entry: &WorkloadEntry) -> Result<()>;
    fn delete_entry(&mut self, id: EntryId) -> Result<Option<WorkloadEntry>>;
    fn entry(&self, id: EntryId) -> Result<Option<WorkloadEntry>>;
    /// Entries with `from <= timestamp <= to`, ascending, ties by id
    fn entries_for_client(
        &self,
        client_id: ClientId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkloadEntry>>;

    fn insert_analysis(
        &mut self,
        client: &ClientRef,
        session_id: Option<u64>,
        assessment: FatigueAssessment,
        now: DateTime<Utc>,
    ) -> Result<FatigueAnalysis>;
    /// Store an analysis together with the alerts `raise` derives from it
    ///
    /// Either the analysis and every alert are stored, or none of them is.
    fn insert_analysis_with_alerts(
        &mut self,
        client: &ClientRef,
        session_id: Option<u64>,
        assessment: FatigueAssessment,
        now: DateTime<Utc>,
        raise: &mut dyn FnMut(&FatigueAnalysis) -> Vec<NewAlert>,
    ) -> Result<(FatigueAnalysis, Vec<FatigueAlert>)>;
    fn update_analysis(&mut self, analysis: &FatigueAnalysis) -> Result<()>;
    fn analysis(&self, id: AnalysisId) -> Result<Option<FatigueAnalysis>>;
    /// Analyses ordered by analysis date, then id
    fn analyses_for_client(&self, client_id: ClientId) -> Result<Vec<FatigueAnalysis>>;

    fn insert_alert(&mut self, alert: NewAlert) -> Result<FatigueAlert>;
    fn update_alert(&mut self, alert: &FatigueAlert) -> Result<()>;
    fn alert(&self, id: AlertId) -> Result<Option<FatigueAlert>>;
    /// Alerts ordered by creation time, then id
    fn alerts_for_client(&self, client_id: ClientId) -> Result<Vec<FatigueAlert>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: BTreeMap<ClientId, ClientRef>,
    entries: BTreeMap<EntryId, WorkloadEntry>,
    analyses: BTreeMap<AnalysisId, FatigueAnalysis>,
    alerts: BTreeMap<AlertId, FatigueAlert>,
    next_entry_id: u64,
    next_analysis_id: u64,
    next_alert_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

impl Store for MemoryStore {
    fn upsert_client(&mut self, client: ClientRef) -> Result<()> {
        self.clients.insert(client.id, client);
        Ok(())
    }

    fn client(&self, id: ClientId) -> Result<Option<ClientRef>> {
        Ok(self.clients.get(&id).cloned())
    }

    fn clients(&self) -> Result<Vec<ClientRef>> {
        Ok(self.clients.values().cloned().collect())
    }

    fn insert_entry(
        &mut self,
        trainer_id: TrainerId,
        entry: NewWorkloadEntry,
        now: DateTime<Utc>,
    ) -> Result<WorkloadEntry> {
        let id = EntryId(next_id(&mut self.next_entry_id));
        let stored = WorkloadEntry {
            id,
            client_id: entry.client_id,
            trainer_id,
            session_id: entry.session_id,
            timestamp: entry.timestamp,
            volume_load: entry.volume_load,
            subjective_load: entry.subjective_load,
            notes: entry.notes,
            created_at: now,
            updated_at: now,
        };
        self.entries.insert(id, stored.clone());
        Ok(stored)
    }

    fn update_entry(&mut self, entry: &WorkloadEntry) -> Result<()> {
        self.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    fn delete_entry(&mut self, id: EntryId) -> Result<Option<WorkloadEntry>> {
        Ok(self.entries.remove(&id))
    }

    fn entry(&self, id: EntryId) -> Result<Option<WorkloadEntry>> {
        Ok(self.entries.get(&id).cloned())
    }

    fn entries_for_client(
        &self,
        client_id: ClientId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkloadEntry>> {
        let mut entries: Vec<WorkloadEntry> = self
            .entries
            .values()
            .filter(|e| e.client_id == client_id)
            .filter(|e| from.map_or(true, |from| e.timestamp >= from))
            .filter(|e| to.map_or(true, |to| e.timestamp <= to))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.timestamp, e.id));
        Ok(entries)
    }

    fn insert_analysis(
        &mut self,
        client: &ClientRef,
        session_id: Option<u64>,
        assessment: FatigueAssessment,
        now: DateTime<Utc>,
    ) -> Result<FatigueAnalysis> {
        let id = AnalysisId(next_id(&mut self.next_analysis_id));
        let analysis = FatigueAnalysis {
            id,
            client_id: client.id,
            trainer_id: client.trainer_id,
            session_id,
            assessment,
            created_at: now,
            correction: None,
        };
        self.analyses.insert(id, analysis.clone());
        Ok(analysis)
    }

    fn insert_analysis_with_alerts(
        &mut self,
        client: &ClientRef,
        session_id: Option<u64>,
        assessment: FatigueAssessment,
        now: DateTime<Utc>,
        raise: &mut dyn FnMut(&FatigueAnalysis) -> Vec<NewAlert>,
    ) -> Result<(FatigueAnalysis, Vec<FatigueAlert>)> {
        // In-memory inserts cannot fail part way
        let analysis = self.insert_analysis(client, session_id, assessment, now)?;
        let alerts = raise(&analysis)
            .into_iter()
            .map(|alert| self.insert_alert(alert))
            .collect::<Result<Vec<_>>>()?;
        Ok((analysis, alerts))
    }

    fn update_analysis(&mut self, analysis: &FatigueAnalysis) -> Result<()> {
        self.analyses.insert(analysis.id, analysis.clone());
        Ok(())
    }

    fn analysis(&self, id: AnalysisId) -> Result<Option<FatigueAnalysis>> {
        Ok(self.analyses.get(&id).cloned())
    }

    fn analyses_for_client(&self, client_id: ClientId) -> Result<Vec<FatigueAnalysis>> {
        let mut analyses: Vec<FatigueAnalysis> = self
            .analyses
            .values()
            .filter(|a| a.client_id == client_id)
            .cloned()
            .collect();
        analyses.sort_by_key(|a| (a.assessment.analysis_date, a.id));
        Ok(analyses)
    }

    fn insert_alert(&mut self, alert: NewAlert) -> Result<FatigueAlert> {
        let id = AlertId(next_id(&mut self.next_alert_id));
        let stored = FatigueAlert {
            id,
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
        };
        self.alerts.insert(id, stored.clone());
        Ok(stored)
    }

    fn update_alert(&mut self, alert: &FatigueAlert) -> Result<()> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    fn alert(&self, id: AlertId) -> Result<Option<FatigueAlert>> {
        Ok(self.alerts.get(&id).cloned())
    }

    fn alerts_for_client(&self, client_id: ClientId) -> Result<Vec<FatigueAlert>> {
        let mut alerts: Vec<FatigueAlert> = self
            .alerts
            .values()
            .filter(|a| a.client_id == client_id)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| (a.created_at, a.id));
        Ok(alerts)
    }
}
