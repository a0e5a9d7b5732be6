//! Workload observation intake
//!
//! Validates and persists per-session load observations and keeps the
//! rollup cache honest: every write invalidates the days it can influence.

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FatigueError, ResourceKind, Result};
use crate::models::{
    check_scale, ClientId, ClientRef, EntryId, FatigueAnalysis, NewWorkloadEntry, WorkloadEntry,
    WorkloadUpdate,
};
use crate::rollup::RollupCache;
use crate::store::Store;
use crate::windows::WindowConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How far into the future a timestamp may sit before it is rejected
    pub clock_skew_tolerance_secs: i64,

    /// Largest volume load accepted for a single entry (default: 1,000,000)
    pub max_volume_load: Decimal,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            clock_skew_tolerance_secs: 300,
            max_volume_load: Decimal::from(1_000_000),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.clock_skew_tolerance_secs < 0 {
            return Err(FatigueError::Configuration(
                "clock_skew_tolerance_secs must not be negative".to_string(),
            ));
        }
        if self.max_volume_load <= Decimal::ZERO {
            return Err(FatigueError::Configuration(
                "max_volume_load must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Records workload observations for clients
pub struct WorkloadTracker {
    config: TrackerConfig,
    windows: WindowConfig,
    rollups: Arc<RollupCache>,
}

impl WorkloadTracker {
    pub fn new(config: TrackerConfig, windows: WindowConfig, rollups: Arc<RollupCache>) -> Self {
        Self {
            config,
            windows,
            rollups,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Check an observation before anything is persisted
    pub fn validate(
        &self,
        timestamp: DateTime<Utc>,
        volume_load: Decimal,
        subjective_load: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if volume_load < Decimal::ZERO {
            return Err(FatigueError::invalid(
                "volume_load",
                format!("must be non-negative, got {}", volume_load),
            ));
        }
        if volume_load > self.config.max_volume_load {
            return Err(FatigueError::invalid(
                "volume_load",
                format!(
                    "{} exceeds the maximum of {}",
                    volume_load, self.config.max_volume_load
                ),
            ));
        }
        if let Some(subjective) = subjective_load {
            check_scale("subjective_load", subjective)?;
        }

        let latest_allowed = now + Duration::seconds(self.config.clock_skew_tolerance_secs);
        if timestamp > latest_allowed {
            return Err(FatigueError::invalid(
                "timestamp",
                format!(
                    "{} is in the future (now {}, tolerance {}s)",
                    timestamp.to_rfc3339(),
                    now.to_rfc3339(),
                    self.config.clock_skew_tolerance_secs
                ),
            ));
        }
        Ok(())
    }

    /// Persist one observation for `client`
    pub fn record<S: Store + ?Sized>(
        &self,
        store: &mut S,
        client: &ClientRef,
        entry: NewWorkloadEntry,
        now: DateTime<Utc>,
    ) -> Result<WorkloadEntry> {
        if entry.client_id != client.id {
            return Err(FatigueError::invalid(
                "client_id",
                format!("entry belongs to client {}, not {}", entry.client_id, client.id),
            ));
        }
        self.validate(entry.timestamp, entry.volume_load, entry.subjective_load, now)?;

        let stored = store.insert_entry(client.trainer_id, entry, now)?;
        self.rollups.invalidate(stored.client_id, stored.date())?;

        info!(
            client_id = %stored.client_id,
            entry_id = %stored.id,
            date = %stored.date(),
            volume_load = %stored.volume_load,
            "Recorded workload entry"
        );
        Ok(stored)
    }

    /// Last date whose entries are frozen, given the analyses already stored
    ///
    /// An analysis consumes the acute window ending on its date; entries on
    /// or before `latest_analysis_date - acute_window_days` belong to a
    /// completed period.
    pub fn locked_through(&self, analyses: &[FatigueAnalysis]) -> Option<NaiveDate> {
        analyses
            .iter()
            .map(|a| a.assessment.analysis_date)
            .max()
            .and_then(|latest| {
                latest.checked_sub_days(Days::new(self.windows.acute_window_days as u64))
            })
    }

    /// Apply an explicit update to an existing entry
    pub fn update<S: Store + ?Sized>(
        &self,
        store: &mut S,
        current: WorkloadEntry,
        update: WorkloadUpdate,
        now: DateTime<Utc>,
    ) -> Result<WorkloadEntry> {
        let analyses = store.analyses_for_client(current.client_id)?;
        let locked_through = self.locked_through(&analyses);

        let mut updated = current.clone();
        if let Some(timestamp) = update.timestamp {
            updated.timestamp = timestamp;
        }
        if let Some(volume_load) = update.volume_load {
            updated.volume_load = volume_load;
        }
        if let Some(subjective_load) = update.subjective_load {
            updated.subjective_load = Some(subjective_load);
        }
        if let Some(notes) = update.notes {
            updated.notes = Some(notes);
        }

        if let Some(locked) = locked_through {
            for date in [current.date(), updated.date()] {
                if date <= locked {
                    warn!(
                        client_id = %current.client_id,
                        entry_id = %current.id,
                        date = %date,
                        locked_through = %locked,
                        "Rejected update to a completed period"
                    );
                    return Err(FatigueError::invalid(
                        "entry",
                        format!(
                            "entry date {} falls in a period already consumed by analysis (locked through {})",
                            date, locked
                        ),
                    ));
                }
            }
        }

        self.validate(updated.timestamp, updated.volume_load, updated.subjective_load, now)?;
        updated.updated_at = now;
        store.update_entry(&updated)?;

        self.rollups.invalidate(current.client_id, current.date())?;
        if updated.date() != current.date() {
            self.rollups.invalidate(updated.client_id, updated.date())?;
        }

        info!(
            client_id = %updated.client_id,
            entry_id = %updated.id,
            date = %updated.date(),
            "Updated workload entry"
        );
        Ok(updated)
    }

    /// Remove an entry; always allowed, dependent rollups are rebuilt lazily
    pub fn delete<S: Store + ?Sized>(&self, store: &mut S, id: EntryId) -> Result<WorkloadEntry> {
        let removed = store
            .delete_entry(id)?
            .ok_or_else(|| FatigueError::not_found(ResourceKind::WorkloadEntry, id))?;
        self.rollups.invalidate(removed.client_id, removed.date())?;

        info!(
            client_id = %removed.client_id,
            entry_id = %removed.id,
            date = %removed.date(),
            "Deleted workload entry"
        );
        Ok(removed)
    }

    /// Time-ordered entries for a client within `[from, to]`
    pub fn history<S: Store + ?Sized>(
        &self,
        store: &S,
        client_id: ClientId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkloadEntry>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(FatigueError::invalid(
                    "range",
                    "start must not be after end",
                ));
            }
        }

        let entries = store.entries_for_client(client_id, from, to)?;
        debug!(client_id = %client_id, count = entries.len(), "Loaded workload history");
        Ok(entries)
    }
}
