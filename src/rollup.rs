//! Per-client daily workload rollups
//!
//! A pure cache over the workload log: every rollup can be rebuilt from the
//! entries at any time. Writes invalidate the days they can influence and
//! bump the client's version, so a rebuild that raced with a write is
//! discarded instead of cached.
//!
//! The cache is bounded. Each client keeps at most `max_days_per_client`
//! days (oldest dropped first) and at most `max_clients` clients are held,
//! least recently used evicted first. An eviction bumps the cache epoch, so
//! a rebuild that started before it is not cached either.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{FatigueError, Result};
use crate::models::{ClientId, WorkloadEntry};
use crate::windows::{LoadWindowAggregator, WindowConfig};

/// Daily workload tracking record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRollup {
    pub date: NaiveDate,
    pub total_volume: Decimal,
    pub entry_count: u16,
    pub mean_subjective_load: Option<Decimal>,
    pub acute_load: Decimal,
    pub chronic_load: Decimal,
    pub acwr: Option<Decimal>,
}

/// Cache bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupCacheConfig {
    /// Clients kept before the least recently used is evicted (default: 1024)
    pub max_clients: usize,

    /// Days kept per client before the oldest are dropped (default: 366)
    pub max_days_per_client: usize,
}

impl Default for RollupCacheConfig {
    fn default() -> Self {
        RollupCacheConfig {
            max_clients: 1024,
            max_days_per_client: 366,
        }
    }
}

impl RollupCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_clients == 0 || self.max_days_per_client == 0 {
            return Err(FatigueError::Configuration(
                "rollup cache limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ClientRollup {
    version: u64,
    last_used: u64,
    days: BTreeMap<NaiveDate, WorkloadRollup>,
}

/// Cache occupancy figures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub clients: usize,
    pub cached_days: usize,
    pub evictions: u64,
}

/// Keyed rollup store: client id -> versioned daily rollups
pub struct RollupCache {
    aggregator: LoadWindowAggregator,
    limits: RollupCacheConfig,
    clients: Mutex<HashMap<ClientId, ClientRollup>>,
    /// Bumped on every client eviction
    epoch: AtomicU64,
    tick: AtomicU64,
}

impl RollupCache {
    pub fn new(windows: WindowConfig) -> Self {
        Self::with_limits(windows, RollupCacheConfig::default())
    }

    pub fn with_limits(windows: WindowConfig, limits: RollupCacheConfig) -> Self {
        RollupCache {
            aggregator: LoadWindowAggregator::with_config(windows),
            limits,
            clients: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            tick: AtomicU64::new(0),
        }
    }

    /// Current version of a client's rollups (0 when never touched)
    pub fn version(&self, client_id: ClientId) -> Result<u64> {
        let clients = self.clients.lock()?;
        Ok(clients.get(&client_id).map_or(0, |c| c.version))
    }

    /// Drop every cached day whose windows include `date`
    pub fn invalidate(&self, client_id: ClientId, date: NaiveDate) -> Result<()> {
        let reach = self.aggregator.config().chronic_window_days.saturating_sub(1);
        let last_affected = date
            .checked_add_days(Days::new(reach as u64))
            .unwrap_or(NaiveDate::MAX);

        let mut clients = self.clients.lock()?;
        let rollup = self.touch(&mut clients, client_id);
        rollup.version += 1;
        let version = rollup.version;
        let stale: Vec<NaiveDate> = rollup
            .days
            .range(date..=last_affected)
            .map(|(d, _)| *d)
            .collect();
        for day in &stale {
            rollup.days.remove(day);
        }
        self.evict_over_capacity(&mut clients, client_id);

        debug!(
            client_id = %client_id,
            from = %date,
            to = %last_affected,
            dropped = stale.len(),
            version,
            "Invalidated workload rollups"
        );
        Ok(())
    }

    /// Drop everything cached for a client
    pub fn invalidate_client(&self, client_id: ClientId) -> Result<()> {
        let mut clients = self.clients.lock()?;
        let rollup = self.touch(&mut clients, client_id);
        rollup.version += 1;
        rollup.days.clear();
        self.evict_over_capacity(&mut clients, client_id);
        Ok(())
    }

    /// Drop the whole cache
    pub fn clear(&self) -> Result<()> {
        let mut clients = self.clients.lock()?;
        for rollup in clients.values_mut() {
            rollup.version += 1;
            rollup.days.clear();
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let clients = self.clients.lock()?;
        Ok(CacheStats {
            clients: clients.len(),
            cached_days: clients.values().map(|c| c.days.len()).sum(),
            evictions: self.epoch.load(Ordering::SeqCst),
        })
    }

    fn touch<'a>(
        &self,
        clients: &'a mut HashMap<ClientId, ClientRollup>,
        client_id: ClientId,
    ) -> &'a mut ClientRollup {
        let rollup = clients.entry(client_id).or_default();
        rollup.last_used = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
        rollup
    }

    /// Evict least recently used clients other than `keep` until within bounds
    fn evict_over_capacity(&self, clients: &mut HashMap<ClientId, ClientRollup>, keep: ClientId) {
        while clients.len() > self.limits.max_clients {
            let Some(oldest) = clients
                .iter()
                .filter(|(id, _)| **id != keep)
                .min_by_key(|(_, rollup)| rollup.last_used)
                .map(|(id, _)| *id)
            else {
                break;
            };
            clients.remove(&oldest);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            debug!(client_id = %oldest, "Evicted workload rollups");
        }
    }

    /// Rollups for every day in `[from, to]`, rebuilding missing days from
    /// the entries returned by `load`
    pub fn rollups<F>(
        &self,
        client_id: ClientId,
        from: NaiveDate,
        to: NaiveDate,
        load: F,
    ) -> Result<Vec<WorkloadRollup>>
    where
        F: FnOnce() -> Result<Vec<WorkloadEntry>>,
    {
        if from > to {
            return Err(FatigueError::invalid(
                "period",
                "start date must not be after end date",
            ));
        }

        let (version, epoch) = {
            let mut clients = self.clients.lock()?;
            if let Some(rollup) = clients.get_mut(&client_id) {
                let days: Vec<WorkloadRollup> =
                    rollup.days.range(from..=to).map(|(_, r)| r.clone()).collect();
                if days.len() as i64 == (to - from).num_days() + 1 {
                    rollup.last_used = self.tick.fetch_add(1, Ordering::SeqCst) + 1;
                    return Ok(days);
                }
            }
            (
                clients.get(&client_id).map_or(0, |c| c.version),
                self.epoch.load(Ordering::SeqCst),
            )
        };

        let entries = load()?;
        let daily = self.aggregator.aggregate_daily_loads(&entries)?;
        let built: Vec<WorkloadRollup> = self
            .aggregator
            .metrics_series(&daily, from, to)?
            .into_iter()
            .map(|metrics| {
                let day = daily.get(&metrics.as_of);
                WorkloadRollup {
                    date: metrics.as_of,
                    total_volume: day.map_or(Decimal::ZERO, |d| d.total_load),
                    entry_count: day.map_or(0, |d| d.entry_count),
                    mean_subjective_load: day.and_then(|d| d.mean_subjective_load()),
                    acute_load: metrics.acute_load,
                    chronic_load: metrics.chronic_load,
                    acwr: metrics.acwr,
                }
            })
            .collect();

        let mut clients = self.clients.lock()?;
        let current = clients.get(&client_id).map_or(0, |c| c.version);
        if current == version && self.epoch.load(Ordering::SeqCst) == epoch {
            let rollup = self.touch(&mut clients, client_id);
            for day in &built {
                rollup.days.insert(day.date, day.clone());
            }
            while rollup.days.len() > self.limits.max_days_per_client {
                rollup.days.pop_first();
            }
            self.evict_over_capacity(&mut clients, client_id);
        } else {
            debug!(client_id = %client_id, "Discarding rollups built from a stale history");
        }

        Ok(built)
    }
}
