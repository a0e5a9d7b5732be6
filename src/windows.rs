//! Rolling acute/chronic load windows
//!
//! Turns a client's workload history into daily loads and derives the
//! acute:chronic workload ratio (ACWR), training monotony and strain for a
//! given date. Everything here is a pure function of the entries and the
//! window sizes, so recomputing for the same inputs always yields the same
//! figures.

use chrono::{Days, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FatigueError, Result};
use crate::models::WorkloadEntry;

/// Window sizes used by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Acute window in days (default: 7)
    pub acute_window_days: u16,

    /// Chronic window in days (default: 28)
    pub chronic_window_days: u16,

    /// Decimal places kept for ACWR, monotony and strain
    pub ratio_decimal_places: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            acute_window_days: 7,
            chronic_window_days: 28,
            ratio_decimal_places: 4,
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.acute_window_days == 0 {
            return Err(FatigueError::Configuration(
                "acute_window_days must be at least 1".to_string(),
            ));
        }
        if self.chronic_window_days < self.acute_window_days {
            return Err(FatigueError::Configuration(format!(
                "chronic_window_days ({}) must not be shorter than acute_window_days ({})",
                self.chronic_window_days, self.acute_window_days
            )));
        }
        Ok(())
    }
}

/// Load accumulated on a single training day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoad {
    pub date: NaiveDate,

    /// Sum of volume load for the day
    pub total_load: Decimal,

    /// Number of entries recorded on this day
    pub entry_count: u16,

    /// Subjective loads reported on this day
    pub subjective_loads: Vec<Decimal>,
}

impl DailyLoad {
    /// Mean subjective load for the day, if any was reported
    pub fn mean_subjective_load(&self) -> Option<Decimal> {
        if self.subjective_loads.is_empty() {
            return None;
        }
        let total: Decimal = self.subjective_loads.iter().sum();
        Some(total / Decimal::from(self.subjective_loads.len()))
    }
}

/// Window figures for one client as of one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub as_of: NaiveDate,

    /// Sum of daily loads in (as_of - acute, as_of]
    pub acute_load: Decimal,

    /// Mean of the rolling acute sums whose windows fit in the chronic window
    pub chronic_load: Decimal,

    /// acute / chronic; `None` when the chronic load is zero
    pub acwr: Option<Decimal>,

    /// mean / population std-dev of daily loads; `None` when std-dev is zero
    pub monotony: Option<Decimal>,

    /// chronic-window total x monotony; `None` when monotony is undefined
    pub strain: Option<Decimal>,

    /// Sum of daily loads over the chronic window
    pub chronic_total: Decimal,

    /// Acute load per day of the acute window
    pub acute_daily_mean: Decimal,

    /// Chronic load per day of the acute window
    pub chronic_daily_mean: Decimal,

    /// Days in the chronic window with any recorded load
    pub training_days: u16,
}

impl WindowMetrics {
    /// True when no load at all fell inside the windows
    pub fn has_history(&self) -> bool {
        self.chronic_load > Decimal::ZERO || self.acute_load > Decimal::ZERO
    }
}

/// Core load window engine
pub struct LoadWindowAggregator {
    config: WindowConfig,
}

impl LoadWindowAggregator {
    /// Create aggregator with the default 7/28 day windows
    pub fn new() -> Self {
        LoadWindowAggregator {
            config: WindowConfig::default(),
        }
    }

    /// Create aggregator with custom window sizes
    pub fn with_config(config: WindowConfig) -> Self {
        LoadWindowAggregator { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Aggregate daily loads from a collection of entries
    pub fn aggregate_daily_loads(
        &self,
        entries: &[WorkloadEntry],
    ) -> Result<BTreeMap<NaiveDate, DailyLoad>> {
        let mut daily: BTreeMap<NaiveDate, DailyLoad> = BTreeMap::new();

        for entry in entries {
            let date = entry.date();
            let day = daily.entry(date).or_insert_with(|| DailyLoad {
                date,
                total_load: Decimal::ZERO,
                entry_count: 0,
                subjective_loads: Vec::new(),
            });
            day.total_load = day
                .total_load
                .checked_add(entry.volume_load)
                .ok_or_else(|| overflow("daily load"))?;
            day.entry_count += 1;
            if let Some(subjective) = entry.subjective_load {
                day.subjective_loads.push(subjective);
            }
        }

        Ok(daily)
    }

    /// Compute window metrics for `as_of` straight from entries
    pub fn aggregate(&self, entries: &[WorkloadEntry], as_of: NaiveDate) -> Result<WindowMetrics> {
        let daily = self.aggregate_daily_loads(entries)?;
        self.aggregate_daily(&daily, as_of)
    }

    /// Compute window metrics for `as_of` from pre-aggregated daily loads
    ///
    /// Days after `as_of` are never read, so future-dated entries cannot leak
    /// into the figures. Loads too large for exact decimal arithmetic are
    /// rejected with [`FatigueError::InvalidInput`].
    pub fn aggregate_daily(
        &self,
        daily: &BTreeMap<NaiveDate, DailyLoad>,
        as_of: NaiveDate,
    ) -> Result<WindowMetrics> {
        let acute_days = self.config.acute_window_days;
        let chronic_days = self.config.chronic_window_days;

        let acute_load = self.acute_load_on(daily, as_of)?;

        // Rolling acute sums for every day whose acute window sits inside the
        // chronic window
        let rolling_count = chronic_days - acute_days + 1;
        let mut rolling_total = Decimal::ZERO;
        for offset in 0..rolling_count {
            let week = self.acute_load_on(daily, days_before(as_of, offset))?;
            rolling_total = rolling_total
                .checked_add(week)
                .ok_or_else(|| overflow("chronic load"))?;
        }
        let chronic_load = rolling_total / Decimal::from(rolling_count);

        let acwr = if chronic_load > Decimal::ZERO {
            let ratio = acute_load
                .checked_div(chronic_load)
                .ok_or_else(|| overflow("ACWR"))?;
            Some(self.round_ratio(ratio))
        } else {
            None
        };

        let chronic_series = daily_series(daily, as_of, chronic_days);
        let chronic_total = checked_sum(&chronic_series, "chronic total")?;
        let training_days = chronic_series.iter().filter(|l| **l > Decimal::ZERO).count() as u16;

        let monotony = monotony(&chronic_series)?.map(|m| self.round_ratio(m));
        let strain = match monotony {
            Some(m) => Some(self.round_ratio(
                chronic_total.checked_mul(m).ok_or_else(|| overflow("strain"))?,
            )),
            None => None,
        };

        Ok(WindowMetrics {
            as_of,
            acute_load,
            chronic_load,
            acwr,
            monotony,
            strain,
            chronic_total,
            acute_daily_mean: acute_load / Decimal::from(acute_days),
            chronic_daily_mean: chronic_load / Decimal::from(acute_days),
            training_days,
        })
    }

    /// Sum of daily loads in the acute window ending on `date`
    pub fn acute_load_on(
        &self,
        daily: &BTreeMap<NaiveDate, DailyLoad>,
        date: NaiveDate,
    ) -> Result<Decimal> {
        checked_sum(&daily_series(daily, date, self.config.acute_window_days), "acute load")
    }

    /// Metrics for every day in `[start, end]`
    pub fn metrics_series(
        &self,
        daily: &BTreeMap<NaiveDate, DailyLoad>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WindowMetrics>> {
        if start > end {
            return Err(FatigueError::invalid(
                "period",
                "start date must not be after end date",
            ));
        }

        let mut series = Vec::new();
        let mut current = start;
        while current <= end {
            series.push(self.aggregate_daily(daily, current)?);
            current = match current.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(series)
    }

    fn round_ratio(&self, value: Decimal) -> Decimal {
        value
            .round_dp_with_strategy(
                self.config.ratio_decimal_places,
                RoundingStrategy::MidpointAwayFromZero,
            )
            .normalize()
    }
}

impl Default for LoadWindowAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn days_before(date: NaiveDate, days: u16) -> NaiveDate {
    date.checked_sub_days(Days::new(days as u64)).unwrap_or(NaiveDate::MIN)
}

/// Daily loads for the `len` days ending on `end`, rest days as zero
fn daily_series(daily: &BTreeMap<NaiveDate, DailyLoad>, end: NaiveDate, len: u16) -> Vec<Decimal> {
    let start = days_before(end, len.saturating_sub(1));
    let mut series = vec![Decimal::ZERO; len as usize];
    for (date, day) in daily.range(start..=end) {
        let index = (*date - start).num_days() as usize;
        if let Some(slot) = series.get_mut(index) {
            *slot = day.total_load;
        }
    }
    series
}

fn overflow(what: &str) -> FatigueError {
    FatigueError::invalid(
        "volume_load",
        format!("{} exceeds the supported decimal range", what),
    )
}

fn checked_sum(values: &[Decimal], what: &str) -> Result<Decimal> {
    values.iter().try_fold(Decimal::ZERO, |total, value| {
        total.checked_add(*value).ok_or_else(|| overflow(what))
    })
}

/// Mean divided by population standard deviation
fn monotony(loads: &[Decimal]) -> Result<Option<Decimal>> {
    if loads.is_empty() {
        return Ok(None);
    }

    let count = Decimal::from(loads.len());
    let mean = checked_sum(loads, "monotony")? / count;
    let mut squares = Decimal::ZERO;
    for load in loads {
        let deviation = load.checked_sub(mean).ok_or_else(|| overflow("monotony"))?;
        squares = deviation
            .checked_mul(deviation)
            .and_then(|square| squares.checked_add(square))
            .ok_or_else(|| overflow("monotony"))?;
    }
    let variance = squares / count;

    if variance <= Decimal::ZERO {
        return Ok(None);
    }

    let Some(std_dev) = variance
        .to_f64()
        .and_then(|v| Decimal::from_f64_retain(v.sqrt()))
    else {
        return Ok(None);
    };
    if std_dev.is_zero() {
        return Ok(None);
    }

    mean.checked_div(std_dev)
        .map(Some)
        .ok_or_else(|| overflow("monotony"))
}
