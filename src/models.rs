use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analyzer::AcwrZone;
use crate::error::{FatigueError, Result};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Client profile identifier (owned by the external client directory)
    ClientId
);
record_id!(
    /// Trainer identifier
    TrainerId
);
record_id!(
    /// Identity of whoever reads, resolves or corrects a record
    UserId
);
record_id!(
    /// Workload entry identifier, assigned in insertion order
    EntryId
);
record_id!(
    /// Fatigue analysis identifier, assigned in insertion order
    AnalysisId
);
record_id!(
    /// Fatigue alert identifier
    AlertId
);

/// A client known to the engine together with the trainer who owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRef {
    pub id: ClientId,
    pub trainer_id: TrainerId,
    pub name: Option<String>,
}

/// Input for a new training-load observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkloadEntry {
    pub client_id: ClientId,

    /// When the session took place; its UTC date is the training day
    pub timestamp: DateTime<Utc>,

    /// Volume load (sets x reps x weight, or session RPE x duration)
    pub volume_load: Decimal,

    /// Subjective load on a 0-10 scale
    pub subjective_load: Option<Decimal>,

    /// Originating training session, if any
    pub session_id: Option<u64>,

    pub notes: Option<String>,
}

/// Stored training-load observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadEntry {
    pub id: EntryId,
    pub client_id: ClientId,
    pub trainer_id: TrainerId,
    pub session_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub volume_load: Decimal,
    pub subjective_load: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkloadEntry {
    /// Training day the entry counts towards
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Explicit changes to an existing entry; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadUpdate {
    pub timestamp: Option<DateTime<Utc>>,
    pub volume_load: Option<Decimal>,
    pub subjective_load: Option<Decimal>,
    pub notes: Option<String>,
}

/// Self-reported wellness and exertion scores, all on a 0-10 scale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectiveInputs {
    /// Session rate of perceived exertion
    pub session_rpe: Option<Decimal>,
    pub muscle_soreness: Option<Decimal>,
    pub pre_fatigue_level: Option<Decimal>,
    pub post_fatigue_level: Option<Decimal>,
    pub pre_energy_level: Option<Decimal>,
    pub post_energy_level: Option<Decimal>,
    /// Higher is better
    pub sleep_quality: Option<Decimal>,
    pub stress_level: Option<Decimal>,
}

impl SubjectiveInputs {
    fn fields(&self) -> [(&'static str, Option<Decimal>); 8] {
        [
            ("session_rpe", self.session_rpe),
            ("muscle_soreness", self.muscle_soreness),
            ("pre_fatigue_level", self.pre_fatigue_level),
            ("post_fatigue_level", self.post_fatigue_level),
            ("pre_energy_level", self.pre_energy_level),
            ("post_energy_level", self.post_energy_level),
            ("sleep_quality", self.sleep_quality),
            ("stress_level", self.stress_level),
        ]
    }

    /// True when no score was supplied at all
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value)| value.is_none())
    }

    /// Reject scores outside the 0-10 scale
    pub fn validate(&self) -> Result<()> {
        for (field, value) in self.fields() {
            if let Some(value) = value {
                check_scale(field, value)?;
            }
        }
        Ok(())
    }

    /// Post-session minus pre-session fatigue
    pub fn fatigue_delta(&self) -> Option<Decimal> {
        Some(self.post_fatigue_level? - self.pre_fatigue_level?)
    }

    /// Post-session minus pre-session energy
    pub fn energy_delta(&self) -> Option<Decimal> {
        Some(self.post_energy_level? - self.pre_energy_level?)
    }
}

/// Validate a value on the 0-10 subjective scale
pub fn check_scale(field: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO || value > Decimal::TEN {
        return Err(FatigueError::invalid(
            field,
            format!("{} is outside the 0-10 scale", value),
        ));
    }
    Ok(())
}

/// Fatigue risk classification
///
/// Ordered so that `max` picks the more severe tier; `Unknown` sorts lowest
/// and is only produced for insufficient data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Unknown,
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Unknown => "unknown",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = FatigueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(RiskLevel::Unknown),
            "low" => Ok(RiskLevel::Low),
            "moderate" | "medium" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(FatigueError::invalid("risk_level", format!("unknown risk level: {}", s))),
        }
    }
}

/// Output of the fatigue analyzer for one client and date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAssessment {
    pub analysis_date: NaiveDate,

    /// Sum of daily loads over the acute window
    pub acute_load: Decimal,

    /// Rolling mean of acute-window sums over the chronic window
    pub chronic_load: Decimal,

    /// Acute:chronic workload ratio, absent when chronic load is zero
    pub acwr: Option<Decimal>,

    pub acwr_zone: Option<AcwrZone>,

    /// Mean daily load divided by its standard deviation
    pub monotony: Option<Decimal>,

    /// Chronic-window load weighted by monotony
    pub strain: Option<Decimal>,

    /// Composite score on a 0-100 scale
    pub fatigue_score: Option<Decimal>,

    pub risk_level: RiskLevel,

    /// Set when neither load history nor subjective inputs were available
    pub insufficient_data: bool,

    pub subjective: Option<SubjectiveInputs>,

    pub recommendation: String,

    pub next_session_adjustment: String,
}

/// Explicit trainer override of an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerCorrection {
    pub corrected_by: UserId,
    pub corrected_at: DateTime<Utc>,
    pub previous_risk: RiskLevel,
    pub previous_score: Option<Decimal>,
    pub notes: Option<String>,
}

/// Stored fatigue analysis; history is append-only per client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAnalysis {
    pub id: AnalysisId,
    pub client_id: ClientId,
    pub trainer_id: TrainerId,
    pub session_id: Option<u64>,
    #[serde(flatten)]
    pub assessment: FatigueAssessment,
    pub created_at: DateTime<Utc>,
    pub correction: Option<TrainerCorrection>,
}

/// Kinds of fatigue alert, evaluated independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    AcwrSpike,
    HighMonotony,
    SustainedHighStrain,
}

impl AlertType {
    pub const ALL: [AlertType; 3] = [
        AlertType::AcwrSpike,
        AlertType::HighMonotony,
        AlertType::SustainedHighStrain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::AcwrSpike => "acwr_spike",
            AlertType::HighMonotony => "high_monotony",
            AlertType::SustainedHighStrain => "sustained_high_strain",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = FatigueError;

    fn from_str(s: &str) -> Result<Self> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FatigueError::invalid("alert_type", format!("unknown alert type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = FatigueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(FatigueError::invalid("severity", format!("unknown severity: {}", s))),
        }
    }
}

/// Lifecycle of a single alert; each variant carries the data that becomes
/// known once the alert reaches it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlertState {
    Unread,
    Read {
        read_at: DateTime<Utc>,
        read_by: UserId,
    },
    Resolved {
        read_at: DateTime<Utc>,
        read_by: UserId,
        resolved_at: DateTime<Utc>,
        resolved_by: UserId,
        resolution_notes: Option<String>,
    },
}

/// Stored fatigue alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAlert {
    pub id: AlertId,
    pub client_id: ClientId,
    pub trainer_id: TrainerId,
    pub analysis_id: AnalysisId,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub recommendations: Option<String>,
    #[serde(flatten)]
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
}

impl FatigueAlert {
    /// Unread, or read but not yet resolved
    pub fn is_open(&self) -> bool {
        !matches!(self.state, AlertState::Resolved { .. })
    }

    pub fn is_unread(&self) -> bool {
        matches!(self.state, AlertState::Unread)
    }

    pub fn read_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            AlertState::Unread => None,
            AlertState::Read { read_at, .. } | AlertState::Resolved { read_at, .. } => {
                Some(*read_at)
            }
        }
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            AlertState::Resolved { resolved_at, .. } => Some(*resolved_at),
            _ => None,
        }
    }

    pub fn resolved_by(&self) -> Option<UserId> {
        match &self.state {
            AlertState::Resolved { resolved_by, .. } => Some(*resolved_by),
            _ => None,
        }
    }
}

/// Offset/limit window over a list query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 1000;

    pub fn new(skip: usize, limit: usize) -> Result<Self> {
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(FatigueError::invalid(
                "limit",
                format!("must be between 1 and {}", Self::MAX_LIMIT),
            ));
        }
        Ok(Page { skip, limit })
    }

    /// Apply the window to an already ordered list
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Page { skip: 0, limit: 100 }
    }
}
