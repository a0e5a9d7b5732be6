//! Unified error hierarchy for the fatigue engine
//!
//! Every failure the engine can surface is a variant of [`FatigueError`], so a
//! caller can tell "nothing to compute yet" apart from "bad input" and from
//! "not allowed" without string matching.

use thiserror::Error;

use crate::models::{AlertId, ClientId};

/// Top-level error type for all engine operations
#[derive(Debug, Error)]
pub enum FatigueError {
    /// Malformed or out-of-range values; nothing was persisted
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// Not enough workload history to compute the requested figure
    #[error("Insufficient history for client {client_id}: {reason}")]
    InsufficientHistory { client_id: ClientId, reason: String },

    /// Unknown client, entry, analysis or alert
    #[error("{resource} not found: {id}")]
    NotFound { resource: ResourceKind, id: String },

    /// Illegal alert state change
    #[error("Invalid transition for alert {alert_id}: {source}")]
    InvalidTransition {
        alert_id: AlertId,
        #[source]
        source: TransitionError,
    },

    /// Client outside the caller's authorized scope
    #[error("Client {client_id} is outside the caller's scope")]
    ScopeViolation { client_id: ClientId },

    /// Storage backend errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Kinds of records the engine looks up by id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Client,
    WorkloadEntry,
    Analysis,
    Alert,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Client => write!(f, "Client"),
            ResourceKind::WorkloadEntry => write!(f, "Workload entry"),
            ResourceKind::Analysis => write!(f, "Fatigue analysis"),
            ResourceKind::Alert => write!(f, "Fatigue alert"),
        }
    }
}

/// Rejected alert state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("alert is already resolved")]
    AlreadyResolved,
}

/// Storage backend errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt value in {column}: {value}")]
    CorruptValue { column: String, value: String },

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FatigueError>;

impl FatigueError {
    /// Shorthand for [`FatigueError::InvalidInput`]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FatigueError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`FatigueError::NotFound`]
    pub fn not_found(resource: ResourceKind, id: impl std::fmt::Display) -> Self {
        FatigueError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FatigueError::Database(DatabaseError::Sqlite(_))
                | FatigueError::Database(DatabaseError::LockPoisoned(_))
                | FatigueError::Io(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FatigueError::InsufficientHistory { .. } => ErrorSeverity::Info,
            FatigueError::InvalidInput { .. } => ErrorSeverity::Warning,
            FatigueError::NotFound { .. } => ErrorSeverity::Warning,
            FatigueError::InvalidTransition { .. } => ErrorSeverity::Warning,
            FatigueError::ScopeViolation { .. } => ErrorSeverity::Error,
            FatigueError::Database(DatabaseError::CorruptValue { .. }) => ErrorSeverity::Critical,
            FatigueError::Database(_) => ErrorSeverity::Error,
            FatigueError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            FatigueError::InsufficientHistory { .. } => {
                "Not enough workload history yet. Keep logging sessions and try again.".to_string()
            }
            FatigueError::ScopeViolation { .. } => {
                "You are not allowed to access this client.".to_string()
            }
            FatigueError::InvalidTransition { .. } => {
                "This alert has already been resolved.".to_string()
            }
            FatigueError::Database(DatabaseError::Sqlite(_)) => {
                "Unable to access the database. Please check your configuration.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for FatigueError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        FatigueError::Database(DatabaseError::LockPoisoned(err.to_string()))
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
