// Library interface for the fatigue analytics engine
// This allows the CLI, integration tests and benchmarks to share the core functionality

pub mod alerts;
pub mod analytics;
pub mod analyzer;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod rollup;
pub mod scope;
pub mod store;
pub mod tracker;
pub mod windows;

// Re-export commonly used types for convenience
pub use models::*;
pub use alerts::{AlertConfig, AlertEngine, EpisodeState};
pub use analytics::{
    AnalysisPeriod, AnalyticsAggregator, FatigueTrend, SubjectivePoint, TrendSummary,
};
pub use analyzer::{AcwrZone, AnalyzerConfig, FatigueAnalyzer};
pub use database::SqliteStore;
pub use engine::{
    AnalysisCorrection, AnalysisOutcome, AnalysisRequest, Clock, EngineConfig, FatigueEngine,
    FixedClock, RecomputeReport, SystemClock,
};
pub use error::{FatigueError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use scope::AccessScope;
pub use store::{MemoryStore, Store};
pub use tracker::{TrackerConfig, WorkloadTracker};
pub use rollup::{RollupCache, RollupCacheConfig, WorkloadRollup};
pub use windows::{LoadWindowAggregator, WindowConfig};
