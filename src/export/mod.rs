//! Export of analyses, alerts and trends to files or writers

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::analytics::FatigueTrend;
use crate::models::{FatigueAlert, FatigueAnalysis};
use crate::rollup::WorkloadRollup;

pub mod csv;
pub mod json;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// What to export
#[derive(Debug, Clone, Copy)]
pub enum ExportData<'a> {
    Analyses(&'a [FatigueAnalysis]),
    Alerts(&'a [FatigueAlert]),
    Workload(&'a [WorkloadRollup]),
    Trend(&'a FatigueTrend),
}

/// Write `data` to `output_path` in `format`
///
/// A trend is nested data and always written as JSON; its CSV form is the
/// analysis table.
pub fn export<P: AsRef<Path>>(
    data: ExportData<'_>,
    format: ExportFormat,
    output_path: P,
) -> Result<(), ExportError> {
    let path = output_path.as_ref();
    match (format, data) {
        (ExportFormat::Json, ExportData::Analyses(analyses)) => json::export_json(&analyses, path),
        (ExportFormat::Json, ExportData::Alerts(alerts)) => json::export_json(&alerts, path),
        (ExportFormat::Json, ExportData::Workload(rollups)) => json::export_json(&rollups, path),
        (ExportFormat::Json, ExportData::Trend(trend)) => json::export_json(trend, path),
        (ExportFormat::Csv, ExportData::Analyses(analyses)) => {
            csv::write_analyses(analyses, std::fs::File::create(path)?)
        }
        (ExportFormat::Csv, ExportData::Trend(trend)) => {
            csv::write_analyses(&trend.analyses, std::fs::File::create(path)?)
        }
        (ExportFormat::Csv, ExportData::Alerts(alerts)) => {
            csv::write_alerts(alerts, std::fs::File::create(path)?)
        }
        (ExportFormat::Csv, ExportData::Workload(rollups)) => {
            csv::write_workload(rollups, std::fs::File::create(path)?)
        }
    }?;

    tracing::info!(path = %path.display(), format = ?format, "Export written");
    Ok(())
}
