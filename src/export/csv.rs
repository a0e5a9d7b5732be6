use chrono::{DateTime, NaiveDate, Utc};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

use super::ExportError;
use crate::models::{FatigueAlert, FatigueAnalysis};
use crate::rollup::WorkloadRollup;

#[derive(Debug, Serialize)]
struct AnalysisRow<'a> {
    id: u64,
    client_id: u64,
    analysis_date: NaiveDate,
    acute_load: Decimal,
    chronic_load: Decimal,
    acwr: Option<Decimal>,
    acwr_zone: Option<&'a str>,
    monotony: Option<Decimal>,
    strain: Option<Decimal>,
    fatigue_score: Option<Decimal>,
    risk_level: &'a str,
    insufficient_data: bool,
    post_fatigue_level: Option<Decimal>,
    fatigue_delta: Option<Decimal>,
    corrected: bool,
    recommendation: &'a str,
}

#[derive(Debug, Serialize)]
struct AlertRow<'a> {
    id: u64,
    client_id: u64,
    analysis_id: u64,
    alert_type: &'a str,
    severity: &'a str,
    title: &'a str,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<u64>,
}

/// One row per analysis
pub fn write_analyses<W: Write>(analyses: &[FatigueAnalysis], out: W) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(out);
    for analysis in analyses {
        let a = &analysis.assessment;
        let subjective = a.subjective.as_ref();
        writer.serialize(AnalysisRow {
            id: analysis.id.0,
            client_id: analysis.client_id.0,
            analysis_date: a.analysis_date,
            acute_load: a.acute_load.round_dp(2),
            chronic_load: a.chronic_load.round_dp(2),
            acwr: a.acwr,
            acwr_zone: a.acwr_zone.map(|z| z.as_str()),
            monotony: a.monotony,
            strain: a.strain,
            fatigue_score: a.fatigue_score,
            risk_level: a.risk_level.as_str(),
            insufficient_data: a.insufficient_data,
            post_fatigue_level: subjective.and_then(|s| s.post_fatigue_level),
            fatigue_delta: subjective.and_then(|s| s.fatigue_delta()),
            corrected: analysis.correction.is_some(),
            recommendation: &a.recommendation,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per alert with its lifecycle stamps
pub fn write_alerts<W: Write>(alerts: &[FatigueAlert], out: W) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(out);
    for alert in alerts {
        writer.serialize(AlertRow {
            id: alert.id.0,
            client_id: alert.client_id.0,
            analysis_id: alert.analysis_id.0,
            alert_type: alert.alert_type.as_str(),
            severity: alert.severity.as_str(),
            title: &alert.title,
            created_at: alert.created_at,
            read_at: alert.read_at(),
            resolved_at: alert.resolved_at(),
            resolved_by: alert.resolved_by().map(|u| u.0),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Daily workload rollups
pub fn write_workload<W: Write>(rollups: &[WorkloadRollup], out: W) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(out);
    for rollup in rollups {
        writer.serialize(rollup)?;
    }
    writer.flush()?;
    Ok(())
}
