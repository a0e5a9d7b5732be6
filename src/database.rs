//! SQLite-backed [`Store`]
//!
//! Decimals are stored as TEXT to keep them exact, timestamps as fixed-width
//! RFC 3339 strings so that text ordering matches time ordering, and dates
//! as `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{DatabaseError, FatigueError, ResourceKind, Result};
use crate::models::{
    AlertId, AlertState, AnalysisId, ClientId, ClientRef, EntryId, FatigueAlert, FatigueAnalysis,
    FatigueAssessment, NewWorkloadEntry, SubjectiveInputs, TrainerCorrection, TrainerId, UserId,
    WorkloadEntry,
};
use crate::store::{NewAlert, Store};

const ENTRY_COLUMNS: &str = "id, client_id, trainer_id, session_id, timestamp, volume_load, \
     subjective_load, notes, created_at, updated_at";

const ANALYSIS_COLUMNS: &str = "id, client_id, trainer_id, session_id, analysis_date, acute_load, \
     chronic_load, acwr, acwr_zone, monotony, strain, fatigue_score, risk_level, insufficient_data, \
     subjective, recommendation, next_session_adjustment, correction, created_at";

const ALERT_COLUMNS: &str = "id, client_id, trainer_id, analysis_id, alert_type, severity, title, \
     message, recommendations, read_at, read_by, resolved_at, resolved_by, resolution_notes, created_at";

/// Store over a single SQLite connection
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create or open a database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(DatabaseError::from)?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.as_ref().display(), "Opened fatigue database");
        Ok(store)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        // WAL for concurrent readers; in-memory databases silently keep "memory"
        self.conn
            .query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
            .map_err(DatabaseError::from)?;
        self.conn
            .execute_batch(
                r#"
                PRAGMA synchronous=NORMAL;
                PRAGMA foreign_keys=ON;

                CREATE TABLE IF NOT EXISTS clients (
                    id INTEGER PRIMARY KEY,
                    trainer_id INTEGER NOT NULL,
                    name TEXT
                );

                CREATE TABLE IF NOT EXISTS workload_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client_id INTEGER NOT NULL REFERENCES clients (id),
                    trainer_id INTEGER NOT NULL,
                    session_id INTEGER,
                    timestamp TEXT NOT NULL,
                    volume_load TEXT NOT NULL,
                    subjective_load TEXT,
                    notes TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS fatigue_analyses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client_id INTEGER NOT NULL REFERENCES clients (id),
                    trainer_id INTEGER NOT NULL,
                    session_id INTEGER,
                    analysis_date TEXT NOT NULL,
                    acute_load TEXT NOT NULL,
                    chronic_load TEXT NOT NULL,
                    acwr TEXT,
                    acwr_zone TEXT,
                    monotony TEXT,
                    strain TEXT,
                    fatigue_score TEXT,
                    risk_level TEXT NOT NULL,
                    insufficient_data INTEGER NOT NULL,
                    subjective TEXT,
                    recommendation TEXT NOT NULL,
                    next_session_adjustment TEXT NOT NULL,
                    correction TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS fatigue_alerts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    client_id INTEGER NOT NULL REFERENCES clients (id),
                    trainer_id INTEGER NOT NULL,
                    analysis_id INTEGER NOT NULL REFERENCES fatigue_analyses (id),
                    alert_type TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    title TEXT NOT NULL,
                    message TEXT NOT NULL,
                    recommendations TEXT,
                    read_at TEXT,
                    read_by INTEGER,
                    resolved_at TEXT,
                    resolved_by INTEGER,
                    resolution_notes TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_entries_client_time
                    ON workload_entries (client_id, timestamp);
                CREATE INDEX IF NOT EXISTS idx_analyses_client_date
                    ON fatigue_analyses (client_id, analysis_date);
                CREATE INDEX IF NOT EXISTS idx_alerts_client_type
                    ON fatigue_alerts (client_id, alert_type);
                "#,
            )
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    fn entry_from_row(row: &Row) -> rusqlite::Result<WorkloadEntry> {
        Ok(WorkloadEntry {
            id: EntryId(row.get("id")?),
            client_id: ClientId(row.get("client_id")?),
            trainer_id: TrainerId(row.get("trainer_id")?),
            session_id: row.get("session_id")?,
            timestamp: parse_col(row, "timestamp")?,
            volume_load: parse_col(row, "volume_load")?,
            subjective_load: parse_opt_col(row, "subjective_load")?,
            notes: row.get("notes")?,
            created_at: parse_col(row, "created_at")?,
            updated_at: parse_col(row, "updated_at")?,
        })
    }

    fn analysis_from_row(row: &Row) -> rusqlite::Result<FatigueAnalysis> {
        let subjective: Option<SubjectiveInputs> = json_col(row, "subjective")?;
        let correction: Option<TrainerCorrection> = json_col(row, "correction")?;

        Ok(FatigueAnalysis {
            id: AnalysisId(row.get("id")?),
            client_id: ClientId(row.get("client_id")?),
            trainer_id: TrainerId(row.get("trainer_id")?),
            session_id: row.get("session_id")?,
            assessment: FatigueAssessment {
                analysis_date: parse_col(row, "analysis_date")?,
                acute_load: parse_col(row, "acute_load")?,
                chronic_load: parse_col(row, "chronic_load")?,
                acwr: parse_opt_col(row, "acwr")?,
                acwr_zone: parse_opt_col(row, "acwr_zone")?,
                monotony: parse_opt_col(row, "monotony")?,
                strain: parse_opt_col(row, "strain")?,
                fatigue_score: parse_opt_col(row, "fatigue_score")?,
                risk_level: parse_col(row, "risk_level")?,
                insufficient_data: row.get("insufficient_data")?,
                subjective,
                recommendation: row.get("recommendation")?,
                next_session_adjustment: row.get("next_session_adjustment")?,
            },
            created_at: parse_col(row, "created_at")?,
            correction,
        })
    }

    fn alert_from_row(row: &Row) -> rusqlite::Result<FatigueAlert> {
        let read_at: Option<DateTime<Utc>> = parse_opt_col(row, "read_at")?;
        let read_by: Option<u64> = row.get("read_by")?;
        let resolved_at: Option<DateTime<Utc>> = parse_opt_col(row, "resolved_at")?;
        let resolved_by: Option<u64> = row.get("resolved_by")?;

        let state = match (read_at, read_by, resolved_at, resolved_by) {
            (None, None, None, None) => AlertState::Unread,
            (Some(read_at), Some(read_by), None, None) => AlertState::Read {
                read_at,
                read_by: UserId(read_by),
            },
            (Some(read_at), Some(read_by), Some(resolved_at), Some(resolved_by)) => {
                AlertState::Resolved {
                    read_at,
                    read_by: UserId(read_by),
                    resolved_at,
                    resolved_by: UserId(resolved_by),
                    resolution_notes: row.get("resolution_notes")?,
                }
            }
            _ => {
                return Err(conversion_error(
                    row,
                    "resolved_at",
                    DatabaseError::CorruptValue {
                        column: "fatigue_alerts.state".to_string(),
                        value: "inconsistent read/resolved columns".to_string(),
                    },
                ))
            }
        };

        Ok(FatigueAlert {
            id: AlertId(row.get("id")?),
            client_id: ClientId(row.get("client_id")?),
            trainer_id: TrainerId(row.get("trainer_id")?),
            analysis_id: AnalysisId(row.get("analysis_id")?),
            alert_type: parse_col(row, "alert_type")?,
            severity: parse_col(row, "severity")?,
            title: row.get("title")?,
            message: row.get("message")?,
            recommendations: row.get("recommendations")?,
            state,
            created_at: parse_col(row, "created_at")?,
        })
    }

    fn query_entries(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<WorkloadEntry>> {
        let mut stmt = self.conn.prepare(sql).map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params, Self::entry_from_row)
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DatabaseError::from)?)
    }
}

/// Fixed-width RFC 3339 so that TEXT ordering is chronological
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decimal_text(value: Decimal) -> String {
    value.to_string()
}

fn conversion_error<E>(row: &Row, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_col<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse::<T>().map_err(|e| conversion_error(row, column, e))
}

fn parse_opt_col<T>(row: &Row, column: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| s.parse::<T>().map_err(|e| conversion_error(row, column, e)))
        .transpose()
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row, column: &str) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_error(row, column, e)))
        .transpose()
}

fn to_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| FatigueError::Internal(format!("failed to encode JSON column: {}", e)))
}

impl Store for SqliteStore {
    fn upsert_client(&mut self, client: ClientRef) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO clients (id, trainer_id, name) VALUES (?1, ?2, ?3)
                ON CONFLICT (id) DO UPDATE SET trainer_id = excluded.trainer_id, name = excluded.name
                "#,
                params![client.id.0, client.trainer_id.0, client.name],
            )
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    fn client(&self, id: ClientId) -> Result<Option<ClientRef>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, trainer_id, name FROM clients WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(ClientRef {
                        id: ClientId(row.get(0)?),
                        trainer_id: TrainerId(row.get(1)?),
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(DatabaseError::from)?)
    }

    fn clients(&self) -> Result<Vec<ClientRef>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, trainer_id, name FROM clients ORDER BY id")
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ClientRef {
                    id: ClientId(row.get(0)?),
                    trainer_id: TrainerId(row.get(1)?),
                    name: row.get(2)?,
                })
            })
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DatabaseError::from)?)
    }

    fn insert_entry(
        &mut self,
        trainer_id: TrainerId,
        entry: NewWorkloadEntry,
        now: DateTime<Utc>,
    ) -> Result<WorkloadEntry> {
        self.conn
            .execute(
                r#"
                INSERT INTO workload_entries (
                    client_id, trainer_id, session_id, timestamp, volume_load,
                    subjective_load, notes, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                "#,
                params![
                    entry.client_id.0,
                    trainer_id.0,
                    entry.session_id,
                    ts(entry.timestamp),
                    decimal_text(entry.volume_load),
                    entry.subjective_load.map(decimal_text),
                    entry.notes,
                    ts(now),
                ],
            )
            .map_err(DatabaseError::from)?;
        let id = EntryId(self.conn.last_insert_rowid() as u64);

        Ok(WorkloadEntry {
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
        })
    }

    fn update_entry(&mut self, entry: &WorkloadEntry) -> Result<()> {
        let changed = self
            .conn
            .execute(
                r#"
                UPDATE workload_entries
                SET timestamp = ?2, volume_load = ?3, subjective_load = ?4, notes = ?5, updated_at = ?6
                WHERE id = ?1
                "#,
                params![
                    entry.id.0,
                    ts(entry.timestamp),
                    decimal_text(entry.volume_load),
                    entry.subjective_load.map(decimal_text),
                    entry.notes,
                    ts(entry.updated_at),
                ],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(FatigueError::not_found(ResourceKind::WorkloadEntry, entry.id));
        }
        Ok(())
    }

    fn delete_entry(&mut self, id: EntryId) -> Result<Option<WorkloadEntry>> {
        let existing = self.entry(id)?;
        if existing.is_some() {
            self.conn
                .execute("DELETE FROM workload_entries WHERE id = ?1", params![id.0])
                .map_err(DatabaseError::from)?;
        }
        Ok(existing)
    }

    fn entry(&self, id: EntryId) -> Result<Option<WorkloadEntry>> {
        let sql = format!("SELECT {} FROM workload_entries WHERE id = ?1", ENTRY_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id.0], Self::entry_from_row)
            .optional()
            .map_err(DatabaseError::from)?)
    }

    fn entries_for_client(
        &self,
        client_id: ClientId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkloadEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM workload_entries
            WHERE client_id = ?1
              AND (?2 IS NULL OR timestamp >= ?2)
              AND (?3 IS NULL OR timestamp <= ?3)
            ORDER BY timestamp, id
            "#,
            ENTRY_COLUMNS
        );
        let from = from.map(ts);
        let to = to.map(ts);
        self.query_entries(&sql, params![client_id.0, from, to])
    }

    fn insert_analysis(
        &mut self,
        client: &ClientRef,
        session_id: Option<u64>,
        assessment: FatigueAssessment,
        now: DateTime<Utc>,
    ) -> Result<FatigueAnalysis> {
        insert_analysis_row(&self.conn, client, session_id, assessment, now)
    }

    fn insert_analysis_with_alerts(
        &mut self,
        client: &ClientRef,
        session_id: Option<u64>,
        assessment: FatigueAssessment,
        now: DateTime<Utc>,
        raise: &mut dyn FnMut(&FatigueAnalysis) -> Vec<NewAlert>,
    ) -> Result<(FatigueAnalysis, Vec<FatigueAlert>)> {
        // Dropping the transaction on an early return rolls it back
        let tx = self.conn.transaction().map_err(DatabaseError::from)?;
        let analysis = insert_analysis_row(&tx, client, session_id, assessment, now)?;
        let alerts = raise(&analysis)
            .into_iter()
            .map(|alert| insert_alert_row(&tx, alert))
            .collect::<Result<Vec<_>>>()?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok((analysis, alerts))
    }

    fn update_analysis(&mut self, analysis: &FatigueAnalysis) -> Result<()> {
        let changed = self
            .conn
            .execute(
                r#"
                UPDATE fatigue_analyses
                SET risk_level = ?2, fatigue_score = ?3, correction = ?4
                WHERE id = ?1
                "#,
                params![
                    analysis.id.0,
                    analysis.assessment.risk_level.as_str(),
                    analysis.assessment.fatigue_score.map(decimal_text),
                    to_json(&analysis.correction)?,
                ],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(FatigueError::not_found(ResourceKind::Analysis, analysis.id));
        }
        Ok(())
    }

    fn analysis(&self, id: AnalysisId) -> Result<Option<FatigueAnalysis>> {
        let sql = format!("SELECT {} FROM fatigue_analyses WHERE id = ?1", ANALYSIS_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id.0], Self::analysis_from_row)
            .optional()
            .map_err(DatabaseError::from)?)
    }

    fn analyses_for_client(&self, client_id: ClientId) -> Result<Vec<FatigueAnalysis>> {
        let sql = format!(
            "SELECT {} FROM fatigue_analyses WHERE client_id = ?1 ORDER BY analysis_date, id",
            ANALYSIS_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params![client_id.0], Self::analysis_from_row)
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DatabaseError::from)?)
    }

    fn insert_alert(&mut self, alert: NewAlert) -> Result<FatigueAlert> {
        insert_alert_row(&self.conn, alert)
    }

    fn update_alert(&mut self, alert: &FatigueAlert) -> Result<()> {
        let (read_at, read_by, resolved_at, resolved_by, notes) = match &alert.state {
            AlertState::Unread => (None, None, None, None, None),
            AlertState::Read { read_at, read_by } => {
                (Some(ts(*read_at)), Some(read_by.0), None, None, None)
            }
            AlertState::Resolved {
                read_at,
                read_by,
                resolved_at,
                resolved_by,
                resolution_notes,
            } => (
                Some(ts(*read_at)),
                Some(read_by.0),
                Some(ts(*resolved_at)),
                Some(resolved_by.0),
                resolution_notes.clone(),
            ),
        };

        let changed = self
            .conn
            .execute(
                r#"
                UPDATE fatigue_alerts
                SET read_at = ?2, read_by = ?3, resolved_at = ?4, resolved_by = ?5, resolution_notes = ?6
                WHERE id = ?1
                "#,
                params![alert.id.0, read_at, read_by, resolved_at, resolved_by, notes],
            )
            .map_err(DatabaseError::from)?;
        if changed == 0 {
            return Err(FatigueError::not_found(ResourceKind::Alert, alert.id));
        }
        Ok(())
    }

    fn alert(&self, id: AlertId) -> Result<Option<FatigueAlert>> {
        let sql = format!("SELECT {} FROM fatigue_alerts WHERE id = ?1", ALERT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id.0], Self::alert_from_row)
            .optional()
            .map_err(DatabaseError::from)?)
    }

    fn alerts_for_client(&self, client_id: ClientId) -> Result<Vec<FatigueAlert>> {
        let sql = format!(
            "SELECT {} FROM fatigue_alerts WHERE client_id = ?1 ORDER BY created_at, id",
            ALERT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params![client_id.0], Self::alert_from_row)
            .map_err(DatabaseError::from)?;
        Ok(rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DatabaseError::from)?)
    }
}

fn insert_analysis_row(
    conn: &Connection,
    client: &ClientRef,
    session_id: Option<u64>,
    assessment: FatigueAssessment,
    now: DateTime<Utc>,
) -> Result<FatigueAnalysis> {
    conn.execute(
        r#"
        INSERT INTO fatigue_analyses (
            client_id, trainer_id, session_id, analysis_date, acute_load, chronic_load,
            acwr, acwr_zone, monotony, strain, fatigue_score, risk_level, insufficient_data,
            subjective, recommendation, next_session_adjustment, correction, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, NULL, ?17)
        "#,
        params![
            client.id.0,
            client.trainer_id.0,
            session_id,
            assessment.analysis_date.to_string(),
            decimal_text(assessment.acute_load),
            decimal_text(assessment.chronic_load),
            assessment.acwr.map(decimal_text),
            assessment.acwr_zone.map(|z| z.as_str()),
            assessment.monotony.map(decimal_text),
            assessment.strain.map(decimal_text),
            assessment.fatigue_score.map(decimal_text),
            assessment.risk_level.as_str(),
            assessment.insufficient_data,
            to_json(&assessment.subjective)?,
            assessment.recommendation,
            assessment.next_session_adjustment,
            ts(now),
        ],
    )
    .map_err(DatabaseError::from)?;
    let id = AnalysisId(conn.last_insert_rowid() as u64);

    Ok(FatigueAnalysis {
        id,
        client_id: client.id,
        trainer_id: client.trainer_id,
        session_id,
        assessment,
        created_at: now,
        correction: None,
    })
}

fn insert_alert_row(conn: &Connection, alert: NewAlert) -> Result<FatigueAlert> {
    conn.execute(
        r#"
        INSERT INTO fatigue_alerts (
            client_id, trainer_id, analysis_id, alert_type, severity, title, message,
            recommendations, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            alert.client_id.0,
            alert.trainer_id.0,
            alert.analysis_id.0,
            alert.alert_type.as_str(),
            alert.severity.as_str(),
            alert.title,
            alert.message,
            alert.recommendations,
            ts(alert.created_at),
        ],
    )
    .map_err(DatabaseError::from)?;
    let id = AlertId(conn.last_insert_rowid() as u64);

    Ok(FatigueAlert {
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
    })
}
