#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use twod_forecast_core::{
    format_iso_date, format_rfc3339, now_utc, parse_iso_date, parse_rfc3339_utc, DrawEntry,
    DrawRecord, ExpertKind, ForecastError, ForecastRuleset, ForecastStorage, RecordId, Session,
    TwoDigit, WeightUpdate, WeightVector,
};
use ulid::Ulid;

const FORECAST_MIGRATION_VERSION: i64 = 1;
const DEFAULT_CREDENTIAL: &str = "external_model";

const SCHEMA_FORECAST_V1: &str = r"
CREATE TABLE IF NOT EXISTS forecast_rulesets (
  ruleset_version INTEGER PRIMARY KEY,
  ruleset_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS draw_records (
  record_id TEXT PRIMARY KEY,
  draw_date TEXT NOT NULL UNIQUE,
  am TEXT NOT NULL CHECK (length(am) = 2),
  pm TEXT NOT NULL CHECK (length(pm) = 2),
  market_index TEXT,
  market_value TEXT,
  day_of_week TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS expert_weights (
  expert TEXT PRIMARY KEY,
  weight REAL NOT NULL CHECK (weight >= 0.0),
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
  name TEXT PRIMARY KEY,
  secret TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS weight_adaptations (
  adaptation_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  adaptation_id TEXT NOT NULL UNIQUE,
  recorded_at TEXT NOT NULL,
  draw_date TEXT NOT NULL,
  session TEXT NOT NULL CHECK (session IN ('morning', 'evening')),
  outcome TEXT NOT NULL,
  predicted_by_json TEXT NOT NULL,
  before_json TEXT NOT NULL,
  after_json TEXT NOT NULL,
  changed INTEGER NOT NULL CHECK (changed IN (0, 1))
);

CREATE TRIGGER IF NOT EXISTS trg_weight_adaptations_no_update
BEFORE UPDATE ON weight_adaptations
BEGIN
  SELECT RAISE(FAIL, 'weight_adaptations is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_weight_adaptations_no_delete
BEFORE DELETE ON weight_adaptations
BEGIN
  SELECT RAISE(FAIL, 'weight_adaptations is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_weight_adaptations_date_seq
  ON weight_adaptations(draw_date, adaptation_seq);
";

/// One row of the append-only adaptation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptationLogEntry {
    pub adaptation_seq: i64,
    pub adaptation_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub draw_date: String,
    pub session: Session,
    pub outcome: TwoDigit,
    pub predicted_by: Vec<ExpertKind>,
    pub before: WeightVector,
    pub after: WeightVector,
    pub changed: bool,
}

pub struct SqliteForecastStore {
    conn: Connection,
}

impl SqliteForecastStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_FORECAST_V1)
            .context("failed to apply forecast schema")?;

        let now = timestamp_now()?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![FORECAST_MIGRATION_VERSION, now],
            )
            .context("failed to register forecast schema migration")?;
        if inserted > 0 {
            tracing::info!(
                version = FORECAST_MIGRATION_VERSION,
                "applied forecast schema migration"
            );
        }

        if !self.get_rulesets()?.contains_key(&1) {
            self.upsert_ruleset(&ForecastRuleset::v1())?;
        }

        Ok(())
    }

    pub fn upsert_ruleset(&self, ruleset: &ForecastRuleset) -> Result<()> {
        ruleset
            .validate()
            .map_err(|err| anyhow!("invalid ruleset configuration: {err}"))?;

        let payload = serde_json::to_string(ruleset).context("failed to serialize ruleset")?;
        let now = timestamp_now()?;

        self.conn
            .execute(
                "INSERT INTO forecast_rulesets(ruleset_version, ruleset_json, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(ruleset_version) DO UPDATE SET
                   ruleset_json = excluded.ruleset_json,
                   created_at = excluded.created_at",
                params![i64::from(ruleset.ruleset_version), payload, now],
            )
            .context("failed to upsert ruleset")?;

        Ok(())
    }

    pub fn get_rulesets(&self) -> Result<BTreeMap<u32, ForecastRuleset>> {
        let mut stmt = self.conn.prepare(
            "SELECT ruleset_version, ruleset_json FROM forecast_rulesets ORDER BY ruleset_version ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut map = BTreeMap::new();

        while let Some(row) = rows.next()? {
            let version_i64: i64 = row.get(0)?;
            let version = u32::try_from(version_i64)
                .with_context(|| format!("invalid ruleset_version: {version_i64}"))?;
            let json: String = row.get(1)?;
            let value: Value =
                serde_json::from_str(&json).context("invalid stored ruleset JSON")?;
            let ruleset = ForecastRuleset::from_json(&value)
                .map_err(|err| anyhow!("failed to parse ruleset {version}: {err}"))?;
            map.insert(version, ruleset);
        }

        Ok(map)
    }

    /// The highest stored ruleset version, or v1 when none is stored.
    pub fn active_ruleset(&self) -> Result<ForecastRuleset> {
        Ok(self
            .get_rulesets()?
            .into_values()
            .next_back()
            .unwrap_or_else(ForecastRuleset::v1))
    }

    pub fn append_adaptation(
        &self,
        draw_date: time::Date,
        session: Session,
        update: &WeightUpdate,
    ) -> Result<AdaptationLogEntry> {
        let adaptation_id = Ulid::new().to_string();
        let recorded_at = now_utc();
        let predicted_by_json =
            serde_json::to_string(&update.predicted_by).context("failed to serialize predictors")?;
        let before_json =
            serde_json::to_string(&update.before).context("failed to serialize weights")?;
        let after_json =
            serde_json::to_string(&update.after).context("failed to serialize weights")?;

        self.conn
            .execute(
                "INSERT INTO weight_adaptations(
                   adaptation_id, recorded_at, draw_date, session, outcome,
                   predicted_by_json, before_json, after_json, changed
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    adaptation_id,
                    format_rfc3339(recorded_at).map_err(|err| anyhow!(err.to_string()))?,
                    format_iso_date(draw_date),
                    session.as_str(),
                    update.outcome.to_string(),
                    predicted_by_json,
                    before_json,
                    after_json,
                    i64::from(update.changed),
                ],
            )
            .context("failed to append weight adaptation")?;

        Ok(AdaptationLogEntry {
            adaptation_seq: self.conn.last_insert_rowid(),
            adaptation_id,
            recorded_at,
            draw_date: format_iso_date(draw_date),
            session,
            outcome: update.outcome,
            predicted_by: update.predicted_by.clone(),
            before: update.before.clone(),
            after: update.after.clone(),
            changed: update.changed,
        })
    }

    /// Most recent adaptations first.
    pub fn list_adaptations(&self, limit: usize) -> Result<Vec<AdaptationLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT adaptation_seq, adaptation_id, recorded_at, draw_date, session, outcome,
                    predicted_by_json, before_json, after_json, changed
             FROM weight_adaptations
             ORDER BY adaptation_seq DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], parse_adaptation_row)?;
        collect_rows(rows)
    }

    pub fn count_adaptations(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM weight_adaptations", [], |row| row.get(0))
            .context("failed to count weight adaptations")?;
        usize::try_from(count).context("adaptation count out of range")
    }

    pub fn load_records_raw(&self) -> Result<Vec<DrawRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, draw_date, am, pm, market_index, market_value
             FROM draw_records
             ORDER BY draw_date DESC",
        )?;
        let rows = stmt.query_map([], parse_record_row)?;
        collect_rows(rows)
    }

    pub fn replace_records(&mut self, records: &[DrawRecord]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("failed to begin record transaction")?;
        tx.execute("DELETE FROM draw_records", [])
            .context("failed to clear draw_records")?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO draw_records(
                   record_id, draw_date, am, pm, market_index, market_value, day_of_week
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                insert
                    .execute(params![
                        record.id.to_string(),
                        format_iso_date(record.date),
                        record.am.to_string(),
                        record.pm.to_string(),
                        record.market_index,
                        record.market_value,
                        record.day_of_week(),
                    ])
                    .with_context(|| {
                        format!("failed to insert record for {}", format_iso_date(record.date))
                    })?;
            }
        }
        tx.commit().context("failed to commit record transaction")?;
        tracing::debug!(records = records.len(), "saved draw records");
        Ok(())
    }

    pub fn load_weight_rows(&self) -> Result<Option<WeightVector>> {
        let mut stmt = self
            .conn
            .prepare("SELECT expert, weight FROM expert_weights ORDER BY expert ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut weights = Vec::new();
        for (name, weight) in collect_rows(rows)? {
            match ExpertKind::parse(&name) {
                Some(kind) => weights.push((kind, weight)),
                None => tracing::warn!(expert = %name, "ignoring weight for unknown expert"),
            }
        }
        if weights.is_empty() {
            return Ok(None);
        }
        WeightVector::from_weights(weights)
            .map(Some)
            .map_err(|err| anyhow!("invalid stored weights: {err}"))
    }

    pub fn replace_weights(&mut self, weights: &WeightVector) -> Result<()> {
        let now = timestamp_now()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to begin weight transaction")?;
        tx.execute("DELETE FROM expert_weights", [])
            .context("failed to clear expert_weights")?;
        for (kind, weight) in weights.iter() {
            tx.execute(
                "INSERT INTO expert_weights(expert, weight, updated_at) VALUES (?1, ?2, ?3)",
                params![kind.as_str(), weight, now],
            )
            .with_context(|| format!("failed to store weight for {}", kind.as_str()))?;
        }
        tx.commit().context("failed to commit weight transaction")?;
        Ok(())
    }

    pub fn get_credential(&self, name: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT secret FROM credentials WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read credential")
    }

    pub fn put_credential(&self, name: &str, secret: &str) -> Result<()> {
        let now = timestamp_now()?;
        self.conn
            .execute(
                "INSERT INTO credentials(name, secret, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                   secret = excluded.secret,
                   updated_at = excluded.updated_at",
                params![name, secret, now],
            )
            .context("failed to store credential")?;
        Ok(())
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ForecastStorage for SqliteForecastStore {
    fn load_records(&self) -> Result<Option<Vec<DrawRecord>>, ForecastError> {
        let records = self.load_records_raw().map_err(storage_error)?;
        Ok((!records.is_empty()).then_some(records))
    }

    fn save_records(&mut self, records: &[DrawRecord]) -> Result<(), ForecastError> {
        self.replace_records(records).map_err(storage_error)
    }

    fn load_weights(&self) -> Result<Option<WeightVector>, ForecastError> {
        self.load_weight_rows().map_err(storage_error)
    }

    fn save_weights(&mut self, weights: &WeightVector) -> Result<(), ForecastError> {
        self.replace_weights(weights).map_err(storage_error)
    }

    fn load_credential(&self) -> Result<Option<String>, ForecastError> {
        self.get_credential(DEFAULT_CREDENTIAL).map_err(storage_error)
    }

    fn save_credential(&mut self, credential: &str) -> Result<(), ForecastError> {
        self.put_credential(DEFAULT_CREDENTIAL, credential)
            .map_err(storage_error)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(err: anyhow::Error) -> ForecastError {
    ForecastError::Storage(format!("{err:#}"))
}

fn timestamp_now() -> Result<String> {
    format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))
}

fn parse_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DrawRecord> {
    let id_raw: String = row.get(0)?;
    let date_raw: String = row.get(1)?;
    let am_raw: String = row.get(2)?;
    let pm_raw: String = row.get(3)?;

    let id = RecordId::parse(&id_raw).map_err(to_sql_error)?;
    let date = parse_iso_date(&date_raw).map_err(to_sql_error)?;
    let am = TwoDigit::parse(&am_raw).map_err(to_sql_error)?;
    let pm = TwoDigit::parse(&pm_raw).map_err(to_sql_error)?;
    let entry = DrawEntry::new(date, am, pm).with_market(row.get(4)?, row.get(5)?);

    Ok(DrawRecord::restore(id, entry))
}

fn parse_adaptation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdaptationLogEntry> {
    let recorded_at_raw: String = row.get(2)?;
    let session_raw: String = row.get(4)?;
    let outcome_raw: String = row.get(5)?;
    let predicted_by_raw: String = row.get(6)?;
    let before_raw: String = row.get(7)?;
    let after_raw: String = row.get(8)?;
    let changed: i64 = row.get(9)?;

    let session = match session_raw.as_str() {
        "morning" => Session::Morning,
        "evening" => Session::Evening,
        other => {
            return Err(to_sql_error(ForecastError::Validation(format!(
                "unknown session {other:?}"
            ))))
        }
    };

    Ok(AdaptationLogEntry {
        adaptation_seq: row.get(0)?,
        adaptation_id: row.get(1)?,
        recorded_at: parse_rfc3339_utc(&recorded_at_raw).map_err(to_sql_error)?,
        draw_date: row.get(3)?,
        session,
        outcome: TwoDigit::parse(&outcome_raw).map_err(to_sql_error)?,
        predicted_by: serde_json::from_str(&predicted_by_raw).map_err(json_to_sql_error)?,
        before: serde_json::from_str(&before_raw).map_err(json_to_sql_error)?,
        after: serde_json::from_str(&after_raw).map_err(json_to_sql_error)?,
        changed: changed != 0,
    })
}

#[allow(clippy::needless_pass_by_value)]
fn to_sql_error(err: ForecastError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )),
    )
}

fn json_to_sql_error(err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
