use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::debug;

use crate::model::{AppliedConversion, DocumentOutcome, MetricRecord, MetricValue};
use crate::util::{ensure_directory, now_utc_string};

mod schema;

pub use schema::DB_SCHEMA_VERSION;

pub const DEFAULT_DB_FILENAME: &str = "healthmetrics.sqlite";

const METRIC_COLUMNS: &str = "id, test_name, canonical_test_name, value, unit, reference_range, \
     report_date, source_file, converted_from_unit, conversion_factor";

/// Prior records of one canonical test, in insertion order.
pub trait MetricHistory {
    fn records_for_test(&self, canonical_test_name: &str) -> Result<Vec<MetricRecord>>;
}

impl MetricHistory for [MetricRecord] {
    fn records_for_test(&self, canonical_test_name: &str) -> Result<Vec<MetricRecord>> {
        Ok(self
            .iter()
            .filter(|record| record.canonical_test_name == canonical_test_name)
            .cloned()
            .collect())
    }
}

impl MetricHistory for Vec<MetricRecord> {
    fn records_for_test(&self, canonical_test_name: &str) -> Result<Vec<MetricRecord>> {
        self.as_slice().records_for_test(canonical_test_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetric {
    pub id: i64,
    pub record: MetricRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppendSummary {
    pub inserted: usize,
    pub deduplicated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub updated: usize,
    pub removed_duplicates: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub metrics: i64,
    pub distinct_tests: i64,
    pub converted_metrics: i64,
    pub files_succeeded: i64,
    pub files_failed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub filename: String,
    pub processed_at: String,
    pub status: String,
    pub data_points_extracted: i64,
    pub failure_reason: Option<String>,
}

pub struct SqliteMetricStore {
    connection: Connection,
}

impl SqliteMetricStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_connection(connection)
    }

    /// Opens an existing database for reads only; schema and metadata are left
    /// as they are.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database read-only: {}", path.display()))?;
        Ok(Self { connection })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        schema::configure_connection(&connection)?;
        schema::ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// `None` when an identical reading (test, value, unit, date) is already stored.
    pub fn append(&self, record: &MetricRecord) -> Result<Option<i64>> {
        insert_metric(&self.connection, record)
    }

    pub fn append_all(&mut self, records: &[MetricRecord]) -> Result<AppendSummary> {
        let tx = self.connection.transaction()?;
        let mut summary = AppendSummary::default();

        for record in records {
            match insert_metric(&tx, record)? {
                Some(_) => summary.inserted += 1,
                None => summary.deduplicated += 1,
            }
        }

        tx.commit().context("failed to commit metric batch")?;
        Ok(summary)
    }

    pub fn query_all(&self) -> Result<Vec<MetricRecord>> {
        Ok(self
            .stored_metrics()?
            .into_iter()
            .map(|stored| stored.record)
            .collect())
    }

    pub fn query_by_test(&self, canonical_test_name: &str) -> Result<Vec<MetricRecord>> {
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM metrics WHERE canonical_test_name = ?1 ORDER BY id"
        );
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement.query_map([canonical_test_name], stored_metric_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.record);
        }
        Ok(records)
    }

    pub fn stored_metrics(&self) -> Result<Vec<StoredMetric>> {
        let sql = format!("SELECT {METRIC_COLUMNS} FROM metrics ORDER BY id");
        let mut statement = self.connection.prepare(&sql)?;
        let rows = statement.query_map([], stored_metric_from_row)?;

        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row.context("failed to read metric row")?);
        }
        Ok(metrics)
    }

    /// Writes rewritten rows back. A row whose new form collides with another
    /// stored row is deleted instead.
    pub fn rewrite(&mut self, metrics: &[StoredMetric]) -> Result<RewriteSummary> {
        let tx = self.connection.transaction()?;
        let mut summary = RewriteSummary::default();

        {
            let mut update = tx.prepare(
                "
                UPDATE metrics SET
                  canonical_test_name = ?2,
                  value = ?3,
                  unit = ?4,
                  reference_range = ?5,
                  report_date = ?6,
                  converted_from_unit = ?7,
                  conversion_factor = ?8
                WHERE id = ?1
                ",
            )?;
            let mut delete = tx.prepare("DELETE FROM metrics WHERE id = ?1")?;

            for stored in metrics {
                let record = &stored.record;
                let result = update.execute(params![
                    stored.id,
                    record.canonical_test_name,
                    record.value.to_stored(),
                    record.unit,
                    record.reference_range,
                    record.report_date,
                    record.conversion.as_ref().map(|conversion| &conversion.from_unit),
                    record.conversion.as_ref().map(|conversion| conversion.factor),
                ]);

                match result {
                    Ok(_) => summary.updated += 1,
                    Err(rusqlite::Error::SqliteFailure(failure, _))
                        if failure.code == ErrorCode::ConstraintViolation =>
                    {
                        debug!(id = stored.id, "removing row that duplicates another reading");
                        delete.execute([stored.id])?;
                        summary.removed_duplicates += 1;
                    }
                    Err(err) => {
                        return Err(err)
                            .with_context(|| format!("failed to update metric {}", stored.id));
                    }
                }
            }
        }

        tx.commit().context("failed to commit rewritten metrics")?;
        Ok(summary)
    }

    pub fn record_outcome(&self, outcome: &DocumentOutcome) -> Result<i64> {
        self.connection
            .execute(
                "
                INSERT INTO processed_files(
                  filename, sha256, processed_at, status, data_points_extracted,
                  report_date, failure_reason
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    outcome.filename,
                    outcome.sha256,
                    now_utc_string(),
                    outcome.status.as_str(),
                    outcome.data_points_extracted as i64,
                    outcome.report_date,
                    outcome.failure_reason,
                ],
            )
            .with_context(|| format!("failed to record outcome for {}", outcome.filename))?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Whether a file with this content hash has already been extracted successfully.
    pub fn is_processed(&self, sha256: &str) -> Result<bool> {
        let found = self
            .connection
            .query_row(
                "SELECT 1 FROM processed_files WHERE sha256 = ?1 AND status = 'Success' LIMIT 1",
                [sha256],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn recent_failures(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let mut statement = self.connection.prepare(
            "
            SELECT filename, processed_at, status, data_points_extracted, failure_reason
            FROM processed_files
            WHERE status = 'Failed'
            ORDER BY id DESC
            LIMIT ?1
            ",
        )?;
        let rows = statement.query_map([limit as i64], |row| {
            Ok(LedgerEntry {
                filename: row.get(0)?,
                processed_at: row.get(1)?,
                status: row.get(2)?,
                data_points_extracted: row.get(3)?,
                failure_reason: row.get(4)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            metrics: self.query_count("SELECT COUNT(*) FROM metrics")?,
            distinct_tests: self
                .query_count("SELECT COUNT(DISTINCT canonical_test_name) FROM metrics")?,
            converted_metrics: self.query_count(
                "SELECT COUNT(*) FROM metrics WHERE converted_from_unit IS NOT NULL",
            )?,
            files_succeeded: self
                .query_count("SELECT COUNT(*) FROM processed_files WHERE status = 'Success'")?,
            files_failed: self
                .query_count("SELECT COUNT(*) FROM processed_files WHERE status = 'Failed'")?,
        })
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        let version = self
            .connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn query_count(&self, sql: &str) -> Result<i64> {
        let count = self
            .connection
            .query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("failed to run count query: {sql}"))?;
        Ok(count)
    }
}

impl MetricHistory for SqliteMetricStore {
    fn records_for_test(&self, canonical_test_name: &str) -> Result<Vec<MetricRecord>> {
        self.query_by_test(canonical_test_name)
    }
}

fn insert_metric(connection: &Connection, record: &MetricRecord) -> Result<Option<i64>> {
    let inserted = connection
        .execute(
            "
            INSERT OR IGNORE INTO metrics(
              test_name, canonical_test_name, value, unit, reference_range, report_date,
              source_file, converted_from_unit, conversion_factor, created_at
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                record.test_name,
                record.canonical_test_name,
                record.value.to_stored(),
                record.unit,
                record.reference_range,
                record.report_date,
                record.source_file,
                record.conversion.as_ref().map(|conversion| &conversion.from_unit),
                record.conversion.as_ref().map(|conversion| conversion.factor),
                now_utc_string(),
            ],
        )
        .with_context(|| format!("failed to insert metric {}", record.canonical_test_name))?;

    if inserted == 0 {
        debug!(test_name = %record.canonical_test_name, "duplicate reading ignored");
        return Ok(None);
    }
    Ok(Some(connection.last_insert_rowid()))
}

fn stored_metric_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMetric> {
    let raw_value: String = row.get(3)?;
    let unit: Option<String> = row.get(4)?;
    let converted_from_unit: Option<String> = row.get(8)?;
    let conversion_factor: Option<f64> = row.get(9)?;

    let conversion = match (converted_from_unit, conversion_factor) {
        (Some(from_unit), Some(factor)) => Some(AppliedConversion {
            from_unit,
            to_unit: unit.clone().unwrap_or_default(),
            factor,
        }),
        _ => None,
    };

    Ok(StoredMetric {
        id: row.get(0)?,
        record: MetricRecord {
            test_name: row.get(1)?,
            canonical_test_name: row.get(2)?,
            value: MetricValue::from_stored(&raw_value),
            unit,
            reference_range: row.get(5)?,
            report_date: row.get(6)?,
            source_file: row.get(7)?,
            conversion,
        },
    })
}
