use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "1.1.0";

pub(super) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub(super) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metrics (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              test_name TEXT NOT NULL,
              canonical_test_name TEXT NOT NULL,
              value TEXT NOT NULL,
              unit TEXT,
              reference_range TEXT,
              report_date TEXT,
              source_file TEXT,
              created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS processed_files (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              filename TEXT NOT NULL,
              sha256 TEXT,
              processed_at TEXT NOT NULL,
              status TEXT NOT NULL,
              data_points_extracted INTEGER NOT NULL DEFAULT 0,
              report_date TEXT
            );
            ",
        )
        .context("failed to create base tables")?;

    ensure_column_exists(connection, "metrics", "converted_from_unit TEXT")?;
    ensure_column_exists(connection, "metrics", "conversion_factor REAL")?;
    ensure_column_exists(connection, "processed_files", "failure_reason TEXT")?;

    connection
        .execute_batch(
            "
            CREATE UNIQUE INDEX IF NOT EXISTS idx_metrics_dedup
              ON metrics(canonical_test_name, value, IFNULL(unit, ''), IFNULL(report_date, ''));
            CREATE INDEX IF NOT EXISTS idx_metrics_canonical ON metrics(canonical_test_name);
            CREATE INDEX IF NOT EXISTS idx_processed_files_sha ON processed_files(sha256, status);
            ",
        )
        .context("failed to create metric indexes")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

fn ensure_column_exists(
    connection: &Connection,
    table_name: &str,
    column_definition: &str,
) -> Result<()> {
    let Some(column_name) = column_definition.split_whitespace().next() else {
        bail!("invalid column definition: {column_definition}");
    };

    let pragma_sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to inspect schema for table {table_name}"))?;

    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let existing_name: String = row.get(1)?;
        if existing_name == column_name {
            return Ok(());
        }
    }

    let alter_sql = format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}");
    connection
        .execute(&alter_sql, [])
        .with_context(|| format!("failed to add column {column_name} on {table_name}"))?;

    Ok(())
}
