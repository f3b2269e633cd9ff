use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::{DB_SCHEMA_VERSION, SqliteMetricStore};

const RECENT_FAILURE_LIMIT: usize = 5;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.store.cache_root.join("manifests");
    let db_path = args.store.resolved_db_path();

    info!(cache_root = %args.store.cache_root.display(), "status requested");

    match latest_extract_manifest(&manifest_dir)? {
        Some(path) => {
            let raw =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let manifest: Value = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            let text = |key: &str| {
                manifest
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let count = |key: &str| {
                manifest
                    .get("counts")
                    .and_then(|counts| counts.get(key))
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
            };

            info!(
                path = %path.display(),
                run_id = %text("run_id"),
                status = %text("status"),
                mode = %text("mode"),
                updated_at = %text("updated_at"),
                documents_succeeded = count("documents_succeeded"),
                documents_failed = count("documents_failed"),
                documents_skipped = count("documents_skipped"),
                records_inserted = count("records_inserted"),
                "loaded latest extract manifest"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no extract manifest found"),
    }

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = SqliteMetricStore::open_read_only(&db_path)?;
    let schema_version = store.schema_version()?.unwrap_or_default();
    let counts = store.counts()?;

    info!(
        path = %db_path.display(),
        schema_version = %schema_version,
        metrics = counts.metrics,
        distinct_tests = counts.distinct_tests,
        converted_metrics = counts.converted_metrics,
        files_succeeded = counts.files_succeeded,
        files_failed = counts.files_failed,
        "database status"
    );
    if schema_version != DB_SCHEMA_VERSION {
        warn!(
            found = %schema_version,
            expected = DB_SCHEMA_VERSION,
            "database schema version differs from this build"
        );
    }

    for entry in store.recent_failures(RECENT_FAILURE_LIMIT)? {
        warn!(
            filename = %entry.filename,
            processed_at = %entry.processed_at,
            reason = %entry.failure_reason.unwrap_or_default(),
            "recent extraction failure"
        );
    }

    Ok(())
}

/// Run manifests carry a compact UTC timestamp in their names, so the
/// lexicographically greatest name is the newest run.
fn latest_extract_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to list {}", manifest_dir.display()))?;

    let mut latest: Option<PathBuf> = None;
    for entry in entries {
        let path = entry?.path();
        let is_extract_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("extract_run_") && name.ends_with(".json"));
        if is_extract_manifest && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StoreArgs;

    #[test]
    fn latest_extract_manifest_picks_newest_run_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "extract_run_20240101T000000Z.json",
            "extract_run_20240301T120000Z.json",
            "notes.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write manifest");
        }

        let latest = latest_extract_manifest(dir.path())
            .expect("scan")
            .expect("manifest found");
        assert_eq!(
            latest.file_name().and_then(|name| name.to_str()),
            Some("extract_run_20240301T120000Z.json")
        );
        assert!(latest_extract_manifest(&dir.path().join("missing"))
            .expect("scan")
            .is_none());
    }

    #[test]
    fn status_tolerates_an_empty_cache_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        run(StatusArgs {
            store: StoreArgs {
                cache_root: dir.path().to_path_buf(),
                db_path: None,
                config_path: None,
            },
        })
        .expect("status on empty cache root");
        assert!(!dir.path().join(crate::store::DEFAULT_DB_FILENAME).exists());
    }
}
