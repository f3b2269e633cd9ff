use anyhow::{Result, bail};
use tracing::info;

use crate::cli::RenormalizeArgs;
use crate::commands::load_pipeline_config;
use crate::pipeline::normalizer::Normalizer;
use crate::store::{RewriteSummary, SqliteMetricStore, StoredMetric};

/// Pushes every stored row through the current normalization tables and writes
/// back the rows that changed.
pub fn run(args: RenormalizeArgs) -> Result<()> {
    let db_path = args.store.resolved_db_path();
    if !db_path.exists() {
        bail!("database file missing: {}", db_path.display());
    }

    let normalizer = Normalizer::new(&load_pipeline_config(&args.store)?)?;
    let mut store = SqliteMetricStore::open(&db_path)?;
    let stored = store.stored_metrics()?;
    let changed = renormalized_rows(&normalizer, &stored);

    info!(
        path = %db_path.display(),
        scanned = stored.len(),
        changed = changed.len(),
        dry_run = args.dry_run,
        "renormalize scanned stored metrics"
    );

    if args.dry_run || changed.is_empty() {
        return Ok(());
    }

    let RewriteSummary {
        updated,
        removed_duplicates,
    } = store.rewrite(&changed)?;
    info!(updated, removed_duplicates, "renormalize completed");

    Ok(())
}

fn renormalized_rows(normalizer: &Normalizer, stored: &[StoredMetric]) -> Vec<StoredMetric> {
    stored
        .iter()
        .filter_map(|metric| {
            let mut record = metric.record.clone();
            normalizer.normalize(&mut record);
            (record != metric.record).then_some(StoredMetric {
                id: metric.id,
                record,
            })
        })
        .collect()
}
