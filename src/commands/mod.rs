use std::path::Path;

use anyhow::Result;
use tracing::warn;

use crate::cli::StoreArgs;
use crate::config::{PipelineConfig, load_config};
use crate::model::MetricRecord;
use crate::store::SqliteMetricStore;

pub mod alerts;
pub mod extract;
pub mod renormalize;
pub mod status;
pub mod trend;

pub(crate) fn load_pipeline_config(store: &StoreArgs) -> Result<PipelineConfig> {
    let path = store.resolved_config_path();
    load_config(path.as_deref())
}

/// Every stored record, or none when the database has not been created yet.
pub(crate) fn load_history(db_path: &Path) -> Result<Vec<MetricRecord>> {
    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(Vec::new());
    }

    SqliteMetricStore::open_read_only(db_path)?.query_all()
}
