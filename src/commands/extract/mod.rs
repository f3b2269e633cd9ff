use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::commands::load_pipeline_config;
use crate::model::{
    DocumentOutcome, DocumentStatus, ExtractCounts, ExtractPaths, ExtractRunManifest,
    ExtractionStats, MetricRecord,
};
use crate::pipeline::ExtractionPipeline;
use crate::store::{DB_SCHEMA_VERSION, MetricHistory, SqliteMetricStore};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

mod document;
mod run;
#[cfg(test)]
mod tests;

pub use run::run;

use document::*;
