use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::config::resolve_config_path;
use crate::pipeline::DEFAULT_CHUNK_SIZE;
use crate::store::DEFAULT_DB_FILENAME;

#[derive(Parser, Debug)]
#[command(
    name = "healthmetrics",
    version,
    about = "Turn lab-report extraction output into clean, trendable health metrics"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Trend(TrendArgs),
    Alerts(AlertsArgs),
    Renormalize(RenormalizeArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/healthmetrics")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub config_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join(DEFAULT_DB_FILENAME))
    }

    pub fn resolved_config_path(&self) -> Option<PathBuf> {
        resolve_config_path(&self.cache_root, self.config_path.as_deref())
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long = "input", required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub stream: bool,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Re-extract files whose content hash already has a successful ledger entry.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TrendArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Print the series for one test instead of listing eligible tests.
    #[arg(long)]
    pub test: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AlertsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Reference day for staleness, `YYYY-MM-DD`. Defaults to the local date.
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct RenormalizeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
