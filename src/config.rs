use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::util::read_json;

pub const DEFAULT_CONFIG_FILENAME: &str = "healthmetrics.json";

pub const DEFAULT_CATEGORICAL_VALUES: [&str; 9] = [
    "negative", "positive", "normal", "nil", "absent", "present", "trace", "male", "female",
];

const DEFAULT_EXCLUDED_TEST_NAMES: [&str; 2] = ["Age", "Sex"];
const DEFAULT_EXCLUDED_TEST_PREFIXES: [&str; 1] = ["X-Ray"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub categorical_values: Vec<String>,
    pub excluded_test_names: Vec<String>,
    pub excluded_test_prefixes: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    pub normalize_dates: bool,
    pub stale_after_months: u32,
    pub very_stale_after_months: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            categorical_values: DEFAULT_CATEGORICAL_VALUES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            excluded_test_names: DEFAULT_EXCLUDED_TEST_NAMES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            excluded_test_prefixes: DEFAULT_EXCLUDED_TEST_PREFIXES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            aliases: BTreeMap::new(),
            normalize_dates: true,
            stale_after_months: 12,
            very_stale_after_months: 24,
        }
    }
}

/// Explicit path wins; otherwise `<cache_root>/healthmetrics.json` is used when present.
pub fn resolve_config_path(cache_root: &Path, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let candidate = cache_root.join(DEFAULT_CONFIG_FILENAME);
    candidate.exists().then_some(candidate)
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };

    let config: PipelineConfig = read_json(path)?;
    info!(
        path = %path.display(),
        categorical_values = config.categorical_values.len(),
        aliases = config.aliases.len(),
        "loaded pipeline config"
    );
    Ok(config)
}
