use crate::config::PipelineConfig;

/// Anti-hallucination gate: a record only survives when its value is a real
/// measurement, either a finite number or one of the configured categorical tokens.
#[derive(Debug, Clone)]
pub struct ValueValidator {
    vocabulary: Vec<String>,
}

impl ValueValidator {
    pub fn new(categorical_values: &[String]) -> Self {
        let mut vocabulary = categorical_values
            .iter()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect::<Vec<String>>();
        vocabulary.sort();
        vocabulary.dedup();
        Self { vocabulary }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.categorical_values)
    }

    pub fn is_acceptable(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };

        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            return false;
        }

        if let Ok(number) = trimmed.parse::<f64>() {
            return number.is_finite();
        }

        let folded = trimmed.to_lowercase();
        self.vocabulary
            .binary_search_by(|candidate| candidate.as_str().cmp(folded.as_str()))
            .is_ok()
    }
}

/// Drops rows that name patient metadata or non-metric findings rather than a lab test.
#[derive(Debug, Clone)]
pub struct MetadataFilter {
    names: Vec<String>,
    prefixes: Vec<String>,
}

impl MetadataFilter {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            names: config
                .excluded_test_names
                .iter()
                .map(|name| name.trim().to_lowercase())
                .collect(),
            prefixes: config
                .excluded_test_prefixes
                .iter()
                .map(|prefix| prefix.trim().to_lowercase())
                .filter(|prefix| !prefix.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, test_name: Option<&str>) -> bool {
        let Some(test_name) = test_name else {
            return false;
        };

        let folded = test_name.trim().to_lowercase();
        if folded.is_empty() {
            return false;
        }

        self.names.iter().any(|name| *name == folded)
            || self
                .prefixes
                .iter()
                .any(|prefix| folded.starts_with(prefix.as_str()))
    }
}
