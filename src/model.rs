use serde::{Deserialize, Serialize};

use crate::util::format_number;

/// One fragment recovered from model output, before any validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub test_name: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub report_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Numeric(f64),
    /// Categorical tokens (lower-cased) and any non-numeric text read back from the store.
    Text(String),
}

impl MetricValue {
    pub fn from_accepted(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Numeric(number),
            _ => Self::Text(trimmed.to_lowercase()),
        }
    }

    pub fn from_stored(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Numeric(number),
            _ => Self::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric(number) => Some(*number),
            Self::Text(_) => None,
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            Self::Numeric(number) => format_number(*number),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedConversion {
    pub from_unit: String,
    pub to_unit: String,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub test_name: String,
    pub canonical_test_name: String,
    pub value: MetricValue,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub report_date: Option<String>,
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<AppliedConversion>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum DocumentStatus {
    Success,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub filename: String,
    pub sha256: Option<String>,
    pub status: DocumentStatus,
    pub data_points_extracted: usize,
    pub records_inserted: usize,
    pub report_date: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStats {
    pub fragments_parsed: usize,
    pub rejected_metadata: usize,
    pub rejected_value: usize,
    pub records_normalized: usize,
    pub ranges_autofilled: usize,
    pub units_converted: usize,
}

impl ExtractionStats {
    pub fn absorb(&mut self, other: &ExtractionStats) {
        self.fragments_parsed += other.fragments_parsed;
        self.rejected_metadata += other.rejected_metadata;
        self.rejected_value += other.rejected_value;
        self.records_normalized += other.records_normalized;
        self.ranges_autofilled += other.ranges_autofilled;
        self.units_converted += other.units_converted;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractPaths {
    pub cache_root: String,
    pub db_path: String,
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractCounts {
    pub documents_total: usize,
    pub documents_skipped: usize,
    pub documents_succeeded: usize,
    pub documents_failed: usize,
    pub records_inserted: usize,
    pub records_deduplicated: usize,
    pub metrics_total: i64,
    pub extraction: ExtractionStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub mode: String,
    pub dry_run: bool,
    pub command: String,
    pub paths: ExtractPaths,
    pub counts: ExtractCounts,
    pub documents: Vec<DocumentOutcome>,
    pub warnings: Vec<String>,
}
