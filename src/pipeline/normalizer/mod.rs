use anyhow::Result;

use crate::config::PipelineConfig;
use crate::dates::normalize_report_date;
use crate::model::MetricRecord;

mod names;
mod ranges;
#[cfg(test)]
mod tests;
mod units;

pub use names::NameCanonicalizer;
pub use ranges::{RangeCleaner, ReferenceBounds, autofill_reference_range, parse_reference_range};
pub use units::UnitNormalizer;

/// Name, unit, range and date transforms, applied in that order. Each one is
/// idempotent, so stored rows can be pushed through again after the tables change.
#[derive(Debug)]
pub struct Normalizer {
    names: NameCanonicalizer,
    units: UnitNormalizer,
    ranges: RangeCleaner,
    normalize_dates: bool,
}

impl Normalizer {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            names: NameCanonicalizer::new(&config.aliases),
            units: UnitNormalizer::new(),
            ranges: RangeCleaner::new()?,
            normalize_dates: config.normalize_dates,
        })
    }

    pub fn canonicalize_name(&self, test_name: &str) -> String {
        self.names.canonicalize(test_name)
    }

    pub fn normalize_unit(&self, record: &mut MetricRecord) -> bool {
        self.units.apply(record)
    }

    pub fn clean_range(&self, raw: Option<&str>) -> Option<String> {
        raw.and_then(|range| self.ranges.clean(range))
    }

    pub fn normalize_date(&self, raw: Option<&str>) -> Option<String> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        if self.normalize_dates {
            Some(normalize_report_date(raw))
        } else {
            Some(raw.to_string())
        }
    }

    /// Returns whether a unit-system conversion fired.
    pub fn normalize(&self, record: &mut MetricRecord) -> bool {
        record.canonical_test_name = self.canonicalize_name(&record.test_name);
        let converted = self.normalize_unit(record);
        record.reference_range = self.clean_range(record.reference_range.as_deref());
        record.report_date = self.normalize_date(record.report_date.as_deref());
        converted
    }

    pub fn autofill_range(&self, record: &mut MetricRecord, history: &[MetricRecord]) -> bool {
        autofill_reference_range(record, history)
    }
}
