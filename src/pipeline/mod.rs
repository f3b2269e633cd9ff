use std::collections::HashMap;
use std::io::Read;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::model::{CandidateRecord, ExtractionStats, MetricRecord, MetricValue};
use crate::store::MetricHistory;

pub mod normalizer;
pub mod parser;
pub mod validator;

use normalizer::Normalizer;
use parser::{StreamingRecordParser, parse_records};
use validator::{MetadataFilter, ValueValidator};

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Default)]
pub struct DocumentExtraction {
    pub records: Vec<MetricRecord>,
    pub stats: ExtractionStats,
}

/// Parser -> metadata filter -> validator -> normalizer -> range auto-fill.
#[derive(Debug)]
pub struct ExtractionPipeline {
    metadata_filter: MetadataFilter,
    validator: ValueValidator,
    normalizer: Normalizer,
}

impl ExtractionPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            metadata_filter: MetadataFilter::from_config(config),
            validator: ValueValidator::from_config(config),
            normalizer: Normalizer::new(config)?,
        })
    }

    /// One whole document of model output. `history` is consulted only for
    /// reference-range auto-fill.
    pub fn process_text(
        &self,
        text: &str,
        source_file: Option<&str>,
        history: &dyn MetricHistory,
    ) -> Result<DocumentExtraction> {
        let mut extraction = DocumentExtraction::default();
        let mut cache = HistoryCache::new(history);

        for candidate in parse_records(text) {
            extraction.stats.fragments_parsed += 1;
            if let Some(record) =
                self.accept(candidate, source_file, &mut cache, &mut extraction.stats)?
            {
                extraction.records.push(record);
            }
        }

        debug!(
            source = source_file.unwrap_or("-"),
            fragments = extraction.stats.fragments_parsed,
            records = extraction.records.len(),
            "processed document text"
        );
        Ok(extraction)
    }

    /// Reads `reader` in `chunk_size` byte pieces and hands each accepted record
    /// to `emit` as soon as its line is complete. Records already emitted stay
    /// emitted when a later read fails.
    pub fn process_stream<R: Read>(
        &self,
        mut reader: R,
        chunk_size: usize,
        source_file: Option<&str>,
        history: &dyn MetricHistory,
        mut emit: impl FnMut(MetricRecord) -> Result<()>,
    ) -> Result<ExtractionStats> {
        let mut stats = ExtractionStats::default();
        let mut cache = HistoryCache::new(history);
        let mut parser = StreamingRecordParser::new();
        let mut buffer = vec![0_u8; chunk_size.max(1)];
        let mut pending = Vec::new();

        loop {
            let count = reader.read(&mut buffer).with_context(|| {
                format!(
                    "failed to read extraction stream: {}",
                    source_file.unwrap_or("-")
                )
            })?;
            if count == 0 {
                break;
            }

            pending.extend_from_slice(&buffer[..count]);
            let ready = pending.drain(..complete_utf8_prefix(&pending)).collect::<Vec<u8>>();
            for candidate in parser.feed(&String::from_utf8_lossy(&ready)) {
                stats.fragments_parsed += 1;
                if let Some(record) = self.accept(candidate, source_file, &mut cache, &mut stats)? {
                    emit(record)?;
                }
            }
        }

        let mut tail = Vec::new();
        if !pending.is_empty() {
            tail.extend(parser.feed(&String::from_utf8_lossy(&pending)));
        }
        tail.extend(parser.finish());
        for candidate in tail {
            stats.fragments_parsed += 1;
            if let Some(record) = self.accept(candidate, source_file, &mut cache, &mut stats)? {
                emit(record)?;
            }
        }

        Ok(stats)
    }

    fn accept(
        &self,
        candidate: CandidateRecord,
        source_file: Option<&str>,
        cache: &mut HistoryCache<'_>,
        stats: &mut ExtractionStats,
    ) -> Result<Option<MetricRecord>> {
        let test_name = candidate.test_name.as_deref().unwrap_or_default().trim();

        if self.metadata_filter.is_excluded(Some(test_name)) {
            stats.rejected_metadata += 1;
            info!(test_name, "dropping metadata row");
            return Ok(None);
        }

        let Some(value) = candidate
            .value
            .as_deref()
            .filter(|value| self.validator.is_acceptable(Some(value)))
        else {
            stats.rejected_value += 1;
            info!(test_name, "rejecting record without a usable value");
            return Ok(None);
        };

        let mut record = MetricRecord {
            test_name: test_name.to_string(),
            canonical_test_name: String::new(),
            value: MetricValue::from_accepted(value),
            unit: candidate.unit,
            reference_range: candidate.reference_range,
            report_date: candidate.report_date,
            source_file: source_file.map(str::to_string),
            conversion: None,
        };

        if self.normalizer.normalize(&mut record) {
            stats.units_converted += 1;
        }
        stats.records_normalized += 1;

        if record.reference_range.is_none() {
            let history = cache.records_for_test(&record.canonical_test_name)?;
            if self.normalizer.autofill_range(&mut record, history) {
                stats.ranges_autofilled += 1;
                debug!(
                    test_name = %record.canonical_test_name,
                    "reference range filled from history"
                );
            }
        }

        Ok(Some(record))
    }
}

/// Per-document memo of store lookups, keyed by canonical test name.
struct HistoryCache<'a> {
    source: &'a dyn MetricHistory,
    by_test: HashMap<String, Vec<MetricRecord>>,
}

impl<'a> HistoryCache<'a> {
    fn new(source: &'a dyn MetricHistory) -> Self {
        Self {
            source,
            by_test: HashMap::new(),
        }
    }

    fn records_for_test(&mut self, canonical_test_name: &str) -> Result<&[MetricRecord]> {
        if !self.by_test.contains_key(canonical_test_name) {
            let records = self.source.records_for_test(canonical_test_name)?;
            self.by_test.insert(canonical_test_name.to_string(), records);
        }
        Ok(self
            .by_test
            .get(canonical_test_name)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

/// Length of the longest prefix that does not end inside a multi-byte character.
/// Invalid sequences are left in the prefix and replaced when decoded.
fn complete_utf8_prefix(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(err) if err.error_len().is_none() => err.valid_up_to(),
        Err(_) => bytes.len(),
    }
}
