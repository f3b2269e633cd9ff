use super::*;

#[derive(Debug, Clone, Copy)]
pub(super) struct ExtractOptions {
    pub stream: bool,
    pub chunk_size: usize,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub(super) struct DocumentReport {
    pub extracted: usize,
    pub inserted: usize,
    pub deduplicated: usize,
    pub report_date: Option<String>,
    pub stats: ExtractionStats,
}

impl DocumentReport {
    fn note_record(&mut self, record: &MetricRecord) {
        self.extracted += 1;
        if self.report_date.is_none() {
            self.report_date = record.report_date.clone();
        }
    }
}

/// Runs one document through the pipeline and persists its records before
/// returning. `report` keeps whatever was counted even when this fails midway.
pub(super) fn extract_document(
    pipeline: &ExtractionPipeline,
    store: Option<&mut SqliteMetricStore>,
    path: &Path,
    options: ExtractOptions,
    report: &mut DocumentReport,
) -> Result<()> {
    let source_file = source_name(path);
    let empty = Vec::<MetricRecord>::new();

    if options.stream {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let store = store.as_deref();
        let history: &dyn MetricHistory = match store {
            Some(store) => store,
            None => &empty,
        };
        let writer = store.filter(|_| !options.dry_run);

        let stats = pipeline.process_stream(
            file,
            options.chunk_size,
            Some(&source_file),
            history,
            |record| {
                report.note_record(&record);
                if let Some(store) = writer {
                    match store.append(&record)? {
                        Some(_) => report.inserted += 1,
                        None => report.deduplicated += 1,
                    }
                }
                Ok(())
            },
        )?;
        report.stats = stats;
        return Ok(());
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let extraction = {
        let history: &dyn MetricHistory = match store.as_deref() {
            Some(store) => store,
            None => &empty,
        };
        pipeline.process_text(&text, Some(&source_file), history)?
    };

    for record in &extraction.records {
        report.note_record(record);
    }
    report.stats = extraction.stats;

    if let Some(store) = store.filter(|_| !options.dry_run) {
        let summary = store.append_all(&extraction.records)?;
        report.inserted += summary.inserted;
        report.deduplicated += summary.deduplicated;
    }

    Ok(())
}

pub(super) fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| path.display().to_string())
}
