use super::*;

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.store.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "extract_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let db_path = args.store.resolved_db_path();
    let config_path = args.store.resolved_config_path();

    info!(
        cache_root = %cache_root.display(),
        run_id = %run_id,
        documents = args.inputs.len(),
        dry_run = args.dry_run,
        "starting extract"
    );

    let config = load_pipeline_config(&args.store)?;
    let pipeline = ExtractionPipeline::new(&config)?;

    let mut store = match (args.dry_run, db_path.exists()) {
        (false, _) => Some(SqliteMetricStore::open(&db_path)?),
        (true, true) => Some(SqliteMetricStore::open_read_only(&db_path)?),
        (true, false) => None,
    };

    let options = ExtractOptions {
        stream: args.stream,
        chunk_size: args.chunk_size,
        dry_run: args.dry_run,
    };

    let mut counts = ExtractCounts {
        documents_total: args.inputs.len(),
        ..ExtractCounts::default()
    };
    let mut documents = Vec::with_capacity(args.inputs.len());
    let mut warnings = Vec::new();

    for path in &args.inputs {
        let sha256 = sha256_file(path).ok();

        if !args.force {
            if let (Some(store), Some(hash)) = (store.as_ref(), sha256.as_deref()) {
                if store.is_processed(hash)? {
                    info!(path = %path.display(), "skipping already processed file");
                    warnings.push(format!(
                        "skipped already processed file: {}",
                        path.display()
                    ));
                    counts.documents_skipped += 1;
                    continue;
                }
            }
        }

        let outcome = process_path(
            &pipeline,
            store.as_mut(),
            path,
            sha256,
            options,
            &mut counts,
        );

        if !args.dry_run {
            if let Some(store) = store.as_ref() {
                store.record_outcome(&outcome)?;
            }
        }
        documents.push(outcome);
    }

    counts.metrics_total = match store.as_ref() {
        Some(store) => store.counts()?.metrics,
        None => 0,
    };

    let status = if counts.documents_failed == 0 {
        "completed"
    } else if counts.documents_succeeded == 0 {
        "failed"
    } else {
        "completed_with_failures"
    };

    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        mode: if args.stream { "stream" } else { "batch" }.to_string(),
        dry_run: args.dry_run,
        command: render_extract_command(&args),
        paths: ExtractPaths {
            cache_root: cache_root.display().to_string(),
            db_path: db_path.display().to_string(),
            config_path: config_path.map(|path| path.display().to_string()),
        },
        counts,
        documents,
        warnings,
    };

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote extract run manifest");
    info!(
        succeeded = manifest.counts.documents_succeeded,
        failed = manifest.counts.documents_failed,
        skipped = manifest.counts.documents_skipped,
        inserted = manifest.counts.records_inserted,
        deduplicated = manifest.counts.records_deduplicated,
        "extract completed"
    );

    if manifest.counts.documents_failed > 0 && manifest.counts.documents_succeeded == 0 {
        bail!(
            "all {} attempted documents failed; see {}",
            manifest.counts.documents_failed,
            manifest_path.display()
        );
    }

    Ok(())
}

fn process_path(
    pipeline: &ExtractionPipeline,
    store: Option<&mut SqliteMetricStore>,
    path: &Path,
    sha256: Option<String>,
    options: ExtractOptions,
    counts: &mut ExtractCounts,
) -> DocumentOutcome {
    let mut report = DocumentReport::default();
    let result = extract_document(pipeline, store, path, options, &mut report);

    counts.records_inserted += report.inserted;
    counts.records_deduplicated += report.deduplicated;
    counts.extraction.absorb(&report.stats);

    let (status, failure_reason) = match result {
        Ok(()) => {
            counts.documents_succeeded += 1;
            info!(
                path = %path.display(),
                records = report.extracted,
                inserted = report.inserted,
                deduplicated = report.deduplicated,
                "document extracted"
            );
            (DocumentStatus::Success, None)
        }
        Err(err) => {
            counts.documents_failed += 1;
            let reason = format!("{err:#}");
            warn!(path = %path.display(), error = %reason, "document failed");
            (DocumentStatus::Failed, Some(reason))
        }
    };

    DocumentOutcome {
        filename: source_name(path),
        sha256,
        status,
        data_points_extracted: report.extracted,
        records_inserted: report.inserted,
        report_date: report.report_date,
        failure_reason,
    }
}

pub(super) fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec![
        "healthmetrics".to_string(),
        "extract".to_string(),
        "--cache-root".to_string(),
        args.store.cache_root.display().to_string(),
    ];

    if let Some(path) = &args.store.db_path {
        command.push("--db-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.store.config_path {
        command.push("--config-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    for input in &args.inputs {
        command.push("--input".to_string());
        command.push(input.display().to_string());
    }
    if args.stream {
        command.push("--stream".to_string());
        command.push("--chunk-size".to_string());
        command.push(args.chunk_size.to_string());
    }
    if args.dry_run {
        command.push("--dry-run".to_string());
    }
    if args.force {
        command.push("--force".to_string());
    }

    command.join(" ")
}
