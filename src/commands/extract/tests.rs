use std::path::PathBuf;

use rusqlite::Connection;
use serde_json::Value;

use super::run::render_extract_command;
use super::*;
use crate::cli::StoreArgs;

const LIPID_REPORT: &str = "{\"test_name\":\"Cholesterol, Total\",\"value\":\"5.2\",\"unit\":\"mmol/l\",\"reference_range\":\"< 5.2\",\"report_date\":\"01/06/2022\"}\n{\"test_name\":\"HDL\",\"value\":\"38\",\"unit\":\"mg/dl\",\"reference_range\":\"> 40\",\"report_date\":\"01/06/2022\"}\n{\"test_name\":\"Age\",\"value\":\"41\"}\n";

const FOLLOW_UP_REPORT: &str = "[{\"test_name\":\"HDL Cholesterol\",\"value\":\"42\",\"unit\":\"mg/dL\",\"report_date\":\"2023-01-10\"}]";

fn extract_args(cache_root: &Path, inputs: Vec<PathBuf>) -> ExtractArgs {
    ExtractArgs {
        store: StoreArgs {
            cache_root: cache_root.to_path_buf(),
            db_path: None,
            config_path: None,
        },
        inputs,
        stream: false,
        chunk_size: 64,
        dry_run: false,
        force: false,
        manifest_path: Some(cache_root.join("manifests").join("extract_run.json")),
    }
}

fn write_input(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("write input");
    path
}

fn read_manifest(cache_root: &Path) -> Value {
    let raw = fs::read(cache_root.join("manifests").join("extract_run.json"))
        .expect("manifest should exist");
    serde_json::from_slice(&raw).expect("manifest should parse")
}

fn open_store(cache_root: &Path) -> SqliteMetricStore {
    SqliteMetricStore::open(&cache_root.join(crate::store::DEFAULT_DB_FILENAME))
        .expect("store should open")
}

#[test]
fn extract_persists_records_ledger_rows_and_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), "lipids.txt", LIPID_REPORT);
    let missing = dir.path().join("missing.txt");

    run(extract_args(dir.path(), vec![input, missing])).expect("extract should succeed");

    let store = open_store(dir.path());
    let records = store.query_all().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].canonical_test_name, "Total Cholesterol");
    assert_eq!(records[0].unit.as_deref(), Some("mg/dL"));
    assert_eq!(records[1].canonical_test_name, "HDL Cholesterol");

    let counts = store.counts().expect("counts");
    assert_eq!(counts.files_succeeded, 1);
    assert_eq!(counts.files_failed, 1);

    let manifest = read_manifest(dir.path());
    assert_eq!(manifest["status"], "completed_with_failures");
    assert_eq!(manifest["mode"], "batch");
    assert_eq!(manifest["counts"]["records_inserted"], 2);
    assert_eq!(manifest["counts"]["extraction"]["rejected_metadata"], 1);
    assert_eq!(manifest["counts"]["extraction"]["units_converted"], 1);
    assert_eq!(manifest["documents"][0]["report_date"], "2022-06-01");
    assert_eq!(manifest["documents"][1]["status"], "Failed");
}

#[test]
fn extract_fills_ranges_from_documents_processed_earlier_in_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_input(dir.path(), "2022.txt", LIPID_REPORT);
    let second = write_input(dir.path(), "2023.txt", FOLLOW_UP_REPORT);

    run(extract_args(dir.path(), vec![first, second])).expect("extract should succeed");

    let hdl = open_store(dir.path())
        .query_by_test("HDL Cholesterol")
        .expect("history");
    assert_eq!(hdl.len(), 2);
    assert_eq!(hdl[1].report_date.as_deref(), Some("2023-01-10"));
    assert_eq!(hdl[1].reference_range.as_deref(), Some(">40"));
}

#[test]
fn extract_skips_processed_files_unless_forced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), "lipids.txt", LIPID_REPORT);

    run(extract_args(dir.path(), vec![input.clone()])).expect("first run");
    run(extract_args(dir.path(), vec![input.clone()])).expect("second run");
    let manifest = read_manifest(dir.path());
    assert_eq!(manifest["counts"]["documents_skipped"], 1);
    assert_eq!(manifest["counts"]["records_inserted"], 0);

    let mut forced = extract_args(dir.path(), vec![input]);
    forced.force = true;
    run(forced).expect("forced run");
    let manifest = read_manifest(dir.path());
    assert_eq!(manifest["counts"]["documents_skipped"], 0);
    assert_eq!(manifest["counts"]["records_deduplicated"], 2);
    assert_eq!(open_store(dir.path()).counts().expect("counts").metrics, 2);
}

#[test]
fn extract_stream_mode_matches_batch_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), "lipids.txt", LIPID_REPORT);

    let mut args = extract_args(dir.path(), vec![input]);
    args.stream = true;
    args.chunk_size = 5;
    run(args).expect("stream extract");

    let records = open_store(dir.path()).query_all().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].reference_range.as_deref(), Some("<201.1"));

    let manifest = read_manifest(dir.path());
    assert_eq!(manifest["mode"], "stream");
    assert_eq!(manifest["documents"][0]["data_points_extracted"], 2);
}

#[test]
fn extract_batch_mode_keeps_records_around_invalid_utf8() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut bytes = LIPID_REPORT.replacen("\"HDL\"", "\"HDL#\"", 1).into_bytes();
    let marker = bytes.iter().position(|byte| *byte == b'#').expect("marker");
    bytes[marker] = 0xff;

    let batch_input = dir.path().join("batch.txt");
    fs::write(&batch_input, &bytes).expect("write input");
    run(extract_args(dir.path(), vec![batch_input])).expect("batch extract");
    let batch = open_store(dir.path()).query_all().expect("records");

    let stream_root = dir.path().join("stream");
    let stream_input = dir.path().join("stream.txt");
    fs::write(&stream_input, &bytes).expect("write input");
    let mut args = extract_args(&stream_root, vec![stream_input]);
    args.stream = true;
    run(args).expect("stream extract");
    let stream = open_store(&stream_root).query_all().expect("records");

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.len(), stream.len());
    assert_eq!(batch[1].test_name, "HDL\u{fffd}");
    assert_eq!(batch[1].canonical_test_name, stream[1].canonical_test_name);
}

#[test]
fn extract_dry_run_leaves_no_database_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_input(dir.path(), "lipids.txt", LIPID_REPORT);

    let mut args = extract_args(dir.path(), vec![input]);
    args.dry_run = true;
    run(args).expect("dry run");

    assert!(!dir.path().join(crate::store::DEFAULT_DB_FILENAME).exists());
    let manifest = read_manifest(dir.path());
    assert_eq!(manifest["dry_run"], true);
    assert_eq!(manifest["documents"][0]["data_points_extracted"], 2);
    assert_eq!(manifest["counts"]["records_inserted"], 0);
}

#[test]
fn extract_dry_run_leaves_an_existing_database_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_input(dir.path(), "2022.txt", LIPID_REPORT);
    let second = write_input(dir.path(), "2023.txt", FOLLOW_UP_REPORT);
    run(extract_args(dir.path(), vec![first])).expect("seed run");

    let db_path = dir.path().join(crate::store::DEFAULT_DB_FILENAME);
    let updated_at = || {
        Connection::open(&db_path)
            .expect("open db")
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_updated_at'",
                [],
                |row| row.get::<_, String>(0),
            )
            .expect("db_updated_at")
    };
    Connection::open(&db_path)
        .expect("open db")
        .execute(
            "UPDATE metadata SET value = 'seeded' WHERE key = 'db_updated_at'",
            [],
        )
        .expect("mark metadata");

    let mut args = extract_args(dir.path(), vec![second]);
    args.dry_run = true;
    run(args).expect("dry run");

    assert_eq!(updated_at(), "seeded");
    let manifest = read_manifest(dir.path());
    assert_eq!(manifest["documents"][0]["data_points_extracted"], 1);
    assert_eq!(manifest["counts"]["metrics_total"], 2);
    let store = open_store(dir.path());
    assert_eq!(store.counts().expect("counts").files_succeeded, 1);
}

#[test]
fn extract_fails_when_every_document_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let args = extract_args(dir.path(), vec![dir.path().join("nope.txt")]);

    let err = run(args).expect_err("all documents failed");
    assert!(err.to_string().contains("all 1 attempted documents failed"));
    assert_eq!(read_manifest(dir.path())["status"], "failed");
}

#[test]
fn render_extract_command_lists_inputs_and_mode_flags() {
    let mut args = extract_args(Path::new(".cache/healthmetrics"), vec![
        PathBuf::from("a.txt"),
        PathBuf::from("b.txt"),
    ]);
    args.manifest_path = None;
    args.stream = true;
    args.force = true;

    let command = render_extract_command(&args);
    assert!(command.starts_with("healthmetrics extract --cache-root .cache/healthmetrics"));
    assert!(command.contains("--input a.txt --input b.txt"));
    assert!(command.contains("--stream --chunk-size 64"));
    assert!(command.ends_with("--force"));
}
