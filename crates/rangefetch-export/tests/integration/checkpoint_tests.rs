use std::path::Path;
use std::time::Duration;

use rangefetch_core::rate::RateConfig;
use rangefetch_core::testutil::{ScriptedFetcher, Step};
use rangefetch_core::traits::CheckpointSink;
use rangefetch_core::{CheckpointKind, Orchestrator, ResultAccumulator, RunConfig, SuccessRecord};
use rangefetch_export::{ExportConfig, FieldMapping, FileSink, load_error_ids};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort();
    files
}

#[tokio::test(start_paused = true)]
async fn run_writes_records_and_error_log_that_reloads() {
    let dir = tempfile::TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new(|id, _| match id % 5 {
        0 => Step::Fatal,
        1 => Step::Success,
        _ => Step::Empty,
    });
    let config = RunConfig::for_range(1, 20)
        .with_workers(3)
        .with_rate(RateConfig::fixed(Duration::from_millis(10)));
    let sink = FileSink::new(ExportConfig::new(dir.path()));

    let summary = Orchestrator::new(config, fetcher, sink)
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.successes, 4);
    assert_eq!(summary.errors, 4);

    let logs = files_with_prefix(dir.path(), "error_logs_");
    assert_eq!(logs.len(), 2);
    assert!(logs[1].extension().is_some_and(|e| e == "xlsx"));
    let logs: Vec<_> = logs
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "csv"))
        .collect();
    let mut ids = load_error_ids(&logs[0]).unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![5, 10, 15, 20]);

    let json_files: Vec<_> = files_with_prefix(dir.path(), "all_cinemas_data_")
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&json_files[0]).unwrap()).unwrap();
    assert_eq!(rows.len(), 4);
}

#[test]
fn projection_csv_uses_renamed_columns() {
    let dir = tempfile::TempDir::new().unwrap();
    let sink = FileSink::new(
        ExportConfig::new(dir.path())
            .with_fields(
                "names",
                FieldMapping::parse_list("CinemaName,ProvinceName:Province").unwrap(),
            )
            .with_jsonl(false),
    );
    sink.prepare().unwrap();

    let acc = ResultAccumulator::new();
    acc.push_record(SuccessRecord::new(
        8,
        json!({"CinemaName": "星光影城", "ProvinceName": "浙江", "Other": 1}),
    ));
    sink.save(&acc.snapshot(CheckpointKind::Final)).unwrap();

    let csv = files_with_prefix(dir.path(), "names_")
        .into_iter()
        .find(|p| p.extension().is_some_and(|e| e == "csv"))
        .unwrap();
    let text = std::fs::read_to_string(csv).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("CinemaName,Province"));
    assert_eq!(lines.next(), Some("星光影城,浙江"));
    assert!(files_with_prefix(dir.path(), "all_cinemas_data_")
        .iter()
        .all(|p| p.extension().is_some_and(|e| e != "jsonl")));
}

#[test]
fn full_csv_holds_union_of_keys() {
    let dir = tempfile::TempDir::new().unwrap();
    let sink = FileSink::new(ExportConfig::new(dir.path()).without_projections());
    let acc = ResultAccumulator::new();
    acc.push_record(SuccessRecord::new(1, json!({"CinemaID": 1, "ZZID": "a"})));
    acc.push_record(SuccessRecord::new(2, json!({"CinemaID": 2, "Screens": 6})));
    sink.save(&acc.snapshot(CheckpointKind::Final)).unwrap();

    let csv = files_with_prefix(dir.path(), "all_cinemas_data_")
        .into_iter()
        .find(|p| p.extension().is_some_and(|e| e == "csv"))
        .unwrap();
    let text = std::fs::read_to_string(csv).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "CinemaID,ZZID,Screens");
    assert_eq!(lines[1], "1,a,");
    assert_eq!(lines[2], "2,,6");
}
