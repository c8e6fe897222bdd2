mod common;

use common::{StubScraper, syncer};
use kpisync::backends::MemoryStore;
use kpisync::{InputMode, RunReport, StoreError, SyncError};
use kpisync_common::CellValue;
use serde_json::json;

fn config(datapoints: &str) -> String {
    format!(
        r#"
spreadsheet-id: test-sheet
sheet-name: Data
sheet-key-col: A
sheet-data-start-col: B
sheet-topic-row: 1
sheet-data-start-row: 2
datapoints:
{datapoints}
"#
    )
}

fn sheet() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.set_row("Data", "B1", ["2024-18", "2024-19", "region"]);
    store.set_column("Data", "A2", ["k1", "k2", "k1"]);
    store.set("Data", "B2", 1i64);
    store
}

const RECORDS: &str = "{\"key\":\"k1\",\"val\":5}\n{\"key\":\"k2\",\"val\":7}\n\n{\"key\":\"k3\",\"val\":9}\n";

fn report(report: RunReport) -> kpisync::datapoints::DatapointReport {
    match report {
        RunReport::Datapoints(report) => report,
        other => panic!("expected a datapoint report, got {other:?}"),
    }
}

#[test]
fn updates_known_keys_and_appends_new_ones() {
    let yaml = config(
        r#"
  - title: weekly
    command: records
    add-rows: true
"#,
    );
    let mut syncer = syncer(&yaml, sheet(), StubScraper::default().with_output("records", RECORDS));
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.week, "2024-19");
    assert_eq!(report.tally.synced, 1);
    assert_eq!(report.records.updated, 2);
    assert_eq!(report.records.appended, 1);

    let store = syncer.store();
    assert_eq!(store.get("Data", "C2"), CellValue::Int(5));
    assert_eq!(store.get("Data", "C3"), CellValue::Int(7));
    assert_eq!(store.get("Data", "C4"), CellValue::Empty);
    assert_eq!(store.get("Data", "A5"), CellValue::from("k3"));
    assert_eq!(store.get("Data", "C5"), CellValue::Int(9));

    let ranges: Vec<(&str, InputMode)> = store
        .writes()
        .iter()
        .map(|w| (w.range.as_str(), w.mode))
        .collect();
    assert_eq!(
        ranges,
        vec![("Data!A5:A5", InputMode::Raw), ("Data!C2:C5", InputMode::Raw)]
    );
}

#[test]
fn second_run_is_a_noop() {
    let yaml = config(
        r#"
  - title: weekly
    command: records
    add-rows: true
"#,
    );
    let mut syncer = syncer(&yaml, sheet(), StubScraper::default().with_output("records", RECORDS));
    syncer.run_once().unwrap();
    syncer.store_mut().clear_logs();

    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.records.changed(), 0);
    assert_eq!(report.records.no_op, 3);
    assert!(syncer.store().writes().is_empty());
}

#[test]
fn match_all_writes_every_row_with_the_key() {
    let yaml = config(
        r#"
  - title: weekly
    command: records
    match-all: true
"#,
    );
    let mut syncer = syncer(&yaml, sheet(), StubScraper::default().with_output("records", RECORDS));
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.records.skipped, 1);

    let store = syncer.store();
    assert_eq!(store.get("Data", "C2"), CellValue::Int(5));
    assert_eq!(store.get("Data", "C4"), CellValue::Int(5));
    assert_eq!(store.get("Data", "A5"), CellValue::Empty);
    assert_eq!(store.writes().len(), 1);
    assert_eq!(store.writes()[0].range, "Data!C2:C4");
}

#[test]
fn explicit_topic_selects_its_column() {
    let yaml = config(
        r#"
  - title: last week
    topic: "2024-18"
    command: records
"#,
    );
    let mut syncer = syncer(&yaml, sheet(), StubScraper::default().with_output("records", RECORDS));
    syncer.run_once().unwrap();
    let store = syncer.store();
    assert_eq!(store.get("Data", "B2"), CellValue::Int(5));
    assert_eq!(store.get("Data", "B3"), CellValue::Int(7));
    assert_eq!(store.get("Data", "C2"), CellValue::Empty);
}

#[test]
fn missing_topic_aborts_the_run() {
    let yaml = config(
        r#"
  - title: nowhere
    topic: "2030-01"
    command: records
  - title: weekly
    command: records
"#,
    );
    let mut syncer = syncer(&yaml, sheet(), StubScraper::default().with_output("records", RECORDS));
    let err = syncer.run_once().unwrap_err();
    assert!(matches!(err, SyncError::MissingTopic { ref topic, .. } if topic == "2030-01"));
    assert!(syncer.store().writes().is_empty());
}

#[test]
fn failing_source_does_not_stop_other_datapoints() {
    let yaml = config(
        r#"
  - title: broken
    command: missing-script
  - title: weekly
    command: records
"#,
    );
    let mut syncer = syncer(&yaml, sheet(), StubScraper::default().with_output("records", RECORDS));
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.synced, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title, "broken");
    assert_eq!(syncer.store().get("Data", "C3"), CellValue::Int(7));
}

#[test]
fn coordinates_are_read_once_per_run() {
    let yaml = config(
        r#"
  - title: first
    command: records
  - title: second
    command: more
"#,
    );
    let scraper = StubScraper::default()
        .with_output("records", RECORDS)
        .with_output("more", "{\"key\":\"k2\",\"val\":8}\n");
    let mut syncer = syncer(&yaml, sheet(), scraper);
    syncer.run_once().unwrap();

    let store = syncer.store();
    let count = |range: &str| store.reads().iter().filter(|r| r.as_str() == range).count();
    assert_eq!(count("Data!B1:1"), 1);
    assert_eq!(count("Data!A2:A"), 1);
    assert_eq!(count("Data!C2:C"), 1);
    assert_eq!(store.get("Data", "C3"), CellValue::Int(8));
}

#[test]
fn json_endpoint_records_and_fixed_cells() {
    let yaml = config(
        r#"
  - title: by region
    topic: region
    url: https://stats.example.test/regions
    pick: data.regions
  - title: headcount
    cell: F4
    url: https://stats.example.test/hc
    pick: /total
"#,
    );
    let scraper = StubScraper::default()
        .with_doc(
            "https://stats.example.test/regions",
            json!({"data": {"regions": [{"key": "k2", "val": "emea"}]}}),
        )
        .with_doc("https://stats.example.test/hc", json!({"total": 31}));
    let mut syncer = syncer(&yaml, sheet(), scraper);
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.tally.synced, 2);

    let store = syncer.store();
    assert_eq!(store.get("Data", "D3"), CellValue::from("emea"));
    assert_eq!(store.get("Data", "F4"), CellValue::Int(31));
    let cell_write = store.writes().iter().find(|w| w.range == "Data!F4:F4").unwrap();
    assert_eq!(cell_write.mode, InputMode::UserEntered);

    syncer.store_mut().clear_logs();
    syncer.run_once().unwrap();
    assert!(syncer.store().writes().is_empty());
}

fn written_ranges(store: &MemoryStore) -> Vec<&str> {
    store.writes().iter().map(|w| w.range.as_str()).collect()
}

#[test]
fn failed_column_write_keeps_appended_key_rows() {
    let yaml = config(
        r#"
  - title: this week
    command: new-key
    add-rows: true
  - title: last week
    topic: "2024-18"
    command: new-key-again
    add-rows: true
"#,
    );
    let mut store = sheet();
    store.fail_writes_to(
        "Data!C2:C5",
        StoreError::with_status(403, "googleapi: Error 403: forbidden"),
    );
    let scraper = StubScraper::default()
        .with_output("new-key", "{\"key\":\"k3\",\"val\":9}\n")
        .with_output("new-key-again", "{\"key\":\"k3\",\"val\":2}\n");
    let mut syncer = syncer(&yaml, store, scraper);
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.synced, 1);
    assert_eq!(report.failures[0].title, "this week");
    assert_eq!(report.records.updated, 1);
    assert_eq!(report.records.appended, 0);

    let store = syncer.store();
    assert_eq!(written_ranges(store), vec!["Data!A5:A5", "Data!B2:B5"]);
    assert_eq!(store.get("Data", "A5"), CellValue::from("k3"));
    assert_eq!(store.get("Data", "A6"), CellValue::Empty);
    assert_eq!(store.get("Data", "B5"), CellValue::Int(2));
    assert_eq!(store.get("Data", "C5"), CellValue::Empty);
}

const TWO_COLUMNS: &str = r#"
  - title: this week
    command: records
  - title: last week
    topic: "2024-18"
    command: more
"#;

fn two_column_scraper() -> StubScraper {
    StubScraper::default()
        .with_output("records", RECORDS)
        .with_output("more", "{\"key\":\"k2\",\"val\":8}\n")
}

#[test]
fn rejected_write_fails_only_its_datapoint() {
    let mut store = sheet();
    store.fail_next_write(StoreError::with_status(
        403,
        "googleapi: Error 403: The caller does not have permission",
    ));
    let mut syncer = syncer(&config(TWO_COLUMNS), store, two_column_scraper());
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.synced, 1);
    assert_eq!(report.failures[0].title, "this week");
    assert!(syncer.retrier().sleeper().pauses.is_empty());

    let store = syncer.store();
    assert_eq!(written_ranges(store), vec!["Data!B2:B3"]);
    assert_eq!(store.get("Data", "B3"), CellValue::Int(8));
    assert_eq!(store.get("Data", "C2"), CellValue::Empty);
}

#[test]
fn exhausted_retries_fail_only_their_datapoint() {
    let yaml = format!("retry:\n  attempts: 2\n  backoff-secs: 1\n{}", config(TWO_COLUMNS));
    let mut store = sheet();
    for _ in 0..2 {
        store.fail_next_write(StoreError::with_status(
            429,
            "googleapi: Error 429: Quota exceeded",
        ));
    }
    let mut syncer = syncer(&yaml, store, two_column_scraper());
    let report = report(syncer.run_once().unwrap());
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.synced, 1);
    assert_eq!(report.failures[0].title, "this week");
    assert_eq!(syncer.retrier().sleeper().pauses.len(), 1);

    let store = syncer.store();
    assert_eq!(written_ranges(store), vec!["Data!B2:B3"]);
    assert_eq!(store.get("Data", "B3"), CellValue::Int(8));
    assert_eq!(store.get("Data", "C3"), CellValue::Empty);
}
