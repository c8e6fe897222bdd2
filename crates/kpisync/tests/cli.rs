use assert_cmd::Command;
use chrono::Utc;
use kpisync::backends::FileStore;
use kpisync::clock::year_week;
use kpisync_common::CellValue;
use predicates::prelude::*;

fn kpisync() -> Command {
    Command::cargo_bin("kpisync").expect("binary is built")
}

#[test]
fn schema_prints_config_schema() {
    kpisync()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("spreadsheet-id"))
        .stdout(predicate::str::contains("sheet-kpi-name-col"));
}

#[test]
fn validate_reports_every_issue_with_exit_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "spreadsheet-id: bad id!\nsheet-name: KPI\nKPI:\n  - title: x\n    sheet-row: 0\n    kpi-command: echo\n",
    )
    .unwrap();

    kpisync()
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("spreadsheet-id"))
        .stderr(predicate::str::contains("sheet-kpi-name-col"))
        .stderr(predicate::str::contains("KPI[0].sheet-row"));
}

#[test]
fn validate_accepts_good_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "spreadsheet-id: abc\nsheet-name: Data\ndatapoints:\n  - title: hc\n    cell: B2\n    command: echo\n",
    )
    .unwrap();
    kpisync()
        .args(["validate", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok (1 datapoints)"));
}

#[test]
fn missing_config_file_fails() {
    kpisync()
        .args(["run", "--once", "--config", "/nonexistent/kpisync.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read config"));
}

#[cfg(unix)]
#[test]
fn run_once_against_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let grid = dir.path().join("grid.json");
    let week = year_week(Utc::now());
    std::fs::write(
        &grid,
        format!(
            r#"{{"version":1,"sheets":{{"KPI":[{{"row":1,"col":"D","value":"{week}"}}]}}}}"#
        ),
    )
    .unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            r#"
spreadsheet-id: local
sheet-name: KPI
sheet-kpi-last-update-col: C
sheet-kpi-name-col: B
sheet-data-start-col: D
sheet-data-date-row: 1
store:
  kind: file
  path: {}
KPI:
  - title: Answer
    sheet-row: 3
    kpi-command: echo
    kpi-command-args: "42"
"#,
            grid.display()
        ),
    )
    .unwrap();

    kpisync()
        .args(["run", "--once", "--config"])
        .arg(&config)
        .env("RUST_LOG", "warn")
        .assert()
        .success();

    let store = FileStore::open(&grid).unwrap();
    assert_eq!(store.grid().get("KPI", "B3"), CellValue::from("Answer"));
    assert_eq!(store.grid().get("KPI", "D3"), CellValue::Int(42));
}

#[cfg(unix)]
#[test]
fn dry_run_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let grid = dir.path().join("grid.json");
    let week = year_week(Utc::now());
    let original = format!(
        r#"{{"version":1,"sheets":{{"KPI":[{{"row":1,"col":"D","value":"{week}"}}]}}}}"#
    );
    std::fs::write(&grid, &original).unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(
        &config,
        format!(
            "spreadsheet-id: local\nsheet-name: KPI\nsheet-kpi-last-update-col: C\nsheet-kpi-name-col: B\nsheet-data-start-col: D\nsheet-data-date-row: 1\nstore:\n  kind: file\n  path: {}\nKPI:\n  - title: Answer\n    sheet-row: 3\n    kpi-command: echo\n    kpi-command-args: \"42\"\n",
            grid.display()
        ),
    )
    .unwrap();

    kpisync()
        .args(["run", "--once", "--dry-run", "--config"])
        .arg(&config)
        .env("RUST_LOG", "info")
        .assert()
        .success()
        .stderr(predicate::str::contains("dry run"));

    assert_eq!(std::fs::read_to_string(&grid).unwrap(), original);
}
