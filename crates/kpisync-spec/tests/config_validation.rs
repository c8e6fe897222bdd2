use kpisync_spec::{Config, ConfigError, SourceSpec, StoreSpec, schema_json};

fn load_fixture(name: &str) -> Config {
    let path = format!("tests/fixtures/{}.yaml", name);
    let text = std::fs::read_to_string(path).expect("failed to read fixture");
    Config::from_yaml_str(&text).expect("fixture should deserialize")
}

#[test]
fn legacy_fixture_validates() {
    let config = load_fixture("legacy");
    config.validate().expect("fixture should validate");
    assert!(config.has_legacy_kpis());
    assert!(matches!(config.kpi[1].source, SourceSpec::Http(_)));
    assert_eq!(
        config.metrics.as_ref().map(|m| m.ready_path.as_str()),
        Some("/ready")
    );
}

#[test]
fn datapoint_fixture_validates() {
    let config = load_fixture("datapoints");
    config.validate().expect("fixture should validate");
    assert!(!config.has_legacy_kpis());
    assert_eq!(config.datapoints.len(), 3);
    assert!(config.datapoints[0].add_rows);
    assert!(config.datapoints[1].match_all);
    assert_eq!(config.datapoints[2].cell.as_deref(), Some("F2"));
    assert_eq!(config.retry.attempts, 5);
    assert!(matches!(config.store, StoreSpec::File { .. }));
    assert_eq!(config.interval_secs, Some(3600));
}

#[test]
fn missing_week_anchors_reported_together() {
    let mut config = load_fixture("legacy");
    config.sheet_kpi_name_col = None;
    config.sheet_data_start_col = Some("D4".to_string());
    config.sheet_data_date_row = None;

    let err = config.validate().expect_err("validation should fail");
    assert!(err.has_issue("sheet-kpi-name-col"));
    assert!(err.has_issue("sheet-data-start-col"));
    assert!(err.has_issue("sheet-data-date-row"));
    assert_eq!(err.issues().len(), 3);
}

#[test]
fn duplicate_titles_and_bad_cells_rejected() {
    let mut config = load_fixture("datapoints");
    config.datapoints[1].title = config.datapoints[0].title.clone();
    config.datapoints[2].cell = Some("F".to_string());
    config.retry.attempts = 0;
    config.retry.transient_pattern = "(unclosed".to_string();

    let err = config.validate().expect_err("validation should fail");
    assert!(err.has_issue("datapoints[1].title"));
    assert!(err.has_issue("datapoints[2].cell"));
    assert!(err.has_issue("retry.attempts"));
    assert!(err.has_issue("retry.transient-pattern"));
}

#[test]
fn empty_config_has_nothing_to_sync() {
    let config = Config::from_yaml_str("spreadsheet-id: abc\nsheet-name: KPI\n")
        .expect("minimal config parses");
    let err = config.validate().expect_err("nothing to sync");
    assert!(err.has_issue("KPI"));
}

#[test]
fn load_reports_io_and_validation_errors() {
    let missing = Config::load("tests/fixtures/does-not-exist.yaml").unwrap_err();
    assert!(matches!(missing, ConfigError::Io { .. }));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "spreadsheet-id: \"has spaces\"\nsheet-name: KPI\n").unwrap();
    match Config::load(&path) {
        Err(ConfigError::Invalid(err)) => {
            assert!(err.has_issue("spreadsheet-id"));
            assert!(err.to_string().starts_with("invalid configuration:"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn schema_json_is_well_formed() {
    let value: serde_json::Value =
        serde_json::from_str(&schema_json()).expect("schema must be valid JSON");
    assert!(value.is_object(), "schema root should be an object");
    let text = value.to_string();
    assert!(text.contains("spreadsheet-id"));
    assert!(text.contains("sheet-kpi-name-col"));
}
