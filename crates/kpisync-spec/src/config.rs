use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use kpisync_common::{A1Ref, ColumnLabel};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{ConfigIssue, ValidationError};

/// Transient-error pattern used when `retry.transient-pattern` is not set.
pub const DEFAULT_TRANSIENT_PATTERN: &str = r"Error 429|[Tt]ime(d)? ?out|deadline exceeded";
/// Environment variable holding the bearer token for the Sheets backend.
pub const DEFAULT_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

static SPREADSHEET_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("spreadsheet id regex must compile"));

/// Syncer configuration document.
///
/// Keys of the original single-sheet KPI deployments (`sheet-kpi-name-col`,
/// `KPI`, ...) are accepted verbatim; generic keyed datapoints live under
/// `datapoints`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// Identifier of the target spreadsheet.
    pub spreadsheet_id: String,
    /// Sheet (tab) all KPIs and datapoints are written to.
    pub sheet_name: String,
    #[serde(default)]
    /// Column receiving the last-update date of each legacy KPI.
    pub sheet_kpi_last_update_col: Option<String>,
    #[serde(default)]
    /// Column receiving the title of each legacy KPI.
    pub sheet_kpi_name_col: Option<String>,
    #[serde(default)]
    /// First column of the week/topic grid.
    pub sheet_data_start_col: Option<String>,
    #[serde(default)]
    /// Row holding the `YYYY-WW` week labels.
    pub sheet_data_date_row: Option<RowNumber>,
    #[serde(default)]
    /// Column holding datapoint keys.
    pub sheet_key_col: Option<String>,
    #[serde(default)]
    /// Header row holding datapoint topics (defaults to `sheet-data-date-row`).
    pub sheet_topic_row: Option<RowNumber>,
    #[serde(default)]
    /// First row holding datapoint keys and values.
    pub sheet_data_start_row: Option<RowNumber>,
    #[serde(default, rename = "KPI")]
    /// Fixed-row KPIs. When present the run is legacy-only.
    pub kpi: Vec<KpiSpec>,
    #[serde(default)]
    /// Keyed datapoints located through the key column.
    pub datapoints: Vec<DatapointSpec>,
    #[serde(default)]
    pub retry: RetrySpec,
    #[serde(default)]
    /// Health and metrics listener; disabled when absent.
    pub metrics: Option<MetricsSpec>,
    #[serde(default)]
    pub store: StoreSpec,
    #[serde(default)]
    /// Repeat the run every N seconds instead of exiting after one run.
    pub interval_secs: Option<u64>,
}

/// Row number written either as an integer or as a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RowNumber {
    Number(u32),
    Text(String),
}

impl RowNumber {
    /// The 1-based row, or `None` when zero or not numeric.
    pub fn get(&self) -> Option<u32> {
        let row = match self {
            RowNumber::Number(n) => *n,
            RowNumber::Text(s) => s.trim().parse().ok()?,
        };
        (row > 0).then_some(row)
    }
}

impl From<u32> for RowNumber {
    fn from(value: u32) -> Self {
        RowNumber::Number(value)
    }
}

/// Fixed-position KPI: title, weekly value and last-update date on one row.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct KpiSpec {
    pub title: String,
    pub sheet_row: RowNumber,
    #[serde(flatten)]
    pub source: SourceSpec,
}

/// Keyed datapoint written into a topic column.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct DatapointSpec {
    pub title: String,
    #[serde(default)]
    /// Header label of the target column (defaults to the current `YYYY-WW`).
    pub topic: Option<String>,
    #[serde(flatten)]
    pub source: SourceSpec,
    #[serde(default)]
    /// Append a row when a key is not present yet.
    pub add_rows: bool,
    #[serde(default)]
    /// Update every row carrying the key, not only the first.
    pub match_all: bool,
    #[serde(default)]
    /// Write the scalar value to this cell (e.g. `F4`) instead of resolving keys.
    pub cell: Option<String>,
}

/// Where a value comes from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SourceSpec {
    Command(CommandSource),
    Http(HttpSource),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct CommandSource {
    #[serde(alias = "kpi-command")]
    pub command: String,
    #[serde(default, alias = "kpi-command-args")]
    pub args: CommandArgs,
}

/// A single argument string or a list of arguments.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CommandArgs {
    One(String),
    Many(Vec<String>),
}

impl Default for CommandArgs {
    fn default() -> Self {
        CommandArgs::Many(Vec::new())
    }
}

impl CommandArgs {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            CommandArgs::One(arg) if arg.is_empty() => Vec::new(),
            CommandArgs::One(arg) => vec![arg.clone()],
            CommandArgs::Many(args) => args.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct HttpSource {
    /// JSON endpoint to fetch.
    pub url: String,
    /// Dotted/indexed path (`data.items[0].count`) or JSON pointer (`/data/items/0`).
    pub pick: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RetrySpec {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_transient_pattern")]
    /// Regular expression matched against write error messages.
    pub transient_pattern: String,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_secs: default_backoff_secs(),
            transient_pattern: default_transient_pattern(),
        }
    }
}

fn default_attempts() -> u32 {
    12
}

fn default_backoff_secs() -> u64 {
    10
}

fn default_transient_pattern() -> String {
    DEFAULT_TRANSIENT_PATTERN.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MetricsSpec {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_ready_path")]
    pub ready_path: String,
    #[serde(default = "default_alive_path")]
    pub alive_path: String,
}

impl Default for MetricsSpec {
    fn default() -> Self {
        Self {
            address: default_address(),
            metrics_path: default_metrics_path(),
            ready_path: default_ready_path(),
            alive_path: default_alive_path(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_ready_path() -> String {
    "/ready".to_string()
}

fn default_alive_path() -> String {
    "/alive".to_string()
}

/// Grid store backend.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSpec {
    /// Google Sheets REST API; the bearer token is read from `token-env`.
    Sheets {
        #[serde(default = "default_token_env", rename = "token-env")]
        token_env: String,
    },
    /// Local JSON file, for runs without the remote service.
    File { path: PathBuf },
}

impl Default for StoreSpec {
    fn default() -> Self {
        StoreSpec::Sheets {
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

impl Config {
    /// Construct a config by reading YAML from any reader.
    pub fn from_yaml_reader<R: std::io::Read>(reader: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(reader)
    }

    /// Construct a config from a YAML string slice.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Read and parse a YAML file. Does not validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_yaml_reader(std::io::BufReader::new(file))?)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this config to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Whether fixed-row KPIs are configured (legacy mode wins over datapoints).
    pub fn has_legacy_kpis(&self) -> bool {
        !self.kpi.is_empty()
    }

    /// Effective topic header row for datapoints.
    pub fn topic_row(&self) -> Option<&RowNumber> {
        self.sheet_topic_row
            .as_ref()
            .or(self.sheet_data_date_row.as_ref())
    }

    /// Validate the config and return every issue found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if !SPREADSHEET_ID.is_match(&self.spreadsheet_id) {
            issues.push(ConfigIssue::new(
                "spreadsheet-id",
                "spreadsheet id must be a non-empty string of letters, digits, '-' or '_'",
            ));
        }
        if self.sheet_name.trim().is_empty() {
            issues.push(ConfigIssue::new("sheet-name", "sheet name must not be empty"));
        }

        if self.kpi.is_empty() && self.datapoints.is_empty() {
            issues.push(ConfigIssue::new(
                "KPI",
                "config defines neither `KPI` nor `datapoints`; nothing to sync",
            ));
        }

        if self.has_legacy_kpis() {
            self.validate_legacy(&mut issues);
        } else if !self.datapoints.is_empty() {
            self.validate_datapoints(&mut issues);
        }

        self.validate_retry(&mut issues);

        if let Some(metrics) = &self.metrics {
            if metrics.address.parse::<SocketAddr>().is_err() {
                issues.push(ConfigIssue::new(
                    "metrics.address",
                    format!("`{}` is not a socket address", metrics.address),
                ));
            }
            for (field, path) in [
                ("metrics.metrics-path", &metrics.metrics_path),
                ("metrics.ready-path", &metrics.ready_path),
                ("metrics.alive-path", &metrics.alive_path),
            ] {
                if !path.starts_with('/') {
                    issues.push(ConfigIssue::new(field, "path must start with '/'"));
                }
            }
            if metrics.metrics_path == metrics.ready_path
                || metrics.metrics_path == metrics.alive_path
                || metrics.ready_path == metrics.alive_path
            {
                issues.push(ConfigIssue::new(
                    "metrics",
                    "metrics, ready and alive paths must be distinct",
                ));
            }
        }

        if let StoreSpec::File { path } = &self.store {
            if path.as_os_str().is_empty() {
                issues.push(ConfigIssue::new("store.path", "file store needs a path"));
            }
        }

        if self.interval_secs == Some(0) {
            issues.push(ConfigIssue::new(
                "interval-secs",
                "interval must be at least one second",
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }

    fn validate_legacy(&self, issues: &mut Vec<ConfigIssue>) {
        require_column(
            issues,
            "sheet-kpi-name-col",
            self.sheet_kpi_name_col.as_deref(),
        );
        require_column(
            issues,
            "sheet-kpi-last-update-col",
            self.sheet_kpi_last_update_col.as_deref(),
        );
        require_column(
            issues,
            "sheet-data-start-col",
            self.sheet_data_start_col.as_deref(),
        );
        require_row(
            issues,
            "sheet-data-date-row",
            self.sheet_data_date_row.as_ref(),
        );

        for (idx, kpi) in self.kpi.iter().enumerate() {
            if kpi.title.trim().is_empty() {
                issues.push(ConfigIssue::new(
                    format!("KPI[{idx}].title"),
                    "title must not be empty",
                ));
            }
            if kpi.sheet_row.get().is_none() {
                issues.push(ConfigIssue::new(
                    format!("KPI[{idx}].sheet-row"),
                    "sheet-row must be a positive row number",
                ));
            }
            validate_source(issues, &format!("KPI[{idx}]"), &kpi.source);
        }
    }

    fn validate_datapoints(&self, issues: &mut Vec<ConfigIssue>) {
        let needs_anchors = self.datapoints.iter().any(|dp| dp.cell.is_none());
        if needs_anchors {
            require_column(issues, "sheet-key-col", self.sheet_key_col.as_deref());
            require_column(
                issues,
                "sheet-data-start-col",
                self.sheet_data_start_col.as_deref(),
            );
            require_row(issues, "sheet-topic-row", self.topic_row());
            require_row(
                issues,
                "sheet-data-start-row",
                self.sheet_data_start_row.as_ref(),
            );
        }

        let mut seen_titles = std::collections::HashSet::new();
        for (idx, dp) in self.datapoints.iter().enumerate() {
            let path = format!("datapoints[{idx}]");
            if dp.title.trim().is_empty() {
                issues.push(ConfigIssue::new(
                    format!("{path}.title"),
                    "title must not be empty",
                ));
            } else if !seen_titles.insert(dp.title.as_str()) {
                issues.push(ConfigIssue::new(
                    format!("{path}.title"),
                    format!("duplicate datapoint title `{}`", dp.title),
                ));
            }
            if let Some(topic) = &dp.topic {
                if topic.trim().is_empty() {
                    issues.push(ConfigIssue::new(
                        format!("{path}.topic"),
                        "topic must not be blank when given",
                    ));
                }
            }
            if let Some(cell) = &dp.cell {
                let ok = A1Ref::parse(cell)
                    .map(|r| r.col.is_some() && r.row.is_some())
                    .unwrap_or(false);
                if !ok {
                    issues.push(ConfigIssue::new(
                        format!("{path}.cell"),
                        format!("`{cell}` is not a single cell reference such as `F4`"),
                    ));
                }
                if dp.add_rows || dp.match_all {
                    issues.push(ConfigIssue::new(
                        format!("{path}.cell"),
                        "`cell` cannot be combined with `add-rows` or `match-all`",
                    ));
                }
            }
            validate_source(issues, &path, &dp.source);
        }
    }

    fn validate_retry(&self, issues: &mut Vec<ConfigIssue>) {
        if self.retry.attempts == 0 {
            issues.push(ConfigIssue::new(
                "retry.attempts",
                "at least one write attempt is required",
            ));
        }
        if let Err(err) = Regex::new(&self.retry.transient_pattern) {
            issues.push(ConfigIssue::new(
                "retry.transient-pattern",
                format!("pattern does not compile: {err}"),
            ));
        }
    }
}

fn require_column(issues: &mut Vec<ConfigIssue>, path: &str, value: Option<&str>) {
    match value {
        None => issues.push(ConfigIssue::new(path, "column is required")),
        Some(col) => {
            if let Err(err) = ColumnLabel::parse(col) {
                issues.push(ConfigIssue::new(path, err.to_string()));
            }
        }
    }
}

fn require_row(issues: &mut Vec<ConfigIssue>, path: &str, value: Option<&RowNumber>) {
    match value.map(RowNumber::get) {
        None => issues.push(ConfigIssue::new(path, "row is required")),
        Some(None) => issues.push(ConfigIssue::new(path, "row must be a positive number")),
        Some(Some(_)) => {}
    }
}

fn validate_source(issues: &mut Vec<ConfigIssue>, path: &str, source: &SourceSpec) {
    match source {
        SourceSpec::Command(cmd) => {
            if cmd.command.trim().is_empty() {
                issues.push(ConfigIssue::new(
                    format!("{path}.command"),
                    "command must not be empty",
                ));
            }
        }
        SourceSpec::Http(http) => {
            if !(http.url.starts_with("http://") || http.url.starts_with("https://")) {
                issues.push(ConfigIssue::new(
                    format!("{path}.url"),
                    "url must use http:// or https://",
                ));
            }
            if http.pick.trim().is_empty() {
                issues.push(ConfigIssue::new(
                    format!("{path}.pick"),
                    "pick path must not be empty",
                ));
            }
        }
    }
}

impl std::str::FromStr for Config {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Config::from_yaml_str(s)
    }
}
