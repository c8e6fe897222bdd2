//! Configuration for the kpisync KPI-to-spreadsheet syncer.
//!
//! The document is YAML with kebab-case keys. [`Config::validate`] collects
//! every problem in one pass so operators can fix a config in a single edit.

mod config;
mod error;
mod validation;

pub use config::{
    CommandArgs, CommandSource, Config, DEFAULT_TOKEN_ENV, DEFAULT_TRANSIENT_PATTERN,
    DatapointSpec, HttpSource, KpiSpec, MetricsSpec, RetrySpec, RowNumber, SourceSpec,
    StoreSpec,
};
pub use error::ConfigError;
pub use validation::{ConfigIssue, ValidationError};

/// JSON schema of [`Config`] as a `serde_json::Value`.
pub fn generate_schema_value() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(Config))
        .expect("generated schema is always serializable")
}

/// Pretty-printed JSON schema of [`Config`].
pub fn schema_json() -> String {
    serde_json::to_string_pretty(&generate_schema_value())
        .expect("schema value is always serializable")
}
