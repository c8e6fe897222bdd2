use kpisync_common::ColumnError;
use kpisync_spec::ValidationError;

use crate::source::SourceError;
use crate::store::StoreError;

/// Errors surfaced by a sync run.
///
/// Configuration-shaped errors abort the whole run in either mode; store and
/// source errors are per-item in datapoint mode (see [`SyncError::aborts_run`]).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ValidationError),

    #[error("invalid binding for `{item}`: {message}")]
    Binding { item: String, message: String },

    #[error("topic `{topic}` not found in {range}; add a column for it")]
    MissingTopic { topic: String, range: String },

    #[error("key `{key}` not found in {range}; add a new row for it")]
    MissingKey { key: String, range: String },

    #[error("reading {range} failed: {source}")]
    Read {
        range: String,
        #[source]
        source: StoreError,
    },

    #[error("writing {range} failed: {source}")]
    Write {
        range: String,
        #[source]
        source: StoreError,
    },

    #[error("writing {range} still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        range: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("source for `{item}` failed: {source}")]
    Source {
        item: String,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Column(#[from] ColumnError),
}

impl SyncError {
    /// Whether the error stems from the sheet or config setup and therefore
    /// needs an operator change before any further item can succeed.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::Binding { .. }
                | SyncError::MissingTopic { .. }
                | SyncError::MissingKey { .. }
                | SyncError::Column(_)
        )
    }
}
