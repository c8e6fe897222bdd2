//! Scrape KPI values and reconcile them into a week-indexed spreadsheet.
//!
//! A [`Syncer`] binds a validated [`kpisync_spec::Config`] to a [`GridStore`],
//! a [`Scraper`] and a [`Clock`], then runs either the fixed-row KPI flow or
//! the keyed datapoint flow once per [`Syncer::run_once`].

pub mod backends;
pub mod binding;
pub mod buffer;
pub mod cache;
pub mod clock;
pub mod context;
pub mod datapoints;
mod error;
pub mod health;
pub mod legacy;
pub mod metrics;
pub mod reconcile;
pub mod retry;
mod runtime;
pub mod source;
pub mod store;

pub use binding::{Bindings, RunPlan, SyncTarget};
pub use clock::{Clock, FixedClock};
#[cfg(feature = "system-clock")]
pub use clock::SystemClock;
pub use error::SyncError;
pub use reconcile::{RecordOutcome, SyncStatus, SyncTally};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper, WriteRetrier};
pub use runtime::{RunReport, Syncer};
pub use source::{Record, Scraper, SourceError, SystemScraper, ValueSource};
pub use store::{GridStore, InputMode, StoreError, ValueRender};
