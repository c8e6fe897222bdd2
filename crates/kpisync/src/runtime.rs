use kpisync_spec::Config;
use tracing::info_span;

use crate::binding::{Bindings, RunPlan};
use crate::clock::Clock;
use crate::context::RunContext;
use crate::datapoints::{self, DatapointReport};
use crate::error::SyncError;
use crate::legacy::{self, LegacyReport};
use crate::reconcile::SyncTally;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper, WriteRetrier};
use crate::source::Scraper;
use crate::store::GridStore;

/// Outcome of one [`Syncer::run_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    Legacy(LegacyReport),
    Datapoints(DatapointReport),
}

impl RunReport {
    pub fn tally(&self) -> SyncTally {
        match self {
            RunReport::Legacy(report) => report.tally,
            RunReport::Datapoints(report) => report.tally,
        }
    }

    pub fn week(&self) -> &str {
        match self {
            RunReport::Legacy(report) => &report.week,
            RunReport::Datapoints(report) => &report.week,
        }
    }
}

/// Runtime container pairing bound config with a grid store, a scraper and a
/// clock.
pub struct Syncer<S, P, C, Z = ThreadSleeper> {
    bindings: Bindings,
    store: S,
    scraper: P,
    clock: C,
    retrier: WriteRetrier<Z>,
}

impl<S, P, C, Z> Syncer<S, P, C, Z>
where
    S: GridStore,
    P: Scraper,
    C: Clock,
    Z: Sleeper,
{
    /// Validate and bind `config`, keeping the collaborators for later runs.
    pub fn new(config: &Config, store: S, scraper: P, clock: C, sleeper: Z) -> Result<Self, SyncError> {
        let bindings = Bindings::new(config)?;
        let policy = RetryPolicy::from_spec(&config.retry).map_err(|e| SyncError::Binding {
            item: "retry.transient-pattern".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            bindings,
            store,
            scraper,
            clock,
            retrier: WriteRetrier::new(policy, sleeper),
        })
    }

    /// Execute one run against the current time. Coordinate caches and
    /// column buffers never outlive the call.
    pub fn run_once(&mut self) -> Result<RunReport, SyncError> {
        let now = self.clock.now();
        let target = self.bindings.target();
        let _span = info_span!(
            "sync_run",
            spreadsheet = %target.spreadsheet_id,
            sheet = %target.sheet
        )
        .entered();
        let mut ctx = RunContext {
            store: &mut self.store,
            scraper: &self.scraper,
            retrier: &mut self.retrier,
            target,
            now,
        };
        match self.bindings.plan() {
            RunPlan::LegacyKpi { layout, kpis } => {
                legacy::run(&mut ctx, layout, kpis).map(RunReport::Legacy)
            }
            RunPlan::Datapoints {
                anchors,
                datapoints,
            } => datapoints::run(&mut ctx, anchors.as_ref(), datapoints).map(RunReport::Datapoints),
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn retrier(&self) -> &WriteRetrier<Z> {
        &self.retrier
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
