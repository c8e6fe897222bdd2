//! Prometheus collectors, registered in a crate-local registry under the
//! `kpisync` namespace.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::reconcile::SyncStatus;

const NAMESPACE: &str = "kpisync";

pub static SYNC_RUN_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("sync_run_duration_seconds", "Wall time of one sync run")
            .namespace(NAMESPACE)
            .buckets(vec![
                10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0, 90.0, 120.0, 190.0, 240.0, 300.0,
            ]),
    )
    .expect("sync_run_duration_seconds definition is valid")
});

pub static READ_ENDPOINT_DATA_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("read_endpoint_data_total", "Values and records read from sources")
            .namespace(NAMESPACE),
    )
    .expect("read_endpoint_data_total definition is valid")
});

pub static SYNCED_DATAPOINTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("synced_datapoints_total", "KPIs and datapoints processed, by outcome")
            .namespace(NAMESPACE),
        &["status"],
    )
    .expect("synced_datapoints_total definition is valid")
});

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    registry
        .register(Box::new(SYNC_RUN_DURATION_SECONDS.clone()))
        .expect("collector registered once");
    registry
        .register(Box::new(READ_ENDPOINT_DATA_TOTAL.clone()))
        .expect("collector registered once");
    registry
        .register(Box::new(SYNCED_DATAPOINTS_TOTAL.clone()))
        .expect("collector registered once");
    registry
});

pub fn record_status(status: SyncStatus) {
    SYNCED_DATAPOINTS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
}

pub fn record_reads(count: usize) {
    READ_ENDPOINT_DATA_TOTAL.inc_by(count as u64);
}

/// Text exposition of every registered collector.
pub fn gather_text() -> String {
    let mut buffer = String::new();
    if let Err(err) = TextEncoder::new().encode_utf8(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %err, "metrics encoding failed");
    }
    buffer
}
