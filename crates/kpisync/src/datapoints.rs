//! Keyed datapoint runs.
//!
//! Records are located by key in the key column and by topic in the header
//! row. Every column touched in a run is buffered and written back as one
//! contiguous range. A failing datapoint is logged and counted; the run only
//! aborts for errors that need the sheet or config fixed first.

use std::collections::HashMap;

use kpisync_common::{A1Range, CellValue, ColumnLabel};
use tracing::{debug, error, info, info_span};

use crate::binding::{BoundDatapoint, GridAnchors, Placement};
use crate::buffer::ColumnBuffer;
use crate::cache::CoordinateCache;
use crate::clock;
use crate::context::RunContext;
use crate::error::SyncError;
use crate::metrics;
use crate::reconcile::{
    RecordOutcome, RecordPolicy, RecordTally, SyncStatus, SyncTally, reconcile_record,
};
use crate::retry::Sleeper;
use crate::source::Scraper;
use crate::store::{GridStore, InputMode, ValueRender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatapointReport {
    pub week: String,
    pub tally: SyncTally,
    pub records: RecordTally,
    pub failures: Vec<ItemFailure>,
}

struct RunState {
    week: String,
    cache: CoordinateCache,
    buffers: HashMap<ColumnLabel, ColumnBuffer>,
}

pub fn run<S, P, Z>(
    ctx: &mut RunContext<'_, S, P, Z>,
    anchors: Option<&GridAnchors>,
    datapoints: &[BoundDatapoint],
) -> Result<DatapointReport, SyncError>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    let mut state = RunState {
        week: clock::year_week(ctx.now),
        cache: CoordinateCache::new(),
        buffers: HashMap::new(),
    };
    let mut report = DatapointReport {
        week: state.week.clone(),
        ..Default::default()
    };

    for dp in datapoints {
        let _span = info_span!("datapoint", title = %dp.title).entered();
        let result = match &dp.placement {
            Placement::Cell { col, row } => sync_cell(ctx, dp, col, *row),
            Placement::Keyed {
                topic,
                add_rows,
                match_all,
            } => match anchors {
                Some(anchors) => sync_keyed(
                    ctx,
                    &mut state,
                    anchors,
                    dp,
                    topic.as_deref(),
                    RecordPolicy {
                        add_rows: *add_rows,
                        match_all: *match_all,
                    },
                ),
                None => Err(SyncError::Binding {
                    item: dp.title.clone(),
                    message: "keyed datapoint without sheet anchors".into(),
                }),
            },
        };

        match result {
            Ok(records) => {
                debug!(
                    updated = records.updated,
                    appended = records.appended,
                    skipped = records.skipped,
                    "datapoint synced"
                );
                report.records.merge(records);
                report.tally.record(SyncStatus::Synced);
                metrics::record_status(SyncStatus::Synced);
            }
            Err(err) => {
                report.tally.record(SyncStatus::Failed);
                metrics::record_status(SyncStatus::Failed);
                if err.aborts_run() {
                    return Err(err);
                }
                error!(error = %err, "datapoint failed; continuing with the next one");
                report.failures.push(ItemFailure {
                    title: dp.title.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        synced = report.tally.synced,
        failed = report.tally.failed,
        updated = report.records.updated,
        appended = report.records.appended,
        "datapoint run finished"
    );
    Ok(report)
}

fn sync_cell<S, P, Z>(
    ctx: &mut RunContext<'_, S, P, Z>,
    dp: &BoundDatapoint,
    col: &ColumnLabel,
    row: u32,
) -> Result<RecordTally, SyncError>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    let value = dp
        .source
        .scalar(ctx.scraper)
        .map_err(|source| SyncError::Source {
            item: dp.title.clone(),
            source,
        })?;
    metrics::record_reads(1);

    let range = A1Range::cell(&ctx.target.sheet, col, row);
    let existing = ctx
        .store
        .get_range(&ctx.target.spreadsheet_id, &range, ValueRender::Unformatted)
        .map_err(|source| SyncError::Read {
            range: range.to_string(),
            source,
        })?
        .into_iter()
        .next()
        .and_then(|cells| cells.into_iter().next())
        .unwrap_or_default();

    let mut tally = RecordTally::default();
    if existing.same_as(&value) {
        tally.record(RecordOutcome::NoOp);
        return Ok(tally);
    }
    ctx.persist_cell(&range, value, InputMode::UserEntered)?;
    tally.record(RecordOutcome::Updated);
    Ok(tally)
}

fn sync_keyed<S, P, Z>(
    ctx: &mut RunContext<'_, S, P, Z>,
    state: &mut RunState,
    anchors: &GridAnchors,
    dp: &BoundDatapoint,
    topic: Option<&str>,
    policy: RecordPolicy,
) -> Result<RecordTally, SyncError>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    let topic = topic.unwrap_or(state.week.as_str()).to_string();
    let column = state
        .cache
        .resolve_column(
            &mut *ctx.store,
            ctx.target,
            &anchors.data_start_col,
            anchors.topic_row,
            &topic,
            true,
        )?
        .ok_or_else(|| SyncError::MissingTopic {
            topic: topic.clone(),
            range: A1Range::open_row(&ctx.target.sheet, &anchors.data_start_col, anchors.topic_row)
                .to_string(),
        })?;
    state.cache.warm_keys(
        &mut *ctx.store,
        ctx.target,
        &anchors.key_col,
        anchors.data_start_row,
    )?;

    let records = dp
        .source
        .records(ctx.scraper)
        .map_err(|source| SyncError::Source {
            item: dp.title.clone(),
            source,
        })?;
    metrics::record_reads(records.len());
    debug!(topic = %topic, column = %column, records = records.len(), "scraped");

    if !state.buffers.contains_key(&column) {
        let buffer = ColumnBuffer::load(
            &mut *ctx.store,
            ctx.target,
            &column,
            anchors.data_start_row,
            ValueRender::Unformatted,
        )?;
        state.buffers.insert(column.clone(), buffer);
    }
    let Some(buffer) = state.buffers.get_mut(&column) else {
        return Ok(RecordTally::default());
    };

    let mut tally = RecordTally::default();
    let mut appended: Vec<(String, u32)> = Vec::new();
    for record in &records {
        let outcome = reconcile_record(&mut state.cache, buffer, policy, &record.key, &record.value);
        if let RecordOutcome::Appended(row) = outcome {
            appended.push((record.key.trim().to_string(), row));
        }
        tally.record(outcome);
    }

    if !buffer.is_dirty() {
        return Ok(tally);
    }

    if let Err(err) = persist_keys(ctx, anchors, &appended) {
        // neither keys nor values reached the sheet
        state.buffers.remove(&column);
        for (key, row) in &appended {
            state.cache.forget_key(key, *row);
        }
        return Err(err);
    }

    let range = buffer.range(&ctx.target.sheet);
    if let Err(err) = ctx.persist(&range, &buffer.to_rows(), InputMode::Raw) {
        // appended keys are in the sheet now; only the column is stale
        state.buffers.remove(&column);
        return Err(err);
    }
    buffer.mark_clean();
    Ok(tally)
}

/// Write keys of appended rows into the key column as one range.
fn persist_keys<S, P, Z>(
    ctx: &mut RunContext<'_, S, P, Z>,
    anchors: &GridAnchors,
    appended: &[(String, u32)],
) -> Result<(), SyncError>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    let (Some(first), Some(last)) = (
        appended.iter().map(|(_, row)| *row).min(),
        appended.iter().map(|(_, row)| *row).max(),
    ) else {
        return Ok(());
    };
    let mut rows = vec![vec![CellValue::Empty]; (last - first + 1) as usize];
    for (key, row) in appended {
        rows[(row - first) as usize] = vec![CellValue::from(key.as_str())];
    }
    let range = A1Range::column_span(&ctx.target.sheet, &anchors.key_col, first, last);
    ctx.persist(&range, &rows, InputMode::Raw)
}
