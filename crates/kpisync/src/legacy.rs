//! Fixed-row KPI runs.
//!
//! Each KPI owns one row: its title goes to the name column, the scraped
//! value to the current week's column and the run date to the last-update
//! column. Any scrape or write failure aborts the run.

use kpisync_common::{A1Range, CellValue, ColumnLabel};
use tracing::{debug, info, info_span, warn};

use crate::binding::{BoundKpi, LegacyLayout};
use crate::buffer::ColumnBuffer;
use crate::cache::CoordinateCache;
use crate::clock;
use crate::context::RunContext;
use crate::error::SyncError;
use crate::metrics;
use crate::reconcile::{SyncStatus, SyncTally, TitleCheck, check_title};
use crate::retry::Sleeper;
use crate::source::Scraper;
use crate::store::{GridStore, InputMode, ValueRender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyReport {
    pub week: String,
    pub tally: SyncTally,
}

pub fn run<S, P, Z>(
    ctx: &mut RunContext<'_, S, P, Z>,
    layout: &LegacyLayout,
    kpis: &[BoundKpi],
) -> Result<LegacyReport, SyncError>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    let week = clock::year_week(ctx.now);
    let date = clock::update_date(ctx.now);
    let mut cache = CoordinateCache::new();

    let week_col = cache
        .resolve_column(
            &mut *ctx.store,
            ctx.target,
            &layout.data_start_col,
            layout.date_row,
            &week,
            false,
        )?
        .ok_or_else(|| SyncError::MissingTopic {
            topic: week.clone(),
            range: A1Range::open_row(&ctx.target.sheet, &layout.data_start_col, layout.date_row)
                .to_string(),
        })?;
    info!(week = %week, column = %week_col, "resolved week column");

    let mut names = ColumnBuffer::load(
        &mut *ctx.store,
        ctx.target,
        &layout.name_col,
        1,
        ValueRender::Formatted,
    )?;

    let mut tally = SyncTally::default();
    for (idx, kpi) in kpis.iter().enumerate() {
        let _span = info_span!("kpi", index = idx + 1, title = %kpi.title).entered();
        match sync_kpi(ctx, layout, &week_col, &date, &mut names, kpi) {
            Ok(status) => {
                tally.record(status);
                metrics::record_status(status);
            }
            Err(err) => {
                tally.record(SyncStatus::Failed);
                metrics::record_status(SyncStatus::Failed);
                return Err(err);
            }
        }
    }

    info!(
        synced = tally.synced,
        collision = tally.collision,
        "KPI run finished"
    );
    Ok(LegacyReport { week, tally })
}

fn sync_kpi<S, P, Z>(
    ctx: &mut RunContext<'_, S, P, Z>,
    layout: &LegacyLayout,
    week_col: &ColumnLabel,
    date: &str,
    names: &mut ColumnBuffer,
    kpi: &BoundKpi,
) -> Result<SyncStatus, SyncError>
where
    S: GridStore + ?Sized,
    P: Scraper + ?Sized,
    Z: Sleeper,
{
    let value = kpi
        .source
        .scalar(ctx.scraper)
        .map_err(|source| SyncError::Source {
            item: kpi.title.clone(),
            source,
        })?;
    metrics::record_reads(1);
    debug!(value = %value, "scraped");

    let title_cell = A1Range::cell(&ctx.target.sheet, &layout.name_col, kpi.row);
    let existing = names.get(kpi.row);
    match check_title(&existing, &kpi.title) {
        TitleCheck::Collision => {
            warn!(
                cell = %title_cell,
                existing = %existing,
                "row already holds another KPI title; leaving it untouched"
            );
            return Ok(SyncStatus::Collision);
        }
        TitleCheck::Empty => {
            ctx.persist_cell(&title_cell, CellValue::from(kpi.title.as_str()), InputMode::Raw)?;
            names.set(kpi.row, CellValue::from(kpi.title.as_str()));
        }
        TitleCheck::Matches => {}
    }

    let value_cell = A1Range::cell(&ctx.target.sheet, week_col, kpi.row);
    ctx.persist_cell(&value_cell, value, InputMode::UserEntered)?;

    let date_cell = A1Range::cell(&ctx.target.sheet, &layout.last_update_col, kpi.row);
    ctx.persist_cell(&date_cell, CellValue::from(date), InputMode::UserEntered)?;

    info!(cell = %value_cell, "KPI synced");
    Ok(SyncStatus::Synced)
}
