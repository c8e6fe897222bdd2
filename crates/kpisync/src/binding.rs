use kpisync_common::{A1Ref, ColumnLabel};
use kpisync_spec::{Config, DatapointSpec, KpiSpec, RowNumber, SourceSpec};

use crate::error::SyncError;
use crate::source::ValueSource;

/// Spreadsheet and sheet every write of a run goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub spreadsheet_id: String,
    pub sheet: String,
}

/// Anchors of the fixed-row KPI grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyLayout {
    pub name_col: ColumnLabel,
    pub last_update_col: ColumnLabel,
    pub data_start_col: ColumnLabel,
    pub date_row: u32,
}

/// Anchors of the keyed datapoint grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAnchors {
    pub key_col: ColumnLabel,
    pub data_start_col: ColumnLabel,
    pub topic_row: u32,
    pub data_start_row: u32,
}

#[derive(Debug, Clone)]
pub struct BoundKpi {
    pub title: String,
    pub row: u32,
    pub source: ValueSource,
}

/// Where a datapoint's values land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Records are matched by key against the key column under a topic column.
    Keyed {
        topic: Option<String>,
        add_rows: bool,
        match_all: bool,
    },
    /// A single scalar written to a fixed cell.
    Cell { col: ColumnLabel, row: u32 },
}

#[derive(Debug, Clone)]
pub struct BoundDatapoint {
    pub title: String,
    pub source: ValueSource,
    pub placement: Placement,
}

/// What a run does. Legacy KPIs take precedence when both are configured.
#[derive(Debug, Clone)]
pub enum RunPlan {
    LegacyKpi {
        layout: LegacyLayout,
        kpis: Vec<BoundKpi>,
    },
    Datapoints {
        anchors: Option<GridAnchors>,
        datapoints: Vec<BoundDatapoint>,
    },
}

/// Validated config resolved into typed coordinates.
#[derive(Debug, Clone)]
pub struct Bindings {
    target: SyncTarget,
    plan: RunPlan,
}

impl Bindings {
    /// Validate `config` and bind it into a [`RunPlan`].
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        config.validate()?;
        let target = SyncTarget {
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet: config.sheet_name.clone(),
        };
        let plan = if config.has_legacy_kpis() {
            RunPlan::LegacyKpi {
                layout: LegacyLayout {
                    name_col: column("sheet-kpi-name-col", config.sheet_kpi_name_col.as_deref())?,
                    last_update_col: column(
                        "sheet-kpi-last-update-col",
                        config.sheet_kpi_last_update_col.as_deref(),
                    )?,
                    data_start_col: column(
                        "sheet-data-start-col",
                        config.sheet_data_start_col.as_deref(),
                    )?,
                    date_row: row("sheet-data-date-row", config.sheet_data_date_row.as_ref())?,
                },
                kpis: config
                    .kpi
                    .iter()
                    .map(bind_kpi)
                    .collect::<Result<_, _>>()?,
            }
        } else {
            let datapoints: Vec<BoundDatapoint> = config
                .datapoints
                .iter()
                .map(bind_datapoint)
                .collect::<Result<_, _>>()?;
            let needs_anchors = datapoints
                .iter()
                .any(|dp| matches!(dp.placement, Placement::Keyed { .. }));
            let anchors = if needs_anchors {
                Some(GridAnchors {
                    key_col: column("sheet-key-col", config.sheet_key_col.as_deref())?,
                    data_start_col: column(
                        "sheet-data-start-col",
                        config.sheet_data_start_col.as_deref(),
                    )?,
                    topic_row: row("sheet-topic-row", config.topic_row())?,
                    data_start_row: row(
                        "sheet-data-start-row",
                        config.sheet_data_start_row.as_ref(),
                    )?,
                })
            } else {
                None
            };
            RunPlan::Datapoints {
                anchors,
                datapoints,
            }
        };
        Ok(Self { target, plan })
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }
}

fn column(item: &str, value: Option<&str>) -> Result<ColumnLabel, SyncError> {
    let value = value.ok_or_else(|| binding_error(item, "column is not set"))?;
    Ok(ColumnLabel::parse(value)?)
}

fn row(item: &str, value: Option<&RowNumber>) -> Result<u32, SyncError> {
    value
        .and_then(RowNumber::get)
        .ok_or_else(|| binding_error(item, "row is not a positive number"))
}

fn binding_error(item: &str, message: &str) -> SyncError {
    SyncError::Binding {
        item: item.to_string(),
        message: message.to_string(),
    }
}

fn bind_kpi(kpi: &KpiSpec) -> Result<BoundKpi, SyncError> {
    Ok(BoundKpi {
        title: kpi.title.trim().to_string(),
        row: row(&kpi.title, Some(&kpi.sheet_row))?,
        source: ValueSource::from(&kpi.source),
    })
}

fn bind_datapoint(dp: &DatapointSpec) -> Result<BoundDatapoint, SyncError> {
    let placement = match &dp.cell {
        Some(cell) => match A1Ref::parse(cell) {
            Ok(A1Ref {
                col: Some(col),
                row: Some(row),
            }) => Placement::Cell { col, row },
            _ => return Err(binding_error(&dp.title, "cell is not a single cell reference")),
        },
        None => Placement::Keyed {
            topic: dp.topic.as_ref().map(|t| t.trim().to_string()),
            add_rows: dp.add_rows,
            match_all: dp.match_all,
        },
    };
    Ok(BoundDatapoint {
        title: dp.title.clone(),
        source: ValueSource::from(&dp.source),
        placement,
    })
}

impl From<&SourceSpec> for ValueSource {
    fn from(spec: &SourceSpec) -> Self {
        match spec {
            SourceSpec::Command(cmd) => ValueSource::Command {
                program: cmd.command.clone(),
                args: cmd.args.to_vec(),
            },
            SourceSpec::Http(http) => ValueSource::Http {
                url: http.url.clone(),
                pick: http.pick.clone(),
            },
        }
    }
}
