//! One ETL run: fetch every endpoint, aggregate, load.
//!
//! Fetch failures only drop that endpoint's rows. The warehouse is opened only
//! once there is something to load and is always closed afterwards.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::api::SeriesProvider;
use crate::database::{LoadMode, LoadReport, Warehouse};
use crate::error::LoadError;
use crate::models::{Endpoint, FetchWindow, SeriesRecord, SeriesTable, ENDPOINTS};

/// Knobs for a single run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub endpoints: Vec<Endpoint>,
    pub lookback_days: u32,
    pub load_mode: LoadMode,
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            endpoints: ENDPOINTS.to_vec(),
            lookback_days: crate::models::DEFAULT_LOOKBACK_DAYS,
            load_mode: LoadMode::Replace,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndpointStatus {
    Fetched { rows: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointOutcome {
    pub endpoint: Endpoint,
    pub status: EndpointStatus,
}

impl EndpointOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, EndpointStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoData,
    DryRun,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(LoadReport),
    Skipped(SkipReason),
    /// Warehouse could not be reached, nothing was attempted
    ConnectFailed(String),
    Failed(String),
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every endpoint fetched and the load committed
    Complete,
    /// Load committed, but some endpoints contributed nothing
    Partial,
    /// No endpoint produced rows, nothing was loaded
    NoData,
    /// Rows were collected but the load was rolled back
    LoadFailed,
    /// Rows were collected but the warehouse was unreachable
    ConnectFailed,
    DryRun,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Complete | RunStatus::DryRun => 0,
            RunStatus::ConnectFailed => 1,
            RunStatus::Partial => 2,
            RunStatus::NoData => 3,
            RunStatus::LoadFailed => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub window: FetchWindow,
    pub endpoints: Vec<EndpointOutcome>,
    pub rows_aggregated: usize,
    pub load: LoadOutcome,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        match &self.load {
            LoadOutcome::Loaded(_) if self.endpoints.iter().any(EndpointOutcome::is_failed) => {
                RunStatus::Partial
            }
            LoadOutcome::Loaded(_) => RunStatus::Complete,
            LoadOutcome::Skipped(SkipReason::NoData) => RunStatus::NoData,
            LoadOutcome::Skipped(SkipReason::DryRun) => RunStatus::DryRun,
            LoadOutcome::ConnectFailed(_) => RunStatus::ConnectFailed,
            LoadOutcome::Failed(_) => RunStatus::LoadFailed,
        }
    }

    pub fn log_summary(&self) {
        let failed = self.endpoints.iter().filter(|e| e.is_failed()).count();
        info!(
            "Run finished: {:?} | window {} | {} endpoints ({} failed) | {} rows",
            self.status(),
            self.window,
            self.endpoints.len(),
            failed,
            self.rows_aggregated
        );
        for outcome in &self.endpoints {
            if let EndpointStatus::Failed { reason } = &outcome.status {
                warn!("  {} ({}): {}", outcome.endpoint.path, outcome.endpoint.concept, reason);
            }
        }
    }
}

/// Fetch one endpoint, reducing any failure to an empty contribution
pub async fn fetch_or_empty<P>(
    provider: &P,
    endpoint: &Endpoint,
    window: &FetchWindow,
) -> (Vec<SeriesRecord>, EndpointOutcome)
where
    P: SeriesProvider + ?Sized,
{
    match provider.fetch_series(endpoint, window).await {
        Ok(records) => {
            info!("{}: {} rows in window", endpoint.path, records.len());
            let outcome = EndpointOutcome {
                endpoint: *endpoint,
                status: EndpointStatus::Fetched {
                    rows: records.len(),
                },
            };
            (records, outcome)
        }
        Err(e) => {
            warn!("{}: skipped, {}", endpoint.path, e);
            let outcome = EndpointOutcome {
                endpoint: *endpoint,
                status: EndpointStatus::Failed {
                    reason: e.to_string(),
                },
            };
            (Vec::new(), outcome)
        }
    }
}

/// Fetch every endpoint in order against the same window and aggregate
pub async fn collect<P>(
    provider: &P,
    endpoints: &[Endpoint],
    window: &FetchWindow,
) -> (Option<SeriesTable>, Vec<EndpointOutcome>)
where
    P: SeriesProvider + ?Sized,
{
    let mut contributions = Vec::with_capacity(endpoints.len());
    let mut outcomes = Vec::with_capacity(endpoints.len());

    for endpoint in endpoints {
        let (records, outcome) = fetch_or_empty(provider, endpoint, window).await;
        contributions.push(records);
        outcomes.push(outcome);
    }

    (aggregate(contributions), outcomes)
}

/// Run the job. `now` is captured once by the caller and fixes the window for
/// every endpoint. `open_warehouse` is only called when there are rows to load.
pub async fn run<P, F, Fut>(
    provider: &P,
    open_warehouse: F,
    options: &RunOptions,
    now: DateTime<Utc>,
) -> RunReport
where
    P: SeriesProvider + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Box<dyn Warehouse + Send + Sync>, LoadError>>,
{
    let window = FetchWindow::at(now, options.lookback_days);
    info!(
        "Fetching {} endpoints for {} ({} days)",
        options.endpoints.len(),
        window,
        window.days_count()
    );

    let (table, endpoints) = collect(provider, &options.endpoints, &window).await;

    let Some(table) = table else {
        println!("No data collected from the endpoints.");
        return RunReport {
            window,
            endpoints,
            rows_aggregated: 0,
            load: LoadOutcome::Skipped(SkipReason::NoData),
        };
    };

    println!("{table}");
    let rows_aggregated = table.len();

    if options.dry_run {
        info!("Dry run, {} rows not loaded", rows_aggregated);
        return RunReport {
            window,
            endpoints,
            rows_aggregated,
            load: LoadOutcome::Skipped(SkipReason::DryRun),
        };
    }

    let load = match open_warehouse().await {
        Ok(warehouse) => {
            let result = warehouse.load(&table, options.load_mode).await;
            warehouse.close().await;
            match result {
                Ok(report) => {
                    info!(
                        "Inserted {} rows into {} in {} batches",
                        report.rows_inserted, report.table, report.batches
                    );
                    LoadOutcome::Loaded(report)
                }
                Err(e) => {
                    error!("Load rolled back: {}", e);
                    LoadOutcome::Failed(e.to_string())
                }
            }
        }
        Err(e) => {
            error!("{}", e);
            LoadOutcome::ConnectFailed(e.to_string())
        }
    };

    RunReport {
        window,
        endpoints,
        rows_aggregated,
        load,
    }
}
