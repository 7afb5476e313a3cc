use crate::config::Config;
use crate::data::history::{fetch_history, HistoryRequest};
use crate::data::pairs::{discover_pairs, PairFilter};
use crate::exchange::Exchange;
use crate::models::{PairOutcome, PairResult, SyncReport};
use crate::storage::SqliteStorage;
use crate::Result;
use tracing::{error, info};

#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub interval: String,
    pub limit: u32,
    pub filter: PairFilter,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: "1d".to_string(),
            limit: 1000,
            filter: PairFilter::default(),
        }
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.sync.interval.clone(),
            limit: config.sync.limit,
            filter: PairFilter::from(&config.sync),
        }
    }
}

/// Handles for one run: where candles come from and where they go.
pub struct SyncContext<'a> {
    pub exchange: &'a dyn Exchange,
    pub storage: &'a mut SqliteStorage,
    pub settings: SyncSettings,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        exchange: &'a dyn Exchange,
        storage: &'a mut SqliteStorage,
        settings: SyncSettings,
    ) -> Self {
        Self {
            exchange,
            storage,
            settings,
        }
    }
}

/// Brings one pair's table up to date and returns the number of appended rows.
pub fn sync_pair(ctx: &mut SyncContext<'_>, pair: &str) -> Result<usize> {
    ctx.storage.ensure_table(pair)?;
    let latest = ctx.storage.latest_open_time(pair)?;

    let request = HistoryRequest {
        pair,
        latest_timestamp: latest,
        interval: &ctx.settings.interval,
        limit: ctx.settings.limit,
    };
    let candles = fetch_history(ctx.exchange, &request)?;
    if candles.is_empty() {
        return Ok(0);
    }
    ctx.storage.append_candles(pair, &candles)
}

/// Discovers pairs and syncs them one at a time. A failing pair is logged and
/// skipped; the rest of the run continues.
pub fn run_sync(ctx: &mut SyncContext<'_>) -> SyncReport {
    let pairs = discover_pairs(ctx.exchange, &ctx.settings.filter);
    let mut report = SyncReport::default();
    if pairs.is_empty() {
        info!("No trading pairs to sync");
        return report;
    }

    info!(pairs = pairs.len(), interval = %ctx.settings.interval, "Starting kline sync");
    for pair in pairs {
        let outcome = match sync_pair(ctx, &pair) {
            Ok(0) => {
                info!("Adding trading pair: {pair} - No new rows added");
                PairOutcome::UpToDate
            }
            Ok(rows) => {
                info!("Adding trading pair: {pair} - Rows added: {rows}");
                PairOutcome::Added(rows)
            }
            Err(err) => {
                error!("Error retrieving data for {pair}: {}", err.message);
                PairOutcome::Failed(err.message)
            }
        };
        report.pairs.push(PairResult { pair, outcome });
    }

    info!(
        pairs = report.pairs.len(),
        rows_added = report.rows_added(),
        failures = report.failures().len(),
        "Kline sync finished"
    );
    report
}
