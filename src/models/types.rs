use chrono::NaiveDateTime;

/// Display format for candle timestamps in log lines (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format candle timestamps are written to storage with (UTC, microseconds).
pub const STORED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One kline interval for a single pair. Times are UTC.
#[derive(Clone, Debug, PartialEq)]
pub struct Candle {
    pub open_time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: NaiveDateTime,
    pub num_trades: i64,
}

/// A symbol entry from the exchange metadata listing.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    /// Informational only. Pair selection matches on the symbol text.
    pub quote_asset: Option<String>,
}

impl SymbolInfo {
    pub fn new(symbol: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            status: status.into(),
            quote_asset: None,
        }
    }

    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PairOutcome {
    Added(usize),
    UpToDate,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PairResult {
    pub pair: String,
    pub outcome: PairOutcome,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncReport {
    pub pairs: Vec<PairResult>,
}

impl SyncReport {
    pub fn rows_added(&self) -> usize {
        self.pairs
            .iter()
            .map(|result| match result.outcome {
                PairOutcome::Added(rows) => rows,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> Vec<&PairResult> {
        self.pairs
            .iter()
            .filter(|result| matches!(result.outcome, PairOutcome::Failed(_)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
