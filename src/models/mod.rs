pub mod types;

pub use types::{Candle, PairOutcome, PairResult, SymbolInfo, SyncReport, STORED_TIMESTAMP_FORMAT, TIMESTAMP_FORMAT};
