pub mod binance;

use crate::models::{Candle, SymbolInfo};
use crate::Result;

pub struct CandleRequest {
    pub symbol: String,
    pub interval: String,
    pub limit: u32,
}

/// Read-only market data used by the sync loop.
pub trait Exchange {
    fn fetch_symbols(&self) -> Result<Vec<SymbolInfo>>;
    fn fetch_klines(&self, req: &CandleRequest) -> Result<Vec<Candle>>;
}
