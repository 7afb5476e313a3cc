use crate::config::SyncConfig;
use crate::exchange::Exchange;
use crate::models::SymbolInfo;
use tracing::error;

#[derive(Clone, Debug)]
pub struct PairFilter {
    pub quote_asset: String,
    pub excluded_markers: Vec<String>,
}

impl Default for PairFilter {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            excluded_markers: vec!["UPUSDT".to_string(), "DOWNUSDT".to_string()],
        }
    }
}

impl From<&SyncConfig> for PairFilter {
    fn from(config: &SyncConfig) -> Self {
        Self {
            quote_asset: config.quote_asset.clone(),
            excluded_markers: config.excluded_markers.clone(),
        }
    }
}

/// Trading symbols containing the quote asset, minus leveraged-token variants.
pub fn is_tradable_pair(info: &SymbolInfo, filter: &PairFilter) -> bool {
    info.is_trading()
        && info.symbol.contains(filter.quote_asset.as_str())
        && !filter
            .excluded_markers
            .iter()
            .any(|marker| info.symbol.contains(marker.as_str()))
}

pub fn select_pairs(symbols: &[SymbolInfo], filter: &PairFilter) -> Vec<String> {
    symbols
        .iter()
        .filter(|info| is_tradable_pair(info, filter))
        .map(|info| info.symbol.clone())
        .collect()
}

/// Lists the pairs to sync. A failed metadata request yields no pairs.
pub fn discover_pairs(exchange: &dyn Exchange, filter: &PairFilter) -> Vec<String> {
    match exchange.fetch_symbols() {
        Ok(symbols) => select_pairs(&symbols, filter),
        Err(err) => {
            error!("Error retrieving trading pairs: {}", err.message);
            Vec::new()
        }
    }
}
