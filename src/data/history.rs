use crate::exchange::{CandleRequest, Exchange};
use crate::models::{Candle, TIMESTAMP_FORMAT};
use crate::Result;
use chrono::{Duration, NaiveDateTime};
use tracing::warn;

pub struct HistoryRequest<'a> {
    pub pair: &'a str,
    pub latest_timestamp: Option<NaiveDateTime>,
    pub interval: &'a str,
    pub limit: u32,
}

impl<'a> HistoryRequest<'a> {
    /// Daily candles, up to 1000 rows, no cutoff.
    pub fn new(pair: &'a str) -> Self {
        Self {
            pair,
            latest_timestamp: None,
            interval: "1d",
            limit: 1000,
        }
    }

    pub fn since(mut self, latest_timestamp: Option<NaiveDateTime>) -> Self {
        self.latest_timestamp = latest_timestamp;
        self
    }
}

/// Fetches the most recent `limit` candles and keeps those newer than the cutoff.
pub fn fetch_history(exchange: &dyn Exchange, request: &HistoryRequest<'_>) -> Result<Vec<Candle>> {
    let candles = exchange.fetch_klines(&CandleRequest {
        symbol: request.pair.to_string(),
        interval: request.interval.to_string(),
        limit: request.limit,
    })?;

    let Some(cutoff) = request.latest_timestamp else {
        return Ok(candles);
    };

    if candles.len() >= request.limit as usize {
        let oldest = candles.iter().map(|candle| candle.open_time).min();
        let next_expected = interval_step(request.interval)
            .and_then(|step| cutoff.checked_add_signed(step));
        if let (Some(oldest), Some(next_expected)) = (oldest, next_expected) {
            if oldest > next_expected {
                warn!(
                    pair = request.pair,
                    stored_until = %cutoff.format(TIMESTAMP_FORMAT),
                    fetched_from = %oldest.format(TIMESTAMP_FORMAT),
                    "history gap: more new candles than one request returns"
                );
            }
        }
    }

    Ok(filter_newer(candles, Some(cutoff)))
}

/// Longest gap between two consecutive candle opens for a kline interval.
/// Months count as 31 days.
pub fn interval_step(interval: &str) -> Option<Duration> {
    let unit = interval.chars().last()?;
    let count: i64 = interval[..interval.len() - unit.len_utf8()].parse().ok()?;
    let unit_secs: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        'M' => 31 * 24 * 60 * 60,
        _ => return None,
    };
    if count <= 0 {
        return None;
    }
    count.checked_mul(unit_secs).map(Duration::seconds)
}

/// Keeps candles with `open_time` strictly after the cutoff.
pub fn filter_newer(candles: Vec<Candle>, cutoff: Option<NaiveDateTime>) -> Vec<Candle> {
    match cutoff {
        Some(cutoff) => candles
            .into_iter()
            .filter(|candle| candle.open_time > cutoff)
            .collect(),
        None => candles,
    }
}
