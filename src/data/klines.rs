use crate::models::{Candle, SymbolInfo};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Columns in a Binance kline row. Columns past `num_trades` (quote volume is
/// column 7, taker volumes and an unused field follow) are dropped.
const KLINE_MIN_COLUMNS: usize = 9;

pub fn parse_binance_klines(payload: &str) -> Result<Vec<Candle>> {
    let data: Vec<Vec<Value>> = serde_json::from_str(payload)
        .map_err(|err| Error::new(format!("json parse failed: {err}")))?;

    let mut candles = Vec::with_capacity(data.len());
    for row in data {
        if row.len() < KLINE_MIN_COLUMNS {
            return Err(Error::new(format!(
                "kline row has {} fields, expected at least {KLINE_MIN_COLUMNS}",
                row.len()
            )));
        }
        candles.push(Candle {
            open_time: millis_to_timestamp(value_to_i64(&row[0])?)?,
            open: value_to_f64(&row[1])?,
            high: value_to_f64(&row[2])?,
            low: value_to_f64(&row[3])?,
            close: value_to_f64(&row[4])?,
            volume: value_to_f64(&row[5])?,
            close_time: millis_to_timestamp(value_to_i64(&row[6])?)?,
            num_trades: value_to_i64(&row[8])?,
        });
    }

    Ok(candles)
}

pub fn parse_exchange_info(payload: &str) -> Result<Vec<SymbolInfo>> {
    let data: Value = serde_json::from_str(payload)
        .map_err(|err| Error::new(format!("json parse failed: {err}")))?;
    let symbols = data
        .get("symbols")
        .and_then(|value| value.as_array())
        .ok_or_else(|| Error::new("exchangeInfo symbols missing"))?;

    let mut result = Vec::with_capacity(symbols.len());
    for entry in symbols {
        let symbol = entry
            .get("symbol")
            .and_then(|value| value.as_str())
            .ok_or_else(|| Error::new("exchangeInfo entry without symbol"))?;
        let status = entry
            .get("status")
            .and_then(|value| value.as_str())
            .unwrap_or("");
        let quote_asset = entry
            .get("quoteAsset")
            .and_then(|value| value.as_str())
            .map(str::to_string);
        result.push(SymbolInfo {
            symbol: symbol.to_string(),
            status: status.to_string(),
            quote_asset,
        });
    }
    Ok(result)
}

pub fn millis_to_timestamp(millis: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis)
        .map(|datetime| datetime.naive_utc())
        .ok_or_else(|| Error::new(format!("timestamp out of range: {millis}")))
}

fn value_to_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| Error::new("number is not i64")),
        Value::String(text) => text
            .parse::<i64>()
            .map_err(|err| Error::new(format!("invalid i64: {err}"))),
        _ => Err(Error::new("unexpected value type for i64")),
    }
}

fn value_to_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| Error::new("number is not f64")),
        Value::String(text) => text
            .parse::<f64>()
            .map_err(|err| Error::new(format!("invalid f64: {err}"))),
        _ => Err(Error::new("unexpected value type for f64")),
    }
}
