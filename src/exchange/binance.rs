use crate::config::ExchangeConfig;
use crate::data::klines::{parse_binance_klines, parse_exchange_info};
use crate::exchange::{CandleRequest, Exchange};
use crate::models::{Candle, SymbolInfo};
use crate::{Error, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct BinanceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl From<&ExchangeConfig> for BinanceConfig {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        }
    }
}

pub struct BinanceExchange {
    client: Client,
    config: BinanceConfig,
}

impl BinanceExchange {
    pub fn new(config: BinanceConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::new("base_url must be set"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|err| Error::new(format!("http client build failed: {err}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn public_request(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            let mut request = self.client.get(&url).query(query);
            if let Some(key) = self.config.api_key.as_deref() {
                request = request.header("X-MBX-APIKEY", key);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .text()
                            .map_err(|err| Error::new(format!("http read failed: {err}")));
                    }

                    if should_retry(status) && attempt < self.config.max_retries {
                        let delay =
                            retry_delay_ms(&response, attempt, self.config.retry_base_delay_ms);
                        warn!(path, %status, attempt = attempt + 1, delay_ms = delay, "retrying binance request");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }

                    return Err(Error::new(format!("binance response status: {status}")));
                }
                Err(err) => {
                    if attempt < self.config.max_retries {
                        let delay = backoff_ms(self.config.retry_base_delay_ms, attempt);
                        warn!(path, error = %err, attempt = attempt + 1, delay_ms = delay, "retrying binance request");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::new(format!("http request failed: {err}")));
                }
            }
        }
    }
}

impl Exchange for BinanceExchange {
    fn fetch_symbols(&self) -> Result<Vec<SymbolInfo>> {
        let text = self.public_request("/api/v3/exchangeInfo", &[])?;
        parse_exchange_info(&text)
    }

    fn fetch_klines(&self, req: &CandleRequest) -> Result<Vec<Candle>> {
        let query = vec![
            ("symbol".to_string(), req.symbol.clone()),
            ("interval".to_string(), req.interval.clone()),
            ("limit".to_string(), req.limit.to_string()),
        ];
        let text = self.public_request("/api/v3/klines", &query)?;
        parse_binance_klines(&text)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_delay_ms(response: &Response, attempt: u32, base_ms: u64) -> u64 {
    if let Some(value) = response.headers().get("retry-after") {
        if let Ok(text) = value.to_str() {
            if let Ok(seconds) = text.parse::<u64>() {
                return seconds.saturating_mul(1000);
            }
        }
    }
    backoff_ms(base_ms, attempt)
}

fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let shift = if attempt >= 63 { u64::MAX } else { 1_u64 << attempt };
    base_ms.saturating_mul(shift)
}
