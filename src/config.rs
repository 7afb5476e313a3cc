use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::fs;

pub const VALID_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

pub const MAX_KLINE_LIMIT: u32 = 1000;

#[derive(Clone, Debug)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub interval: String,
    pub limit: u32,
    pub quote_asset: String,
    pub excluded_markers: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub db_path: String,
    pub table_prefix: String,
}

#[derive(Clone, Debug)]
pub struct OutputConfig {
    pub format: String,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
}

#[derive(Clone, Debug, Deserialize)]
struct ExchangeConfigFile {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
struct SyncConfigFile {
    interval: Option<String>,
    limit: Option<u32>,
    quote_asset: Option<String>,
    excluded_markers: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
struct StorageConfigFile {
    db_path: Option<String>,
    table_prefix: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct OutputConfigFile {
    format: Option<String>,
    path: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct ConfigFile {
    exchange: Option<ExchangeConfigFile>,
    sync: Option<SyncConfigFile>,
    storage: Option<StorageConfigFile>,
    output: Option<OutputConfigFile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                base_url: "https://api.binance.com".to_string(),
                api_key: None,
                timeout_secs: 30,
                max_retries: 0,
                retry_base_delay_ms: 500,
            },
            sync: SyncConfig {
                interval: "1d".to_string(),
                limit: MAX_KLINE_LIMIT,
                quote_asset: "USDT".to_string(),
                excluded_markers: vec!["UPUSDT".to_string(), "DOWNUSDT".to_string()],
            },
            storage: StorageConfig {
                db_path: "trading_data.db".to_string(),
                table_prefix: "pair_".to_string(),
            },
            output: OutputConfig {
                format: "none".to_string(),
                path: "output/sync_report.json".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let config = Config::load_unvalidated(Some(path))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> Result<Self> {
        let config = Config::load_unvalidated(None)?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults) plus environment overrides. The caller validates
    /// after applying its own overrides.
    pub fn load_unvalidated(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .map_err(|err| Error::new(format!("failed to read config: {err}")))?;
                Config::parse(&content)?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|err| Error::new(format!("failed to parse config: {err}")))?;
        Ok(Config::from_file(file))
    }

    fn from_file(file: ConfigFile) -> Self {
        let mut config = Config::default();

        if let Some(exchange) = file.exchange {
            if let Some(value) = exchange.base_url {
                config.exchange.base_url = value;
            }
            if let Some(value) = exchange.api_key {
                config.exchange.api_key = non_empty(value);
            }
            if let Some(value) = exchange.timeout_secs {
                config.exchange.timeout_secs = value;
            }
            if let Some(value) = exchange.max_retries {
                config.exchange.max_retries = value;
            }
            if let Some(value) = exchange.retry_base_delay_ms {
                config.exchange.retry_base_delay_ms = value;
            }
        }

        if let Some(sync) = file.sync {
            if let Some(value) = sync.interval {
                config.sync.interval = value;
            }
            if let Some(value) = sync.limit {
                config.sync.limit = value;
            }
            if let Some(value) = sync.quote_asset {
                config.sync.quote_asset = value;
            }
            if let Some(value) = sync.excluded_markers {
                config.sync.excluded_markers = value;
            }
        }

        if let Some(storage) = file.storage {
            if let Some(value) = storage.db_path {
                config.storage.db_path = value;
            }
            if let Some(value) = storage.table_prefix {
                config.storage.table_prefix = value;
            }
        }

        if let Some(output) = file.output {
            if let Some(value) = output.format {
                config.output.format = value;
            }
            if let Some(value) = output.path {
                config.output.path = value;
            }
        }

        config
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = read_string_env("KLINE_SYNC_BASE_URL")? {
            self.exchange.base_url = value;
        }
        if let Some(value) = read_string_env("KLINE_SYNC_API_KEY")? {
            self.exchange.api_key = non_empty(value);
        }
        if let Some(value) = read_u64_env("KLINE_SYNC_TIMEOUT_SECS")? {
            self.exchange.timeout_secs = value;
        }
        if let Some(value) = read_u32_env("KLINE_SYNC_MAX_RETRIES")? {
            self.exchange.max_retries = value;
        }
        if let Some(value) = read_u64_env("KLINE_SYNC_RETRY_BASE_MS")? {
            self.exchange.retry_base_delay_ms = value;
        }

        if let Some(value) = read_string_env("KLINE_SYNC_INTERVAL")? {
            self.sync.interval = value;
        }
        if let Some(value) = read_u32_env("KLINE_SYNC_LIMIT")? {
            self.sync.limit = value;
        }
        if let Some(value) = read_string_env("KLINE_SYNC_QUOTE_ASSET")? {
            self.sync.quote_asset = value;
        }
        if let Some(value) = read_string_env("KLINE_SYNC_EXCLUDED_MARKERS")? {
            self.sync.excluded_markers = value
                .split(',')
                .map(|marker| marker.trim().to_string())
                .filter(|marker| !marker.is_empty())
                .collect();
        }

        if let Some(value) = read_string_env("KLINE_SYNC_DB_PATH")? {
            self.storage.db_path = value;
        }
        if let Some(value) = read_string_env("KLINE_SYNC_TABLE_PREFIX")? {
            self.storage.table_prefix = value;
        }

        if let Some(value) = read_string_env("KLINE_SYNC_OUTPUT_FORMAT")? {
            self.output.format = value;
        }
        if let Some(value) = read_string_env("KLINE_SYNC_OUTPUT_PATH")? {
            self.output.path = value;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.base_url.trim().is_empty() {
            return Err(Error::new("exchange.base_url must be set"));
        }
        if self.exchange.timeout_secs == 0 {
            return Err(Error::new("exchange.timeout_secs must be positive"));
        }

        if !VALID_INTERVALS.contains(&self.sync.interval.as_str()) {
            return Err(Error::new(format!(
                "sync.interval must be one of {}",
                VALID_INTERVALS.join(", ")
            )));
        }
        if self.sync.limit == 0 || self.sync.limit > MAX_KLINE_LIMIT {
            return Err(Error::new(format!(
                "sync.limit must be in [1, {MAX_KLINE_LIMIT}]"
            )));
        }
        if self.sync.quote_asset.trim().is_empty() {
            return Err(Error::new("sync.quote_asset must be set"));
        }
        if self
            .sync
            .excluded_markers
            .iter()
            .any(|marker| marker.trim().is_empty())
        {
            return Err(Error::new("sync.excluded_markers must not contain empty values"));
        }

        if self.storage.db_path.trim().is_empty() {
            return Err(Error::new("storage.db_path must be set"));
        }
        validate_table_prefix(&self.storage.table_prefix)?;

        match self.output.format.as_str() {
            "none" | "json" | "csv" => {}
            _ => return Err(Error::new("output.format must be none, json, or csv")),
        }
        if self.output.format != "none" && self.output.path.trim().is_empty() {
            return Err(Error::new("output.path must be set"));
        }

        Ok(())
    }
}

fn validate_table_prefix(prefix: &str) -> Result<()> {
    let Some(first) = prefix.chars().next() else {
        return Err(Error::new("storage.table_prefix must be set"));
    };
    if first.is_ascii_digit() {
        return Err(Error::new("storage.table_prefix must not start with a digit"));
    }
    if !prefix
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(Error::new(
            "storage.table_prefix may only contain ASCII letters, digits, and '_'",
        ));
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn read_string_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(Error::new(format!("failed to read {key}: {err}"))),
    }
}

fn read_u32_env(key: &str) -> Result<Option<u32>> {
    match env::var(key) {
        Ok(value) => value
            .parse::<u32>()
            .map(Some)
            .map_err(|err| Error::new(format!("{key} must be u32: {err}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(Error::new(format!("failed to read {key}: {err}"))),
    }
}

fn read_u64_env(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|err| Error::new(format!("{key} must be u64: {err}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(Error::new(format!("failed to read {key}: {err}"))),
    }
}
