use crate::app::report::write_output;
use crate::config::Config;
use crate::exchange::binance::{BinanceConfig, BinanceExchange};
use crate::storage::SqliteStorage;
use crate::sync::{run_sync, SyncContext, SyncSettings};
use crate::{Error, Result};
use std::env;
use tracing::info;

pub fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let cli = parse_args(&args)?;

    if cli.show_help {
        print_usage();
        return Ok(());
    }

    let config = resolve_config(&cli)?;

    let exchange = BinanceExchange::new(BinanceConfig::from(&config.exchange))?;
    let mut storage =
        SqliteStorage::open(&config.storage.db_path)?.with_prefix(&config.storage.table_prefix);
    info!(
        db_path = %config.storage.db_path,
        base_url = %config.exchange.base_url,
        "Opened kline database"
    );

    let mut ctx = SyncContext::new(&exchange, &mut storage, SyncSettings::from(&config));
    let report = run_sync(&mut ctx);

    if config.output.format != "none" {
        write_output(&config.output.path, &config.output.format, &report)?;
        info!(
            path = %config.output.path,
            format = %config.output.format,
            "Sync report written"
        );
    }
    Ok(())
}

/// Config file (if any), then environment, then command-line overrides.
pub fn resolve_config(cli: &CliArgs) -> Result<Config> {
    let mut config = Config::load_unvalidated(cli.config_path.as_deref())?;
    if let Some(path) = &cli.db_path {
        config.storage.db_path = path.clone();
    }
    if let Some(interval) = &cli.interval {
        config.sync.interval = interval.clone();
    }
    if let Some(limit) = cli.limit {
        config.sync.limit = limit;
    }
    if let Some(path) = &cli.report_path {
        config.output.path = path.clone();
        config.output.format = report_format_for(path).to_string();
    }
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub config_path: Option<String>,
    pub db_path: Option<String>,
    pub interval: Option<String>,
    pub limit: Option<u32>,
    pub report_path: Option<String>,
    pub show_help: bool,
}

pub fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut cli = CliArgs::default();

    let mut index = 1;
    while index < args.len() {
        match args[index].as_str() {
            "--help" | "-h" => {
                cli.show_help = true;
                index += 1;
            }
            "--config" | "-c" => {
                cli.config_path = Some(flag_value(args, index, "--config")?);
                index += 2;
            }
            "--db" | "-d" => {
                cli.db_path = Some(flag_value(args, index, "--db")?);
                index += 2;
            }
            "--interval" | "-i" => {
                cli.interval = Some(flag_value(args, index, "--interval")?);
                index += 2;
            }
            "--limit" | "-l" => {
                let value = flag_value(args, index, "--limit")?;
                let parsed = value
                    .parse::<u32>()
                    .map_err(|_| Error::new("invalid value for --limit"))?;
                cli.limit = Some(parsed);
                index += 2;
            }
            "--report" | "-r" => {
                cli.report_path = Some(flag_value(args, index, "--report")?);
                index += 2;
            }
            unknown => {
                return Err(Error::new(format!("unknown argument: {unknown}")));
            }
        }
    }

    Ok(cli)
}

fn flag_value(args: &[String], index: usize, flag: &str) -> Result<String> {
    args.get(index + 1)
        .map(|value| value.to_string())
        .ok_or_else(|| Error::new(format!("missing value for {flag}")))
}

fn report_format_for(path: &str) -> &'static str {
    if path.to_ascii_lowercase().ends_with(".csv") {
        "csv"
    } else {
        "json"
    }
}

fn print_usage() {
    println!("usage: kline-sync [--config <path>] [--db <path>] [--interval <iv>] [--limit <n>] [--report <path>]");
    println!("  -c, --config     Path to a TOML config file (default: built-in defaults + env)");
    println!("  -d, --db         SQLite database file (default: trading_data.db)");
    println!("  -i, --interval   Kline interval (default: 1d)");
    println!("  -l, --limit      Candles requested per pair, 1-1000 (default: 1000)");
    println!("  -r, --report     Write a run report (.json or .csv)");
    println!("  -h, --help       Show this help");
}
