use chrono::{Duration, NaiveDate, NaiveDateTime};
use kline_sync::data::history::{fetch_history, filter_newer, HistoryRequest};
use kline_sync::data::pairs::{discover_pairs, PairFilter};
use kline_sync::exchange::{CandleRequest, Exchange};
use kline_sync::models::{Candle, PairOutcome, SymbolInfo};
use kline_sync::storage::SqliteStorage;
use kline_sync::sync::{run_sync, sync_pair, SyncContext, SyncSettings};
use kline_sync::{Error, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};

fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("valid date")
        + Duration::days(offset)
}

fn candle(offset: i64) -> Candle {
    Candle {
        open_time: day(offset),
        open: 100.0,
        high: 110.0,
        low: 95.0,
        close: 105.0,
        volume: 1.5,
        close_time: day(offset + 1) - Duration::seconds(1),
        num_trades: 42,
    }
}

fn candles(days: std::ops::Range<i64>) -> Vec<Candle> {
    days.map(candle).collect()
}

#[derive(Default)]
struct MockExchange {
    symbols: Option<Vec<SymbolInfo>>,
    klines: HashMap<String, Vec<Candle>>,
    failing: Vec<String>,
    requests: RefCell<Vec<(String, String, u32)>>,
}

impl MockExchange {
    fn with_symbols(symbols: &[&str]) -> Self {
        Self {
            symbols: Some(
                symbols
                    .iter()
                    .map(|symbol| SymbolInfo::new(*symbol, "TRADING"))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    fn klines(mut self, pair: &str, rows: Vec<Candle>) -> Self {
        self.klines.insert(pair.to_string(), rows);
        self
    }

    fn failing(mut self, pair: &str) -> Self {
        self.failing.push(pair.to_string());
        self
    }

    fn requested_pairs(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|(symbol, _, _)| symbol.clone())
            .collect()
    }
}

impl Exchange for MockExchange {
    fn fetch_symbols(&self) -> Result<Vec<SymbolInfo>> {
        self.symbols
            .clone()
            .ok_or_else(|| Error::new("http request failed: connection refused"))
    }

    fn fetch_klines(&self, req: &CandleRequest) -> Result<Vec<Candle>> {
        self.requests
            .borrow_mut()
            .push((req.symbol.clone(), req.interval.clone(), req.limit));
        if self.failing.contains(&req.symbol) {
            return Err(Error::new("binance response status: 400 Bad Request"));
        }
        let mut rows = self.klines.get(&req.symbol).cloned().unwrap_or_default();
        let keep_from = rows.len().saturating_sub(req.limit as usize);
        Ok(rows.split_off(keep_from))
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8")
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn leveraged_tokens_are_never_processed() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT", "ETHUPUSDT"])
        .klines("BTCUSDT", candles(0..3))
        .klines("ETHUPUSDT", candles(0..3));
    let mut storage = SqliteStorage::open_in_memory().expect("open");
    let mut ctx = SyncContext::new(&exchange, &mut storage, SyncSettings::default());

    let report = run_sync(&mut ctx);

    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.pairs[0].pair, "BTCUSDT");
    assert_eq!(exchange.requested_pairs(), vec!["BTCUSDT".to_string()]);
    assert!(storage.table_name("BTCUSDT").is_ok());
    assert_eq!(storage.row_count("BTCUSDT").expect("count"), 3);
}

#[test]
fn discovery_failure_means_no_work() {
    let exchange = MockExchange::default();
    assert!(discover_pairs(&exchange, &PairFilter::default()).is_empty());

    let mut storage = SqliteStorage::open_in_memory().expect("open");
    let mut ctx = SyncContext::new(&exchange, &mut storage, SyncSettings::default());
    let report = run_sync(&mut ctx);

    assert!(report.is_empty());
    assert!(exchange.requested_pairs().is_empty());
}

#[test]
fn fetcher_keeps_only_candles_strictly_after_cutoff() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..5));
    let request = HistoryRequest::new("BTCUSDT").since(Some(day(2)));

    let fetched = fetch_history(&exchange, &request).expect("fetch");

    let open_times: Vec<NaiveDateTime> = fetched.iter().map(|c| c.open_time).collect();
    assert_eq!(open_times, vec![day(3), day(4)]);
    assert!(fetched.iter().all(|c| c.open_time > day(2)));
}

#[test]
fn fetcher_without_cutoff_returns_latest_limit_rows() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..8));
    let mut request = HistoryRequest::new("BTCUSDT");
    request.limit = 5;

    let fetched = fetch_history(&exchange, &request).expect("fetch");

    assert_eq!(fetched.len(), 5);
    assert_eq!(fetched[0].open_time, day(3));
    assert_eq!(
        exchange.requests.borrow()[0],
        ("BTCUSDT".to_string(), "1d".to_string(), 5)
    );
}

#[test]
fn fetcher_returns_empty_when_nothing_is_newer() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..3));
    let request = HistoryRequest::new("BTCUSDT").since(Some(day(2)));
    assert!(fetch_history(&exchange, &request).expect("fetch").is_empty());
    assert!(filter_newer(candles(0..3), Some(day(10))).is_empty());
    assert_eq!(filter_newer(candles(0..3), None).len(), 3);
}

fn fetch_with_logs(exchange: &MockExchange, request: &HistoryRequest<'_>) -> (Vec<Candle>, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let fetched = tracing::subscriber::with_default(subscriber, || {
        fetch_history(exchange, request).expect("fetch")
    });
    (fetched, buffer.contents())
}

#[test]
fn full_page_starting_past_the_next_candle_warns_about_a_gap() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..6));
    let mut request = HistoryRequest::new("BTCUSDT").since(Some(day(0)));
    request.limit = 3;

    let (fetched, logs) = fetch_with_logs(&exchange, &request);

    let open_times: Vec<NaiveDateTime> = fetched.iter().map(|c| c.open_time).collect();
    assert_eq!(open_times, vec![day(3), day(4), day(5)]);
    assert!(logs.contains("WARN"));
    assert!(logs.contains("history gap"));
    assert!(logs.contains("BTCUSDT"));
}

#[test]
fn full_page_starting_at_the_next_candle_is_not_a_gap() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..4));
    let mut request = HistoryRequest::new("BTCUSDT").since(Some(day(0)));
    request.limit = 3;

    let (fetched, logs) = fetch_with_logs(&exchange, &request);

    let open_times: Vec<NaiveDateTime> = fetched.iter().map(|c| c.open_time).collect();
    assert_eq!(open_times, vec![day(1), day(2), day(3)]);
    assert!(!logs.contains("history gap"));
}

#[test]
fn second_run_without_new_data_adds_nothing() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT", "ETHUSDT"])
        .klines("BTCUSDT", candles(0..4))
        .klines("ETHUSDT", candles(0..2));
    let mut storage = SqliteStorage::open_in_memory().expect("open");

    let first = run_sync(&mut SyncContext::new(&exchange, &mut storage, SyncSettings::default()));
    assert_eq!(first.rows_added(), 6);

    let second = run_sync(&mut SyncContext::new(&exchange, &mut storage, SyncSettings::default()));
    assert_eq!(second.rows_added(), 0);
    assert!(second
        .pairs
        .iter()
        .all(|result| result.outcome == PairOutcome::UpToDate));
    assert_eq!(storage.row_count("BTCUSDT").expect("count"), 4);
    assert_eq!(storage.row_count("ETHUSDT").expect("count"), 2);
}

#[test]
fn later_runs_append_only_newer_candles() {
    let mut storage = SqliteStorage::open_in_memory().expect("open");

    let early = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..3));
    let mut ctx = SyncContext::new(&early, &mut storage, SyncSettings::default());
    assert_eq!(sync_pair(&mut ctx, "BTCUSDT").expect("first sync"), 3);

    let later = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..6));
    let mut ctx = SyncContext::new(&later, &mut storage, SyncSettings::default());
    assert_eq!(sync_pair(&mut ctx, "BTCUSDT").expect("second sync"), 3);

    let stored = storage.load_candles("BTCUSDT").expect("load");
    let open_times: Vec<NaiveDateTime> = stored.iter().map(|c| c.open_time).collect();
    assert_eq!(open_times, (0..6).map(day).collect::<Vec<_>>());
}

#[test]
fn one_failing_pair_does_not_stop_the_others() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT", "ETHUSDT", "SOLUSDT"])
        .klines("BTCUSDT", candles(0..2))
        .klines("SOLUSDT", candles(0..3))
        .failing("ETHUSDT");
    let mut storage = SqliteStorage::open_in_memory().expect("open");

    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || {
        let mut ctx = SyncContext::new(&exchange, &mut storage, SyncSettings::default());
        run_sync(&mut ctx)
    });

    assert_eq!(report.pairs.len(), 3);
    assert_eq!(report.pairs[0].outcome, PairOutcome::Added(2));
    assert!(matches!(report.pairs[1].outcome, PairOutcome::Failed(_)));
    assert_eq!(report.pairs[2].outcome, PairOutcome::Added(3));
    assert_eq!(report.failures().len(), 1);

    let logs = buffer.contents();
    let error_lines: Vec<&str> = logs.lines().filter(|line| line.contains("ERROR")).collect();
    assert_eq!(error_lines.len(), 1);
    assert!(error_lines[0].contains("Error retrieving data for ETHUSDT"));
    assert!(logs.contains("Adding trading pair: BTCUSDT - Rows added: 2"));
    assert!(logs.contains("Adding trading pair: SOLUSDT - Rows added: 3"));

    // The failed pair's table exists but holds nothing.
    assert_eq!(storage.row_count("ETHUSDT").expect("count"), 0);
}

#[test]
fn up_to_date_pairs_log_no_new_rows() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", Vec::new());
    let mut storage = SqliteStorage::open_in_memory().expect("open");

    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let report = tracing::subscriber::with_default(subscriber, || {
        run_sync(&mut SyncContext::new(&exchange, &mut storage, SyncSettings::default()))
    });

    assert_eq!(report.pairs[0].outcome, PairOutcome::UpToDate);
    assert!(buffer
        .contents()
        .contains("Adding trading pair: BTCUSDT - No new rows added"));
}

#[test]
fn settings_interval_and_limit_reach_the_exchange() {
    let exchange = MockExchange::with_symbols(&["BTCUSDT"]).klines("BTCUSDT", candles(0..10));
    let mut storage = SqliteStorage::open_in_memory().expect("open");
    let settings = SyncSettings {
        interval: "4h".to_string(),
        limit: 4,
        ..SyncSettings::default()
    };

    let report = run_sync(&mut SyncContext::new(&exchange, &mut storage, settings));

    assert_eq!(report.rows_added(), 4);
    assert_eq!(
        exchange.requests.borrow()[0],
        ("BTCUSDT".to_string(), "4h".to_string(), 4)
    );
}

#[test]
fn interrupted_runs_resume_from_the_database_file() {
    let mut path = env::temp_dir();
    path.push(format!("kline_sync_{}_resume.db", std::process::id()));
    let _ = fs::remove_file(&path);

    let exchange = MockExchange::with_symbols(&["BTCUSDT", "ETHUSDT"])
        .klines("BTCUSDT", candles(0..3))
        .klines("ETHUSDT", candles(0..3));

    {
        let mut storage = SqliteStorage::open(&path).expect("open");
        let mut ctx = SyncContext::new(&exchange, &mut storage, SyncSettings::default());
        sync_pair(&mut ctx, "BTCUSDT").expect("partial run");
    }

    let mut storage = SqliteStorage::open(&path).expect("reopen");
    let report = run_sync(&mut SyncContext::new(&exchange, &mut storage, SyncSettings::default()));
    assert_eq!(report.pairs[0].outcome, PairOutcome::UpToDate);
    assert_eq!(report.pairs[1].outcome, PairOutcome::Added(3));
    assert_eq!(storage.row_count("BTCUSDT").expect("count"), 3);

    drop(storage);
    let _ = fs::remove_file(&path);
}
