use crate::models::{Candle, STORED_TIMESTAMP_FORMAT};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub const DEFAULT_TABLE_PREFIX: &str = "pair_";

/// One append-only candle table per pair in a single SQLite file.
pub struct SqliteStorage {
    conn: Connection,
    table_prefix: String,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|err| Error::new(format!("sqlite open failed for {}: {err}", path.display())))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| Error::new(format!("sqlite open failed: {err}")))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Pair symbols are interpolated into SQL, so only ASCII alphanumerics pass.
    pub fn table_name(&self, pair: &str) -> Result<String> {
        if pair.is_empty() || !pair.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(Error::new(format!("invalid pair identifier: {pair:?}")));
        }
        Ok(format!("{}{}", self.table_prefix, pair))
    }

    pub fn ensure_table(&self, pair: &str) -> Result<()> {
        let table = self.table_name(pair)?;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    open_time TIMESTAMP,
                    open REAL,
                    high REAL,
                    low REAL,
                    close REAL,
                    volume REAL,
                    close_time TIMESTAMP,
                    num_trades INTEGER
                )"
            ))
            .map_err(|err| Error::new(format!("create table {table} failed: {err}")))
    }

    /// Latest stored `open_time`, or `None` for an empty table.
    pub fn latest_open_time(&self, pair: &str) -> Result<Option<NaiveDateTime>> {
        let table = self.table_name(pair)?;
        let latest: Option<String> = self
            .conn
            .query_row(&format!("SELECT MAX(open_time) FROM \"{table}\""), [], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()
            .map_err(|err| Error::new(format!("select max(open_time) from {table} failed: {err}")))?
            .flatten();

        latest.as_deref().map(parse_stored_timestamp).transpose()
    }

    /// Appends all candles in one transaction and returns the number of rows written.
    pub fn append_candles(&mut self, pair: &str, candles: &[Candle]) -> Result<usize> {
        if candles.is_empty() {
            return Ok(0);
        }
        let table = self.table_name(pair)?;
        let tx = self
            .conn
            .transaction()
            .map_err(|err| Error::new(format!("sqlite transaction failed: {err}")))?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO \"{table}\" \
                     (open_time, open, high, low, close, volume, close_time, num_trades) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ))
                .map_err(|err| Error::new(format!("prepare insert into {table} failed: {err}")))?;

            for candle in candles {
                stmt.execute(params![
                    candle.open_time.format(STORED_TIMESTAMP_FORMAT).to_string(),
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume,
                    candle.close_time.format(STORED_TIMESTAMP_FORMAT).to_string(),
                    candle.num_trades,
                ])
                .map_err(|err| Error::new(format!("insert into {table} failed: {err}")))?;
            }
        }
        tx.commit()
            .map_err(|err| Error::new(format!("sqlite commit failed: {err}")))?;
        Ok(candles.len())
    }

    pub fn row_count(&self, pair: &str) -> Result<usize> {
        let table = self.table_name(pair)?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
            .map_err(|err| Error::new(format!("count rows in {table} failed: {err}")))?;
        Ok(count as usize)
    }

    /// Stored rows in `open_time` order.
    pub fn load_candles(&self, pair: &str) -> Result<Vec<Candle>> {
        let table = self.table_name(pair)?;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT open_time, open, high, low, close, volume, close_time, num_trades \
                 FROM \"{table}\" ORDER BY open_time ASC"
            ))
            .map_err(|err| Error::new(format!("prepare select from {table} failed: {err}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .map_err(|err| Error::new(format!("select from {table} failed: {err}")))?;

        let mut candles = Vec::new();
        for row in rows {
            let (open_time, open, high, low, close, volume, close_time, num_trades) =
                row.map_err(|err| Error::new(format!("read row from {table} failed: {err}")))?;
            candles.push(Candle {
                open_time: parse_stored_timestamp(&open_time)?,
                open,
                high,
                low,
                close,
                volume,
                close_time: parse_stored_timestamp(&close_time)?,
                num_trades,
            });
        }
        Ok(candles)
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` with optional fractional seconds, which also
/// covers timestamps written by pandas `to_sql`.
pub fn parse_stored_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|err| Error::new(format!("invalid stored timestamp {trimmed:?}: {err}")))
}
