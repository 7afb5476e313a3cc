pub mod history;
pub mod klines;
pub mod pairs;
