//! Canonical domain types for the scan engine.

pub mod models;
pub mod ticker;

pub use models::{Hit, OptionContract, PriceSource, ScanStats, TickerScan};
pub use ticker::Ticker;
