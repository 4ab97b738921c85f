use serde::{Deserialize, Serialize};
use time::Date;

use crate::Ticker;

/// Provenance of a hit's used price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Mid,
    Last,
    Intrinsic,
}

impl PriceSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mid => "mid",
            Self::Last => "last",
            Self::Intrinsic => "intrinsic",
        }
    }
}

/// Raw put contract as returned by the chain endpoint.
///
/// Bid/ask/last and implied volatility are nullable upstream; volume and
/// open interest default to zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub contract_symbol: String,
    pub strike: f64,
    pub expiration: Date,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub implied_volatility: Option<f64>,
    pub volume: u64,
    pub open_interest: u64,
}

/// Per-ticker pipeline counters.
///
/// Each kept-counter tracks survivors of one filter stage, so the chain
/// `near_kept >= priced_kept >= min_intrinsic_kept >= rich_kept >=
/// vol_oi_kept` is non-increasing for every ticker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub expiries: u32,
    pub puts_seen: u32,
    pub near_kept: u32,
    pub priced_kept: u32,
    pub min_intrinsic_kept: u32,
    pub rich_kept: u32,
    pub vol_oi_kept: u32,
    pub notes: Vec<String>,
}

impl ScanStats {
    pub const MAX_NOTES: usize = 10;

    /// Record a diagnostic note, silently dropping past the cap.
    pub fn note(&mut self, note: impl Into<String>) {
        if self.notes.len() < Self::MAX_NOTES {
            self.notes.push(note.into());
        }
    }
}

/// A contract that survived every filter stage, enriched with the derived
/// pricing fields used for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub ticker: Ticker,
    pub contract_symbol: String,
    pub strike: f64,
    pub expiration: Date,
    pub dte: i64,
    pub spot: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub used_price: f64,
    pub price_used: PriceSource,
    pub theo_price: f64,
    /// Richness ratio `used_price / theo_price`; `+inf` when the
    /// theoretical price is zero, which ranks first.
    pub ratio: f64,
    pub intrinsic_value: f64,
    pub intrinsic_gap: f64,
    pub moneyness_pct: f64,
    pub iv_pct: f64,
    pub volume: u64,
    pub open_interest: u64,
}

/// Result of scanning a single ticker. Never an error: failures degrade to
/// an empty hit list with the reason captured in `stats.notes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerScan {
    pub ticker: Ticker,
    pub hits: Vec<Hit>,
    pub stats: ScanStats,
}
