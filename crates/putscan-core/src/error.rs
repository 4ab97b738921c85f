use thiserror::Error;

/// Validation errors raised at the request boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker cannot be empty")]
    EmptyTicker,
    #[error("ticker length {len} exceeds max {max}")]
    TickerTooLong { len: usize, max: usize },
    #[error("ticker must start with an ASCII letter: '{ch}'")]
    TickerInvalidStart { ch: char },
    #[error("ticker contains invalid character '{ch}' at index {index}")]
    TickerInvalidChar { ch: char, index: usize },

    #[error("invalid scan mode '{value}', expected 'regular' or 'afterhours'")]
    InvalidMode { value: String },
}

/// Failures raised by the quote/chain client.
///
/// Every variant is absorbed at the per-ticker scan boundary; a failing
/// ticker contributes zero hits and never aborts a batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("no spot price available for {ticker}")]
    NoPriceAvailable { ticker: String },

    #[error("upstream fetch failed: {0}")]
    Upstream(String),

    #[error("failed to decode upstream payload: {0}")]
    Parse(String),
}

impl ChainError {
    pub fn no_price(ticker: impl Into<String>) -> Self {
        Self::NoPriceAvailable {
            ticker: ticker.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

/// Fatal configuration problems. Only surfaced at process startup; the
/// scan path itself never raises these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("universe override file not found: {path}")]
    UniverseMissing { path: String },
}
