//! Quote/chain client for the unofficial Yahoo-style options API.
//!
//! All calls go through the [`HttpClient`] abstraction so tests can script
//! responses. The client holds the cookie/crumb session state (the API
//! refuses crumb-less requests) and a circuit breaker; the scan path itself
//! performs no retries — a stale crumb is invalidated so the *next* call
//! refreshes it, and the failing ticker degrades to zero hits.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use time::{Date, OffsetDateTime};

use crate::breaker::Breaker;
use crate::config::ScanMode;
use crate::domain::{OptionContract, Ticker};
use crate::error::ChainError;
use crate::http_client::{HttpClient, HttpRequest};

const QUERY_HOST: &str = "https://query2.finance.yahoo.com";
const CRUMB_HOSTS: [&str; 2] = [
    "https://query1.finance.yahoo.com",
    "https://query2.finance.yahoo.com",
];
const SESSION_URL: &str = "https://fc.yahoo.com";
const REFERER: &str = "https://finance.yahoo.com/";
const CRUMB_TTL: Duration = Duration::from_secs(3600);
const FETCH_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Crumb session state
// ============================================================================

#[derive(Debug, Clone)]
struct CachedCrumb {
    value: String,
    fetched_at: Instant,
}

/// Cookie/crumb session manager. The session cookie lives in the transport's
/// jar; only the crumb token is cached here.
#[derive(Debug, Default)]
struct CrumbManager {
    crumb: Mutex<Option<CachedCrumb>>,
}

impl CrumbManager {
    fn cached(&self) -> Option<String> {
        self.crumb
            .lock()
            .expect("crumb lock is not poisoned")
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < CRUMB_TTL)
            .map(|c| c.value.clone())
    }

    fn store(&self, value: String) {
        *self.crumb.lock().expect("crumb lock is not poisoned") = Some(CachedCrumb {
            value,
            fetched_at: Instant::now(),
        });
    }

    fn invalidate(&self) {
        *self.crumb.lock().expect("crumb lock is not poisoned") = None;
    }

    async fn get(&self, http: &Arc<dyn HttpClient>) -> Result<String, ChainError> {
        if let Some(crumb) = self.cached() {
            return Ok(crumb);
        }

        // Visiting the session host seeds the cookie jar the crumb endpoint
        // validates against.
        let session = HttpRequest::get(SESSION_URL)
            .with_header("referer", REFERER)
            .with_timeout_ms(FETCH_TIMEOUT_MS);
        http.execute(session).await.map_err(|e| {
            ChainError::upstream(format!("session cookie fetch failed: {}", e.message()))
        })?;

        for host in CRUMB_HOSTS {
            let request = HttpRequest::get(format!("{host}/v1/test/getcrumb"))
                .with_header("referer", REFERER)
                .with_timeout_ms(FETCH_TIMEOUT_MS);

            match http.execute(request).await {
                Ok(response) if response.is_success() => {
                    let body = response.body.trim();
                    if looks_like_crumb(body) {
                        self.store(body.to_owned());
                        return Ok(body.to_owned());
                    }
                }
                _ => continue,
            }
        }

        Err(ChainError::upstream("failed to obtain session crumb"))
    }
}

fn looks_like_crumb(body: &str) -> bool {
    !body.is_empty()
        && body.len() < 100
        && !body.contains(' ')
        && !body.contains("<html")
        && !body.contains("<!DOCTYPE")
}

// ============================================================================
// Chain client
// ============================================================================

/// Price fields embedded in chain and quote responses.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuoteFields {
    #[serde(rename = "regularMarketPrice", default)]
    pub regular_market_price: Option<f64>,
    #[serde(rename = "regularMarketPreviousClose", default)]
    pub regular_market_previous_close: Option<f64>,
    #[serde(rename = "postMarketPrice", default)]
    pub post_market_price: Option<f64>,
    #[serde(rename = "preMarketPrice", default)]
    pub pre_market_price: Option<f64>,
}

impl QuoteFields {
    /// First finite positive candidate, in fallback order: regular price,
    /// previous close, post-market, pre-market.
    pub fn best_price(&self) -> Option<f64> {
        [
            self.regular_market_price,
            self.regular_market_previous_close,
            self.post_market_price,
            self.pre_market_price,
        ]
        .into_iter()
        .flatten()
        .find(|p| p.is_finite() && *p > 0.0)
    }
}

/// Expirations and embedded quote from the date-less options call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainSummary {
    /// Ascending, non-zero expiration epochs.
    pub expirations: Vec<i64>,
    pub quote: Option<QuoteFields>,
}

/// Options-chain and spot-price retrieval for one upstream session.
pub struct ChainClient {
    http: Arc<dyn HttpClient>,
    crumb: CrumbManager,
    breaker: Breaker,
}

impl ChainClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            crumb: CrumbManager::default(),
            breaker: Breaker::default(),
        }
    }

    /// Fetch the expiration list (plus embedded quote) for a ticker.
    pub async fn fetch_expirations(&self, ticker: &Ticker) -> Result<ChainSummary, ChainError> {
        let crumb = self.crumb.get(&self.http).await?;
        let url = format!(
            "{QUERY_HOST}/v7/finance/options/{}?crumb={}",
            urlencoding::encode(ticker.as_str()),
            urlencoding::encode(&crumb)
        );
        let body = self.get_body(url).await?;
        let payload = parse_options_payload(&body)?;

        let mut expirations: Vec<i64> = payload
            .expiration_dates
            .into_iter()
            .filter(|&epoch| epoch > 0)
            .collect();
        expirations.sort_unstable();

        Ok(ChainSummary {
            expirations,
            quote: payload.quote,
        })
    }

    /// Fetch the put chain for one expiry.
    pub async fn fetch_chain(
        &self,
        ticker: &Ticker,
        expiry_epoch: i64,
    ) -> Result<Vec<OptionContract>, ChainError> {
        let crumb = self.crumb.get(&self.http).await?;
        let url = format!(
            "{QUERY_HOST}/v7/finance/options/{}?date={}&crumb={}",
            urlencoding::encode(ticker.as_str()),
            expiry_epoch,
            urlencoding::encode(&crumb)
        );
        let body = self.get_body(url).await?;
        let payload = parse_options_payload(&body)?;
        let expiration = expiry_date(expiry_epoch)?;

        let block = {
            let mut blocks = payload.options;
            let matching = blocks
                .iter()
                .position(|b| b.expiration_date == expiry_epoch)
                .unwrap_or(0);
            if blocks.is_empty() {
                None
            } else {
                Some(blocks.swap_remove(matching))
            }
        };

        Ok(block
            .map(|b| {
                b.puts
                    .into_iter()
                    .filter_map(|p| contract_from_wire(p, expiration))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Resolve the spot price for a ticker. Fallback chain, first finite
    /// positive value wins: embedded chain quote, direct quote lookup, and
    /// (afterhours only) the summary endpoint's previous close.
    pub async fn resolve_spot(
        &self,
        ticker: &Ticker,
        mode: ScanMode,
        embedded: Option<&QuoteFields>,
    ) -> Result<f64, ChainError> {
        if let Some(price) = embedded.and_then(QuoteFields::best_price) {
            return Ok(price);
        }

        if let Ok(Some(price)) = self.quote_lookup(ticker).await {
            return Ok(price);
        }

        if mode == ScanMode::Afterhours {
            if let Ok(Some(price)) = self.summary_lookup(ticker).await {
                return Ok(price);
            }
        }

        Err(ChainError::no_price(ticker.as_str()))
    }

    async fn quote_lookup(&self, ticker: &Ticker) -> Result<Option<f64>, ChainError> {
        let crumb = self.crumb.get(&self.http).await?;
        let url = format!(
            "{QUERY_HOST}/v7/finance/quote?symbols={}&crumb={}",
            urlencoding::encode(ticker.as_str()),
            urlencoding::encode(&crumb)
        );
        let body = self.get_body(url).await?;

        let envelope: QuoteEnvelope = serde_json::from_str(&body)
            .map_err(|e| ChainError::parse(format!("quote response: {e}")))?;
        Ok(envelope
            .quote_response
            .result
            .unwrap_or_default()
            .first()
            .and_then(QuoteFields::best_price))
    }

    async fn summary_lookup(&self, ticker: &Ticker) -> Result<Option<f64>, ChainError> {
        let crumb = self.crumb.get(&self.http).await?;
        let url = format!(
            "{QUERY_HOST}/v10/finance/quoteSummary/{}?modules=summaryDetail%2Cprice&crumb={}",
            urlencoding::encode(ticker.as_str()),
            urlencoding::encode(&crumb)
        );
        let body = self.get_body(url).await?;

        let envelope: SummaryEnvelope = serde_json::from_str(&body)
            .map_err(|e| ChainError::parse(format!("summary response: {e}")))?;
        let payload = match envelope.quote_summary.result.unwrap_or_default().pop() {
            Some(payload) => payload,
            None => return Ok(None),
        };

        let previous_close = payload
            .summary_detail
            .and_then(|d| d.previous_close)
            .and_then(|v| v.raw)
            .or_else(|| {
                payload
                    .price
                    .and_then(|p| p.regular_market_previous_close)
                    .and_then(|v| v.raw)
            });

        Ok(previous_close.filter(|p| p.is_finite() && *p > 0.0))
    }

    async fn get_body(&self, url: String) -> Result<String, ChainError> {
        if !self.breaker.check() {
            return Err(ChainError::upstream("chain circuit breaker is open"));
        }

        let request = HttpRequest::get(&url)
            .with_header("referer", REFERER)
            .with_timeout_ms(FETCH_TIMEOUT_MS);

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                self.breaker.failure();
                return Err(ChainError::upstream(error.message().to_owned()));
            }
        };

        if response.status == 401 || response.status == 429 {
            // Stale crumb or throttle. Invalidate so the next call starts a
            // fresh session; this call still fails.
            self.breaker.failure();
            self.crumb.invalidate();
            return Err(ChainError::upstream(format!(
                "upstream returned status {}",
                response.status
            )));
        }

        if !response.is_success() {
            self.breaker.failure();
            return Err(ChainError::upstream(format!(
                "upstream returned status {}",
                response.status
            )));
        }

        self.breaker.success();
        Ok(response.body)
    }
}

/// Calendar date of an expiration epoch (UTC).
pub fn expiry_date(epoch: i64) -> Result<Date, ChainError> {
    OffsetDateTime::from_unix_timestamp(epoch)
        .map(|dt| dt.date())
        .map_err(|e| ChainError::parse(format!("expiration epoch {epoch}: {e}")))
}

// ============================================================================
// Wire formats
// ============================================================================

#[derive(Debug, Deserialize)]
struct OptionsEnvelope {
    #[serde(rename = "optionChain")]
    option_chain: OptionsBody,
}

#[derive(Debug, Deserialize)]
struct OptionsBody {
    #[serde(default)]
    result: Option<Vec<OptionsPayload>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OptionsPayload {
    #[serde(rename = "expirationDates", default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    quote: Option<QuoteFields>,
    #[serde(default)]
    options: Vec<OptionsBlock>,
}

#[derive(Debug, Deserialize)]
struct OptionsBlock {
    #[serde(rename = "expirationDate", default)]
    expiration_date: i64,
    #[serde(default)]
    puts: Vec<WirePut>,
}

#[derive(Debug, Deserialize)]
struct WirePut {
    #[serde(rename = "contractSymbol", default)]
    contract_symbol: String,
    #[serde(default)]
    strike: f64,
    #[serde(default)]
    bid: Option<f64>,
    #[serde(default)]
    ask: Option<f64>,
    #[serde(rename = "lastPrice", default)]
    last_price: Option<f64>,
    #[serde(rename = "impliedVolatility", default)]
    implied_volatility: Option<f64>,
    #[serde(default)]
    volume: Option<u64>,
    #[serde(rename = "openInterest", default)]
    open_interest: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Option<Vec<QuoteFields>>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryPayload>>,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    #[serde(rename = "summaryDetail", default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    price: Option<SummaryPrice>,
}

#[derive(Debug, Deserialize)]
struct SummaryDetail {
    #[serde(rename = "previousClose", default)]
    previous_close: Option<WrappedValue>,
}

#[derive(Debug, Deserialize)]
struct SummaryPrice {
    #[serde(rename = "regularMarketPreviousClose", default)]
    regular_market_previous_close: Option<WrappedValue>,
}

/// Summary-module numbers arrive wrapped in `{raw, fmt}` objects.
#[derive(Debug, Deserialize)]
struct WrappedValue {
    #[serde(default)]
    raw: Option<f64>,
}

fn parse_options_payload(body: &str) -> Result<OptionsPayload, ChainError> {
    let envelope: OptionsEnvelope = serde_json::from_str(body)
        .map_err(|e| ChainError::parse(format!("options response: {e}")))?;

    if let Some(error) = &envelope.option_chain.error {
        if !error.is_null() {
            return Err(ChainError::upstream(format!("chain API error: {error}")));
        }
    }

    let mut results = envelope.option_chain.result.unwrap_or_default();
    if results.is_empty() {
        return Err(ChainError::parse("empty options result"));
    }
    Ok(results.remove(0))
}

fn contract_from_wire(put: WirePut, expiration: Date) -> Option<OptionContract> {
    if !(put.strike.is_finite() && put.strike > 0.0) {
        return None;
    }
    Some(OptionContract {
        contract_symbol: put.contract_symbol,
        strike: put.strike,
        expiration,
        bid: put.bid,
        ask: put.ask,
        last_price: put.last_price,
        implied_volatility: put.implied_volatility,
        volume: put.volume.unwrap_or(0),
        open_interest: put.open_interest.unwrap_or(0),
    })
}
