//! Concurrent scan orchestration.
//!
//! A bounded pool of logical workers shares a single atomic cursor over the
//! ticker list: each worker claims the next index, scans that ticker, and
//! appends hits to a shared accumulator. No index is processed twice, no
//! worker idles while tickers remain, and a single ticker's failure never
//! aborts the batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chain::{expiry_date, ChainClient};
use crate::config::ScanOptions;
use crate::domain::{Hit, ScanStats, Ticker, TickerScan};
use crate::error::ChainError;
use crate::events::{emit, EventSink, ProgressGate, ScanEvent};
use crate::filter;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 16;
pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 5000;

/// Clamp a requested worker count into `[1, 16]`.
pub fn clamp_concurrency(requested: i64) -> usize {
    requested.clamp(MIN_CONCURRENCY as i64, MAX_CONCURRENCY as i64) as usize
}

/// Clamp a requested result cap into `[1, 5000]`.
pub fn clamp_limit(requested: i64) -> usize {
    requested.clamp(MIN_LIMIT as i64, MAX_LIMIT as i64) as usize
}

/// Sort hits descending by richness ratio. Infinite ratios (zero
/// theoretical price) rank first; ties keep discovery order.
pub fn rank_hits(hits: &mut Vec<Hit>) {
    hits.sort_by(|a, b| {
        b.ratio
            .partial_cmp(&a.ratio)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Aggregate outcome of a batch scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Ranked, truncated hits.
    pub results: Vec<Hit>,
    /// Per-ticker counters, collected only when `debug` is set.
    pub stats: Vec<TickerStatsEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStatsEntry {
    pub ticker: Ticker,
    pub stats: ScanStats,
}

/// Drives per-ticker scans over a universe.
#[derive(Clone)]
pub struct ScanRunner {
    client: Arc<ChainClient>,
}

impl ScanRunner {
    pub fn new(client: Arc<ChainClient>) -> Self {
        Self { client }
    }

    /// Scan one ticker. Never errors: any failure in the fetch/filter
    /// sequence degrades to an empty hit list, with the reason captured as
    /// a stats note.
    pub async fn scan_one(&self, ticker: &Ticker, options: &ScanOptions) -> TickerScan {
        let mut stats = ScanStats::default();
        let hits = match self.scan_ticker(ticker, options, &mut stats).await {
            Ok(hits) => hits,
            Err(error) => {
                stats.note(error.to_string());
                Vec::new()
            }
        };
        TickerScan {
            ticker: ticker.clone(),
            hits,
            stats,
        }
    }

    async fn scan_ticker(
        &self,
        ticker: &Ticker,
        options: &ScanOptions,
        stats: &mut ScanStats,
    ) -> Result<Vec<Hit>, ChainError> {
        self.pace(options).await;
        let summary = self.client.fetch_expirations(ticker).await?;
        let spot = self
            .client
            .resolve_spot(ticker, options.mode, summary.quote.as_ref())
            .await?;

        let today = OffsetDateTime::now_utc().date();
        let mut hits = Vec::new();

        for &epoch in summary.expirations.iter().take(options.max_exp) {
            let dte = (expiry_date(epoch)? - today).whole_days();
            if dte < 0 || dte > i64::from(options.max_dte) {
                // Out of window: skipped without issuing a fetch.
                continue;
            }

            stats.expiries += 1;
            self.pace(options).await;
            let contracts = self.client.fetch_chain(ticker, epoch).await?;

            for contract in &contracts {
                if let Some(hit) = filter::evaluate(ticker, contract, spot, dte, options, stats) {
                    hits.push(hit);
                }
            }
        }

        Ok(hits)
    }

    async fn pace(&self, options: &ScanOptions) {
        if options.sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.sleep_ms)).await;
        }
    }

    /// Run a full scan over `tickers` with a bounded worker pool, emitting
    /// the event protocol into `events` when attached. Returns the ranked,
    /// truncated result set.
    pub async fn run_scan(
        &self,
        tickers: Vec<Ticker>,
        options: ScanOptions,
        concurrency: usize,
        limit: usize,
        events: Option<EventSink>,
    ) -> ScanOutcome {
        let total = tickers.len();
        emit(
            events.as_ref(),
            ScanEvent::Start {
                scan_id: Uuid::new_v4(),
                tickers: total,
                filters: options.clone(),
            },
        );

        let tickers = Arc::new(tickers);
        let options = Arc::new(options);
        let cursor = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(Mutex::new(Vec::<Hit>::new()));
        let stats = Arc::new(Mutex::new(Vec::<TickerStatsEntry>::new()));
        let gate = Arc::new(ProgressGate::default());

        let workers = concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let runner = self.clone();
            let tickers = Arc::clone(&tickers);
            let options = Arc::clone(&options);
            let cursor = Arc::clone(&cursor);
            let done = Arc::clone(&done);
            let hits = Arc::clone(&hits);
            let stats = Arc::clone(&stats);
            let gate = Arc::clone(&gate);
            let events = events.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= tickers.len() {
                        break;
                    }

                    let scan = runner.scan_one(&tickers[index], &options).await;
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;

                    if !scan.hits.is_empty() {
                        let running_total = {
                            let mut all = hits.lock().await;
                            all.extend(scan.hits.iter().cloned());
                            all.len()
                        };
                        emit(
                            events.as_ref(),
                            ScanEvent::Hits {
                                ticker: scan.ticker.clone(),
                                count: scan.hits.len(),
                                total: running_total,
                            },
                        );
                    }

                    if options.debug {
                        stats.lock().await.push(TickerStatsEntry {
                            ticker: scan.ticker,
                            stats: scan.stats,
                        });
                    }

                    if gate.ready() {
                        emit(
                            events.as_ref(),
                            ScanEvent::Progress {
                                done: finished,
                                total,
                                pct: finished as f64 * 100.0 / total.max(1) as f64,
                            },
                        );
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let mut results = std::mem::take(&mut *hits.lock().await);
        rank_hits(&mut results);
        results.truncate(limit.clamp(MIN_LIMIT, MAX_LIMIT));

        emit(
            events.as_ref(),
            ScanEvent::Done {
                returned: results.len(),
                results: results.clone(),
            },
        );

        let stats = std::mem::take(&mut *stats.lock().await);
        ScanOutcome { results, stats }
    }
}
