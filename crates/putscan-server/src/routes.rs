//! HTTP routes for the scan service.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /api/health` | Liveness probe |
//! | `GET /api/scan` | Batch scan, JSON |
//! | `GET /api/scan.csv` | Same scan rendered as CSV |
//! | `GET /api/scan/stream` | SSE event stream with 15 s heartbeats |
//! | `GET /api/diag/:ticker` | Single-ticker pipeline diagnostics |
//! | `POST /api/universe/refresh` | Invalidate the universe file cache |

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use time::OffsetDateTime;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use putscan_core::{
    Hit, ScanOptions, ScanRunner, ScanStats, Ticker, TickerStatsEntry, UniverseProvider,
};

use crate::error::ServerError;
use crate::params::ScanParams;

/// Heartbeat interval for streaming scans (comment-only frames).
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
/// Client reconnect hint, sent once at connection start.
const RETRY_HINT: Duration = Duration::from_millis(3000);
/// Hits echoed back by the diagnostic surface.
const DIAG_SAMPLE: usize = 5;

pub struct AppState {
    pub runner: ScanRunner,
    pub universe: UniverseProvider,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/scan", get(scan))
        .route("/api/scan.csv", get(scan_csv))
        .route("/api/scan/stream", get(scan_stream))
        .route("/api/diag/:ticker", get(diag))
        .route("/api/universe/refresh", post(universe_refresh))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ScanResponse {
    mode: &'static str,
    total_tickers: usize,
    returned: usize,
    filters: ScanOptions,
    results: Vec<Hit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stats: Vec<TickerStatsEntry>,
}

#[derive(Debug, Serialize)]
struct DiagResponse {
    ticker: Ticker,
    stats: ScanStats,
    sample_hits: Vec<Hit>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "ts": OffsetDateTime::now_utc().unix_timestamp(),
    }))
}

async fn scan(
    State(state): State<SharedState>,
    Query(params): Query<ScanParams>,
) -> Result<Json<ScanResponse>, ServerError> {
    let response = run_batch(&state, &params).await?;
    Ok(Json(response))
}

async fn scan_csv(
    State(state): State<SharedState>,
    Query(params): Query<ScanParams>,
) -> Result<impl IntoResponse, ServerError> {
    let response = run_batch(&state, &params).await?;
    let body = crate::csv::render(&response.results)?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        body,
    ))
}

async fn run_batch(state: &AppState, params: &ScanParams) -> Result<ScanResponse, ServerError> {
    let options = params.scan_options()?;
    let tickers = state.universe.resolve(params.tickers.as_deref()).await;
    let total_tickers = tickers.len();
    tracing::info!(
        total_tickers,
        mode = options.mode.as_str(),
        concurrency = params.concurrency(),
        "starting batch scan"
    );

    let outcome = state
        .runner
        .run_scan(
            tickers,
            options.clone(),
            params.concurrency(),
            params.limit(),
            None,
        )
        .await;

    Ok(ScanResponse {
        mode: options.mode.as_str(),
        total_tickers,
        returned: outcome.results.len(),
        filters: options,
        results: outcome.results,
        stats: outcome.stats,
    })
}

async fn diag(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
) -> Result<Json<DiagResponse>, ServerError> {
    let ticker = Ticker::parse(&raw)?;
    let scan = state
        .runner
        .scan_one(&ticker, &ScanOptions::diagnostic())
        .await;

    let mut sample_hits = scan.hits;
    sample_hits.truncate(DIAG_SAMPLE);

    Ok(Json(DiagResponse {
        ticker: scan.ticker,
        stats: scan.stats,
        sample_hits,
    }))
}

async fn scan_stream(
    State(state): State<SharedState>,
    Query(params): Query<ScanParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ServerError> {
    let options = params.scan_options()?;
    let tickers = state.universe.resolve(params.tickers.as_deref()).await;
    let concurrency = params.concurrency();
    let limit = params.limit();

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = state.runner.clone();

    // The scan owns the sender. A dropped client closes the channel, which
    // stops event delivery; in-flight upstream calls still complete and
    // their results are discarded.
    tokio::spawn(async move {
        let _ = runner
            .run_scan(tickers, options, concurrency, limit, Some(tx))
            .await;
    });

    let retry = tokio_stream::once(Ok::<Event, axum::Error>(Event::default().retry(RETRY_HINT)));
    let events = UnboundedReceiverStream::new(rx)
        .map(|event| Event::default().event(event.label()).json_data(&event));

    Ok(Sse::new(retry.chain(events))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

async fn universe_refresh(State(state): State<SharedState>) -> Json<serde_json::Value> {
    state.universe.invalidate().await;
    Json(serde_json::json!({ "status": "refreshed" }))
}
