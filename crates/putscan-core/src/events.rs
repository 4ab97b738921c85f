//! Push-based progress/result event protocol for long-running scans.
//!
//! Exactly one `start` event opens a stream and exactly one `done` event
//! terminates it; `hits` and `progress` events interleave in between with
//! no cross-ticker ordering guarantee. Progress is rate-limited through
//! [`ProgressGate`]. Heartbeats are owned by the transport (SSE keep-alive
//! comments), not modeled here.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ScanOptions;
use crate::domain::{Hit, Ticker};

/// Minimum wall-time spacing between `progress` events.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Event stream protocol for a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanEvent {
    /// Emitted exactly once, before any other event.
    Start {
        scan_id: Uuid,
        tickers: usize,
        filters: ScanOptions,
    },
    /// One per ticker that yielded at least one hit.
    Hits {
        ticker: Ticker,
        count: usize,
        total: usize,
    },
    /// Rate-limited completion counter.
    Progress { done: usize, total: usize, pct: f64 },
    /// Emitted exactly once; terminates the stream.
    Done { returned: usize, results: Vec<Hit> },
}

impl ScanEvent {
    /// Wire label used as the SSE event name.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Hits { .. } => "hits",
            Self::Progress { .. } => "progress",
            Self::Done { .. } => "done",
        }
    }
}

/// Sender half of a scan event stream. A dropped receiver makes every send
/// a silent no-op, which is exactly the disconnect behavior the scan wants:
/// in-flight work completes and its events are discarded.
pub type EventSink = mpsc::UnboundedSender<ScanEvent>;

/// Deliver an event if a sink is attached, ignoring closed channels.
pub fn emit(sink: Option<&EventSink>, event: ScanEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event);
    }
}

/// Wall-clock throttle for progress events: `ready()` answers true at most
/// once per interval. The first call always passes.
#[derive(Debug)]
pub struct ProgressGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ProgressGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn ready(&self) -> bool {
        let mut last = self.last.lock().expect("progress gate lock is not poisoned");
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for ProgressGate {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tags() {
        let event = ScanEvent::Progress {
            done: 5,
            total: 20,
            pct: 25.0,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["done"], 5);
        assert_eq!(event.label(), "progress");
    }

    #[test]
    fn gate_passes_once_per_interval() {
        let gate = ProgressGate::new(Duration::from_millis(200));
        assert!(gate.ready());
        assert!(!gate.ready());

        std::thread::sleep(Duration::from_millis(220));
        assert!(gate.ready());
        assert!(!gate.ready());
    }

    #[test]
    fn emit_ignores_dropped_receivers() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(
            Some(&tx),
            ScanEvent::Progress {
                done: 1,
                total: 2,
                pct: 50.0,
            },
        );
        emit(None, ScanEvent::Done {
            returned: 0,
            results: Vec::new(),
        });
    }
}
