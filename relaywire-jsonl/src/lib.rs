//! JSONL sink for `relaywire`. Implements [`relaywire::EventListener`] and
//! writes one JSON object per line, synchronously, on the calling thread.
//! Always writes; the caller brings its own path. A plain trait method is
//! enough here since `relaywire`'s events are synchronous notifications
//! rather than requests flowing through a layered service stack.

use relaywire::{Event, EventListener};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;

/// Appends one JSON line per event to the file at `path`. The file is
/// opened once at construction and held behind a mutex so concurrent
/// callers don't interleave partial lines.
pub struct JsonlSink {
    file: Mutex<std::fs::File>,
}

impl JsonlSink {
    /// Opens (creating if needed) the file at `path` for appending.
    pub fn new<S: AsRef<std::path::Path>>(path: S) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl EventListener for JsonlSink {
    fn on_event(&self, event: &Event) {
        let line = event_to_json(event).to_string() + "\n";
        let mut file = self.file.lock().expect("jsonl sink file mutex poisoned");
        if let Err(err) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!(error = %err, "failed to write relaywire event to jsonl sink");
        }
    }
}

fn event_to_json(event: &Event) -> serde_json::Value {
    match event {
        Event::RateLimited => json!({ "kind": "rate_limited" }),
        Event::CircuitOpened { endpoint_id, failure_count } => {
            json!({ "kind": "circuit_opened", "endpoint_id": endpoint_id, "failure_count": failure_count })
        }
        Event::CircuitHalfOpen { endpoint_id } => {
            json!({ "kind": "circuit_half_open", "endpoint_id": endpoint_id })
        }
        Event::CircuitClosed { endpoint_id } => {
            json!({ "kind": "circuit_closed", "endpoint_id": endpoint_id })
        }
        Event::EndpointMarkedUnhealthy { endpoint_id, consecutive_failures } => json!({
            "kind": "endpoint_marked_unhealthy",
            "endpoint_id": endpoint_id,
            "consecutive_failures": consecutive_failures,
        }),
        Event::EndpointRecovered { endpoint_id } => {
            json!({ "kind": "endpoint_recovered", "endpoint_id": endpoint_id })
        }
        Event::CacheHit { method } => json!({ "kind": "cache_hit", "method": method }),
        Event::CacheMiss { method } => json!({ "kind": "cache_miss", "method": method }),
        Event::CallSucceeded { endpoint_id, method, latency_ms } => json!({
            "kind": "call_succeeded",
            "endpoint_id": endpoint_id,
            "method": method,
            "latency_ms": latency_ms,
        }),
        Event::CallFailed { endpoint_id, method, kind } => json!({
            "kind": "call_failed",
            "endpoint_id": endpoint_id,
            "method": method,
            "error_kind": kind.to_string(),
        }),
    }
}
