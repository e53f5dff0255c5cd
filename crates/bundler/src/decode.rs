//! Raw log file decoding.
//!
//! Raw files are newline-delimited JSON, one event per line. A line that
//! does not parse or validate is counted and skipped; it never fails the
//! file.

use rum_core::limits::MAX_LINE_BYTES;
use rum_core::RawEvent;
use telemetry::metrics;
use tracing::{debug, warn};

/// Events decoded from one raw file.
#[derive(Debug, Default)]
pub struct DecodedFile {
    pub key: String,
    pub events: Vec<RawEvent>,
    /// Non-empty lines seen
    pub lines: usize,
    pub failures: usize,
}

pub fn decode_file(key: &str, body: &[u8]) -> DecodedFile {
    let mut decoded = DecodedFile {
        key: key.to_string(),
        ..Default::default()
    };

    for (n, line) in body.split(|b| *b == b'\n').enumerate() {
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        decoded.lines += 1;

        if line.len() > MAX_LINE_BYTES {
            debug!(file = key, line = n + 1, bytes = line.len(), "Oversized line");
            decoded.failures += 1;
            continue;
        }

        let event = match serde_json::from_slice::<RawEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                debug!(file = key, line = n + 1, error = %e, "Unparseable line");
                decoded.failures += 1;
                continue;
            }
        };

        if let Err(e) = event.validate_event() {
            debug!(file = key, line = n + 1, kind = e.kind(), error = %e, "Invalid event");
            decoded.failures += 1;
            continue;
        }

        decoded.events.push(event);
    }

    metrics().lines_parsed.inc_by(decoded.lines as u64);
    if decoded.failures > 0 {
        metrics().parse_failures.inc_by(decoded.failures as u64);
        warn!(
            file = key,
            failures = decoded.failures,
            lines = decoded.lines,
            "Skipped undecodable lines"
        );
    }

    decoded
}
