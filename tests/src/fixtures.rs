//! Test fixtures and event generators.

use bytes::Bytes;
use chrono::{TimeZone, Utc};

/// Epoch milliseconds of a UTC wall-clock time.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .map(|t| t.timestamp_millis())
        .unwrap_or_default()
}

/// A raw event as the collector writes it.
pub fn raw_event(id: &str, url: &str, time: i64, checkpoint: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "time": time,
        "url": url,
        "checkpoint": checkpoint,
        "weight": 1,
        "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    })
}

/// An LCP reading event.
pub fn lcp_event(id: &str, url: &str, time: i64, lcp: f64) -> serde_json::Value {
    let mut event = raw_event(id, url, time, "cwv");
    event["LCP"] = serde_json::json!(lcp);
    event
}

/// Newline-delimited JSON body of a raw log file.
pub fn ndjson(events: &[serde_json::Value]) -> Bytes {
    let mut body = String::new();
    for event in events {
        body.push_str(&event.to_string());
        body.push('\n');
    }
    Bytes::from(body)
}
