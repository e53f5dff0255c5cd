//! Raw RUM events as they arrive in the log files, and the trimmed form
//! stored inside a bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use validator::Validate;

use crate::error::{Error, Result};
use crate::limits::DEFAULT_WEIGHT;

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

/// One telemetry observation, one line of a raw log file.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Opaque visitor/session token
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    /// Event type tag (`top`, `click`, `cwv`, ...)
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Epoch milliseconds
    #[validate(range(min = 1))]
    pub time: i64,
    #[serde(default)]
    pub host: Option<String>,
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    #[serde(default, alias = "user_agent")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    /// Inverse sampling rate
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Source domain, only set on virtual-routed copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Host family of the source domain, only set on collapsed copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
    #[serde(default, rename = "CLS", skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
    #[serde(default, rename = "LCP", skip_serializing_if = "Option::is_none")]
    pub lcp: Option<f64>,
    #[serde(default, rename = "FID", skip_serializing_if = "Option::is_none")]
    pub fid: Option<f64>,
    #[serde(default, rename = "INP", skip_serializing_if = "Option::is_none")]
    pub inp: Option<f64>,
    #[serde(default, rename = "TTFB", skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<f64>,
}

impl Default for RawEvent {
    fn default() -> Self {
        Self {
            id: String::new(),
            checkpoint: None,
            time: 0,
            host: None,
            url: String::new(),
            user_agent: None,
            referer: None,
            weight: DEFAULT_WEIGHT,
            domain: None,
            host_type: None,
            value: None,
            source: None,
            target: None,
            cls: None,
            lcp: None,
            fid: None,
            inp: None,
            ttfb: None,
        }
    }
}

impl RawEvent {
    /// Runs the field validations and maps them onto our error type.
    pub fn validate_event(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::validation(format!("event {}: {}", self.id, e)))
    }

    pub fn parsed_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|e| Error::invalid_url(format!("{}: {}", self.url, e)))
    }

    /// Domain of the primary partition: the reported host, or the URL's
    /// host when the collector did not record one.
    pub fn partition_domain(&self) -> Result<String> {
        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            return Ok(host.to_string());
        }
        self.parsed_url()?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| Error::missing_field("host"))
    }

    pub fn checkpoint(&self) -> &str {
        self.checkpoint.as_deref().unwrap_or_default()
    }

    /// The Core Web Vitals reading carried by a `cwv` event, if any.
    pub fn cwv_metric(&self) -> Option<(CwvMetric, f64)> {
        CwvMetric::ALL
            .iter()
            .find_map(|metric| self.metric(*metric).map(|value| (*metric, value)))
    }

    fn metric(&self, metric: CwvMetric) -> Option<f64> {
        match metric {
            CwvMetric::Cls => self.cls,
            CwvMetric::Lcp => self.lcp,
            CwvMetric::Fid => self.fid,
            CwvMetric::Inp => self.inp,
            CwvMetric::Ttfb => self.ttfb,
        }
    }
}

/// Core Web Vitals metrics recognised on `cwv` checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwvMetric {
    Cls,
    Lcp,
    Fid,
    Inp,
    Ttfb,
}

impl CwvMetric {
    pub const ALL: [CwvMetric; 5] = [Self::Cls, Self::Lcp, Self::Fid, Self::Inp, Self::Ttfb];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cls => "cls",
            Self::Lcp => "lcp",
            Self::Fid => "fid",
            Self::Inp => "inp",
            Self::Ttfb => "ttfb",
        }
    }
}

/// Checkpoint name of raw Core Web Vitals events.
pub const CWV_CHECKPOINT: &str = "cwv";

/// Trimmed projection of a raw event, as stored inside a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub checkpoint: String,
    /// Milliseconds since the bundle's time slot
    pub time_delta: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
}

impl Event {
    /// Projects a raw event relative to the bundle's time slot.
    ///
    /// `cwv` events become `cwv-<metric>` with the reading as value; a bare
    /// `cwv` with no recognised metric keeps only checkpoint and delta.
    pub fn trim(raw: &RawEvent, time_slot: DateTime<Utc>) -> Self {
        let time_delta = raw.time - time_slot.timestamp_millis();

        if raw.checkpoint() == CWV_CHECKPOINT {
            return match raw.cwv_metric() {
                Some((metric, reading)) => Self {
                    checkpoint: format!("{}-{}", CWV_CHECKPOINT, metric.as_str()),
                    time_delta,
                    value: Some(metric_value(reading)),
                    source: None,
                    target: None,
                },
                None => Self {
                    checkpoint: CWV_CHECKPOINT.to_string(),
                    time_delta,
                    value: None,
                    source: None,
                    target: None,
                },
            };
        }

        Self {
            checkpoint: raw.checkpoint().to_string(),
            time_delta,
            value: non_null(&raw.value),
            source: non_null(&raw.source),
            target: non_null(&raw.target),
        }
    }
}

fn non_null(value: &Option<Value>) -> Option<Value> {
    value.as_ref().filter(|v| !v.is_null()).cloned()
}

/// Integral readings are stored as JSON integers (`2500`, not `2500.0`).
fn metric_value(reading: f64) -> Value {
    if reading.fract() == 0.0 && reading.abs() < i64::MAX as f64 {
        Value::from(reading as i64)
    } else {
        serde_json::Number::from_f64(reading)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
