//! Partition and session keys.
//!
//! A `PartitionKey` is the `(domain, year, month, day, hour)` coordinate of
//! one BundleGroup. The same coordinate without the hour addresses the
//! Manifest of that day. Both the storage path and the in-memory cache key
//! are derived from it, so the mapping must stay deterministic.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{Error, Result};
use crate::events::RawEvent;

/// Storage file name of the per-day manifest.
pub const MANIFEST_FILE: &str = ".manifest.json";

/// Hourly storage coordinate. `month` is 1-based, all fields are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub domain: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl PartitionKey {
    pub fn new(domain: impl Into<String>, year: i32, month: u32, day: u32, hour: u32) -> Self {
        Self {
            domain: domain.into(),
            year,
            month,
            day,
            hour,
        }
    }

    /// Builds the key for an epoch-millisecond timestamp interpreted in UTC.
    pub fn from_time(domain: impl Into<String>, time_ms: i64) -> Result<Self> {
        let ts = Utc
            .timestamp_millis_opt(time_ms)
            .single()
            .ok_or(Error::InvalidTimestamp(time_ms))?;

        Ok(Self::new(domain, ts.year(), ts.month(), ts.day(), ts.hour()))
    }

    /// Key of the primary (non-virtual) partition an event belongs to.
    pub fn for_event(event: &RawEvent) -> Result<Self> {
        Self::from_time(event.partition_domain()?, event.time)
    }

    /// Same day and domain, different hour.
    pub fn with_hour(&self, hour: u32) -> Self {
        Self {
            hour,
            ..self.clone()
        }
    }

    /// Same time coordinate, different domain.
    pub fn with_domain(&self, domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..self.clone()
        }
    }

    /// The same hour on the previous calendar day.
    pub fn previous_day(&self) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.pred_opt()?;
        Some(Self::new(
            self.domain.clone(),
            date.year(),
            date.month(),
            date.day(),
            self.hour,
        ))
    }

    /// Start of this hour.
    pub fn slot_start(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, 0, 0)
            .single()
    }

    /// `{domain}/{year}/{month}/{day}`: cache key of the day's manifest.
    pub fn day_key(&self) -> String {
        format!("{}/{}/{}/{}", self.domain, self.year, self.month, self.day)
    }

    /// `{domain}/{year}/{month}/{day}/{hour}`: cache key of the hour's group.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.day_key(), self.hour)
    }

    pub fn manifest_path(&self) -> String {
        format!("{}/{}", self.day_key(), MANIFEST_FILE)
    }

    pub fn bundle_group_path(&self) -> String {
        format!("{}/{}.json", self.day_key(), self.hour)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Session key of a primary event: `{id}--{path}`.
pub fn session_key(event: &RawEvent) -> Result<String> {
    let url = event.parsed_url()?;
    Ok(format!("{}--{}", event.id, url.path()))
}

/// Session key of a virtual-routed copy: `{id}--{hostname}--{path}`.
///
/// A virtual partition aggregates many source domains, so the hostname is
/// part of the key to keep two sites' visits apart.
pub fn virtual_session_key(event: &RawEvent) -> Result<String> {
    let url = event.parsed_url()?;
    let hostname = url
        .host_str()
        .map(str::to_string)
        .or_else(|| event.host.clone())
        .unwrap_or_default();
    Ok(format!("{}--{}--{}", event.id, hostname, url.path()))
}
