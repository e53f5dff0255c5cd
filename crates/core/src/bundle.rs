//! Session bundles and the per-hour group that stores them.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateData};
use crate::error::{Error, Result};
use crate::events::{Event, RawEvent};
use crate::partition::PartitionKey;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// All events of one visit to one page, rolled up under one session key.
///
/// Session-level fields come from the first event seen for the key and
/// never change afterwards; `events` only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub host: String,
    pub time: DateTime<Utc>,
    /// Hour floor of `time`
    pub time_slot: DateTime<Utc>,
    pub url: String,
    pub user_agent: String,
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_type: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Bundle {
    /// Starts a bundle from the first event of a session. The event itself
    /// is not appended; callers follow up with `push`.
    pub fn from_event(event: &RawEvent, user_agent: String) -> Result<Self> {
        let time = Utc
            .timestamp_millis_opt(event.time)
            .single()
            .ok_or(Error::InvalidTimestamp(event.time))?;
        let time_slot = Utc
            .timestamp_millis_opt(event.time - event.time.rem_euclid(HOUR_MS))
            .single()
            .ok_or(Error::InvalidTimestamp(event.time))?;

        Ok(Self {
            id: event.id.clone(),
            host: event.partition_domain()?,
            time,
            time_slot,
            url: event.url.clone(),
            user_agent,
            weight: event.weight,
            domain: event.domain.clone(),
            host_type: event.host_type.clone(),
            events: Vec::new(),
        })
    }

    pub fn push(&mut self, event: &RawEvent) {
        self.events.push(Event::trim(event, self.time_slot));
    }
}

/// Stored form: `{"bundles": {sessionKey: Bundle}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleGroupData {
    #[serde(default)]
    pub bundles: BTreeMap<String, Bundle>,
}

impl AggregateData for BundleGroupData {
    const KIND: &'static str = "bundle_group";

    fn storage_path(key: &PartitionKey) -> String {
        key.bundle_group_path()
    }
}

/// One per `(domain, year, month, day, hour)`, the unit of durable storage.
pub type BundleGroup = Aggregate<BundleGroupData>;

impl Aggregate<BundleGroupData> {
    /// Appends `event` to the bundle of `session`, creating the bundle from
    /// this event when the session is new to the group. `user_agent` is only
    /// evaluated on creation.
    pub fn add_event<F>(&self, session: &str, event: &RawEvent, user_agent: F) -> Result<()>
    where
        F: FnOnce(&RawEvent) -> String,
    {
        let mut data = self.lock();
        match data.bundles.get_mut(session) {
            Some(bundle) => bundle.push(event),
            None => {
                let mut bundle = Bundle::from_event(event, user_agent(event))?;
                bundle.push(event);
                data.bundles.insert(session.to_string(), bundle);
            }
        }
        drop(data);
        self.mark_dirty();
        Ok(())
    }

    pub fn bundle(&self, session: &str) -> Option<Bundle> {
        self.lock().bundles.get(session).cloned()
    }

    pub fn bundle_count(&self) -> usize {
        self.lock().bundles.len()
    }

    pub fn event_count(&self) -> usize {
        self.lock().bundles.values().map(|b| b.events.len()).sum()
    }
}
