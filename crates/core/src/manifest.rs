//! Per-day registry of session key to originating hour.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateData};
use crate::partition::PartitionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub hour: u32,
}

/// Stored form: `{"sessions": {sessionKey: {"hour": N}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestData {
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionEntry>,
}

impl AggregateData for ManifestData {
    const KIND: &'static str = "manifest";

    fn storage_path(key: &PartitionKey) -> String {
        key.manifest_path()
    }

    fn normalize_key(key: PartitionKey) -> PartitionKey {
        key.with_hour(0)
    }
}

/// One per `(domain, year, month, day)`.
pub type Manifest = Aggregate<ManifestData>;

impl Aggregate<ManifestData> {
    pub fn session_hour(&self, session: &str) -> Option<u32> {
        self.lock().sessions.get(session).map(|entry| entry.hour)
    }

    pub fn has_session(&self, session: &str) -> bool {
        self.lock().sessions.contains_key(session)
    }

    /// Returns the hour recorded for `session`, recording `hour` first if
    /// the session is new. Lookup and insert happen under one lock, so two
    /// tasks racing on a new session agree on a single hour.
    pub fn resolve_or_record(&self, session: &str, hour: u32) -> u32 {
        let mut data = self.lock();
        if let Some(entry) = data.sessions.get(session) {
            return entry.hour;
        }
        data.sessions
            .insert(session.to_string(), SessionEntry { hour });
        drop(data);
        self.mark_dirty();
        hour
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}
