//! Session routing: which hourly bundle group an event lands in.
//!
//! A session belongs to the hour it was first seen in. Later events of the
//! same session, even hours later or after midnight, are appended to that
//! original hour's group. The per-day manifest is the registry of first
//! hours; yesterday's manifest is consulted so sessions spanning midnight
//! stay in one bundle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rum_core::{BundleGroup, Manifest, PartitionKey, RawEvent};
use telemetry::metrics;
use tracing::warn;

use crate::context::BundleContext;
use crate::enrichment::UserAgentClassifier;

/// Last hour of the day; partitions before it look back at yesterday.
const LAST_HOUR: u32 = 23;

/// Bundle groups touched by a routing pass, keyed by cache key.
pub type TouchedGroups = HashMap<String, Arc<BundleGroup>>;

/// Whether sessions in the partition of `key` may have started yesterday.
pub fn needs_lookback(key: &PartitionKey) -> bool {
    key.hour < LAST_HOUR
}

#[derive(Default)]
pub struct SessionRouter {
    classifier: UserAgentClassifier,
}

/// Outcome of routing one partition's sessions.
#[derive(Default)]
pub struct Routed {
    pub groups: TouchedGroups,
    pub events: usize,
    pub failures: usize,
}

impl SessionRouter {
    pub fn new(classifier: UserAgentClassifier) -> Self {
        Self { classifier }
    }

    /// Appends every session's events to the group of its originating hour.
    ///
    /// `key` is the partition all `sessions` fall in by event time;
    /// `manifest` is that day's manifest and `yesterday` the previous
    /// day's, when a lookback applies. New sessions are recorded in
    /// `manifest` under `key.hour`. Events that fail are logged, counted
    /// and skipped.
    pub async fn route(
        &self,
        ctx: &BundleContext,
        key: &PartitionKey,
        sessions: &BTreeMap<String, Vec<RawEvent>>,
        manifest: &Manifest,
        yesterday: Option<&Manifest>,
    ) -> Routed {
        let mut routed = Routed::default();

        for (session, events) in sessions {
            let group_key = resolve_group(key, session, manifest, yesterday);

            let group = match ctx.bundle_group(&group_key).await {
                Ok(group) => group,
                Err(e) => {
                    warn!(
                        group = %group_key,
                        session = %session,
                        error = %e,
                        "Failed to load bundle group, skipping session"
                    );
                    routed.failures += events.len();
                    continue;
                }
            };

            for event in events {
                let added = group.add_event(session, event, |e| {
                    self.classifier.classify(e.user_agent.as_deref())
                });
                match added {
                    Ok(()) => routed.events += 1,
                    Err(e) => {
                        warn!(group = %group_key, id = %event.id, error = %e, "Failed to add event");
                        routed.failures += 1;
                    }
                }
            }

            routed.groups.insert(group_key.cache_key(), group);
        }

        metrics().events_bundled.inc_by(routed.events as u64);
        metrics().route_failures.inc_by(routed.failures as u64);
        routed
    }
}

/// Today's manifest wins, then yesterday's. A session new to both is
/// recorded today under the current hour; the check and the insert are one
/// atomic step on the manifest, so concurrent partitions agree.
fn resolve_group(
    key: &PartitionKey,
    session: &str,
    manifest: &Manifest,
    yesterday: Option<&Manifest>,
) -> PartitionKey {
    if let Some(hour) = manifest.session_hour(session) {
        return key.with_hour(hour);
    }
    if let Some(previous) = yesterday {
        if let Some(hour) = previous.session_hour(session) {
            return previous.key().with_hour(hour);
        }
    }
    let hour = manifest.resolve_or_record(session, key.hour);
    key.with_hour(hour)
}
