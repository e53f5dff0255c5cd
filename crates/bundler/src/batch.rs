//! Grouping of decoded events by partition and session.

use std::collections::{BTreeMap, HashMap};

use rum_core::{session_key, virtual_session_key, PartitionKey, RawEvent};
use tracing::debug;

use crate::virtual_domains::VirtualRouter;

/// Events of one hourly partition, grouped by session key.
#[derive(Debug, Clone)]
pub struct PartitionBatch {
    pub key: PartitionKey,
    pub sessions: BTreeMap<String, Vec<RawEvent>>,
}

impl PartitionBatch {
    pub fn event_count(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }
}

/// Partition key -> session key -> events, in arrival order per session.
#[derive(Debug, Default)]
pub struct EventMap {
    partitions: HashMap<PartitionKey, PartitionBatch>,
}

impl EventMap {
    pub fn add(&mut self, key: PartitionKey, session: String, event: RawEvent) {
        self.partitions
            .entry(key.clone())
            .or_insert_with(|| PartitionBatch {
                key,
                sessions: BTreeMap::new(),
            })
            .sessions
            .entry(session)
            .or_default()
            .push(event);
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn event_count(&self) -> usize {
        self.partitions.values().map(PartitionBatch::event_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn get(&self, key: &PartitionKey) -> Option<&PartitionBatch> {
        self.partitions.get(key)
    }

    pub fn into_batches(self) -> Vec<PartitionBatch> {
        let mut batches: Vec<_> = self.partitions.into_values().collect();
        batches.sort_by(|a, b| a.key.cmp(&b.key));
        batches
    }
}

/// Primary and virtual event maps built from one iteration's events.
#[derive(Debug, Default)]
pub struct SplitEvents {
    pub primary: EventMap,
    pub virtual_copies: EventMap,
    /// Events with no usable partition or session key
    pub rejected: usize,
}

impl SplitEvents {
    /// Keys every event by its own partition and session, and adds one
    /// virtual copy per matching rule under the virtual session key.
    pub fn build(events: impl IntoIterator<Item = RawEvent>, router: &VirtualRouter) -> Self {
        let mut split = Self::default();

        for event in events {
            let keyed = PartitionKey::for_event(&event)
                .and_then(|key| session_key(&event).map(|session| (key, session)));
            let (key, session) = match keyed {
                Ok(keyed) => keyed,
                Err(e) => {
                    debug!(id = %event.id, error = %e, "Dropping unroutable event");
                    split.rejected += 1;
                    continue;
                }
            };

            for route in router.route(&event, &key) {
                match virtual_session_key(&route.event) {
                    Ok(session) => split.virtual_copies.add(route.key, session, route.event),
                    Err(e) => {
                        debug!(id = %event.id, error = %e, "Dropping virtual copy");
                        split.rejected += 1;
                    }
                }
            }

            split.primary.add(key, session, event);
        }

        split
    }
}
