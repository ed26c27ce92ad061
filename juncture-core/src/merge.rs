//! The delta merge engine.
//!
//! Reconciles fetch results (full snapshots or delta pages) into the local
//! event collection. The collection is keyed by event id; order is
//! irrelevant. `apply` is idempotent: replaying the same page yields the
//! same collection, and ids are never duplicated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::{Event, EventPatch, FetchResult};

/// The local working set of events, keyed by id.
///
/// Owned exclusively by one sync session; all mutation goes through
/// [`EventCollection::apply`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventCollection {
    events: HashMap<String, Event>,
}

/// Statistics from one merge application.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ApplyStats {
    /// Accumulate stats from another ApplyStats
    pub fn add(&mut self, other: &ApplyStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }

    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0 || self.deleted > 0
    }
}

impl EventCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    /// Events sorted by id, for stable display and publishing.
    pub fn events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));
        events
    }

    /// Discard everything. Used on logout.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Apply one fetch result.
    ///
    /// A full snapshot replaces the collection wholesale. A delta applies
    /// patch by patch: tombstones remove (a tombstone for an absent id is a
    /// logged no-op), everything else upserts. Duplicate ids within one
    /// delta resolve last-writer-wins by list order.
    pub fn apply(&mut self, incoming: FetchResult) -> ApplyStats {
        let mut stats = ApplyStats::default();

        match incoming {
            FetchResult::FullSnapshot(events) => {
                let mut next: HashMap<String, Event> = HashMap::with_capacity(events.len());
                for event in events {
                    let existed = self.events.contains_key(&event.id);
                    let replaced = next.insert(event.id.clone(), event).is_some();
                    if !replaced {
                        if existed {
                            stats.updated += 1;
                        } else {
                            stats.created += 1;
                        }
                    }
                }
                stats.deleted = self
                    .events
                    .keys()
                    .filter(|id| !next.contains_key(*id))
                    .count();
                self.events = next;
            }
            FetchResult::Delta(patches) => {
                for patch in patches {
                    match patch {
                        EventPatch::Tombstone { id } => {
                            if self.events.remove(&id).is_some() {
                                stats.deleted += 1;
                            } else {
                                tracing::debug!(event_id = %id, "tombstone for absent id, no-op");
                            }
                        }
                        EventPatch::Upsert(event) => {
                            if self.events.insert(event.id.clone(), event).is_some() {
                                stats.updated += 1;
                            } else {
                                stats.created += 1;
                            }
                        }
                    }
                }
            }
        }

        stats
    }
}
