//! The shared view aggregator.
//!
//! Watches the current user's inbound share list and keeps one live
//! subscription per sharing owner, producing a per-owner event map for
//! combined display. Subscriptions are rebuilt whenever the inbound list
//! changes and every spawned task is owned by the aggregator, so stopping
//! it releases everything; failure to resolve one owner never cancels the
//! others.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::error::JunctureResult;
use crate::event::Event;
use crate::store::{CalendarDoc, SharedStore};

/// One sharing owner's mirrored calendar, as currently known.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerCalendar {
    pub owner_email: String,
    /// `None` until the owner has published at least once.
    pub calendar_id: Option<String>,
    pub events: Vec<Event>,
    pub synced_at: Option<DateTime<Utc>>,
}

type OwnerMap = BTreeMap<String, OwnerCalendar>;
type OwnerTasks = Arc<StdMutex<HashMap<String, JoinHandle<()>>>>;

pub struct SharedViewAggregator {
    data: Arc<RwLock<OwnerMap>>,
    revision_tx: watch::Sender<u64>,
    owner_tasks: OwnerTasks,
    root_task: StdMutex<Option<JoinHandle<()>>>,
}

impl SharedViewAggregator {
    /// Start aggregating for the given user. Runs until [`stop`] or drop.
    ///
    /// [`stop`]: SharedViewAggregator::stop
    pub async fn start<S>(store: S, uid: &str) -> JunctureResult<Self>
    where
        S: SharedStore + Clone + 'static,
    {
        let data: Arc<RwLock<OwnerMap>> = Arc::new(RwLock::new(BTreeMap::new()));
        let (revision_tx, _) = watch::channel(0u64);
        let owner_tasks: OwnerTasks = Arc::new(StdMutex::new(HashMap::new()));

        let mut profile_rx = store.watch_profile(uid).await?;

        let root = {
            let data = Arc::clone(&data);
            let revision_tx = revision_tx.clone();
            let owner_tasks = Arc::clone(&owner_tasks);
            tokio::spawn(async move {
                loop {
                    let inbound: Vec<String> = profile_rx
                        .borrow_and_update()
                        .as_ref()
                        .map(|p| p.shared_with_me.clone())
                        .unwrap_or_default();

                    sync_owner_subscriptions(&store, &inbound, &data, &owner_tasks, &revision_tx)
                        .await;

                    if profile_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
        };

        Ok(SharedViewAggregator {
            data,
            revision_tx,
            owner_tasks,
            root_task: StdMutex::new(Some(root)),
        })
    }

    /// The combined view, one entry per sharing owner, keyed by email.
    pub async fn snapshot(&self) -> Vec<OwnerCalendar> {
        self.data.read().await.values().cloned().collect()
    }

    /// A revision counter bumped on every change to the combined view.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Tear down the inbound-list subscription and every per-owner
    /// subscription.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.root_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        if let Ok(mut tasks) = self.owner_tasks.lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

impl Drop for SharedViewAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reconcile the running per-owner subscriptions against the inbound list:
/// tear down owners no longer sharing, subscribe to new ones.
async fn sync_owner_subscriptions<S>(
    store: &S,
    inbound: &[String],
    data: &Arc<RwLock<OwnerMap>>,
    owner_tasks: &OwnerTasks,
    revision_tx: &watch::Sender<u64>,
) where
    S: SharedStore + Clone + 'static,
{
    // Tear down removed owners first.
    let stale: Vec<String> = {
        let tasks = owner_tasks.lock().expect("owner task lock poisoned");
        tasks
            .keys()
            .filter(|email| !inbound.contains(email))
            .cloned()
            .collect()
    };
    if !stale.is_empty() {
        {
            let mut tasks = owner_tasks.lock().expect("owner task lock poisoned");
            for email in &stale {
                if let Some(handle) = tasks.remove(email) {
                    handle.abort();
                }
            }
        }
        let mut map = data.write().await;
        for email in &stale {
            map.remove(email);
        }
        drop(map);
        revision_tx.send_modify(|r| *r += 1);
    }

    for email in inbound {
        let already_watching = owner_tasks
            .lock()
            .expect("owner task lock poisoned")
            .contains_key(email);
        if already_watching {
            continue;
        }

        // Per-owner failures are isolated: log and move on.
        let owner_uid = match store.find_uid_by_email(email).await {
            Ok(Some(uid)) => uid,
            Ok(None) => {
                tracing::warn!(owner = %email, "sharing owner has no account, skipping");
                continue;
            }
            Err(err) => {
                tracing::warn!(owner = %email, %err, "could not resolve sharing owner");
                continue;
            }
        };
        let calendar_rx = match store.watch_calendar(&owner_uid).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::warn!(owner = %email, %err, "could not subscribe to owner calendar");
                continue;
            }
        };

        let handle = tokio::spawn(owner_loop(
            email.clone(),
            calendar_rx,
            Arc::clone(data),
            revision_tx.clone(),
        ));
        owner_tasks
            .lock()
            .expect("owner task lock poisoned")
            .insert(email.clone(), handle);
    }
}

/// Mirror one owner's calendar document into the combined map.
async fn owner_loop(
    owner_email: String,
    mut calendar_rx: watch::Receiver<Option<CalendarDoc>>,
    data: Arc<RwLock<OwnerMap>>,
    revision_tx: watch::Sender<u64>,
) {
    loop {
        let doc = calendar_rx.borrow_and_update().clone();
        let entry = OwnerCalendar {
            owner_email: owner_email.clone(),
            calendar_id: doc.as_ref().map(|d| d.calendar_id.clone()),
            events: doc.as_ref().map(|d| d.events.clone()).unwrap_or_default(),
            synced_at: doc.as_ref().map(|d| d.synced_at),
        };
        data.write().await.insert(owner_email.clone(), entry);
        revision_tx.send_modify(|r| *r += 1);

        if calendar_rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MirrorPublisher;
    use crate::store::{MemoryStore, UserProfile};
    use std::time::Duration;

    fn event(id: &str) -> Event {
        Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            location: None,
            description: None,
            when: None,
            participants: vec![],
        }
    }

    /// Wait for the aggregator view to satisfy a condition, bounded so a
    /// regression fails fast instead of hanging.
    async fn wait_for<F>(aggregator: &SharedViewAggregator, mut condition: F) -> Vec<OwnerCalendar>
    where
        F: FnMut(&[OwnerCalendar]) -> bool,
    {
        let mut revision_rx = aggregator.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let view = aggregator.snapshot().await;
                if condition(&view) {
                    return view;
                }
                revision_rx.changed().await.expect("aggregator gone");
            }
        })
        .await
        .expect("condition not reached in time")
    }

    #[tokio::test]
    async fn test_aggregator_sees_granted_calendar() {
        let store = MemoryStore::new();
        store
            .put_profile(&UserProfile::new("uid-a", "a@x.com", None))
            .await
            .unwrap();
        store
            .put_profile(&UserProfile::new("uid-b", "b@x.com", None))
            .await
            .unwrap();

        let publisher = MirrorPublisher::new(store.clone());
        publisher.publish("uid-a", &[event("1")], "cal-a").await.unwrap();
        publisher.grant("uid-a", "b@x.com").await.unwrap();

        let aggregator = SharedViewAggregator::start(store.clone(), "uid-b")
            .await
            .unwrap();

        let view = wait_for(&aggregator, |v| {
            v.iter().any(|o| o.owner_email == "a@x.com" && o.events.len() == 1)
        })
        .await;
        assert_eq!(view[0].calendar_id, Some("cal-a".to_string()));

        aggregator.stop();
    }

    #[tokio::test]
    async fn test_aggregator_follows_republished_events() {
        let store = MemoryStore::new();
        store
            .put_profile(&UserProfile::new("uid-a", "a@x.com", None))
            .await
            .unwrap();
        store
            .put_profile(&UserProfile::new("uid-b", "b@x.com", None))
            .await
            .unwrap();

        let publisher = MirrorPublisher::new(store.clone());
        publisher.grant("uid-a", "b@x.com").await.unwrap();
        publisher.publish("uid-a", &[event("1")], "cal-a").await.unwrap();

        let aggregator = SharedViewAggregator::start(store.clone(), "uid-b")
            .await
            .unwrap();
        wait_for(&aggregator, |v| v.iter().any(|o| o.events.len() == 1)).await;

        publisher
            .publish("uid-a", &[event("1"), event("2")], "cal-a")
            .await
            .unwrap();
        wait_for(&aggregator, |v| v.iter().any(|o| o.events.len() == 2)).await;

        aggregator.stop();
    }

    #[tokio::test]
    async fn test_revoke_tears_down_owner_subscription() {
        let store = MemoryStore::new();
        store
            .put_profile(&UserProfile::new("uid-a", "a@x.com", None))
            .await
            .unwrap();
        store
            .put_profile(&UserProfile::new("uid-b", "b@x.com", None))
            .await
            .unwrap();

        let publisher = MirrorPublisher::new(store.clone());
        publisher.publish("uid-a", &[event("1")], "cal-a").await.unwrap();
        publisher.grant("uid-a", "b@x.com").await.unwrap();

        let aggregator = SharedViewAggregator::start(store.clone(), "uid-b")
            .await
            .unwrap();
        wait_for(&aggregator, |v| !v.is_empty()).await;

        publisher.revoke("uid-a", "b@x.com").await.unwrap();
        wait_for(&aggregator, |v| v.is_empty()).await;

        aggregator.stop();
    }

    #[tokio::test]
    async fn test_unresolvable_owner_does_not_block_others() {
        let store = MemoryStore::new();
        store
            .put_profile(&UserProfile::new("uid-a", "a@x.com", None))
            .await
            .unwrap();
        // uid-b's inbound list names an owner with no account alongside a
        // real one.
        let mut viewer = UserProfile::new("uid-b", "b@x.com", None);
        viewer.shared_with_me = vec!["ghost@x.com".to_string(), "a@x.com".to_string()];
        store.put_profile(&viewer).await.unwrap();

        let publisher = MirrorPublisher::new(store.clone());
        publisher.publish("uid-a", &[event("1")], "cal-a").await.unwrap();

        let aggregator = SharedViewAggregator::start(store.clone(), "uid-b")
            .await
            .unwrap();
        let view = wait_for(&aggregator, |v| v.iter().any(|o| o.owner_email == "a@x.com")).await;

        assert!(view.iter().all(|o| o.owner_email != "ghost@x.com"));
        aggregator.stop();
    }
}
