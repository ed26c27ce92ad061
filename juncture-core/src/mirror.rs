//! The remote mirror publisher.
//!
//! Pushes the merged local event set to the shared store as a full
//! replacement of the owner's mirrored document (overwrite, not merge:
//! every successful sync cycle rewrites the whole snapshot, trading write
//! efficiency for zero drift), and manages share grants between users.

use chrono::Utc;

use crate::error::{JunctureError, JunctureResult};
use crate::event::Event;
use crate::store::{CalendarDoc, ShareAction, ShareChange, SharedStore, UserProfile};

/// Outcome of a grant request. Granting an existing share is reported, not
/// re-applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    AlreadyShared,
}

/// Outcome of a revoke request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    NotShared,
}

pub struct MirrorPublisher<S> {
    store: S,
}

impl<S: SharedStore> MirrorPublisher<S> {
    pub fn new(store: S) -> Self {
        MirrorPublisher { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Overwrite the owner's mirrored document and update the sync metadata
    /// on their profile.
    pub async fn publish(
        &self,
        uid: &str,
        events: &[Event],
        calendar_id: &str,
    ) -> JunctureResult<()> {
        let mut profile = self.require_profile(uid).await?;

        // The outbound share list rides along on the calendar document so
        // viewers can check visibility without a second lookup.
        let shared_with = profile.shared_with_others.clone();
        let now = Utc::now();

        self.store
            .put_calendar(
                uid,
                &CalendarDoc {
                    events: events.to_vec(),
                    calendar_id: calendar_id.to_string(),
                    synced_at: now,
                    shared_with,
                },
            )
            .await?;

        profile.calendar_id = Some(calendar_id.to_string());
        profile.last_calendar_sync = Some(now);
        profile.total_events = Some(events.len());
        profile.updated_at = Some(now);
        self.store.put_profile(&profile).await?;

        tracing::info!(uid, total_events = events.len(), "mirrored calendar published");
        Ok(())
    }

    /// Share the owner's calendar with another account, by email.
    ///
    /// Resolves the viewer, reports an existing grant as
    /// [`GrantOutcome::AlreadyShared`], and otherwise applies both sides of
    /// the edge through the store's single coordinated write.
    pub async fn grant(&self, owner_uid: &str, viewer_email: &str) -> JunctureResult<GrantOutcome> {
        let owner = self.require_profile(owner_uid).await?;

        if owner.shared_with_others.iter().any(|e| e == viewer_email) {
            return Ok(GrantOutcome::AlreadyShared);
        }

        let change = self.resolve_change(&owner, viewer_email, ShareAction::Grant).await?;
        self.store.apply_share_change(&change).await?;
        tracing::info!(owner = %owner.email, viewer = viewer_email, "calendar shared");
        Ok(GrantOutcome::Granted)
    }

    /// Symmetric removal of a share edge.
    pub async fn revoke(
        &self,
        owner_uid: &str,
        viewer_email: &str,
    ) -> JunctureResult<RevokeOutcome> {
        let owner = self.require_profile(owner_uid).await?;

        if !owner.shared_with_others.iter().any(|e| e == viewer_email) {
            return Ok(RevokeOutcome::NotShared);
        }

        let change = self
            .resolve_change(&owner, viewer_email, ShareAction::Revoke)
            .await?;
        self.store.apply_share_change(&change).await?;
        tracing::info!(owner = %owner.email, viewer = viewer_email, "calendar share revoked");
        Ok(RevokeOutcome::Revoked)
    }

    async fn require_profile(&self, uid: &str) -> JunctureResult<UserProfile> {
        self.store
            .get_profile(uid)
            .await?
            .ok_or_else(|| JunctureError::Store(format!("no profile for '{uid}'")))
    }

    async fn resolve_change(
        &self,
        owner: &UserProfile,
        viewer_email: &str,
        action: ShareAction,
    ) -> JunctureResult<ShareChange> {
        let viewer_uid = self
            .store
            .find_uid_by_email(viewer_email)
            .await?
            .ok_or_else(|| JunctureError::ShareTargetNotFound(viewer_email.to_string()))?;

        Ok(ShareChange {
            owner_uid: owner.uid.clone(),
            owner_email: owner.email.clone(),
            viewer_uid,
            viewer_email: viewer_email.to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn store_with_users() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put_profile(&UserProfile::new("uid-a", "a@x.com", Some("Alice".into())))
            .await
            .unwrap();
        store
            .put_profile(&UserProfile::new("uid-b", "b@x.com", Some("Bob".into())))
            .await
            .unwrap();
        store
    }

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

    #[tokio::test]
    async fn test_publish_overwrites_document_and_metadata() {
        let store = store_with_users().await;
        let publisher = MirrorPublisher::new(store.clone());

        publisher
            .publish("uid-a", &[event("1"), event("2")], "cal-a")
            .await
            .unwrap();
        // Second publish replaces, never appends.
        publisher.publish("uid-a", &[event("3")], "cal-a").await.unwrap();

        let doc = store.get_calendar("uid-a").await.unwrap().unwrap();
        assert_eq!(doc.events.len(), 1);
        assert_eq!(doc.events[0].id, "3");

        let profile = store.get_profile("uid-a").await.unwrap().unwrap();
        assert_eq!(profile.total_events, Some(1));
        assert_eq!(profile.calendar_id, Some("cal-a".to_string()));
        assert!(profile.last_calendar_sync.is_some());
    }

    #[tokio::test]
    async fn test_grant_twice_shares_exactly_once() {
        let store = store_with_users().await;
        let publisher = MirrorPublisher::new(store.clone());

        assert_eq!(
            publisher.grant("uid-a", "b@x.com").await.unwrap(),
            GrantOutcome::Granted
        );
        assert_eq!(
            publisher.grant("uid-a", "b@x.com").await.unwrap(),
            GrantOutcome::AlreadyShared
        );

        let owner = store.get_profile("uid-a").await.unwrap().unwrap();
        let viewer = store.get_profile("uid-b").await.unwrap().unwrap();
        assert_eq!(owner.shared_with_others, vec!["b@x.com"]);
        assert_eq!(viewer.shared_with_me, vec!["a@x.com"]);
    }

    #[tokio::test]
    async fn test_grant_to_unknown_email_mutates_nothing() {
        let store = store_with_users().await;
        let publisher = MirrorPublisher::new(store.clone());

        match publisher.grant("uid-a", "nobody@x.com").await {
            Err(JunctureError::ShareTargetNotFound(email)) => assert_eq!(email, "nobody@x.com"),
            other => panic!("Expected ShareTargetNotFound, got {:?}", other),
        }

        let owner = store.get_profile("uid-a").await.unwrap().unwrap();
        assert!(owner.shared_with_others.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_removes_both_sides() {
        let store = store_with_users().await;
        let publisher = MirrorPublisher::new(store.clone());

        publisher.grant("uid-a", "b@x.com").await.unwrap();
        assert_eq!(
            publisher.revoke("uid-a", "b@x.com").await.unwrap(),
            RevokeOutcome::Revoked
        );
        assert_eq!(
            publisher.revoke("uid-a", "b@x.com").await.unwrap(),
            RevokeOutcome::NotShared
        );

        let owner = store.get_profile("uid-a").await.unwrap().unwrap();
        let viewer = store.get_profile("uid-b").await.unwrap().unwrap();
        assert!(owner.shared_with_others.is_empty());
        assert!(viewer.shared_with_me.is_empty());
    }

    #[tokio::test]
    async fn test_publish_carries_outbound_share_list() {
        let store = store_with_users().await;
        let publisher = MirrorPublisher::new(store.clone());

        publisher.grant("uid-a", "b@x.com").await.unwrap();
        publisher.publish("uid-a", &[event("1")], "cal-a").await.unwrap();

        let doc = store.get_calendar("uid-a").await.unwrap().unwrap();
        assert_eq!(doc.shared_with, vec!["b@x.com"]);
    }
}
