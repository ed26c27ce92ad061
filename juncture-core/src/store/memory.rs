//! In-memory shared store.
//!
//! All documents live under one `RwLock`, which is what makes
//! `apply_share_change` atomic here: the owner profile, viewer profile and
//! calendar document mutate inside a single write-lock scope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use crate::error::{JunctureError, JunctureResult};
use crate::store::{
    push_unique, remove_all, CalendarDoc, ShareAction, ShareChange, SharedStore, UserProfile,
};

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, UserProfile>,
    calendars: HashMap<String, CalendarDoc>,
    user_watch: HashMap<String, watch::Sender<Option<UserProfile>>>,
    calendar_watch: HashMap<String, watch::Sender<Option<CalendarDoc>>>,
}

impl MemoryInner {
    fn notify_user(&mut self, uid: &str) {
        if let Some(tx) = self.user_watch.get(uid) {
            tx.send_replace(self.users.get(uid).cloned());
        }
    }

    fn notify_calendar(&mut self, uid: &str) {
        if let Some(tx) = self.calendar_watch.get(uid) {
            tx.send_replace(self.calendars.get(uid).cloned());
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get_profile(&self, uid: &str) -> JunctureResult<Option<UserProfile>> {
        Ok(self.inner.read().await.users.get(uid).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> JunctureResult<()> {
        let mut inner = self.inner.write().await;
        inner.users.insert(profile.uid.clone(), profile.clone());
        inner.notify_user(&profile.uid);
        Ok(())
    }

    async fn find_uid_by_email(&self, email: &str) -> JunctureResult<Option<String>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|p| p.email == email)
            .map(|p| p.uid.clone()))
    }

    async fn get_calendar(&self, uid: &str) -> JunctureResult<Option<CalendarDoc>> {
        Ok(self.inner.read().await.calendars.get(uid).cloned())
    }

    async fn put_calendar(&self, uid: &str, doc: &CalendarDoc) -> JunctureResult<()> {
        let mut inner = self.inner.write().await;
        inner.calendars.insert(uid.to_string(), doc.clone());
        inner.notify_calendar(uid);
        Ok(())
    }

    async fn apply_share_change(&self, change: &ShareChange) -> JunctureResult<()> {
        let mut inner = self.inner.write().await;

        if !inner.users.contains_key(&change.owner_uid) {
            return Err(JunctureError::Store(format!(
                "no profile for owner '{}'",
                change.owner_uid
            )));
        }
        if !inner.users.contains_key(&change.viewer_uid) {
            return Err(JunctureError::Store(format!(
                "no profile for viewer '{}'",
                change.viewer_uid
            )));
        }

        let now = chrono::Utc::now();

        let owner = inner.users.get_mut(&change.owner_uid).expect("checked above");
        match change.action {
            ShareAction::Grant => push_unique(&mut owner.shared_with_others, &change.viewer_email),
            ShareAction::Revoke => remove_all(&mut owner.shared_with_others, &change.viewer_email),
        }
        owner.updated_at = Some(now);
        let outbound = owner.shared_with_others.clone();

        let viewer = inner.users.get_mut(&change.viewer_uid).expect("checked above");
        match change.action {
            ShareAction::Grant => push_unique(&mut viewer.shared_with_me, &change.owner_email),
            ShareAction::Revoke => remove_all(&mut viewer.shared_with_me, &change.owner_email),
        }
        viewer.updated_at = Some(now);

        if let Some(calendar) = inner.calendars.get_mut(&change.owner_uid) {
            calendar.shared_with = outbound;
        }

        inner.notify_user(&change.owner_uid);
        inner.notify_user(&change.viewer_uid);
        inner.notify_calendar(&change.owner_uid);
        Ok(())
    }

    async fn watch_profile(
        &self,
        uid: &str,
    ) -> JunctureResult<watch::Receiver<Option<UserProfile>>> {
        let mut inner = self.inner.write().await;
        let current = inner.users.get(uid).cloned();
        let tx = inner
            .user_watch
            .entry(uid.to_string())
            .or_insert_with(|| watch::channel(current).0);
        Ok(tx.subscribe())
    }

    async fn watch_calendar(
        &self,
        uid: &str,
    ) -> JunctureResult<watch::Receiver<Option<CalendarDoc>>> {
        let mut inner = self.inner.write().await;
        let current = inner.calendars.get(uid).cloned();
        let tx = inner
            .calendar_watch
            .entry(uid.to_string())
            .or_insert_with(|| watch::channel(current).0);
        Ok(tx.subscribe())
    }
}
