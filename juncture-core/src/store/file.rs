//! File-backed shared store.
//!
//! Documents are JSON files under `<root>/users/<uid>.json` and
//! `<root>/calendar_events/<uid>.json`, written atomically (temp file +
//! rename). Subscriptions poll file contents on a short interval, which is
//! what lets two local processes observe each other's writes.
//!
//! `apply_share_change` holds the store's write lock across all three
//! document writes, so this store's own writers never observe a half-applied
//! share edge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::error::{JunctureError, JunctureResult};
use crate::store::{
    push_unique, remove_all, CalendarDoc, ShareAction, ShareChange, SharedStore, UserProfile,
};

const USERS_DIR: &str = "users";
const CALENDARS_DIR: &str = "calendar_events";
const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_path(&self, uid: &str) -> PathBuf {
        self.root.join(USERS_DIR).join(format!("{uid}.json"))
    }

    fn calendar_path(&self, uid: &str) -> PathBuf {
        self.root.join(CALENDARS_DIR).join(format!("{uid}.json"))
    }

    fn read_doc<T: DeserializeOwned>(path: &Path) -> JunctureResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_doc<T: Serialize>(path: &Path, doc: &T) -> JunctureResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| JunctureError::Store(format!("no parent for {}", path.display())))?;
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_string_pretty(doc)?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, contents)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }

    /// Poll a document file and push changes into a watch channel until the
    /// last receiver is gone.
    fn spawn_watch<T>(&self, path: PathBuf) -> JunctureResult<watch::Receiver<Option<T>>>
    where
        T: DeserializeOwned + PartialEq + Clone + Send + Sync + 'static,
    {
        let initial: Option<T> = Self::read_doc(&path)?;
        let (tx, rx) = watch::channel(initial);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCH_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                match Self::read_doc::<T>(&path) {
                    Ok(current) => {
                        tx.send_if_modified(|held| {
                            if *held != current {
                                *held = current;
                                true
                            } else {
                                false
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), %err, "watch read failed");
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl SharedStore for FileStore {
    async fn get_profile(&self, uid: &str) -> JunctureResult<Option<UserProfile>> {
        Self::read_doc(&self.user_path(uid))
    }

    async fn put_profile(&self, profile: &UserProfile) -> JunctureResult<()> {
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&self.user_path(&profile.uid), profile)
    }

    async fn find_uid_by_email(&self, email: &str) -> JunctureResult<Option<String>> {
        let users_dir = self.root.join(USERS_DIR);
        if !users_dir.exists() {
            return Ok(None);
        }
        for entry in std::fs::read_dir(&users_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_doc::<UserProfile>(&path)? {
                Some(profile) if profile.email == email => return Ok(Some(profile.uid)),
                _ => {}
            }
        }
        Ok(None)
    }

    async fn get_calendar(&self, uid: &str) -> JunctureResult<Option<CalendarDoc>> {
        Self::read_doc(&self.calendar_path(uid))
    }

    async fn put_calendar(&self, uid: &str, doc: &CalendarDoc) -> JunctureResult<()> {
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&self.calendar_path(uid), doc)
    }

    async fn apply_share_change(&self, change: &ShareChange) -> JunctureResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut owner: UserProfile = Self::read_doc(&self.user_path(&change.owner_uid))?
            .ok_or_else(|| {
                JunctureError::Store(format!("no profile for owner '{}'", change.owner_uid))
            })?;
        let mut viewer: UserProfile = Self::read_doc(&self.user_path(&change.viewer_uid))?
            .ok_or_else(|| {
                JunctureError::Store(format!("no profile for viewer '{}'", change.viewer_uid))
            })?;

        let now = chrono::Utc::now();
        match change.action {
            ShareAction::Grant => {
                push_unique(&mut owner.shared_with_others, &change.viewer_email);
                push_unique(&mut viewer.shared_with_me, &change.owner_email);
            }
            ShareAction::Revoke => {
                remove_all(&mut owner.shared_with_others, &change.viewer_email);
                remove_all(&mut viewer.shared_with_me, &change.owner_email);
            }
        }
        owner.updated_at = Some(now);
        viewer.updated_at = Some(now);

        Self::write_doc(&self.user_path(&change.owner_uid), &owner)?;
        Self::write_doc(&self.user_path(&change.viewer_uid), &viewer)?;

        let calendar_path = self.calendar_path(&change.owner_uid);
        if let Some(mut calendar) = Self::read_doc::<CalendarDoc>(&calendar_path)? {
            calendar.shared_with = owner.shared_with_others;
            Self::write_doc(&calendar_path, &calendar)?;
        }

        Ok(())
    }

    async fn watch_profile(
        &self,
        uid: &str,
    ) -> JunctureResult<watch::Receiver<Option<UserProfile>>> {
        self.spawn_watch(self.user_path(uid))
    }

    async fn watch_calendar(
        &self,
        uid: &str,
    ) -> JunctureResult<watch::Receiver<Option<CalendarDoc>>> {
        self.spawn_watch(self.calendar_path(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_roundtrip_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let profile = UserProfile::new("uid-a", "a@x.com", Some("Alice".into()));
        store.put_profile(&profile).await.unwrap();

        assert_eq!(store.get_profile("uid-a").await.unwrap(), Some(profile));
        assert_eq!(
            store.find_uid_by_email("a@x.com").await.unwrap(),
            Some("uid-a".to_string())
        );
        assert_eq!(store.get_profile("uid-other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_share_change_is_applied_to_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .put_profile(&UserProfile::new("uid-a", "a@x.com", None))
            .await
            .unwrap();
        store
            .put_profile(&UserProfile::new("uid-b", "b@x.com", None))
            .await
            .unwrap();

        let change = ShareChange {
            owner_uid: "uid-a".into(),
            owner_email: "a@x.com".into(),
            viewer_uid: "uid-b".into(),
            viewer_email: "b@x.com".into(),
            action: ShareAction::Grant,
        };
        store.apply_share_change(&change).await.unwrap();
        store.apply_share_change(&change).await.unwrap();

        let owner = store.get_profile("uid-a").await.unwrap().unwrap();
        let viewer = store.get_profile("uid-b").await.unwrap().unwrap();
        assert_eq!(owner.shared_with_others, vec!["b@x.com"]);
        assert_eq!(viewer.shared_with_me, vec!["a@x.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_calendar_picks_up_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let mut rx = store.watch_calendar("uid-a").await.unwrap();
        assert!(rx.borrow_and_update().is_none());

        store
            .put_calendar(
                "uid-a",
                &CalendarDoc {
                    events: vec![],
                    calendar_id: "cal-a".into(),
                    synced_at: chrono::Utc::now(),
                    shared_with: vec![],
                },
            )
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|c| c.calendar_id.clone()),
            Some("cal-a".to_string())
        );
    }
}
