//! The shared document store.
//!
//! Plays the role of the hosted store: per-user profile documents
//! (`users/{uid}`) and per-owner mirrored calendar documents
//! (`calendar_events/{uid}`), with live subscriptions. Two backends:
//! in-memory (tests, single-process runs) and file-backed (cross-process
//! CLI use).
//!
//! Share relationships live in two mirrored lists (owner's
//! `shared_with_others`, viewer's `shared_with_me`). Both sides mutate only
//! through [`SharedStore::apply_share_change`], a single coordinated write,
//! never through two independent profile updates.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::JunctureResult;
use crate::event::Event;

/// `users/{uid}`: identity, share lists and sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub shared_with_me: Vec<String>,
    #[serde(default)]
    pub shared_with_others: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_calendar_sync: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_events: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>, email: impl Into<String>, name: Option<String>) -> Self {
        UserProfile {
            uid: uid.into(),
            email: email.into(),
            name,
            shared_with_me: Vec::new(),
            shared_with_others: Vec::new(),
            calendar_id: None,
            last_calendar_sync: None,
            total_events: None,
            updated_at: None,
        }
    }
}

/// `calendar_events/{uid}`: one owner's mirrored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarDoc {
    pub events: Vec<Event>,
    pub calendar_id: String,
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub shared_with: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareAction {
    Grant,
    Revoke,
}

/// A directed share edge mutation, applied to both sides at once.
#[derive(Debug, Clone)]
pub struct ShareChange {
    pub owner_uid: String,
    pub owner_email: String,
    pub viewer_uid: String,
    pub viewer_email: String,
    pub action: ShareAction,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get_profile(&self, uid: &str) -> JunctureResult<Option<UserProfile>>;

    async fn put_profile(&self, profile: &UserProfile) -> JunctureResult<()>;

    /// Resolve an email to a uid, for share-target lookup.
    async fn find_uid_by_email(&self, email: &str) -> JunctureResult<Option<String>>;

    async fn get_calendar(&self, uid: &str) -> JunctureResult<Option<CalendarDoc>>;

    /// Full replacement of the mirrored document (overwrite, not merge).
    async fn put_calendar(&self, uid: &str, doc: &CalendarDoc) -> JunctureResult<()>;

    /// Mutate both sides of a share edge (and the owner's calendar
    /// `shared_with` list) atomically with respect to this store's other
    /// writers. Both entries end up present exactly once, or absent.
    async fn apply_share_change(&self, change: &ShareChange) -> JunctureResult<()>;

    /// Live subscription to a profile document. The receiver holds the
    /// current value and updates on every write.
    async fn watch_profile(
        &self,
        uid: &str,
    ) -> JunctureResult<watch::Receiver<Option<UserProfile>>>;

    /// Live subscription to a calendar document.
    async fn watch_calendar(
        &self,
        uid: &str,
    ) -> JunctureResult<watch::Receiver<Option<CalendarDoc>>>;
}

/// Push a value into a list if absent; used for the share lists so repeated
/// grants stay idempotent.
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

pub(crate) fn remove_all(list: &mut Vec<String>, value: &str) {
    list.retain(|v| v != value);
}
