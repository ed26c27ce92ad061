//! The sync session: owns the grant token, the sync cursor and the local
//! event collection, and drives periodic polling against the provider.
//!
//! One logical actor per login. Polls are serialized: the merge engine
//! never sees two concurrent applies for the same collection, and a poll
//! started while another is outstanding is skipped, not queued. Transient
//! provider failures leave the previously merged view and the cursor
//! untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::error::{JunctureError, JunctureResult};
use crate::event::Event;
use crate::merge::{ApplyStats, EventCollection};
use crate::provider::{code_from_redirect, ProviderClient};
use crate::token::GrantStore;

/// Fixed polling cadence while connected.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    Connected { cursor: Option<String> },
    Polling { cursor: Option<String> },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connected { .. } | SessionState::Polling { .. }
        )
    }
}

/// What observers see: the current state, the merged events, and a soft
/// status message after a failed poll.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub events: Vec<Event>,
    pub status: Option<String>,
}

struct SessionCore {
    state: SessionState,
    events: EventCollection,
    status: Option<String>,
}

struct SessionInner {
    client: ProviderClient,
    grants: GrantStore,
    core: Mutex<SessionCore>,
    poll_in_flight: AtomicBool,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

/// Handle to one sync session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

impl SyncSession {
    pub fn new(client: ProviderClient, grants: GrantStore) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot {
            state: SessionState::LoggedOut,
            events: Vec::new(),
            status: None,
        });
        SyncSession {
            inner: Arc::new(SessionInner {
                client,
                grants,
                core: Mutex::new(SessionCore {
                    state: SessionState::LoggedOut,
                    events: EventCollection::new(),
                    status: None,
                }),
                poll_in_flight: AtomicBool::new(false),
                snapshot_tx,
                poll_task: StdMutex::new(None),
            }),
        }
    }

    /// Observe state changes. The receiver always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.core.lock().await.state.clone()
    }

    /// The current merged view.
    pub async fn events(&self) -> Vec<Event> {
        self.inner.core.lock().await.events.events()
    }

    /// Resume a persisted session if a grant token exists.
    ///
    /// Returns whether a session was resumed. Entering `Connected` resets
    /// the cursor to empty, forcing a full snapshot on the first poll, and
    /// starts the poll timer.
    pub async fn start(&self) -> JunctureResult<bool> {
        {
            let mut core = self.inner.core.lock().await;
            if core.state.is_connected() {
                return Ok(true);
            }
            if self.inner.grants.load()?.is_none() {
                return Ok(false);
            }
            core.state = SessionState::Connected { cursor: None };
            core.status = None;
            self.inner.publish(&core);
        }
        self.start_polling();
        tracing::info!("existing grant found, session resumed");
        Ok(true)
    }

    /// Begin the interactive authorization flow; returns the URL to open.
    pub async fn begin_auth(&self) -> JunctureResult<Url> {
        let mut core = self.inner.core.lock().await;
        if core.state.is_connected() {
            return Err(JunctureError::Session(
                "already connected; log out first".to_string(),
            ));
        }
        core.state = SessionState::Authenticating;
        self.inner.publish(&core);
        self.inner.client.auth_url()
    }

    /// Complete authorization from the callback deep link.
    ///
    /// On success the grant token is persisted, the cursor is reset and the
    /// poll timer starts. On failure the session is `LoggedOut`.
    pub async fn complete_auth(&self, redirect_url: &str) -> JunctureResult<()> {
        {
            let mut core = self.inner.core.lock().await;
            if core.state.is_connected() {
                return Err(JunctureError::Session(
                    "already connected; log out first".to_string(),
                ));
            }
            // Deep links may arrive without an explicit begin_auth.
            core.state = SessionState::Authenticating;
            self.inner.publish(&core);
        }

        let code = match code_from_redirect(redirect_url) {
            Some(code) => code,
            None => {
                self.fail_auth().await;
                return Err(JunctureError::ExchangeFailed(
                    "redirect carries no exchange code".to_string(),
                ));
            }
        };

        let grant = match self.inner.client.exchange_code(&code).await {
            Ok(grant) => grant,
            Err(err) => {
                self.fail_auth().await;
                return Err(err);
            }
        };
        // A grant we cannot persist is a grant we cannot resume; treat it
        // like a failed exchange.
        if let Err(err) = self.inner.grants.save(&grant) {
            self.fail_auth().await;
            return Err(err);
        }

        {
            let mut core = self.inner.core.lock().await;
            core.state = SessionState::Connected { cursor: None };
            core.status = None;
            self.inner.publish(&core);
        }
        self.start_polling();
        tracing::info!("authenticated, grant persisted");
        Ok(())
    }

    /// Abandon an in-progress authorization.
    pub async fn cancel_auth(&self) {
        let mut core = self.inner.core.lock().await;
        if core.state == SessionState::Authenticating {
            core.state = SessionState::LoggedOut;
            self.inner.publish(&core);
        }
    }

    async fn fail_auth(&self) {
        let mut core = self.inner.core.lock().await;
        core.state = SessionState::LoggedOut;
        self.inner.publish(&core);
    }

    /// On-demand refresh. Returns `None` when a poll was already in flight
    /// (skipped, not queued).
    pub async fn poll_now(&self) -> JunctureResult<Option<ApplyStats>> {
        SessionInner::poll_once(&self.inner).await
    }

    /// Cancel the poll timer without touching the persisted grant. The
    /// session can be started again later.
    pub fn stop(&self) {
        self.stop_polling();
    }

    /// Clear the persisted grant and the entire local collection.
    pub async fn logout(&self) -> JunctureResult<()> {
        self.stop_polling();
        self.inner.grants.clear()?;
        let mut core = self.inner.core.lock().await;
        core.events.clear();
        core.state = SessionState::LoggedOut;
        core.status = None;
        self.inner.publish(&core);
        tracing::info!("logged out, grant and local events cleared");
        Ok(())
    }

    fn start_polling(&self) {
        let mut guard = self
            .inner
            .poll_task
            .lock()
            .expect("poll task lock poisoned");
        if guard.is_some() {
            return;
        }
        // The task holds a weak reference so a dropped session stops its
        // own timer instead of keeping itself alive.
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                match SessionInner::poll_once(&inner).await {
                    Ok(Some(stats)) if stats.has_changes() => {
                        tracing::debug!(
                            created = stats.created,
                            updated = stats.updated,
                            deleted = stats.deleted,
                            "poll merged changes"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(%err, "poll failed, previous view retained");
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    fn stop_polling(&self) {
        let handle = self
            .inner
            .poll_task
            .lock()
            .expect("poll task lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl SessionInner {
    fn publish(&self, core: &SessionCore) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: core.state.clone(),
            events: core.events.events(),
            status: core.status.clone(),
        });
    }

    /// One poll cycle, guarded so at most one runs at a time.
    async fn poll_once(inner: &Arc<SessionInner>) -> JunctureResult<Option<ApplyStats>> {
        if inner.poll_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("poll already in flight, skipping");
            return Ok(None);
        }
        // Reset the flag even if the polling task is aborted mid-flight.
        struct InFlight<'a>(&'a AtomicBool);
        impl Drop for InFlight<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _guard = InFlight(&inner.poll_in_flight);

        Self::poll_inner(inner).await.map(Some)
    }

    async fn poll_inner(inner: &Arc<SessionInner>) -> JunctureResult<ApplyStats> {
        let cursor = {
            let mut core = inner.core.lock().await;
            let cursor = match &core.state {
                SessionState::Connected { cursor } => cursor.clone(),
                // A cancelled poll can leave a stale Polling state behind;
                // poll_in_flight says no poll is live, so recover from it.
                SessionState::Polling { cursor } => cursor.clone(),
                SessionState::LoggedOut | SessionState::Authenticating => {
                    return Err(JunctureError::AuthRequired);
                }
            };
            core.state = SessionState::Polling {
                cursor: cursor.clone(),
            };
            inner.publish(&core);
            cursor
        };

        // Fetch without holding the lock; poll_in_flight guarantees no
        // concurrent apply.
        let fetched = inner.client.list_events(cursor.as_deref()).await;

        let mut core = inner.core.lock().await;
        if !matches!(core.state, SessionState::Polling { .. }) {
            // Logout raced the fetch; discard the result.
            tracing::debug!("session left Polling during fetch, discarding result");
            return Ok(ApplyStats::default());
        }

        match fetched {
            Err(err) => {
                // Prior merged view and cursor are retained; the next
                // scheduled poll retries.
                core.state = SessionState::Connected { cursor };
                core.status = Some(err.to_string());
                inner.publish(&core);
                Err(err)
            }
            Ok(page) => {
                let stats = core.events.apply(page.result);
                // A response without a token keeps the previous cursor; we
                // never regress to full-snapshot on our own.
                let next_cursor = page.cursor.or(cursor);
                core.state = SessionState::Connected {
                    cursor: next_cursor,
                };
                core.status = None;
                inner.publish(&core);
                Ok(stats)
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.poll_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
