//! Core library for the juncture ecosystem.
//!
//! Provides the calendar sync engine: provider polling with a sync cursor,
//! the delta merge engine, time normalization, mirroring of the merged set
//! into a shared store, and aggregation of calendars other users share
//! with you. The CLI is plumbing over these types.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod merge;
pub mod mirror;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;
pub mod when;

pub use aggregate::{OwnerCalendar, SharedViewAggregator};
pub use error::{JunctureError, JunctureResult};
pub use event::{Event, EventPatch, FetchPage, FetchResult, Participant, ParticipantStatus, When};
pub use merge::{ApplyStats, EventCollection};
pub use mirror::{GrantOutcome, MirrorPublisher, RevokeOutcome};
pub use provider::{CreateEventRequest, ProviderClient};
pub use session::{SessionSnapshot, SessionState, SyncSession, POLL_INTERVAL};
pub use store::{CalendarDoc, FileStore, MemoryStore, SharedStore, UserProfile};
pub use token::GrantStore;
