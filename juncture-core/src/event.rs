//! Provider-neutral event types and the provider's raw wire shapes.
//!
//! The provider's `when` payloads are heterogeneous: timestamps arrive as
//! epoch seconds or ISO-8601 strings, and all-day events carry date-only
//! fields. The raw types here accept all of those shapes; the `when` module
//! converts them into the canonical [`When`] union.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::when;

/// A calendar event after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `None` when the provider sent a `when` we could not make sense of.
    /// Such events still render, with the sentinel labels.
    pub when: Option<When>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Participant>,
}

/// Canonical event time: exactly one of timed or all-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum When {
    Timed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        /// IANA timezone names as sent by the provider. Unknown names fall
        /// back to the local zone at render time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_tz: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_tz: Option<String>,
    },
    AllDay {
        start_date: NaiveDate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<NaiveDate>,
    },
}

impl When {
    /// The calendar date the event starts on, in its own timezone.
    /// Used for grouping events by day.
    pub fn start_date(&self) -> NaiveDate {
        match self {
            When::AllDay { start_date, .. } => *start_date,
            When::Timed { start, start_tz, .. } => when::date_in_zone(*start, start_tz.as_deref()),
        }
    }
}

/// An event participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub status: ParticipantStatus,
}

/// RSVP status for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Yes,
    No,
    Maybe,
    #[default]
    Pending,
}

/// A single record from the provider's delta feed.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPatch {
    /// Create-or-update by id.
    Upsert(Event),
    /// Deletion tombstone. Applying one for an absent id is a no-op.
    Tombstone { id: String },
}

/// The payload handed to the merge engine after a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Replace the collection wholesale (initial fetch, no cursor).
    FullSnapshot(Vec<Event>),
    /// Apply incrementally, honoring tombstones.
    Delta(Vec<EventPatch>),
}

/// One page from `GET /nylas/list-events`, with the continuation token
/// if the server issued one.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub result: FetchResult,
    pub cursor: Option<String>,
}

// --- Raw wire shapes -------------------------------------------------------

/// An event as the provider sends it, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub when: Option<RawWhen>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub deleted: bool,
}

impl RawEvent {
    /// Convert a raw record into a patch. Normalization failures degrade the
    /// event to `when: None` rather than dropping it.
    pub fn into_patch(self) -> EventPatch {
        if self.deleted {
            return EventPatch::Tombstone { id: self.id };
        }
        EventPatch::Upsert(self.into_event())
    }

    pub fn into_event(self) -> Event {
        let when = match self.when.as_ref().map(when::normalize) {
            Some(Ok(w)) => Some(w),
            Some(Err(err)) => {
                tracing::warn!(event_id = %self.id, %err, "could not normalize event time");
                None
            }
            None => None,
        };

        Event {
            id: self.id,
            title: self.title.unwrap_or_else(|| "Untitled Event".to_string()),
            location: self.location,
            description: self.description,
            when,
            participants: self.participants,
        }
    }
}

/// The provider's `when` object, fields as-sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawWhen {
    /// `"date"` marks an all-day event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timezone: Option<String>,
}

impl RawWhen {
    /// All-day markers take precedence over timed fields.
    pub fn is_all_day(&self) -> bool {
        self.all_day == Some(true)
            || self.object.as_deref() == Some("date")
            || self.start_date.is_some()
    }
}

/// A timestamp as the provider sends it: epoch seconds or an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(i64),
    Iso(String),
}

/// `GET /nylas/list-events` body: a bare array is a full snapshot, an
/// object wrapping `events` is a delta page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEventsResponse {
    Snapshot(Vec<RawEvent>),
    Delta {
        events: Vec<RawEvent>,
        #[serde(default)]
        sync_token: Option<String>,
    },
}

impl ListEventsResponse {
    pub fn into_page(self) -> FetchPage {
        match self {
            ListEventsResponse::Snapshot(raws) => FetchPage {
                result: FetchResult::FullSnapshot(
                    raws.into_iter()
                        .filter(|r| !r.deleted)
                        .map(RawEvent::into_event)
                        .collect(),
                ),
                cursor: None,
            },
            ListEventsResponse::Delta { events, sync_token } => FetchPage {
                result: FetchResult::Delta(
                    events.into_iter().map(RawEvent::into_patch).collect(),
                ),
                cursor: sync_token,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_events_response_detects_snapshot_vs_delta() {
        let snapshot: ListEventsResponse = serde_json::from_str(
            r#"[{"id": "a", "title": "One"}, {"id": "b"}]"#,
        )
        .unwrap();
        match snapshot.into_page().result {
            FetchResult::FullSnapshot(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[1].title, "Untitled Event");
            }
            other => panic!("Expected FullSnapshot, got {:?}", other),
        }

        let delta: ListEventsResponse = serde_json::from_str(
            r#"{"events": [{"id": "a", "deleted": true}], "sync_token": "tok-9"}"#,
        )
        .unwrap();
        let page = delta.into_page();
        assert_eq!(page.cursor.as_deref(), Some("tok-9"));
        match page.result {
            FetchResult::Delta(patches) => {
                assert_eq!(patches, vec![EventPatch::Tombstone { id: "a".into() }]);
            }
            other => panic!("Expected Delta, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_accepts_seconds_and_iso() {
        let raw: RawWhen = serde_json::from_str(
            r#"{"start_time": 1700000000, "end_time": "2023-11-14T23:13:20Z"}"#,
        )
        .unwrap();
        assert_eq!(raw.start_time, Some(Timestamp::Seconds(1700000000)));
        assert_eq!(
            raw.end_time,
            Some(Timestamp::Iso("2023-11-14T23:13:20Z".to_string()))
        );
    }

    #[test]
    fn test_deleted_raw_event_becomes_tombstone() {
        let raw: RawEvent = serde_json::from_str(r#"{"id": "gone", "deleted": true}"#).unwrap();
        assert_eq!(raw.into_patch(), EventPatch::Tombstone { id: "gone".into() });
    }

    #[test]
    fn test_participant_status_defaults_to_pending() {
        let p: Participant = serde_json::from_str(r#"{"email": "a@x.com"}"#).unwrap();
        assert_eq!(p.status, ParticipantStatus::Pending);
    }
}
