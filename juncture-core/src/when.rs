//! Time normalization and label rendering.
//!
//! Converts the provider's heterogeneous `when` shapes into the canonical
//! [`When`] union, and renders the human-readable time/date labels. Label
//! rendering never fails: bad data degrades to a sentinel label so display
//! code never has to handle an error.

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::event::{RawWhen, Timestamp, When};

/// Sentinel label for a missing/unparseable time.
pub const INVALID_TIME: &str = "Invalid Time";
/// Sentinel label for a missing/unparseable date.
pub const INVALID_DATE: &str = "Invalid Date";
/// Label for all-day events.
pub const ALL_DAY: &str = "All day";

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("no start field present")]
    MissingStart,

    #[error("no end field present")]
    MissingEnd,

    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),

    #[error("unparseable date '{0}'")]
    BadDate(String),
}

/// Convert a raw `when` into its canonical form.
///
/// All-day markers (`all_day`, `object == "date"`, a `start_date` field) take
/// precedence over timed fields. Timed events accept epoch seconds or
/// ISO-8601 strings, interpreted in the event's timezone when one is named,
/// else the local system timezone.
pub fn normalize(raw: &RawWhen) -> Result<When, NormalizeError> {
    if raw.is_all_day() {
        let start_date = match (&raw.start_date, &raw.start_time) {
            (Some(date), _) => parse_date(date)?,
            // All-day events carried as a bare timestamp: drop the
            // time-of-day in the event's own zone so the calendar date
            // does not shift across the date line.
            (None, Some(ts)) => {
                let instant = parse_instant(ts, raw.start_timezone.as_deref())?;
                date_in_zone(instant, raw.start_timezone.as_deref())
            }
            (None, None) => return Err(NormalizeError::MissingStart),
        };

        let end_date = match &raw.end_date {
            Some(date) => Some(parse_date(date)?).filter(|d| *d != start_date),
            None => None,
        };

        return Ok(When::AllDay { start_date, end_date });
    }

    let start_ts = raw.start_time.as_ref().ok_or(NormalizeError::MissingStart)?;
    let end_ts = raw.end_time.as_ref().ok_or(NormalizeError::MissingEnd)?;

    Ok(When::Timed {
        start: parse_instant(start_ts, raw.start_timezone.as_deref())?,
        end: parse_instant(end_ts, raw.end_timezone.as_deref())?,
        start_tz: raw.start_timezone.clone(),
        end_tz: raw.end_timezone.clone(),
    })
}

/// "All day", "h:mm a – h:mm a", or the sentinel.
pub fn time_label(when: Option<&When>) -> String {
    match when {
        None => INVALID_TIME.to_string(),
        Some(When::AllDay { .. }) => ALL_DAY.to_string(),
        Some(When::Timed {
            start,
            end,
            start_tz,
            end_tz,
        }) => format!(
            "{} – {}",
            format_in_zone(*start, start_tz.as_deref(), "%-I:%M %p"),
            format_in_zone(*end, end_tz.as_deref(), "%-I:%M %p"),
        ),
    }
}

/// A full date for single-day events, a compact range for multi-day spans.
pub fn date_label(when: Option<&When>) -> String {
    match when {
        None => INVALID_DATE.to_string(),
        Some(When::AllDay { start_date, end_date }) => match end_date {
            Some(end) if end != start_date => range_label(*start_date, *end),
            _ => single_day_label(*start_date),
        },
        Some(When::Timed {
            start,
            end,
            start_tz,
            end_tz,
        }) => {
            let start_date = date_in_zone(*start, start_tz.as_deref());
            let end_date = date_in_zone(*end, end_tz.as_deref());
            if start_date == end_date {
                single_day_label(start_date)
            } else {
                range_label(start_date, end_date)
            }
        }
    }
}

/// The calendar date of an instant in the named zone (local zone if the name
/// is absent or unknown).
pub fn date_in_zone(instant: DateTime<Utc>, tz: Option<&str>) -> NaiveDate {
    match resolve_tz(tz) {
        Some(zone) => instant.with_timezone(&zone).date_naive(),
        None => instant.with_timezone(&Local).date_naive(),
    }
}

fn single_day_label(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn range_label(start: NaiveDate, end: NaiveDate) -> String {
    use chrono::Datelike;

    if start.year() == end.year() && start.month() == end.month() {
        // "Mar 3 – 5, 2025"
        format!("{} – {}", start.format("%b %-d"), end.format("%-d, %Y"))
    } else if start.year() == end.year() {
        // "Mar 3 – Apr 1, 2025"
        format!("{} – {}", start.format("%b %-d"), end.format("%b %-d, %Y"))
    } else {
        format!(
            "{} – {}",
            start.format("%b %-d, %Y"),
            end.format("%b %-d, %Y")
        )
    }
}

fn format_in_zone(instant: DateTime<Utc>, tz: Option<&str>, fmt: &str) -> String {
    match resolve_tz(tz) {
        Some(zone) => instant.with_timezone(&zone).format(fmt).to_string(),
        None => instant.with_timezone(&Local).format(fmt).to_string(),
    }
}

fn resolve_tz(name: Option<&str>) -> Option<Tz> {
    name.and_then(|n| n.parse::<Tz>().ok())
}

fn parse_instant(ts: &Timestamp, tz: Option<&str>) -> Result<DateTime<Utc>, NormalizeError> {
    match ts {
        Timestamp::Seconds(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| NormalizeError::BadTimestamp(secs.to_string())),
        Timestamp::Iso(text) => parse_iso(text, tz),
    }
}

fn parse_iso(text: &str, tz: Option<&str>) -> Result<DateTime<Utc>, NormalizeError> {
    // With an explicit offset the string is already absolute.
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Naive datetimes are interpreted in the event's zone, else local.
    let naive = text
        .parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| NormalizeError::BadTimestamp(text.to_string()))?;

    let resolved = match resolve_tz(tz) {
        Some(zone) => to_utc(zone.from_local_datetime(&naive)),
        None => to_utc(Local.from_local_datetime(&naive)),
    };
    resolved.ok_or_else(|| NormalizeError::BadTimestamp(text.to_string()))
}

fn to_utc<Z: TimeZone>(result: LocalResult<DateTime<Z>>) -> Option<DateTime<Utc>> {
    match result {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        // DST gap/fold: take the earlier interpretation.
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, NormalizeError> {
    // Tolerate a trailing time component. The cut must land on a char
    // boundary; provider data can put a multibyte character there, in
    // which case the whole string is left to fail the parse below.
    let candidate = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .map_err(|_| NormalizeError::BadDate(text.to_string()))
}
