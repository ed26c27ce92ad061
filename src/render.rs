//! Plain-text rendering of events for the terminal.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use juncture_core::when;
use juncture_core::{Event, OwnerCalendar, ParticipantStatus};

/// Print events grouped by day, earliest day first. Events whose time could
/// not be normalized land in a trailing group with the sentinel labels.
pub fn print_events(events: &[Event]) {
    if events.is_empty() {
        println!("   No events");
        return;
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<&Event>> = BTreeMap::new();
    let mut undated: Vec<&Event> = Vec::new();
    for event in events {
        match &event.when {
            Some(when) => by_day.entry(when.start_date()).or_default().push(event),
            None => undated.push(event),
        }
    }

    let mut first = true;
    for (day, mut day_events) in by_day {
        if !first {
            println!();
        }
        first = false;

        // All-day entries lead the day, then timed entries by start.
        day_events.sort_by_key(|e| match &e.when {
            Some(juncture_core::When::AllDay { .. }) | None => (0, None),
            Some(juncture_core::When::Timed { start, .. }) => (1, Some(*start)),
        });

        println!("{}", day.format("%A, %B %-d, %Y"));
        for event in day_events {
            print_event_line(event);
        }
    }

    if !undated.is_empty() {
        if !first {
            println!();
        }
        println!("{}", when::INVALID_DATE);
        for event in undated {
            print_event_line(event);
        }
    }
}

/// One shared calendar, with an owner header.
pub fn print_owner_calendar(owner: &OwnerCalendar) {
    match &owner.calendar_id {
        Some(_) => println!("📅 {}", owner.owner_email),
        None => {
            println!("📅 {} (nothing published yet)", owner.owner_email);
            return;
        }
    }
    print_events(&owner.events);
}

fn print_event_line(event: &Event) {
    println!("   {:<22} {}", when::time_label(event.when.as_ref()), event.title);
    if let Some(location) = &event.location {
        println!("   {:<22} @ {}", "", location);
    }
    for participant in &event.participants {
        println!(
            "   {:<22} {} {}",
            "",
            status_label(participant.status),
            participant.name.as_deref().unwrap_or(&participant.email)
        );
    }
}

fn status_label(status: ParticipantStatus) -> &'static str {
    match status {
        ParticipantStatus::Yes => "✓ Going",
        ParticipantStatus::No => "✗ Not Going",
        ParticipantStatus::Maybe => "? Maybe",
        ParticipantStatus::Pending => "Invited",
    }
}
