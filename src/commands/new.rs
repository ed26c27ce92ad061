use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime, TimeZone};
use juncture_core::{CreateEventRequest, Participant};

use crate::config::Config;
use crate::render;

use super::{grant_store, provider_client};

/// Create an event on the provider calendar.
pub async fn run(
    title: String,
    start: String,
    end: Option<String>,
    location: Option<String>,
    description: Option<String>,
    invite: Vec<String>,
) -> Result<()> {
    let config = Config::load()?;

    let grants = grant_store(&config)?;
    if grants.load()?.is_none() {
        anyhow::bail!("Not connected to a calendar. Run `juncture auth` first.");
    }

    let start_time = parse_local(&start)?;
    let end_time = match end {
        Some(end) => parse_local(&end)?,
        None => start_time + Duration::hours(1).num_seconds(),
    };
    if end_time <= start_time {
        anyhow::bail!("End time must be after the start time.");
    }

    let participants = if invite.is_empty() {
        None
    } else {
        Some(
            invite
                .into_iter()
                .map(|email| Participant {
                    name: None,
                    email,
                    status: Default::default(),
                })
                .collect(),
        )
    };

    let client = provider_client(&config)?;
    let created = client
        .create_event(&CreateEventRequest {
            title,
            start_time,
            end_time,
            participants,
            location,
            description,
        })
        .await?;

    println!("Created '{}' ({})", created.title, created.id);
    render::print_events(std::slice::from_ref(&created));
    Ok(())
}

/// Parse "2025-03-20T15:00" as local wall-clock time into epoch seconds.
fn parse_local(input: &str) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M")
        .with_context(|| format!("Invalid time '{}', expected YYYY-MM-DDTHH:MM", input))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("Time '{}' does not exist in the local timezone", input))?;
    Ok(local.timestamp())
}
