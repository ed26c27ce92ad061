use anyhow::Result;
use chrono::NaiveDate;
use juncture_core::EventCollection;

use crate::config::Config;
use crate::render;

use super::{grant_store, provider_client};

/// Fetch and print the current event list, optionally filtered to one day.
pub async fn run(date: Option<String>) -> Result<()> {
    let config = Config::load()?;

    let grants = grant_store(&config)?;
    if grants.load()?.is_none() {
        anyhow::bail!("Not connected to a calendar. Run `juncture auth` first.");
    }

    let day = date
        .as_deref()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("Invalid date '{}', expected YYYY-MM-DD", d))
        })
        .transpose()?;

    let client = provider_client(&config)?;
    let page = client.list_events(None).await?;
    let mut collection = EventCollection::new();
    collection.apply(page.result);

    let mut events = collection.events();
    if let Some(day) = day {
        events.retain(|e| e.when.as_ref().map(|w| w.start_date()) == Some(day));
    }

    render::print_events(&events);
    Ok(())
}
