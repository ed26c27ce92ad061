use anyhow::Result;
use juncture_core::{EventCollection, MirrorPublisher};

use crate::config::Config;
use crate::render;

use super::{grant_store, open_store, provider_client};

/// One-shot sync: fetch the full snapshot from the provider, merge it, and
/// publish the result to the shared store.
pub async fn run(show: bool) -> Result<()> {
    let config = Config::load()?;
    let user = config.require_user()?;

    let grants = grant_store(&config)?;
    if grants.load()?.is_none() {
        anyhow::bail!("Not connected to a calendar. Run `juncture auth` first.");
    }

    let client = provider_client(&config)?;

    println!("Looking up primary calendar...");
    let calendar_id = client.primary_calendar().await?;

    println!("Fetching events...");
    let page = client.list_events(None).await?;
    let mut collection = EventCollection::new();
    collection.apply(page.result);
    let events = collection.events();

    let publisher = MirrorPublisher::new(open_store(&config)?);
    publisher.publish(&user.uid, &events, &calendar_id).await?;

    println!("Synced {} events to calendar '{}'.", events.len(), calendar_id);
    if show {
        println!();
        render::print_events(&events);
    }
    Ok(())
}
