use anyhow::Result;
use chrono::Local;
use juncture_core::{Event, MirrorPublisher, POLL_INTERVAL};

use crate::config::Config;

use super::{open_session, open_store, provider_client};

/// Long-running sync: poll the provider on a timer and republish the merged
/// view to the shared store whenever it changes. Stops on Ctrl-C.
pub async fn run() -> Result<()> {
    let config = Config::load()?;
    let user = config.require_user()?;

    let session = open_session(&config)?;
    if !session.start().await? {
        anyhow::bail!("Not connected to a calendar. Run `juncture auth` first.");
    }

    let calendar_id = provider_client(&config)?.primary_calendar().await?;
    let publisher = MirrorPublisher::new(open_store(&config)?);

    let mut rx = session.subscribe();
    let mut last_published: Vec<Event> = session.events().await;

    println!(
        "Watching calendar '{}' every {}s. Press Ctrl-C to stop.",
        calendar_id,
        POLL_INTERVAL.as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                if snapshot.events != last_published {
                    publisher
                        .publish(&user.uid, &snapshot.events, &calendar_id)
                        .await?;
                    println!(
                        "{}  published {} events",
                        Local::now().format("%H:%M:%S"),
                        snapshot.events.len()
                    );
                    last_published = snapshot.events;
                }
            }
        }
    }

    session.stop();
    println!("Stopped.");
    Ok(())
}
