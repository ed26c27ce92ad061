use anyhow::{Context, Result};
use chrono::Local;
use juncture_core::{OwnerCalendar, SharedStore, SharedViewAggregator};

use crate::config::Config;
use crate::render;

use super::open_store;

/// Show calendars other users have shared with the local account. With
/// `--watch`, keep live subscriptions and reprint on every change.
pub async fn run(watch: bool) -> Result<()> {
    let config = Config::load()?;
    let user = config.require_user()?;
    let store = open_store(&config)?;

    if !watch {
        return print_once(&store, &user.uid, &user.email).await;
    }

    let aggregator = SharedViewAggregator::start(store, &user.uid).await?;
    let mut rx = aggregator.subscribe();

    println!("Watching shared calendars. Press Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = aggregator.snapshot().await;
                println!("\n--- {} ---", Local::now().format("%H:%M:%S"));
                print_view(&view);
            }
        }
    }

    aggregator.stop();
    println!("Stopped.");
    Ok(())
}

async fn print_once(store: &juncture_core::FileStore, uid: &str, email: &str) -> Result<()> {
    let profile = store
        .get_profile(uid)
        .await?
        .with_context(|| format!("No profile found for {}", email))?;

    let mut view = Vec::new();
    for owner_email in &profile.shared_with_me {
        let Some(owner_uid) = store.find_uid_by_email(owner_email).await? else {
            println!("📅 {} (account not found)", owner_email);
            continue;
        };
        let doc = store.get_calendar(&owner_uid).await?;
        view.push(OwnerCalendar {
            owner_email: owner_email.clone(),
            calendar_id: doc.as_ref().map(|d| d.calendar_id.clone()),
            events: doc.as_ref().map(|d| d.events.clone()).unwrap_or_default(),
            synced_at: doc.as_ref().map(|d| d.synced_at),
        });
    }

    print_view(&view);
    Ok(())
}

fn print_view(view: &[OwnerCalendar]) {
    if view.is_empty() {
        println!("Nobody has shared a calendar with you yet.");
        return;
    }
    for (i, owner) in view.iter().enumerate() {
        if i > 0 {
            println!();
        }
        render::print_owner_calendar(owner);
    }
}
