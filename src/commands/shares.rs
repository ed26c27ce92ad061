use anyhow::{Context, Result};
use juncture_core::SharedStore;

use crate::config::Config;

use super::open_store;

/// List both directions of sharing for the local account.
pub async fn run() -> Result<()> {
    let config = Config::load()?;
    let user = config.require_user()?;

    let store = open_store(&config)?;
    let profile = store
        .get_profile(&user.uid)
        .await?
        .with_context(|| format!("No profile found for {}", user.email))?;

    println!("Shared with others:");
    if profile.shared_with_others.is_empty() {
        println!("   (nobody)");
    }
    for email in &profile.shared_with_others {
        println!("   {}", email);
    }

    println!("\nShared with you:");
    if profile.shared_with_me.is_empty() {
        println!("   (nobody)");
    }
    for email in &profile.shared_with_me {
        println!("   {}", email);
    }
    Ok(())
}
