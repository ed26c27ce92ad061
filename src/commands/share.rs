use anyhow::Result;
use juncture_core::{GrantOutcome, MirrorPublisher, RevokeOutcome};

use crate::config::Config;

use super::open_store;

pub async fn grant(email: String) -> Result<()> {
    let config = Config::load()?;
    let user = config.require_user()?;

    let publisher = MirrorPublisher::new(open_store(&config)?);
    match publisher.grant(&user.uid, &email).await? {
        GrantOutcome::Granted => println!("Calendar shared with {}.", email),
        GrantOutcome::AlreadyShared => println!("Calendar is already shared with {}.", email),
    }
    Ok(())
}

pub async fn revoke(email: String) -> Result<()> {
    let config = Config::load()?;
    let user = config.require_user()?;

    let publisher = MirrorPublisher::new(open_store(&config)?);
    match publisher.revoke(&user.uid, &email).await? {
        RevokeOutcome::Revoked => println!("Stopped sharing your calendar with {}.", email),
        RevokeOutcome::NotShared => println!("Your calendar was not shared with {}.", email),
    }
    Ok(())
}
