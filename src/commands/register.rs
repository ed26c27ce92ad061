use anyhow::Result;
use juncture_core::{SharedStore, UserProfile};
use uuid::Uuid;

use crate::config::{Config, LocalUser};

use super::open_store;

pub async fn run(email: String, name: Option<String>) -> Result<()> {
    let mut config = Config::load()?;

    if let Some(user) = &config.user {
        anyhow::bail!(
            "Already registered as {}.\n\
            Remove the `user` section from the config file to start over.",
            user.email
        );
    }

    let store = open_store(&config)?;
    if store.find_uid_by_email(&email).await?.is_some() {
        anyhow::bail!("An account with email '{}' already exists in this store.", email);
    }

    let uid = Uuid::new_v4().to_string();
    store
        .put_profile(&UserProfile::new(&uid, &email, name.clone()))
        .await?;

    config.user = Some(LocalUser {
        uid: uid.clone(),
        email: email.clone(),
        name,
    });
    config.save()?;

    println!("Registered {} ({})", email, uid);
    println!("Connect your calendar next with:\n  juncture auth");
    Ok(())
}
