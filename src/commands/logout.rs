use anyhow::Result;

use crate::config::Config;

use super::grant_store;

pub fn run() -> Result<()> {
    let config = Config::load()?;
    let grants = grant_store(&config)?;

    match grants.load()? {
        Some(_) => {
            grants.clear()?;
            println!("Logged out. The stored provider grant has been removed.");
        }
        None => println!("Not logged in."),
    }
    Ok(())
}
