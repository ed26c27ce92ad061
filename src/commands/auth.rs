use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::config::Config;

use super::open_session;

pub async fn run() -> Result<()> {
    let config = Config::load()?;
    config.require_user()?;

    let session = open_session(&config)?;
    let auth_url = session.begin_auth().await?;

    println!("Open this URL in your browser and sign in:\n\n  {}\n", auth_url);
    print!("Paste the redirect URL (or just the code): ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read the redirect URL")?;
    let input = line.trim();

    if input.is_empty() {
        session.cancel_auth().await;
        anyhow::bail!("No code entered, authentication cancelled.");
    }

    // Accept a bare code as a convenience.
    let redirect = if input.contains("://") {
        input.to_string()
    } else {
        format!("juncture://oauth/exchange?code={input}")
    };

    session.complete_auth(&redirect).await?;
    session.stop();

    println!("Connected. Run `juncture sync` to publish your calendar.");
    Ok(())
}
