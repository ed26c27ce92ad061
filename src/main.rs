mod commands;
mod config;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "juncture")]
#[command(about = "Sync your calendar from the provider and share it with other users")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a local account in the shared store
    Register {
        email: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Connect your provider calendar via OAuth
    Auth,
    /// Remove the stored provider grant
    Logout,
    /// Fetch the full calendar once and publish it to the shared store
    Sync {
        /// Print the synced events afterwards
        #[arg(long)]
        show: bool,
    },
    /// Keep syncing on a timer, publishing whenever the calendar changes
    Watch,
    /// Show your events
    Events {
        /// Only show events on this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Create an event on your calendar
    New {
        title: String,

        /// Start date/time (e.g. "2025-03-20T15:00", local time)
        #[arg(short, long)]
        start: String,

        /// End date/time. Defaults to one hour after the start
        #[arg(short, long)]
        end: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Invite a participant by email (repeatable)
        #[arg(long)]
        invite: Vec<String>,
    },
    /// Share your calendar with another account
    Share { email: String },
    /// Stop sharing your calendar with an account
    Revoke { email: String },
    /// List who you share with and who shares with you
    Shares,
    /// Show calendars shared with you
    Shared {
        /// Keep watching and reprint on every change
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "juncture=warn,juncture_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Register { email, name } => commands::register::run(email, name).await,
        Commands::Auth => commands::auth::run().await,
        Commands::Logout => commands::logout::run(),
        Commands::Sync { show } => commands::sync::run(show).await,
        Commands::Watch => commands::watch::run().await,
        Commands::Events { date } => commands::events::run(date).await,
        Commands::New {
            title,
            start,
            end,
            location,
            description,
            invite,
        } => commands::new::run(title, start, end, location, description, invite).await,
        Commands::Share { email } => commands::share::grant(email).await,
        Commands::Revoke { email } => commands::share::revoke(email).await,
        Commands::Shares => commands::shares::run().await,
        Commands::Shared { watch } => commands::shared::run(watch).await,
    }
}
