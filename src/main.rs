use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tabula::browser::Browser;
use tabula::config::Config;

/// Tabula - an extensible terminal record browser with Lua plugins
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Database file to browse, overriding the configuration
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging to stderr instead of stdout
    // This prevents log messages from appearing in the browser UI
    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    // Load configuration; a first run materializes the default file.
    // Configuration failures are the only fatal startup errors.
    let mut config = if let Some(config_path) = args.config {
        Config::load_from_file(&config_path)?
    } else {
        Config::load_or_init_default()?
    };

    // Override database target if specified
    if let Some(database) = args.database {
        config.database.database = database;
    }

    // Check if stdout is a TTY
    if !std::io::stdout().is_terminal() {
        eprintln!("Error: Tabula must be run in an interactive terminal.");
        eprintln!("It cannot be run with redirected output or in non-TTY environments.");
        std::process::exit(1);
    }

    let mut browser = Browser::new(config)?;
    if let Err(e) = browser.run().await {
        // Ensure the error is visible after the alternate screen is gone
        eprintln!("\nTabula encountered an error: {e}");
        eprintln!("\nIf the terminal display is corrupted, try running:");
        eprintln!("  reset");
        return Err(e);
    }

    Ok(())
}
