mod cmd;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clubsync_core::config::Config;

#[derive(Parser)]
#[command(
    name = "clubsync",
    about = "Keep Signal groups in step with the club membership directory",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
struct Cli {
    /// Plan and log changes without touching any group or sending messages
    #[arg(long, global = true, env = "DRY_RUN", value_parser = literal_true)]
    dry_run: bool,

    /// Verbose logging, including phone numbers
    #[arg(long, global = true, env = "DEBUG", value_parser = literal_true)]
    debug: bool,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every configured group with the membership directory
    Sync,

    /// Send a direct message from the service account
    Message {
        /// Recipient phone number (any common format)
        number: String,
        /// Message text
        text: String,
    },

    /// List the Signal groups the service account belongs to
    Groups,

    /// List published events from the membership directory
    Events,

    /// Stay connected and send read receipts for incoming messages until Ctrl-C
    Listen,
}

/// Environment flags are on only for the literal string `true`.
fn literal_true(value: &str) -> Result<bool, String> {
    Ok(value == "true")
}

/// Help output counts as a usage error, like running with no arguments.
fn parse_cli() -> Cli {
    Cli::try_parse().unwrap_or_else(|e| {
        if e.kind() == clap::error::ErrorKind::DisplayHelp {
            let _ = e.print();
            std::process::exit(2);
        }
        e.exit()
    })
}

fn main() {
    let cli = parse_cli();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = Config::from_env()
        .context("failed to read configuration")
        .and_then(|mut config| {
            config.dry_run |= cli.dry_run;
            config.debug |= cli.debug;
            match cli.command {
                Commands::Sync => cmd::sync::run(&config, cli.json),
                Commands::Message { number, text } => {
                    cmd::message::run(&config, &number, &text, cli.json)
                }
                Commands::Groups => cmd::groups::run(&config, cli.json),
                Commands::Events => cmd::events::run(&config, cli.json),
                Commands::Listen => cmd::listen::run(&config),
            }
        });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
