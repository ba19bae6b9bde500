mod cmd;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "triage",
    about = "Scheduled issue triage: warn and close stale issues, flag missing phase labels and acceptance criteria",
    version,
    propagate_version = true,
    after_help = "Examples:\n  \
        triage run --config triage.yaml --dry-run\n  \
        triage run --config triage.yaml\n\n\
        Weekly cron job (Mondays 9 AM):\n  \
        0 9 * * 1 triage run --config /etc/triage.yaml"
)]
struct Cli {
    /// Path to the triage config file (required)
    #[arg(long, global = true, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Tracker access token (overrides the config file)
    #[arg(long, global = true, env = "TRIAGE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one triage pass over the project
    Run {
        /// Decide and log every action without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect the triage configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();
    // Global args cannot be marked required, so enforce it here.
    let Some(config) = cli.config else {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "the following required argument was not provided:\n  --config <CONFIG>\n\n\
                 Pass --config or set TRIAGE_CONFIG.",
            )
            .exit();
    };

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run { dry_run } => cmd::run::run(&config, cli.access_token, dry_run, cli.json),
        Commands::Config { subcommand } => {
            cmd::config::run(&config, cli.access_token, subcommand, cli.json)
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
