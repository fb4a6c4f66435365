mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stundenplan_core::FeedConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stundenplan")]
#[command(about = "Stundenplan-Abfragen von der Kommandozeile")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the lesson running right now
    Now,

    /// Show the next upcoming lesson
    Next,

    /// Show today's remaining lessons
    Today,

    /// Show this week's lessons grouped by day
    Week,

    /// Show the next upcoming exams
    Exams {
        /// How many exams to show
        #[arg(short, long, default_value = "5")]
        count: usize,
    },

    /// Fetch the feed and write the normalized table
    Fetch {
        /// Output file (defaults to the snapshot path)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("stundenplan_cli={log_level},stundenplan_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FeedConfig::from_env()?;

    match cli.command {
        Commands::Now => commands::now_command(config, cli.json).await,
        Commands::Next => commands::next_command(config, cli.json).await,
        Commands::Today => commands::today_command(config, cli.json).await,
        Commands::Week => commands::week_command(config, cli.json).await,
        Commands::Exams { count } => commands::exams_command(config, count, cli.json).await,
        Commands::Fetch { output } => commands::fetch_command(config, output).await,
    }
}
