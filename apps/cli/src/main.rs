//! streamfit CLI - trains and evaluates models over CSV streams.
//!
//! The binary plays the host pipeline: it reads the training (and optional
//! test) stream, feeds each row to the streaming trainer and prints the
//! records the trainer emits.

mod commands;
mod source;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// streamfit - streaming model training and evaluation
#[derive(Parser, Debug)]
#[command(name = "streamfit", author, version, about = "Streaming model training and evaluation")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train models over a CSV training stream
    ///
    /// Rows are grouped, trained and evaluated as the configuration says.
    /// One output row is printed per finished group.
    Run {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Training stream (CSV with a header row)
        #[arg(long)]
        train: PathBuf,

        /// Separate test stream (CSV with a header row)
        #[arg(long)]
        test: Option<PathBuf>,

        /// Print output rows as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a configuration file
    Check {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run { config, train, test, json } => {
            commands::run::execute(commands::run::RunOptions { config, train, test, json }).await
        }
        Command::Check { config } => commands::check::execute(&config),
    }
}
