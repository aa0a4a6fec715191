//! TurnGraph CLI: the main entry point.
//!
//! Commands:
//! - `run`    : Run one agent turn and print the reply
//! - `config` : Print the default or effective configuration
//! - `worker` : Child-process entry point for process isolation (hidden)

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use turngraph_config::WorkerType;

mod commands;

#[derive(Parser)]
#[command(
    name = "turngraph",
    about = "TurnGraph: bounded model/tools turns for LLM agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one agent turn
    Run {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// System message placed before the user message
        #[arg(short, long)]
        system: Option<String>,

        /// Run behind a worker thread or child process
        #[arg(long, value_enum)]
        isolate: Option<Isolation>,

        /// Override the recursion ceiling
        #[arg(long)]
        recursion_limit: Option<u32>,

        /// Label for logs and event metadata
        #[arg(long)]
        run_name: Option<String>,

        /// Print the final execution state as JSON
        #[arg(long)]
        json: bool,

        /// Earlier `--json` output whose streaming content seeds this run
        /// (needs `agent.keep_content`)
        #[arg(long, value_name = "FILE")]
        resume: Option<PathBuf>,
    },

    /// Print configuration as TOML
    Config {
        /// Show the effective configuration instead of the defaults
        #[arg(long)]
        current: bool,
    },

    /// Serve one isolated run over stdin/stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Clone, Copy, ValueEnum)]
enum Isolation {
    Thread,
    Process,
}

impl From<Isolation> for WorkerType {
    fn from(value: Isolation) -> Self {
        match value {
            Isolation::Thread => WorkerType::Thread,
            Isolation::Process => WorkerType::Process,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries command output and the worker protocol
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            message,
            system,
            isolate,
            recursion_limit,
            run_name,
            json,
            resume,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                system,
                isolate: isolate.map(WorkerType::from),
                recursion_limit,
                run_name,
                json,
                resume,
            })
            .await?
        }
        Commands::Config { current } => commands::config_cmd::run(current)?,
        Commands::Worker => commands::worker::run().await?,
    }

    Ok(())
}
