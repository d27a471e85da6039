//! tutor CLI — console tutoring sessions and progress reports.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "tutor",
    version,
    about = "Adaptive tutoring sessions with spaced repetition"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive tutoring session
    Session {
        /// Learner name
        #[arg(long)]
        student: String,

        /// Topic catalogue file or directory (overrides config)
        #[arg(long)]
        content: Option<PathBuf>,

        /// Provider to grade with (overrides default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Progress database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Fixed seed for problem selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List topics due for review today
    Due {
        #[arg(long)]
        student: String,

        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Show every progress record for a learner
    Progress {
        #[arg(long)]
        student: String,

        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Show past sessions
    History {
        #[arg(long)]
        student: String,

        /// Number of most recent sessions to show
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Check a topic catalogue for problems
    Validate {
        /// Catalogue file or directory (defaults to the configured one)
        #[arg(long)]
        content: Option<PathBuf>,
    },

    /// Create a starter config and topic catalogue
    Init,
}

#[tokio::main]
async fn main() {
    let filter = match "tutor=info".parse::<Directive>() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Session {
            student,
            content,
            provider,
            database,
            seed,
        } => {
            commands::session::execute(
                config,
                commands::session::SessionArgs {
                    student,
                    content,
                    provider,
                    database,
                    seed,
                },
            )
            .await
        }
        Commands::Due { student, database } => commands::due::execute(config, student, database),
        Commands::Progress { student, database } => {
            commands::progress::execute(config, student, database)
        }
        Commands::History {
            student,
            limit,
            format,
            database,
        } => commands::history::execute(config, student, limit, format, database),
        Commands::Validate { content } => commands::validate::execute(config, content),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
