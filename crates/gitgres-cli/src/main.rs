mod commands;

use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gitgres",
    about = "Store git repositories in PostgreSQL",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository record in the database
    Init(commands::init::InitArgs),
    /// Copy objects and refs from a local repository into the database
    Push(commands::push::PushArgs),
    /// Copy a database repository into a new local repository
    Clone(commands::clone::CloneArgs),
    /// List the refs stored for a repository
    LsRefs(commands::ls_refs::LsRefsArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result: Result<()> = match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Push(args) => commands::push::run(args),
        Commands::Clone(args) => commands::clone::run(args),
        Commands::LsRefs(args) => commands::ls_refs::run(args),
    };

    if let Err(e) = result {
        eprintln!("fatal: {e:#}");
        process::exit(1);
    }
}
