use std::io;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use gitgres_helper::{split_url, HelperSession};
use gitgres_local::LocalRepository;
use gitgres_store::{Db, PgOdb, PgRefdb};
use tracing::debug;

const USAGE: &str = "Usage: git-remote-gitgres <remote-name> <url>

This is a git remote helper. Use it via:
  git remote add <name> gitgres::<conninfo>/<reponame>
  git push <name> main
  git clone gitgres::<conninfo>/<reponame>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    init_trace();

    match run(&args[2]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: git-remote-gitgres: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// When `GIT_REMOTE_GITGRES_DEBUG` names a file, append a structured
/// trace there. stdout and stderr belong to the protocol dialogue, so
/// nothing is logged otherwise.
fn init_trace() {
    let Ok(path) = std::env::var("GIT_REMOTE_GITGRES_DEBUG") else {
        return;
    };
    if path.is_empty() {
        return;
    }
    let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();
}

fn run(url: &str) -> Result<()> {
    let (conninfo, reponame) = split_url(url)?;
    debug!(url, conninfo = conninfo.as_str(), repo = reponame.as_str(), "starting");

    let db = Db::connect(&conninfo).context("connection failed")?;
    let repo_id = db
        .get_or_create_repo(&reponame)
        .with_context(|| format!("preparing repository '{reponame}'"))?;

    let odb = PgOdb::new(db.clone(), repo_id);
    let refdb = PgRefdb::new(db, repo_id);

    let git_dir = std::env::var("GIT_DIR").unwrap_or_else(|_| ".git".to_string());
    let local = LocalRepository::open(&git_dir)
        .with_context(|| format!("opening local repository at '{git_dir}'"))?;
    debug!(repo_id, git_dir = git_dir.as_str(), "ready");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut session =
        HelperSession::new(stdin.lock(), stdout.lock(), &odb, &refdb, &local);
    session.run().context("helper session failed")?;
    Ok(())
}
