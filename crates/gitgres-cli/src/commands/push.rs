use anyhow::{Context, Result};
use clap::Args;
use gitgres_backend::{OdbBackend, RefdbBackend, Reference};
use gitgres_local::LocalRepository;
use gitgres_store::{PgOdb, PgRefdb};
use tracing::warn;

#[derive(Args)]
pub struct PushArgs {
    /// Database connection string
    conninfo: String,
    /// Repository name
    reponame: String,
    /// Path to the local repository to push from
    local_path: std::path::PathBuf,
}

pub fn run(args: &PushArgs) -> Result<()> {
    let (db, repo_id) = super::open_or_create(&args.conninfo, &args.reponame)?;
    let odb = PgOdb::new(db.clone(), repo_id);
    let refdb = PgRefdb::new(db, repo_id);

    let git_dir = resolve_git_dir(&args.local_path);
    let local = LocalRepository::open(&git_dir)
        .with_context(|| format!("opening local repository at '{}'", git_dir.display()))?;

    // Copy every object the store does not already hold.
    let mut count = 0usize;
    let mut errors = 0usize;
    for oid in local.all_oids()? {
        if odb.exists(&oid)? {
            continue;
        }
        match local.read(&oid) {
            Ok((obj_type, data)) => {
                odb.write(&oid, &data, obj_type)?;
                count += 1;
            }
            Err(e) => {
                eprintln!("warning: could not read object {oid}: {e}");
                errors += 1;
            }
        }
    }
    print!("Pushed {count} objects");
    if errors > 0 {
        print!(" ({errors} errors)");
    }
    println!();

    // Mirror every ref, then HEAD's symbolic target.
    let mut ref_count = 0usize;
    for reference in local.list_refs()? {
        match refdb.write(&reference, true, None, None, None, None) {
            Ok(()) => ref_count += 1,
            Err(e) => eprintln!("warning: could not push ref {}: {e}", reference.name()),
        }
    }

    match local.read_ref("HEAD")? {
        Some(head @ Reference::Symbolic { .. }) => {
            if let Err(e) = refdb.write(&head, true, None, None, None, None) {
                eprintln!("warning: failed to set HEAD: {e}");
            }
        }
        Some(_) => warn!("local HEAD is detached; not mirrored"),
        None => {}
    }

    println!("Pushed {ref_count} refs");
    Ok(())
}

/// Accept either a worktree (with a `.git` inside) or a git dir.
pub(crate) fn resolve_git_dir(path: &std::path::Path) -> std::path::PathBuf {
    let dotgit = path.join(".git");
    if dotgit.is_dir() {
        dotgit
    } else {
        path.to_path_buf()
    }
}
