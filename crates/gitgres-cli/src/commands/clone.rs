use anyhow::{Context, Result};
use clap::Args;
use gitgres_backend::{OdbBackend, RefdbBackend, Reference};
use gitgres_local::LocalRepository;
use gitgres_store::{PgOdb, PgRefdb};

#[derive(Args)]
pub struct CloneArgs {
    /// Database connection string
    conninfo: String,
    /// Repository name
    reponame: String,
    /// Directory to create the local repository in
    dest: std::path::PathBuf,
}

pub fn run(args: &CloneArgs) -> Result<()> {
    let (db, repo_id) = super::open_existing(&args.conninfo, &args.reponame)?;
    let odb = PgOdb::new(db.clone(), repo_id);
    let refdb = PgRefdb::new(db, repo_id);

    let local = LocalRepository::init(&args.dest, false)
        .with_context(|| format!("initialising '{}'", args.dest.display()))?;

    // Copy every object out of the store.
    let mut count = 0usize;
    let mut errors = 0usize;
    let mut copy_err: Option<anyhow::Error> = None;
    odb.foreach(&mut |oid| {
        match odb.read(oid) {
            Ok((obj_type, data)) => match local.write(obj_type, &data) {
                Ok(_) => count += 1,
                Err(e) => {
                    copy_err = Some(e.into());
                    return false;
                }
            },
            Err(e) => {
                eprintln!("warning: could not read object {oid}: {e}");
                errors += 1;
            }
        }
        true
    })?;
    if let Some(e) = copy_err {
        return Err(e.context("writing objects into the clone"));
    }
    print!("Cloned {count} objects");
    if errors > 0 {
        print!(" ({errors} errors)");
    }
    println!();

    // Recreate refs; HEAD's symbolic target is applied last.
    let mut ref_count = 0usize;
    let mut head_target: Option<String> = None;
    for reference in refdb.iter(None)? {
        let reference = reference?;
        if reference.name() == "HEAD" {
            head_target = reference.symbolic_target().map(str::to_string);
            continue;
        }
        let result = match &reference {
            Reference::Direct { name, oid } => local.write_ref(name, oid),
            Reference::Symbolic { name, target } => local.write_symbolic_ref(name, target),
        };
        match result {
            Ok(()) => ref_count += 1,
            Err(e) => eprintln!("warning: could not create ref {}: {e}", reference.name()),
        }
    }
    if let Some(target) = head_target {
        local
            .write_symbolic_ref("HEAD", &target)
            .context("setting HEAD")?;
    }
    println!("Cloned {ref_count} refs");

    match local.checkout_head() {
        Ok(files) => println!("Checked out {files} files"),
        Err(e) => eprintln!("warning: checkout failed: {e}"),
    }

    Ok(())
}
