use anyhow::Result;
use clap::Args;
use gitgres_backend::{RefdbBackend, Reference};
use gitgres_store::PgRefdb;

#[derive(Args)]
pub struct LsRefsArgs {
    /// Database connection string
    conninfo: String,
    /// Repository name
    reponame: String,
}

pub fn run(args: &LsRefsArgs) -> Result<()> {
    let (db, repo_id) = super::open_existing(&args.conninfo, &args.reponame)?;
    let refdb = PgRefdb::new(db, repo_id);

    for reference in refdb.iter(None)? {
        match reference? {
            Reference::Symbolic { name, target } => {
                println!("-> {target:<40} {name}");
            }
            Reference::Direct { name, oid } => {
                println!("{:<42} {name}", oid.to_hex());
            }
        }
    }
    Ok(())
}
