use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct InitArgs {
    /// Database connection string
    conninfo: String,
    /// Repository name
    reponame: String,
}

pub fn run(args: &InitArgs) -> Result<()> {
    let (_db, repo_id) = super::open_or_create(&args.conninfo, &args.reponame)?;
    println!("Repository '{}' ready (id={})", args.reponame, repo_id);
    Ok(())
}
