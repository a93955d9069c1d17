pub mod clone;
pub mod init;
pub mod ls_refs;
pub mod push;

use anyhow::{Context, Result};
use gitgres_store::{Db, RepoId};

/// Connect and resolve an existing repository (for read-side commands).
pub fn open_existing(conninfo: &str, reponame: &str) -> Result<(Db, RepoId)> {
    let db = Db::connect(conninfo).context("connection to database failed")?;
    let repo_id = db.get_repo(reponame)?;
    Ok((db, repo_id))
}

/// Connect and get-or-create a repository (for write-side commands).
pub fn open_or_create(conninfo: &str, reponame: &str) -> Result<(Db, RepoId)> {
    let db = Db::connect(conninfo).context("connection to database failed")?;
    let repo_id = db
        .get_or_create_repo(reponame)
        .with_context(|| format!("preparing repository '{reponame}'"))?;
    Ok((db, repo_id))
}
