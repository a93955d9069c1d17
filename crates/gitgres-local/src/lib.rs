//! Minimal local repository access.
//!
//! The remote helper and CLI front-ends need to read and write the user's
//! local `.git` directory: enumerate its objects (loose and packed), copy
//! object content in both directions, resolve refs, and (for `clone`)
//! create a repository and check out `HEAD`. This crate provides exactly
//! that surface; everything richer (index, worktree status, config) stays
//! with the real git client.

mod checkout;
mod loose;
mod refs;
mod repo;

pub use loose::LooseStore;
pub use repo::LocalRepository;

use std::path::PathBuf;

/// Errors from local repository access.
#[derive(Debug, thiserror::Error)]
pub enum LocalError {
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("object not found: {0}")]
    ObjectNotFound(gitgres_hash::ObjectId),

    #[error("corrupt loose object {oid}: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error("ref parse error in {name}: {reason}")]
    RefParse { name: String, reason: String },

    #[error("symbolic ref loop at {0}")]
    SymrefLoop(String),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pack(#[from] gitgres_pack::PackError),

    #[error(transparent)]
    Object(#[from] gitgres_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] gitgres_hash::HashError),
}
