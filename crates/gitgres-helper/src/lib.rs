//! The gitgres remote helper.
//!
//! Git invokes the helper as `git-remote-gitgres <remote> <url>` for any
//! remote whose URL starts with `gitgres::`. The URL's last path segment
//! names the repository; everything before it is the database connection
//! string:
//!
//! ```text
//! git remote add pg gitgres::host=localhost dbname=git/myrepo
//! git push pg main
//! git clone gitgres::host=localhost dbname=git/myrepo
//! ```
//!
//! The protocol dialogue (`capabilities`, `list`, `fetch`, `push`) runs
//! over stdin/stdout; see gitremote-helpers(7). The session is generic
//! over the backend traits, so the same loop drives the PostgreSQL store
//! and the in-memory backends the tests use.

mod session;
mod spec;
mod url;

pub use session::HelperSession;
pub use spec::PushSpec;
pub use url::split_url;

use gitgres_backend::BackendError;
use gitgres_local::LocalError;

/// Errors the helper loop can stop on. Per-ref push problems never land
/// here; they are reported as protocol `error <dst> <reason>` lines.
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error("invalid URL: expected <conninfo>/<reponame>, got '{0}'")]
    InvalidUrl(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Local(#[from] LocalError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
