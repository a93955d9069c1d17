//! Connection lifecycle and repository records.

use std::sync::Arc;

use gitgres_backend::BackendError;
use gitgres_hash::ObjectId;
use parking_lot::{Mutex, MutexGuard};
use postgres::{Client, NoTls};
use tracing::debug;

/// Identifier of a repository row. Every object, ref, and reflog row is
/// scoped to one of these.
pub type RepoId = i32;

/// The embedded relational schema (idempotent DDL).
pub const SCHEMA: &str = include_str!("../schema.sql");

/// An owned, exclusive hold on the connection.
///
/// Unlike the short-lived guard [`Db::conn`] hands out, this one is not
/// tied to a borrow and can ride inside a ref-lock token, keeping the
/// connection (and the transaction open on it) pinned until the token
/// is consumed.
pub(crate) type DbSession =
    parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, Client>;

/// A PostgreSQL session.
///
/// One `Db` is one connection, exclusively owned by one logical session;
/// the backends sharing it serialise access through the interior mutex.
/// Concurrency across pushes comes from database-level locking, not from
/// threads inside this process.
#[derive(Clone)]
pub struct Db {
    client: Arc<Mutex<Client>>,
}

impl Db {
    /// Connect using a libpq-style connection string (or URL). The string
    /// is treated as opaque.
    pub fn connect(conninfo: &str) -> Result<Self, BackendError> {
        let client = Client::connect(conninfo, NoTls).map_err(BackendError::storage)?;
        debug!("connected to database");
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Execute the embedded schema DDL. Idempotent.
    pub fn install_schema(&self) -> Result<(), BackendError> {
        self.conn()
            .batch_execute(SCHEMA)
            .map_err(BackendError::storage)
    }

    /// Get the repository id for `name`, creating the row if needed.
    pub fn get_or_create_repo(&self, name: &str) -> Result<RepoId, BackendError> {
        let row = self
            .conn()
            .query_one(
                "INSERT INTO repositories (name) VALUES ($1) \
                 ON CONFLICT (name) DO UPDATE SET name = $1 \
                 RETURNING id",
                &[&name],
            )
            .map_err(BackendError::storage)?;
        let id: RepoId = row.get(0);
        debug!(repo = name, id, "repository ready");
        Ok(id)
    }

    /// Look up an existing repository. `NotFound` when absent.
    pub fn get_repo(&self, name: &str) -> Result<RepoId, BackendError> {
        let row = self
            .conn()
            .query_opt("SELECT id FROM repositories WHERE name = $1", &[&name])
            .map_err(BackendError::storage)?;
        match row {
            Some(row) => Ok(row.get(0)),
            None => Err(BackendError::NotFound(format!("repository '{name}'"))),
        }
    }

    /// Read a ref's reflog entries, oldest first.
    ///
    /// Reflog storage is write-through: the backend records entries as a
    /// side effect of ref updates, and reads go through this lower-level
    /// query rather than a library-level reflog object.
    pub fn read_reflog(
        &self,
        repo_id: RepoId,
        ref_name: &str,
    ) -> Result<Vec<ReflogRow>, BackendError> {
        let rows = self
            .conn()
            .query(
                "SELECT old_oid, new_oid, committer, timestamp_s, tz_offset, message \
                 FROM reflog WHERE repo_id = $1 AND ref_name = $2 ORDER BY id",
                &[&repo_id, &ref_name],
            )
            .map_err(BackendError::storage)?;

        rows.into_iter()
            .map(|row| {
                let old_oid = row
                    .get::<_, Option<Vec<u8>>>(0)
                    .map(|b| ObjectId::from_bytes(&b))
                    .transpose()?;
                let new_oid = row
                    .get::<_, Option<Vec<u8>>>(1)
                    .map(|b| ObjectId::from_bytes(&b))
                    .transpose()?;
                Ok(ReflogRow {
                    old_oid,
                    new_oid,
                    committer: row.get(2),
                    timestamp_s: row.get(3),
                    tz_offset: row.get(4),
                    message: row.get(5),
                })
            })
            .collect()
    }

    /// Lock the connection for a sequence of statements.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Client> {
        self.client.lock()
    }

    /// Take an owned exclusive hold on the connection (see
    /// [`DbSession`]).
    pub(crate) fn session(&self) -> DbSession {
        self.client.lock_arc()
    }
}

/// One reflog entry as stored. A `None` endpoint means "no ref" (the
/// creation or deletion side of an update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogRow {
    pub old_oid: Option<ObjectId>,
    pub new_oid: Option<ObjectId>,
    pub committer: String,
    pub timestamp_s: i64,
    pub tz_offset: String,
    pub message: Option<String>,
}
