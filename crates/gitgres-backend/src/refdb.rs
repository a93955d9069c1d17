//! Reference database backend interface.

use std::any::Any;
use std::fmt;

use gitgres_hash::ObjectId;
use gitgres_object::Identity;

use crate::{BackendError, Reference};

/// An acquired per-ref advisory lock.
///
/// The token is affine: it is handed out by [`RefdbBackend::lock`] and must
/// be consumed exactly once by [`RefdbBackend::unlock`], which ends the
/// transaction that scopes the lock.
///
/// A backend whose lock lives on a storage session pins that session
/// inside the token. Holding the token then means holding the
/// connection: no other operation can slip a statement into (or commit)
/// the lock transaction before `unlock` ends it.
pub struct RefLock {
    key: i64,
    name: String,
    session: Option<Box<dyn Any>>,
}

impl RefLock {
    /// A token with no attached session, for backends whose locks live
    /// elsewhere.
    pub fn new(key: i64, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            session: None,
        }
    }

    /// A token carrying the exclusive session its lock transaction runs
    /// on.
    pub fn with_session(key: i64, name: impl Into<String>, session: Box<dyn Any>) -> Self {
        Self {
            key,
            name: name.into(),
            session: Some(session),
        }
    }

    /// The advisory lock key the backend derived for this ref.
    pub fn key(&self) -> i64 {
        self.key
    }

    /// The locked ref name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Detach the pinned session. Yields at most once.
    pub fn take_session(&mut self) -> Option<Box<dyn Any>> {
        self.session.take()
    }
}

impl fmt::Debug for RefLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefLock")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("session", &self.session.is_some())
            .finish()
    }
}

/// What to do with a locked ref when releasing the lock.
pub enum UnlockDisposition<'a> {
    /// Roll back; the ref is untouched.
    Discard,
    /// Upsert the ref, optionally recording a reflog entry.
    Write {
        reference: &'a Reference,
        who: Option<&'a Identity>,
        message: Option<&'a str>,
    },
    /// Delete the ref and its reflog.
    Delete { name: &'a str },
}

/// Trait for pluggable reference storage backends.
///
/// Updates are linearised per ref: `write` and `delete` take a row-level
/// lock for their compare-and-swap check, and `lock`/`unlock` bracket a
/// transaction-scoped advisory lock. A reflog entry written by `write` or
/// `unlock` becomes visible atomically with the ref change it records.
pub trait RefdbBackend {
    /// Does a ref with this name exist?
    fn exists(&self, name: &str) -> Result<bool, BackendError>;

    /// Look up one ref. `NotFound` when absent.
    fn lookup(&self, name: &str) -> Result<Reference, BackendError>;

    /// Iterate refs ordered by name.
    ///
    /// `glob` filters names; only `*` is interpreted (as a match-anything
    /// wildcard), other glob constructs match themselves literally.
    fn iter(
        &self,
        glob: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<Reference, BackendError>> + '_>, BackendError>;

    /// Atomic compare-and-swap-and-reflog write.
    ///
    /// With `force` the ref is upserted unconditionally. Otherwise:
    /// if `old_oid` or `old_target` is given the ref must exist and match
    /// exactly (else `ValueChanged`, or `NotFound` when absent); if neither
    /// is given the ref must not exist yet (else `AlreadyExists`).
    /// When `who` is given, a reflog entry is recorded in the same unit of
    /// work.
    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        reference: &Reference,
        force: bool,
        who: Option<&Identity>,
        message: Option<&str>,
        old_oid: Option<&ObjectId>,
        old_target: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Rename a ref and its reflog history. Fails with `AlreadyExists` if
    /// `new` exists and `force` is not set; `NotFound` if `old` is absent.
    /// Returns the renamed reference.
    fn rename(&self, old: &str, new: &str, force: bool) -> Result<Reference, BackendError>;

    /// Delete a ref and its reflog, with an optional compare-and-swap
    /// check against the current value.
    fn delete(
        &self,
        name: &str,
        old_oid: Option<&ObjectId>,
        old_target: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Acquire a transaction-scoped advisory lock on a ref.
    fn lock(&self, name: &str) -> Result<RefLock, BackendError>;

    /// Consume a lock token, applying the disposition and ending the
    /// transaction that scopes the lock.
    fn unlock(&self, lock: RefLock, disposition: UnlockDisposition<'_>)
        -> Result<(), BackendError>;

    /// Does this ref have any reflog entries?
    fn has_log(&self, name: &str) -> Result<bool, BackendError>;

    /// Reflog storage is write-through; there is nothing to pre-create.
    fn ensure_log(&self, _name: &str) -> Result<(), BackendError> {
        Ok(())
    }

    /// Move the reflog history of `old` under `new`.
    fn reflog_rename(&self, old: &str, new: &str) -> Result<(), BackendError>;

    /// Drop all reflog entries of a ref.
    fn reflog_delete(&self, name: &str) -> Result<(), BackendError>;
}
