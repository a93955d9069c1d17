//! The reference database backend.
//!
//! Ref updates are linearised per `(repo_id, name)`: `write` and `delete`
//! run their compare-and-swap under a `SELECT ... FOR UPDATE` row lock,
//! and `lock`/`unlock` bracket a transaction-scoped advisory lock keyed by
//! [`lock_key`](crate::lock_key). The lock token pins the connection for
//! as long as it is held, so the advisory-lock transaction can only be
//! ended by the unlock that consumes the token. A reflog row always
//! lands in the same transaction as the ref change it records.

use gitgres_backend::{
    BackendError, RefLock, RefdbBackend, Reference, UnlockDisposition,
};
use gitgres_hash::ObjectId;
use gitgres_object::Identity;
use postgres::GenericClient;
use tracing::debug;

use crate::db::{Db, DbSession, RepoId};
use crate::lockkey::lock_key;

const UPSERT_DIRECT: &str = "INSERT INTO refs (repo_id, name, oid, symbolic) \
                             VALUES ($1, $2, $3, NULL) \
                             ON CONFLICT (repo_id, name) DO UPDATE \
                             SET oid = EXCLUDED.oid, symbolic = NULL";

const UPSERT_SYMBOLIC: &str = "INSERT INTO refs (repo_id, name, oid, symbolic) \
                               VALUES ($1, $2, NULL, $3) \
                               ON CONFLICT (repo_id, name) DO UPDATE \
                               SET oid = NULL, symbolic = EXCLUDED.symbolic";

/// Reference store for one repository, backed by the `refs` and `reflog`
/// tables.
pub struct PgRefdb {
    db: Db,
    repo_id: RepoId,
}

impl PgRefdb {
    pub fn new(db: Db, repo_id: RepoId) -> Self {
        Self { db, repo_id }
    }

    pub fn repo_id(&self) -> RepoId {
        self.repo_id
    }
}

impl RefdbBackend for PgRefdb {
    fn exists(&self, name: &str) -> Result<bool, BackendError> {
        let row = self
            .db
            .conn()
            .query_opt(
                "SELECT 1 FROM refs WHERE repo_id = $1 AND name = $2",
                &[&self.repo_id, &name],
            )
            .map_err(BackendError::storage)?;
        Ok(row.is_some())
    }

    fn lookup(&self, name: &str) -> Result<Reference, BackendError> {
        let row = self
            .db
            .conn()
            .query_opt(
                "SELECT oid, symbolic FROM refs WHERE repo_id = $1 AND name = $2",
                &[&self.repo_id, &name],
            )
            .map_err(BackendError::storage)?
            .ok_or_else(|| BackendError::NotFound(name.to_string()))?;

        reference_from_columns(name, row.get(0), row.get(1))
    }

    fn iter(
        &self,
        glob: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<Reference, BackendError>> + '_>, BackendError>
    {
        let rows = match glob.filter(|g| !g.is_empty()) {
            Some(glob) => {
                let like = glob_to_like(glob);
                self.db
                    .conn()
                    .query(
                        "SELECT name, oid, symbolic FROM refs \
                         WHERE repo_id = $1 AND name LIKE $2 ORDER BY name",
                        &[&self.repo_id, &like],
                    )
                    .map_err(BackendError::storage)?
            }
            None => self
                .db
                .conn()
                .query(
                    "SELECT name, oid, symbolic FROM refs \
                     WHERE repo_id = $1 ORDER BY name",
                    &[&self.repo_id],
                )
                .map_err(BackendError::storage)?,
        };

        // The iterator owns its result rows; nothing borrows the
        // connection once the query has returned.
        Ok(Box::new(rows.into_iter().map(|row| {
            let name: String = row.get(0);
            reference_from_columns(&name, row.get(1), row.get(2))
        })))
    }

    fn write(
        &self,
        reference: &Reference,
        force: bool,
        who: Option<&Identity>,
        message: Option<&str>,
        old_oid: Option<&ObjectId>,
        old_target: Option<&str>,
    ) -> Result<(), BackendError> {
        let name = reference.name();
        let mut conn = self.db.conn();
        let mut txn = conn.transaction().map_err(BackendError::storage)?;

        if !force {
            // Row-level lock on the current value for the CAS check.
            let rows = txn
                .query(
                    "SELECT oid, symbolic FROM refs \
                     WHERE repo_id = $1 AND name = $2 FOR UPDATE",
                    &[&self.repo_id, &name],
                )
                .map_err(BackendError::storage)?;

            if old_oid.is_some() || old_target.is_some() {
                // The ref must exist and match the expected value exactly.
                let row = rows
                    .first()
                    .ok_or_else(|| BackendError::NotFound(name.to_string()))?;

                if let Some(expected) = old_oid {
                    let current: Option<Vec<u8>> = row.get(0);
                    if current.as_deref() != Some(expected.as_bytes()) {
                        return Err(BackendError::ValueChanged(name.to_string()));
                    }
                }
                if let Some(expected) = old_target {
                    let current: Option<String> = row.get(1);
                    if current.as_deref() != Some(expected) {
                        return Err(BackendError::ValueChanged(name.to_string()));
                    }
                }
            } else if !rows.is_empty() {
                return Err(BackendError::AlreadyExists(name.to_string()));
            }
        }

        upsert_reference(&mut txn, self.repo_id, reference)?;

        if let Some(who) = who {
            insert_reflog(
                &mut txn,
                self.repo_id,
                name,
                old_oid.copied(),
                reference.oid(),
                who,
                message,
            )?;
        }

        txn.commit().map_err(BackendError::storage)?;
        debug!(name, force, "wrote ref");
        Ok(())
    }

    fn rename(&self, old: &str, new: &str, force: bool) -> Result<Reference, BackendError> {
        let mut conn = self.db.conn();
        let mut txn = conn.transaction().map_err(BackendError::storage)?;

        if !force {
            let exists = txn
                .query_opt(
                    "SELECT 1 FROM refs WHERE repo_id = $1 AND name = $2",
                    &[&self.repo_id, &new],
                )
                .map_err(BackendError::storage)?;
            if exists.is_some() {
                return Err(BackendError::AlreadyExists(new.to_string()));
            }
        } else {
            txn.execute(
                "DELETE FROM refs WHERE repo_id = $1 AND name = $2",
                &[&self.repo_id, &new],
            )
            .map_err(BackendError::storage)?;
        }

        let renamed = txn
            .execute(
                "UPDATE refs SET name = $1 WHERE repo_id = $2 AND name = $3",
                &[&new, &self.repo_id, &old],
            )
            .map_err(BackendError::storage)?;
        if renamed == 0 {
            return Err(BackendError::NotFound(old.to_string()));
        }

        // The reflog history follows the ref.
        txn.execute(
            "UPDATE reflog SET ref_name = $1 WHERE repo_id = $2 AND ref_name = $3",
            &[&new, &self.repo_id, &old],
        )
        .map_err(BackendError::storage)?;

        let row = txn
            .query_one(
                "SELECT oid, symbolic FROM refs WHERE repo_id = $1 AND name = $2",
                &[&self.repo_id, &new],
            )
            .map_err(BackendError::storage)?;
        let reference = reference_from_columns(new, row.get(0), row.get(1))?;

        txn.commit().map_err(BackendError::storage)?;
        debug!(old, new, "renamed ref");
        Ok(reference)
    }

    fn delete(
        &self,
        name: &str,
        old_oid: Option<&ObjectId>,
        old_target: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut conn = self.db.conn();
        let mut txn = conn.transaction().map_err(BackendError::storage)?;

        if old_oid.is_some() || old_target.is_some() {
            let rows = txn
                .query(
                    "SELECT oid, symbolic FROM refs \
                     WHERE repo_id = $1 AND name = $2 FOR UPDATE",
                    &[&self.repo_id, &name],
                )
                .map_err(BackendError::storage)?;
            let row = rows
                .first()
                .ok_or_else(|| BackendError::NotFound(name.to_string()))?;

            if let Some(expected) = old_oid {
                let current: Option<Vec<u8>> = row.get(0);
                if current.as_deref() != Some(expected.as_bytes()) {
                    return Err(BackendError::ValueChanged(name.to_string()));
                }
            }
            if let Some(expected) = old_target {
                let current: Option<String> = row.get(1);
                if current.as_deref() != Some(expected) {
                    return Err(BackendError::ValueChanged(name.to_string()));
                }
            }
        }

        txn.execute(
            "DELETE FROM refs WHERE repo_id = $1 AND name = $2",
            &[&self.repo_id, &name],
        )
        .map_err(BackendError::storage)?;
        txn.execute(
            "DELETE FROM reflog WHERE repo_id = $1 AND ref_name = $2",
            &[&self.repo_id, &name],
        )
        .map_err(BackendError::storage)?;

        txn.commit().map_err(BackendError::storage)?;
        debug!(name, "deleted ref");
        Ok(())
    }

    fn lock(&self, name: &str) -> Result<RefLock, BackendError> {
        let key = lock_key(self.repo_id, name);

        // The owned session rides inside the token: the connection
        // stays exclusively held, so nothing else can issue statements
        // into (or commit out from under) the lock transaction before
        // unlock ends it.
        let mut session = self.db.session();
        session.batch_execute("BEGIN").map_err(BackendError::storage)?;
        if let Err(e) = session.query("SELECT pg_advisory_xact_lock($1)", &[&key]) {
            let _ = session.batch_execute("ROLLBACK");
            return Err(BackendError::storage(e));
        }

        debug!(name, key, "acquired ref lock");
        Ok(RefLock::with_session(key, name, Box::new(session)))
    }

    fn unlock(
        &self,
        mut lock: RefLock,
        disposition: UnlockDisposition<'_>,
    ) -> Result<(), BackendError> {
        let session = lock
            .take_session()
            .and_then(|s| s.downcast::<DbSession>().ok())
            .ok_or_else(|| {
                BackendError::Internal(format!(
                    "ref lock for {} has no open session",
                    lock.name()
                ))
            })?;
        let mut session = *session;

        if let UnlockDisposition::Discard = disposition {
            session
                .batch_execute("ROLLBACK")
                .map_err(BackendError::storage)?;
            debug!(name = lock.name(), "discarded ref lock");
            return Ok(());
        }

        let outcome = self.apply_unlock(&mut session, disposition);
        match outcome {
            Ok(()) => {
                session
                    .batch_execute("COMMIT")
                    .map_err(BackendError::storage)?;
                debug!(name = lock.name(), "released ref lock");
                Ok(())
            }
            Err(e) => {
                let _ = session.batch_execute("ROLLBACK");
                Err(e)
            }
        }
    }

    fn has_log(&self, name: &str) -> Result<bool, BackendError> {
        let row = self
            .db
            .conn()
            .query_opt(
                "SELECT 1 FROM reflog WHERE repo_id = $1 AND ref_name = $2 LIMIT 1",
                &[&self.repo_id, &name],
            )
            .map_err(BackendError::storage)?;
        Ok(row.is_some())
    }

    fn reflog_rename(&self, old: &str, new: &str) -> Result<(), BackendError> {
        self.db
            .conn()
            .execute(
                "UPDATE reflog SET ref_name = $1 WHERE repo_id = $2 AND ref_name = $3",
                &[&new, &self.repo_id, &old],
            )
            .map_err(BackendError::storage)?;
        Ok(())
    }

    fn reflog_delete(&self, name: &str) -> Result<(), BackendError> {
        self.db
            .conn()
            .execute(
                "DELETE FROM reflog WHERE repo_id = $1 AND ref_name = $2",
                &[&self.repo_id, &name],
            )
            .map_err(BackendError::storage)?;
        Ok(())
    }
}

impl PgRefdb {
    /// Apply a write/delete disposition on the connection holding the
    /// advisory-lock transaction.
    fn apply_unlock(
        &self,
        conn: &mut postgres::Client,
        disposition: UnlockDisposition<'_>,
    ) -> Result<(), BackendError> {
        match disposition {
            UnlockDisposition::Discard => Ok(()),
            UnlockDisposition::Write {
                reference,
                who,
                message,
            } => {
                upsert_reference(conn, self.repo_id, reference)?;
                if let Some(who) = who {
                    insert_reflog(
                        conn,
                        self.repo_id,
                        reference.name(),
                        None,
                        reference.oid(),
                        who,
                        message,
                    )?;
                }
                Ok(())
            }
            UnlockDisposition::Delete { name } => {
                conn.execute(
                    "DELETE FROM refs WHERE repo_id = $1 AND name = $2",
                    &[&self.repo_id, &name],
                )
                .map_err(BackendError::storage)?;
                conn.execute(
                    "DELETE FROM reflog WHERE repo_id = $1 AND ref_name = $2",
                    &[&self.repo_id, &name],
                )
                .map_err(BackendError::storage)?;
                Ok(())
            }
        }
    }
}

/// Build a `Reference` from the nullable `oid`/`symbolic` columns.
fn reference_from_columns(
    name: &str,
    oid: Option<Vec<u8>>,
    symbolic: Option<String>,
) -> Result<Reference, BackendError> {
    match (oid, symbolic) {
        (Some(bytes), _) => Ok(Reference::direct(name, ObjectId::from_bytes(&bytes)?)),
        (None, Some(target)) => Ok(Reference::symbolic(name, target)),
        (None, None) => Err(BackendError::Internal(format!(
            "ref {name} has neither oid nor symbolic target"
        ))),
    }
}

/// Upsert a ref row, clearing whichever column the new value does not use.
fn upsert_reference<C: GenericClient>(
    conn: &mut C,
    repo_id: RepoId,
    reference: &Reference,
) -> Result<(), BackendError> {
    match reference {
        Reference::Direct { name, oid } => conn
            .execute(UPSERT_DIRECT, &[&repo_id, &name.as_str(), &oid.as_bytes()])
            .map_err(BackendError::storage)?,
        Reference::Symbolic { name, target } => conn
            .execute(
                UPSERT_SYMBOLIC,
                &[&repo_id, &name.as_str(), &target.as_str()],
            )
            .map_err(BackendError::storage)?,
    };
    Ok(())
}

/// Append a reflog row. The all-zero sentinel (and a symbolic new value)
/// store as NULL endpoints; the identity is rendered to
/// `"<name> <<email>>"` text.
fn insert_reflog<C: GenericClient>(
    conn: &mut C,
    repo_id: RepoId,
    name: &str,
    old_oid: Option<ObjectId>,
    new_oid: Option<ObjectId>,
    who: &Identity,
    message: Option<&str>,
) -> Result<(), BackendError> {
    let old_bytes = old_oid.filter(|o| !o.is_zero());
    let old_param: Option<&[u8]> = old_bytes.as_ref().map(|o| o.as_bytes());
    let new_bytes = new_oid.filter(|o| !o.is_zero());
    let new_param: Option<&[u8]> = new_bytes.as_ref().map(|o| o.as_bytes());

    let committer = String::from_utf8_lossy(&who.name_email()).into_owned();

    conn.execute(
        "INSERT INTO reflog (repo_id, ref_name, old_oid, new_oid, \
         committer, timestamp_s, tz_offset, message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        &[
            &repo_id,
            &name,
            &old_param,
            &new_param,
            &committer,
            &who.timestamp,
            &who.tz.as_str(),
            &message,
        ],
    )
    .map_err(BackendError::storage)?;
    Ok(())
}

/// Translate a ref glob to a SQL LIKE pattern: `*` becomes `%`. Other
/// glob constructs are not supported and match themselves literally.
fn glob_to_like(glob: &str) -> String {
    glob.replace('*', "%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_translation() {
        assert_eq!(glob_to_like("refs/heads/*"), "refs/heads/%");
        assert_eq!(glob_to_like("*"), "%");
        assert_eq!(glob_to_like("refs/tags/v1"), "refs/tags/v1");
        assert_eq!(glob_to_like("refs/*/feat*"), "refs/%/feat%");
    }

    #[test]
    fn reference_from_columns_prefers_direct() {
        let oid = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let r = reference_from_columns("refs/heads/x", Some(oid.as_bytes().to_vec()), None)
            .unwrap();
        assert_eq!(r.oid(), Some(oid));

        let r = reference_from_columns("HEAD", None, Some("refs/heads/x".into())).unwrap();
        assert_eq!(r.symbolic_target(), Some("refs/heads/x"));

        assert!(reference_from_columns("broken", None, None).is_err());
    }

    #[test]
    fn reference_from_columns_rejects_short_oid() {
        assert!(reference_from_columns("r", Some(vec![0u8; 12]), None).is_err());
    }
}
