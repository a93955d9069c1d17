//! The object database backend.

use gitgres_backend::{BackendError, OdbBackend, Writepack};
use gitgres_hash::ObjectId;
use gitgres_object::ObjectType;
use tracing::debug;

use crate::db::{Db, RepoId};
use crate::writepack::PgWritepack;

/// Object store for one repository, backed by the `objects` table.
pub struct PgOdb {
    db: Db,
    repo_id: RepoId,
}

impl PgOdb {
    pub fn new(db: Db, repo_id: RepoId) -> Self {
        Self { db, repo_id }
    }

    pub fn repo_id(&self) -> RepoId {
        self.repo_id
    }

    /// Hex length must be 1..=40; full-length prefixes short-circuit to
    /// exact lookups.
    fn check_prefix_len(hex_len: usize) -> Result<(), BackendError> {
        if hex_len == 0 || hex_len > 40 {
            return Err(BackendError::MalformedInput(format!(
                "prefix length {hex_len} out of range 1..=40"
            )));
        }
        Ok(())
    }
}

impl OdbBackend for PgOdb {
    fn read(&self, oid: &ObjectId) -> Result<(ObjectType, Vec<u8>), BackendError> {
        let row = self
            .db
            .conn()
            .query_opt(
                "SELECT type, content FROM objects WHERE repo_id = $1 AND oid = $2",
                &[&self.repo_id, &oid.as_bytes()],
            )
            .map_err(BackendError::storage)?
            .ok_or_else(|| BackendError::NotFound(oid.to_hex()))?;

        let type_code: i16 = row.get(0);
        let content: Vec<u8> = row.get(1);
        Ok((ObjectType::from_code(type_code)?, content))
    }

    fn read_header(&self, oid: &ObjectId) -> Result<(ObjectType, usize), BackendError> {
        let row = self
            .db
            .conn()
            .query_opt(
                "SELECT type, size FROM objects WHERE repo_id = $1 AND oid = $2",
                &[&self.repo_id, &oid.as_bytes()],
            )
            .map_err(BackendError::storage)?
            .ok_or_else(|| BackendError::NotFound(oid.to_hex()))?;

        let type_code: i16 = row.get(0);
        let size: i32 = row.get(1);
        Ok((ObjectType::from_code(type_code)?, size as usize))
    }

    fn read_prefix(
        &self,
        short: &ObjectId,
        hex_len: usize,
    ) -> Result<(ObjectId, ObjectType, Vec<u8>), BackendError> {
        Self::check_prefix_len(hex_len)?;
        if hex_len == 40 {
            let (obj_type, content) = self.read(short)?;
            return Ok((*short, obj_type, content));
        }

        let byte_len = hex_len.div_ceil(2);
        let prefix = &short.as_bytes()[..byte_len];
        let rows = self
            .db
            .conn()
            .query(
                "SELECT oid, type, content FROM objects \
                 WHERE repo_id = $1 AND substring(oid from 1 for $2) = $3",
                &[&self.repo_id, &(byte_len as i32), &prefix],
            )
            .map_err(BackendError::storage)?;

        match rows.len() {
            0 => Err(BackendError::NotFound(short.to_hex()[..hex_len].to_string())),
            1 => {
                let oid = ObjectId::from_bytes(rows[0].get::<_, &[u8]>(0))?;
                let type_code: i16 = rows[0].get(1);
                let content: Vec<u8> = rows[0].get(2);
                Ok((oid, ObjectType::from_code(type_code)?, content))
            }
            _ => Err(BackendError::Ambiguous {
                prefix: short.to_hex()[..hex_len].to_string(),
            }),
        }
    }

    fn write(
        &self,
        oid: &ObjectId,
        data: &[u8],
        obj_type: ObjectType,
    ) -> Result<(), BackendError> {
        self.db
            .conn()
            .execute(
                "INSERT INTO objects (repo_id, oid, type, size, content) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (repo_id, oid) DO NOTHING",
                &[
                    &self.repo_id,
                    &oid.as_bytes(),
                    &obj_type.code(),
                    &(data.len() as i32),
                    &data,
                ],
            )
            .map_err(BackendError::storage)?;
        Ok(())
    }

    fn exists(&self, oid: &ObjectId) -> Result<bool, BackendError> {
        let row = self
            .db
            .conn()
            .query_opt(
                "SELECT 1 FROM objects WHERE repo_id = $1 AND oid = $2",
                &[&self.repo_id, &oid.as_bytes()],
            )
            .map_err(BackendError::storage)?;
        Ok(row.is_some())
    }

    fn exists_prefix(&self, short: &ObjectId, hex_len: usize) -> Result<ObjectId, BackendError> {
        Self::check_prefix_len(hex_len)?;
        if hex_len == 40 {
            return if self.exists(short)? {
                Ok(*short)
            } else {
                Err(BackendError::NotFound(short.to_hex()))
            };
        }

        let byte_len = hex_len.div_ceil(2);
        let prefix = &short.as_bytes()[..byte_len];
        let rows = self
            .db
            .conn()
            .query(
                "SELECT oid FROM objects \
                 WHERE repo_id = $1 AND substring(oid from 1 for $2) = $3",
                &[&self.repo_id, &(byte_len as i32), &prefix],
            )
            .map_err(BackendError::storage)?;

        match rows.len() {
            0 => Err(BackendError::NotFound(short.to_hex()[..hex_len].to_string())),
            1 => Ok(ObjectId::from_bytes(rows[0].get::<_, &[u8]>(0))?),
            _ => Err(BackendError::Ambiguous {
                prefix: short.to_hex()[..hex_len].to_string(),
            }),
        }
    }

    fn foreach(&self, cb: &mut dyn FnMut(&ObjectId) -> bool) -> Result<(), BackendError> {
        let rows = self
            .db
            .conn()
            .query(
                "SELECT oid FROM objects WHERE repo_id = $1 ORDER BY oid",
                &[&self.repo_id],
            )
            .map_err(BackendError::storage)?;

        for row in rows {
            let oid = ObjectId::from_bytes(row.get::<_, &[u8]>(0))?;
            if !cb(&oid) {
                break;
            }
        }
        Ok(())
    }

    fn writepack(&self) -> Result<Box<dyn Writepack + '_>, BackendError> {
        debug!(repo_id = self.repo_id, "opening writepack sink");
        Ok(Box::new(PgWritepack::new(self)?))
    }
}
