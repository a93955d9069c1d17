//! Pack ingestion: stream a pack into a scratch directory, then insert
//! every materialised object through the object backend.

use gitgres_backend::{BackendError, OdbBackend, Writepack};
use gitgres_pack::PackIngester;
use tempfile::TempDir;
use tracing::debug;

use crate::odb::PgOdb;

/// A writepack sink for one incoming pack.
///
/// The staging directory lives as long as the sink and is removed on drop,
/// whether or not the commit happened.
pub struct PgWritepack<'a> {
    odb: &'a PgOdb,
    // Declared before the staging dir so the file closes before the
    // directory is removed on drop.
    ingester: Option<PackIngester>,
    _staging: TempDir,
}

impl<'a> PgWritepack<'a> {
    pub(crate) fn new(odb: &'a PgOdb) -> Result<Self, BackendError> {
        let staging = TempDir::with_prefix("gitgres-writepack-")
            .map_err(|e| BackendError::Internal(format!("creating staging dir: {e}")))?;
        let ingester = PackIngester::create(staging.path().join("incoming.pack"))
            .map_err(|e| BackendError::Internal(format!("creating staging pack: {e}")))?;

        Ok(Self {
            odb,
            ingester: Some(ingester),
            _staging: staging,
        })
    }
}

impl Writepack for PgWritepack<'_> {
    fn append(&mut self, data: &[u8]) -> Result<(), BackendError> {
        let ingester = self
            .ingester
            .as_mut()
            .ok_or_else(|| BackendError::Internal("writepack already committed".into()))?;
        ingester
            .append(data)
            .map_err(|e| BackendError::Internal(format!("staging pack bytes: {e}")))
    }

    fn commit(&mut self) -> Result<usize, BackendError> {
        let ingester = self
            .ingester
            .take()
            .ok_or_else(|| BackendError::Internal("writepack already committed".into()))?;

        // Thin-pack bases resolve against what the store already holds.
        let objects = ingester
            .finish(|oid| self.odb.read(oid).ok())
            .map_err(|e| BackendError::Internal(format!("pack indexing failed: {e}")))?;

        let count = objects.len();
        for obj in objects {
            self.odb.write(&obj.oid, &obj.data, obj.obj_type)?;
        }
        debug!(repo_id = self.odb.repo_id(), count, "ingested pack");
        Ok(count)
    }
}
