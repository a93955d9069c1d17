//! Object database backend interface.

use gitgres_hash::ObjectId;
use gitgres_object::ObjectType;

use crate::BackendError;

/// A sink for streaming a packfile into the object store.
///
/// Bytes arrive through [`append`](Writepack::append); [`commit`](Writepack::commit)
/// indexes the pack and writes every contained object through the backend.
/// Implementations own a private staging area that is destroyed on drop,
/// including after a failed commit.
pub trait Writepack {
    /// Append a chunk of raw pack bytes.
    fn append(&mut self, data: &[u8]) -> Result<(), BackendError>;

    /// Index the received pack and store every object it contains.
    /// Returns the number of objects written.
    fn commit(&mut self) -> Result<usize, BackendError>;
}

/// Trait for pluggable object storage backends.
///
/// Contracts match what a git library expects from an odb backend:
/// content-addressed reads and writes, prefix resolution with ambiguity
/// signalling, and stable-order iteration.
pub trait OdbBackend {
    /// Read an object by exact OID.
    fn read(&self, oid: &ObjectId) -> Result<(ObjectType, Vec<u8>), BackendError>;

    /// Read just the type and size, without transferring content.
    fn read_header(&self, oid: &ObjectId) -> Result<(ObjectType, usize), BackendError>;

    /// Resolve a short OID of `hex_len` hex characters (1..=40).
    ///
    /// Zero matches is `NotFound`, more than one is `Ambiguous`; a full
    /// 40-character prefix short-circuits to an exact read.
    fn read_prefix(
        &self,
        short: &ObjectId,
        hex_len: usize,
    ) -> Result<(ObjectId, ObjectType, Vec<u8>), BackendError>;

    /// Insert an object. Idempotent: re-inserting an existing OID is a
    /// no-op, never an error. The content is stored as given; callers
    /// accepting untrusted bytes re-hash before trusting `oid`.
    fn write(&self, oid: &ObjectId, data: &[u8], obj_type: ObjectType)
        -> Result<(), BackendError>;

    /// Does an object with this exact OID exist?
    fn exists(&self, oid: &ObjectId) -> Result<bool, BackendError>;

    /// Prefix variant of [`exists`](OdbBackend::exists): resolves the short
    /// OID to the unique full OID.
    fn exists_prefix(&self, short: &ObjectId, hex_len: usize) -> Result<ObjectId, BackendError>;

    /// Invoke `cb` once per stored OID, in an order that is stable within
    /// a snapshot. Returning `false` from the callback stops the
    /// iteration early.
    fn foreach(&self, cb: &mut dyn FnMut(&ObjectId) -> bool) -> Result<(), BackendError>;

    /// Open a streaming pack ingestion sink.
    fn writepack(&self) -> Result<Box<dyn Writepack + '_>, BackendError>;
}
