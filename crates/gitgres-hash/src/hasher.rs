//! Canonical git object hashing.
//!
//! The hash of an object is SHA-1 over `"<type-name> <size>\0"` followed
//! by the raw content. Type names are the lowercase English names of the
//! relational type codes: 1=commit, 2=tree, 3=blob, 4=tag.

use digest::Digest;

use crate::{HashError, ObjectId};

/// Map a relational object type code to its canonical ASCII name.
pub fn type_name(code: i16) -> Result<&'static str, HashError> {
    match code {
        1 => Ok("commit"),
        2 => Ok("tree"),
        3 => Ok("blob"),
        4 => Ok("tag"),
        other => Err(HashError::InvalidType(other)),
    }
}

/// Streaming SHA-1 with collision detection.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through
/// the [`std::io::Write`] implementation, then finalised into an
/// [`ObjectId`]. A detected SHA-1 collision is reported as an error rather
/// than silently producing a digest.
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the ObjectId.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        ObjectId::from_bytes(result.hash().as_slice())
    }

    /// Convenience: hash raw data in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash a git object given its type name: `"{type} {len}\0{content}"`.
    pub fn hash_object(type_name: &str, content: &[u8]) -> Result<ObjectId, HashError> {
        let header = format!("{} {}\0", type_name, content.len());
        let mut h = Self::new();
        h.update(header.as_bytes());
        h.update(content);
        h.finalize()
    }

    /// Hash a git object given its relational type code (1..=4).
    ///
    /// Codes outside the range fail with `InvalidType` before any hashing.
    pub fn hash_object_code(code: i16, content: &[u8]) -> Result<ObjectId, HashError> {
        Self::hash_object(type_name(code)?, content)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
