//! Git object format codecs: object types, tree entries, commit headers,
//! and identity lines.
//!
//! These are pure byte-level decoders shared between the relational query
//! surface and the storage backends. Tree entry names and commit messages
//! are raw bytes; git does not require UTF-8 anywhere in object content.

pub mod commit;
mod identity;
pub mod tree;

pub use commit::CommitInfo;
pub use identity::Identity;
pub use tree::{TreeEntry, TreeIter};

use bstr::BString;
use gitgres_hash::{HashError, Hasher, ObjectId};

/// Errors produced by object decoding.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid object type code: {0}")]
    InvalidTypeCode(i16),

    #[error("malformed tree entry at offset {offset}: {reason}")]
    MalformedTree { offset: usize, reason: &'static str },

    #[error("malformed commit header: {0}")]
    MalformedHeader(String),

    #[error("malformed identity: {0}")]
    MalformedIdentity(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four git object types, carrying their relational wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    /// The relational type code (1=commit, 2=tree, 3=blob, 4=tag).
    pub fn code(&self) -> i16 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parse from a relational type code.
    pub fn from_code(code: i16) -> Result<Self, ObjectError> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            other => Err(ObjectError::InvalidTypeCode(other)),
        }
    }

    /// Parse from the type name in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    /// The canonical lowercase ASCII name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// Hash content of this type into its canonical OID.
    pub fn hash_content(&self, content: &[u8]) -> Result<ObjectId, HashError> {
        Hasher::hash_object(self.name(), content)
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}
