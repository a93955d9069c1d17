//! Pluggable storage backend interfaces.
//!
//! These traits are the seam between the storage engine and whichever git
//! library drives it: an object database backend (`OdbBackend`) and a
//! reference database backend (`RefdbBackend`). The concrete PostgreSQL
//! realisations live in `gitgres-store`; any git library with equivalent
//! backend interfaces can sit on the other side of this boundary.

mod error;
mod odb;
mod refdb;

pub use error::BackendError;
pub use odb::{OdbBackend, Writepack};
pub use refdb::{RefLock, RefdbBackend, UnlockDisposition};

use gitgres_hash::ObjectId;

/// A git reference: direct (names an object) or symbolic (names another
/// reference). Exactly one of the two holds, mirroring the storage
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct { name: String, oid: ObjectId },
    Symbolic { name: String, target: String },
}

impl Reference {
    /// Construct a direct reference.
    pub fn direct(name: impl Into<String>, oid: ObjectId) -> Self {
        Self::Direct {
            name: name.into(),
            oid,
        }
    }

    /// Construct a symbolic reference.
    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Symbolic {
            name: name.into(),
            target: target.into(),
        }
    }

    /// The full ref name (`HEAD`, `refs/heads/...`, ...).
    pub fn name(&self) -> &str {
        match self {
            Self::Direct { name, .. } => name,
            Self::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic { .. })
    }

    /// Target OID for a direct ref.
    pub fn oid(&self) -> Option<ObjectId> {
        match self {
            Self::Direct { oid, .. } => Some(*oid),
            Self::Symbolic { .. } => None,
        }
    }

    /// Target ref name for a symbolic ref.
    pub fn symbolic_target(&self) -> Option<&str> {
        match self {
            Self::Symbolic { target, .. } => Some(target),
            Self::Direct { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_accessors() {
        let oid = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let r = Reference::direct("refs/heads/main", oid);
        assert_eq!(r.name(), "refs/heads/main");
        assert_eq!(r.oid(), Some(oid));
        assert_eq!(r.symbolic_target(), None);
        assert!(!r.is_symbolic());
    }

    #[test]
    fn symbolic_accessors() {
        let r = Reference::symbolic("HEAD", "refs/heads/main");
        assert_eq!(r.name(), "HEAD");
        assert_eq!(r.oid(), None);
        assert_eq!(r.symbolic_target(), Some("refs/heads/main"));
        assert!(r.is_symbolic());
    }
}
