use gitgres_hash::HashError;
use gitgres_object::ObjectError;

/// The error taxonomy every backend operation reports through.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Object or ref does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one OID matched a prefix lookup.
    #[error("ambiguous object prefix: {prefix}")]
    Ambiguous { prefix: String },

    /// Creation violated a non-existence precondition.
    #[error("reference already exists: {0}")]
    AlreadyExists(String),

    /// Compare-and-swap mismatch on a ref update or delete.
    #[error("reference value changed: {0}")]
    ValueChanged(String),

    /// OID, tree, or commit format violation.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Object type code outside 1..=4.
    #[error("invalid object type code: {0}")]
    InvalidType(i16),

    /// The database driver returned an unexpected error.
    #[error("storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Resource allocation, temp file, or pack indexer failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Wrap an arbitrary driver error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

impl From<HashError> for BackendError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::InvalidType(code) => Self::InvalidType(code),
            other => Self::MalformedInput(other.to_string()),
        }
    }
}

impl From<ObjectError> for BackendError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::InvalidTypeCode(code) => Self::InvalidType(code),
            ObjectError::Hash(e) => e.into(),
            other => Self::MalformedInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_type_maps_through() {
        let err: BackendError = HashError::InvalidType(9).into();
        assert!(matches!(err, BackendError::InvalidType(9)));
        let err: BackendError = ObjectError::InvalidTypeCode(0).into();
        assert!(matches!(err, BackendError::InvalidType(0)));
    }

    #[test]
    fn hash_errors_are_malformed_input() {
        let err: BackendError = HashError::InvalidHexLength {
            expected: 40,
            actual: 7,
        }
        .into();
        assert!(matches!(err, BackendError::MalformedInput(_)));
    }
}
