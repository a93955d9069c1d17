/// Errors produced by hash and OID operations.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid object id length: expected {expected} hex characters, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid object id length: expected {expected} bytes, got {actual}")]
    InvalidByteLength { expected: usize, actual: usize },

    #[error("invalid object type code: {0}")]
    InvalidType(i16),

    #[error("SHA-1 collision detected")]
    Sha1Collision,
}
