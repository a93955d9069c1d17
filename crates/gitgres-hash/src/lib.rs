//! Object identity and canonical hashing for gitgres.
//!
//! This crate provides the fixed-width `ObjectId` type, hex
//! encoding/decoding, and the canonical git object hash
//! (`SHA1("<type> <size>\0<content>")`) shared by the storage backends
//! and the query surface.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
