//! PostgreSQL-backed git storage.
//!
//! `Db` owns the connection and the fixed set of parameterised statements;
//! `PgOdb` and `PgRefdb` realise the pluggable backend interfaces over it.
//! OIDs travel as binary `bytea`, type codes as `int2`, sizes as `int4`;
//! no hex round-trips on the hot paths.

mod db;
mod lockkey;
mod odb;
mod refdb;
mod writepack;

pub use db::{Db, ReflogRow, RepoId, SCHEMA};
pub use lockkey::lock_key;
pub use odb::PgOdb;
pub use refdb::PgRefdb;
pub use writepack::PgWritepack;
