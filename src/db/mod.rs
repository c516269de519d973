//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: raw row shapes read back from SQLite.
//! - `repo`: SQL-only functions plus `SqliteStore`, the `TransactionStore`
//!   implementation used by the CLI and the tests.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::TransactionRow;
