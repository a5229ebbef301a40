//! Routine store bootstrap.
//!
//! # Responsibility
//! - Open connections for `SqliteRoutineRepository` with WAL and foreign keys.
//! - Create the `routines` and `routine_participants` tables through the
//!   migration registry.
//!
//! # Invariants
//! - Schema version lives in `PRAGMA user_version`; repositories refuse
//!   connections whose version differs from `migrations::latest_version()`.
//! - Participant rows cascade with their routine row.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failures while opening or migrating the routine store.
#[derive(Debug)]
pub enum DbError {
    /// Opening the file, setting pragmas, or running a migration script.
    Sqlite(rusqlite::Error),
    /// The file was written by a newer engine; it is left untouched.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "routine store error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "routine store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
