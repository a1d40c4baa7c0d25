//! Error handling for cmdex-store
//!
//! Maps SQLite and migration failures onto the engine's `Persistence` error

use cmdex_core::errors::EngineError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> EngineError {
    EngineError::persistence("sqlite", err.to_string())
}

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> EngineError {
    EngineError::persistence(
        "migration",
        format!("Migration {} failed: {}", migration_id, reason),
    )
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> EngineError {
    EngineError::persistence(
        "migration_checksum",
        format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ),
    )
}

pub(crate) fn lock_poisoned() -> EngineError {
    EngineError::internal("sqlite connection lock poisoned")
}
