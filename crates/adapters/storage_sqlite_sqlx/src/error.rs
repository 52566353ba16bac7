//! Storage-specific error type wrapping sqlx errors.

use lumen_domain::error::LumenError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to serialize or deserialize a stored JSON column.
    #[error("JSON column error")]
    Json(#[from] serde_json::Error),

    /// A value does not fit its column type.
    #[error("value out of column range")]
    OutOfRange(#[from] std::num::TryFromIntError),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<StorageError> for LumenError {
    fn from(err: StorageError) -> Self {
        Self::storage(err)
    }
}
