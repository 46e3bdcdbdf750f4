//! Storage error type shared by all store traits.

use uuid::Uuid;

/// Errors surfaced by [`crate::BuildStore`], [`crate::UsageStore`], and
/// [`crate::ThreadStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("build {0} not found")]
    BuildNotFound(Uuid),

    #[error("chat thread {0} not found")]
    ThreadNotFound(Uuid),

    /// Opaque failure from the storage backend (connection loss, I/O, ...).
    /// The in-memory store never produces this; database-backed
    /// implementations wrap their driver errors here.
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
