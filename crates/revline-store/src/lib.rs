//! Persistence layer for revline: domain models, storage traits, and the
//! in-memory reference implementation.
//!
//! The pipeline and chat code in `revline-core` talk to storage only through
//! the [`BuildStore`], [`UsageStore`], and [`ThreadStore`] traits, so a
//! database-backed implementation can be swapped in without touching the
//! orchestration logic. [`MemoryStore`] implements all three and defines the
//! reference semantics (lazy row creation, monotonic usage increments,
//! append-only threads).

pub mod error;
pub mod memory;
pub mod models;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use traits::{BuildStore, ThreadStore, UsageStore};
