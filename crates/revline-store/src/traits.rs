//! Storage traits consumed by the pipeline orchestrator and the chat
//! context manager.
//!
//! Every trait is object-safe so callers can hold `Arc<dyn BuildStore>`
//! etc. and swap implementations (in-memory for tests, a database in the
//! deployed service). Stage outputs are persisted as raw JSON: the
//! orchestrator validates them against the stage schema *before* writing,
//! and readers re-parse on the way out.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{BuildRecord, BuildStatus, ChatMessage, ChatRole, ChatThread, NewBuild, TokenUsage};

/// Persistence for builds and their per-stage outputs.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Insert a new build row in `pending` status and return it.
    async fn create_build(&self, request: &NewBuild) -> Result<BuildRecord, StoreError>;

    /// Fetch a build row, or `None` if it does not exist.
    async fn get_build(&self, build_id: Uuid) -> Result<Option<BuildRecord>, StoreError>;

    /// Update the build's run status.
    async fn update_build_status(
        &self,
        build_id: Uuid,
        status: BuildStatus,
    ) -> Result<(), StoreError>;

    /// Write (or overwrite) one stage's output for a build.
    ///
    /// A failure here is fatal to the pipeline run, because later stages
    /// consume the persisted output as their input.
    async fn upsert_stage_output(
        &self,
        build_id: Uuid,
        stage: &str,
        output: &Value,
        tokens_cost: i64,
    ) -> Result<(), StoreError>;

    /// All persisted stage outputs for a build, keyed by stage name.
    async fn get_stage_outputs(
        &self,
        build_id: Uuid,
    ) -> Result<BTreeMap<String, Value>, StoreError>;
}

/// Persistence for per-user token usage rows.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Fetch the user's usage row, creating a default-quota row on first
    /// access.
    async fn get_or_create(&self, user_id: Uuid) -> Result<TokenUsage, StoreError>;

    /// Monotonically add `delta` tokens to the user's counter.
    async fn increment(&self, user_id: Uuid, delta: i64) -> Result<(), StoreError>;

    /// Zero the user's counter and start a new period. Called only by the
    /// external reset job, never by in-process code.
    async fn reset_usage(&self, user_id: Uuid) -> Result<(), StoreError>;
}

/// Persistence for chat threads and their messages.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Return the thread for `(user_id, build_id)`, creating it on first
    /// access. At most one thread exists per pair.
    async fn resolve(
        &self,
        user_id: Uuid,
        build_id: Option<Uuid>,
    ) -> Result<ChatThread, StoreError>;

    /// Append a message to a thread and return the stored row.
    async fn append_message(
        &self,
        thread_id: Uuid,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// All messages in a thread, oldest first. Storage is unbounded;
    /// prompt-time bounding happens in the chat layer.
    async fn list_messages(&self, thread_id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;

    /// Delete every message in a thread (explicit reset). The thread row
    /// itself survives.
    async fn clear_messages(&self, thread_id: Uuid) -> Result<(), StoreError>;
}

// Compile-time assertion: the store traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn BuildStore, _: &dyn UsageStore, _: &dyn ThreadStore) {}
};
