//! In-memory store used by tests and as the reference implementation of
//! the storage traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    BuildRecord, BuildStatus, ChatMessage, ChatRole, ChatThread, NewBuild, TokenUsage,
    USAGE_PERIOD_DAYS,
};
use crate::traits::{BuildStore, ThreadStore, UsageStore};

/// Mutex-guarded maps implementing all three store traits.
///
/// Locks are never held across an await point, so the plain `std` mutex is
/// sufficient here.
#[derive(Default)]
pub struct MemoryStore {
    builds: Mutex<HashMap<Uuid, BuildRecord>>,
    stage_outputs: Mutex<HashMap<Uuid, BTreeMap<String, Value>>>,
    usage: Mutex<HashMap<Uuid, TokenUsage>>,
    threads: Mutex<Vec<ChatThread>>,
    messages: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: pre-seed a user's usage row.
    pub fn seed_usage(&self, usage: TokenUsage) {
        self.usage
            .lock()
            .expect("usage lock poisoned")
            .insert(usage.user_id, usage);
    }
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn create_build(&self, request: &NewBuild) -> Result<BuildRecord, StoreError> {
        let record = BuildRecord::from_request(request);
        self.builds
            .lock()
            .expect("builds lock poisoned")
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_build(&self, build_id: Uuid) -> Result<Option<BuildRecord>, StoreError> {
        Ok(self
            .builds
            .lock()
            .expect("builds lock poisoned")
            .get(&build_id)
            .cloned())
    }

    async fn update_build_status(
        &self,
        build_id: Uuid,
        status: BuildStatus,
    ) -> Result<(), StoreError> {
        let mut builds = self.builds.lock().expect("builds lock poisoned");
        let record = builds
            .get_mut(&build_id)
            .ok_or(StoreError::BuildNotFound(build_id))?;
        record.status = status;
        Ok(())
    }

    async fn upsert_stage_output(
        &self,
        build_id: Uuid,
        stage: &str,
        output: &Value,
        _tokens_cost: i64,
    ) -> Result<(), StoreError> {
        if !self
            .builds
            .lock()
            .expect("builds lock poisoned")
            .contains_key(&build_id)
        {
            return Err(StoreError::BuildNotFound(build_id));
        }
        self.stage_outputs
            .lock()
            .expect("stage outputs lock poisoned")
            .entry(build_id)
            .or_default()
            .insert(stage.to_owned(), output.clone());
        Ok(())
    }

    async fn get_stage_outputs(
        &self,
        build_id: Uuid,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        Ok(self
            .stage_outputs
            .lock()
            .expect("stage outputs lock poisoned")
            .get(&build_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn get_or_create(&self, user_id: Uuid) -> Result<TokenUsage, StoreError> {
        let mut usage = self.usage.lock().expect("usage lock poisoned");
        Ok(usage
            .entry(user_id)
            .or_insert_with(|| TokenUsage::new_default(user_id))
            .clone())
    }

    async fn increment(&self, user_id: Uuid, delta: i64) -> Result<(), StoreError> {
        let mut usage = self.usage.lock().expect("usage lock poisoned");
        let row = usage
            .entry(user_id)
            .or_insert_with(|| TokenUsage::new_default(user_id));
        row.used += delta;
        Ok(())
    }

    async fn reset_usage(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut usage = self.usage.lock().expect("usage lock poisoned");
        if let Some(row) = usage.get_mut(&user_id) {
            row.used = 0;
            row.resets_at = Utc::now() + Duration::days(USAGE_PERIOD_DAYS);
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn resolve(
        &self,
        user_id: Uuid,
        build_id: Option<Uuid>,
    ) -> Result<ChatThread, StoreError> {
        let mut threads = self.threads.lock().expect("threads lock poisoned");
        if let Some(existing) = threads
            .iter()
            .find(|t| t.user_id == user_id && t.build_id == build_id)
        {
            return Ok(existing.clone());
        }
        let thread = ChatThread {
            id: Uuid::new_v4(),
            user_id,
            build_id,
            created_at: Utc::now(),
        };
        threads.push(thread.clone());
        Ok(thread)
    }

    async fn append_message(
        &self,
        thread_id: Uuid,
        role: ChatRole,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        if !self
            .threads
            .lock()
            .expect("threads lock poisoned")
            .iter()
            .any(|t| t.id == thread_id)
        {
            return Err(StoreError::ThreadNotFound(thread_id));
        }
        let message = ChatMessage {
            id: Uuid::new_v4(),
            thread_id,
            role,
            content: content.to_owned(),
            sent_at: Utc::now(),
        };
        self.messages
            .lock()
            .expect("messages lock poisoned")
            .entry(thread_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, thread_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .lock()
            .expect("messages lock poisoned")
            .get(&thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_messages(&self, thread_id: Uuid) -> Result<(), StoreError> {
        self.messages
            .lock()
            .expect("messages lock poisoned")
            .remove(&thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(user_id: Uuid) -> NewBuild {
        NewBuild {
            user_id,
            vehicle: "2015 Subaru WRX".into(),
            goals: "daily with weekend track days".into(),
            budget: Some(8_000),
            constraints: vec![],
            city: None,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_build() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let record = store.create_build(&request(user)).await.unwrap();
        let fetched = store.get_build(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.status, BuildStatus::Pending);

        store
            .update_build_status(record.id, BuildStatus::Running)
            .await
            .unwrap();
        let fetched = store.get_build(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, BuildStatus::Running);
    }

    #[tokio::test]
    async fn status_update_on_missing_build_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_build_status(Uuid::new_v4(), BuildStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BuildNotFound(_)));
    }

    #[tokio::test]
    async fn stage_outputs_upsert_and_read_back() {
        let store = MemoryStore::new();
        let record = store.create_build(&request(Uuid::new_v4())).await.unwrap();

        store
            .upsert_stage_output(record.id, "normalize", &json!({"make": "Subaru"}), 100)
            .await
            .unwrap();
        store
            .upsert_stage_output(record.id, "strategy", &json!({"direction": "track"}), 150)
            .await
            .unwrap();

        let outputs = store.get_stage_outputs(record.id).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["normalize"]["make"], "Subaru");

        // Overwrite is allowed.
        store
            .upsert_stage_output(record.id, "normalize", &json!({"make": "Mazda"}), 80)
            .await
            .unwrap();
        let outputs = store.get_stage_outputs(record.id).await.unwrap();
        assert_eq!(outputs["normalize"]["make"], "Mazda");
    }

    #[tokio::test]
    async fn stage_output_for_missing_build_fails() {
        let store = MemoryStore::new();
        let err = store
            .upsert_stage_output(Uuid::new_v4(), "normalize", &json!({}), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BuildNotFound(_)));
    }

    #[tokio::test]
    async fn usage_row_created_on_first_access() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let usage = store.get_or_create(user).await.unwrap();
        assert_eq!(usage.used, 0);

        store.increment(user, 1_200).await.unwrap();
        store.increment(user, 300).await.unwrap();
        let usage = store.get_or_create(user).await.unwrap();
        assert_eq!(usage.used, 1_500);

        store.reset_usage(user).await.unwrap();
        let usage = store.get_or_create(user).await.unwrap();
        assert_eq!(usage.used, 0);
    }

    #[tokio::test]
    async fn thread_resolution_is_idempotent_per_pair() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let build = Uuid::new_v4();

        let a = store.resolve(user, Some(build)).await.unwrap();
        let b = store.resolve(user, Some(build)).await.unwrap();
        assert_eq!(a.id, b.id);

        // Different build (or no build) means a different thread.
        let general = store.resolve(user, None).await.unwrap();
        assert_ne!(general.id, a.id);
    }

    #[tokio::test]
    async fn messages_append_in_order_and_clear() {
        let store = MemoryStore::new();
        let thread = store.resolve(Uuid::new_v4(), None).await.unwrap();

        store
            .append_message(thread.id, ChatRole::User, "what turbo should I run?")
            .await
            .unwrap();
        store
            .append_message(thread.id, ChatRole::Assistant, "depends on your goals")
            .await
            .unwrap();

        let messages = store.list_messages(thread.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].role, ChatRole::Assistant);

        store.clear_messages(thread.id).await.unwrap();
        assert!(store.list_messages(thread.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_to_missing_thread_fails() {
        let store = MemoryStore::new();
        let err = store
            .append_message(Uuid::new_v4(), ChatRole::User, "hello?")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ThreadNotFound(_)));
    }
}
