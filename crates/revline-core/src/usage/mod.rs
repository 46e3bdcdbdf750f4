//! Per-user token usage ledger.
//!
//! Both the pipeline orchestrator and the chat service hold a ledger handle
//! and refuse to invoke the generator when a user is blocked. Accounting
//! writes are best-effort: the user keeps a successful generation result
//! even when the increment fails, unlike stage-output writes which are
//! fatal to a run.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use revline_store::models::TokenUsage;
use revline_store::{StoreError, UsageStore};

/// Handle to per-user usage rows, shared by the orchestrator and chat.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Current usage row for the user; a default-quota row is created on
    /// first access.
    pub async fn snapshot(&self, user_id: Uuid) -> Result<TokenUsage, StoreError> {
        self.store.get_or_create(user_id).await
    }

    /// Record tokens spent by a successful generator call.
    ///
    /// Persistence failures are logged and swallowed here; the caller's
    /// generation result stands either way.
    pub async fn track(&self, user_id: Uuid, delta: i64) {
        if let Err(e) = self.store.increment(user_id, delta).await {
            warn!(
                user_id = %user_id,
                delta = delta,
                error = %e,
                "failed to record token usage, continuing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revline_store::MemoryStore;

    #[tokio::test]
    async fn gate_opens_and_closes_with_usage() {
        let store = Arc::new(MemoryStore::new());
        let ledger = UsageLedger::new(store.clone());
        let user = Uuid::new_v4();

        let snapshot = ledger.snapshot(user).await.unwrap();
        assert!(!snapshot.is_blocked());

        ledger.track(user, snapshot.limit).await;
        assert!(ledger.snapshot(user).await.unwrap().is_blocked());
    }

    #[tokio::test]
    async fn track_accumulates() {
        let store = Arc::new(MemoryStore::new());
        let ledger = UsageLedger::new(store.clone());
        let user = Uuid::new_v4();

        ledger.track(user, 300).await;
        ledger.track(user, 150).await;
        assert_eq!(ledger.snapshot(user).await.unwrap().used, 450);
    }
}
