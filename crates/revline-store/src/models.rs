use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a build's pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for BuildStatus {
    type Err = BuildStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(BuildStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`BuildStatus`] string.
#[derive(Debug, Clone)]
pub struct BuildStatusParseError(pub String);

impl fmt::Display for BuildStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid build status: {:?}", self.0)
    }
}

impl std::error::Error for BuildStatusParseError {}

// ---------------------------------------------------------------------------

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

impl FromStr for ChatRole {
    type Err = ChatRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ChatRoleParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ChatRole`] string.
#[derive(Debug, Clone)]
pub struct ChatRoleParseError(pub String);

impl fmt::Display for ChatRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid chat role: {:?}", self.0)
    }
}

impl std::error::Error for ChatRoleParseError {}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// Caller input for a new build: vehicle description plus intent.
/// Immutable once the pipeline starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBuild {
    pub user_id: Uuid,
    /// Free-form vehicle description, e.g. "2015 Subaru WRX, 6MT, stock".
    pub vehicle: String,
    /// What the owner wants out of the build.
    pub goals: String,
    /// Total budget in whole dollars, if the caller gave one.
    pub budget: Option<i64>,
    /// Hard constraints ("must stay street legal", "no engine-out work").
    pub constraints: Vec<String>,
    /// Caller's city, used by the sourcing stage for local vendors.
    pub city: Option<String>,
}

/// A persisted build row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vehicle: String,
    pub goals: String,
    pub budget: Option<i64>,
    pub constraints: Vec<String>,
    pub city: Option<String>,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
}

impl BuildRecord {
    /// Materialize a row from caller input with a fresh id.
    pub fn from_request(request: &NewBuild) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            vehicle: request.vehicle.clone(),
            goals: request.goals.clone(),
            budget: request.budget,
            constraints: request.constraints.clone(),
            city: request.city.clone(),
            status: BuildStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Usage accounting
// ---------------------------------------------------------------------------

/// Default per-period token quota granted on first access.
pub const DEFAULT_TOKEN_LIMIT: i64 = 250_000;

/// Length of a usage period in days. Resetting `used` when the period rolls
/// over is an external job, never done in-process.
pub const USAGE_PERIOD_DAYS: i64 = 30;

/// Per-user cumulative token counter against a periodic quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub user_id: Uuid,
    /// Tokens consumed so far this period. Monotonic between resets.
    pub used: i64,
    pub limit: i64,
    pub resets_at: DateTime<Utc>,
}

impl TokenUsage {
    /// A fresh default-quota row for a user seen for the first time.
    pub fn new_default(user_id: Uuid) -> Self {
        Self {
            user_id,
            used: 0,
            limit: DEFAULT_TOKEN_LIMIT,
            resets_at: Utc::now() + Duration::days(USAGE_PERIOD_DAYS),
        }
    }

    /// Whether this user may not make further generator calls.
    pub fn is_blocked(&self) -> bool {
        self.used >= self.limit
    }

    /// Tokens left before the quota gate closes.
    pub fn remaining(&self) -> i64 {
        (self.limit - self.used).max(0)
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat thread, identified by (user, optional build). Messages are stored
/// separately and append-only; see [`crate::ThreadStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The build this thread discusses, if any. `None` is the user's
    /// general-advice thread.
    pub build_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One message within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_status_roundtrip() {
        for status in [
            BuildStatus::Pending,
            BuildStatus::Running,
            BuildStatus::Completed,
            BuildStatus::Failed,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<BuildStatus>().unwrap(), status);
        }
    }

    #[test]
    fn build_status_rejects_unknown() {
        assert!("exploded".parse::<BuildStatus>().is_err());
    }

    #[test]
    fn chat_role_roundtrip() {
        assert_eq!("user".parse::<ChatRole>().unwrap(), ChatRole::User);
        assert_eq!(
            "assistant".parse::<ChatRole>().unwrap(),
            ChatRole::Assistant
        );
        assert!("system".parse::<ChatRole>().is_err());
    }

    #[test]
    fn default_usage_row_is_not_blocked() {
        let usage = TokenUsage::new_default(Uuid::new_v4());
        assert_eq!(usage.used, 0);
        assert_eq!(usage.limit, DEFAULT_TOKEN_LIMIT);
        assert!(!usage.is_blocked());
        assert_eq!(usage.remaining(), DEFAULT_TOKEN_LIMIT);
    }

    #[test]
    fn usage_blocked_at_limit() {
        let mut usage = TokenUsage::new_default(Uuid::new_v4());
        usage.used = usage.limit;
        assert!(usage.is_blocked());
        assert_eq!(usage.remaining(), 0);

        usage.used = usage.limit + 500;
        assert!(usage.is_blocked());
        assert_eq!(usage.remaining(), 0);
    }

    #[test]
    fn build_record_copies_request_fields() {
        let request = NewBuild {
            user_id: Uuid::new_v4(),
            vehicle: "1999 Mazda Miata".into(),
            goals: "autocross".into(),
            budget: Some(6_000),
            constraints: vec!["keep it streetable".into()],
            city: Some("Portland".into()),
        };
        let record = BuildRecord::from_request(&request);
        assert_eq!(record.user_id, request.user_id);
        assert_eq!(record.vehicle, request.vehicle);
        assert_eq!(record.status, BuildStatus::Pending);
        assert_eq!(record.city.as_deref(), Some("Portland"));
    }
}
