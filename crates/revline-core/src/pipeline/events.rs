//! Progress events emitted by a pipeline run.
//!
//! One ordered, unbuffered sequence per run over a push transport
//! (transport mechanics live with the caller). The `running` event for
//! stage *i* always precedes its `completed`/`failed` event, which always
//! precedes the `running` event for stage *i+1*. A stage the quota gate
//! refused never starts and emits no progress event at all. Exactly one
//! terminal [`PipelineEvent::Complete`] or [`PipelineEvent::Error`] closes
//! a run.

use serde::Serialize;
use uuid::Uuid;

use crate::stage::output::StageOutput;
use crate::stage::StageName;

/// Status carried by a per-stage progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Completed,
    Failed,
}

/// Progress of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub step: StageName,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Tokens billed for this stage (completed events only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i64>,
    /// Run total so far (completed events only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i64>,
    /// The stage's validated output payload (completed events only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StageOutput>,
}

impl ProgressEvent {
    pub fn running(step: StageName) -> Self {
        Self {
            step,
            status: StageStatus::Running,
            message: None,
            tokens_used: None,
            total_tokens: None,
            data: None,
        }
    }

    pub fn completed(
        step: StageName,
        data: StageOutput,
        tokens_used: i64,
        total_tokens: i64,
    ) -> Self {
        Self {
            step,
            status: StageStatus::Completed,
            message: None,
            tokens_used: Some(tokens_used),
            total_tokens: Some(total_tokens),
            data: Some(data),
        }
    }

    pub fn failed(step: StageName, message: impl Into<String>) -> Self {
        Self {
            step,
            status: StageStatus::Failed,
            message: Some(message.into()),
            tokens_used: None,
            total_tokens: None,
            data: None,
        }
    }
}

/// Terminal event of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct CompleteEvent {
    pub build_id: Uuid,
    pub success: bool,
    pub total_tokens: i64,
}

/// Terminal event of a failed run. `partial` is true when at least one
/// stage completed; the persisted prefix stays fetchable via `build_id`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub step: StageName,
    pub error: String,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<Uuid>,
}

/// One event in a run's ordered stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_event_omits_optional_fields() {
        let event = PipelineEvent::Progress(ProgressEvent::running(StageName::Normalize));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["step"], "normalize");
        assert_eq!(json["status"], "running");
        assert!(json.get("tokens_used").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn error_event_serializes_partial_flag() {
        let event = PipelineEvent::Error(ErrorEvent {
            step: StageName::Synergy,
            error: "generator unavailable".into(),
            partial: true,
            build_id: Some(Uuid::nil()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["step"], "synergy");
        assert_eq!(json["partial"], true);
    }
}
