//! Chat context manager: thread resolution, system prompts built from a
//! completed (or partial) plan, bounded history, and the advisory
//! context-pressure signal.
//!
//! Chat turns against one thread are not serialized here; callers that
//! need strict message ordering must serialize per-thread themselves.

pub mod context;

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use revline_genai::{GenerateRequest, Generator};
use revline_store::models::{ChatMessage, ChatRole, ChatThread};
use revline_store::{BuildStore, ThreadStore};

use crate::error::ChatError;
use crate::stage::output::StageOutput;
use crate::stage::StageName;
use crate::usage::UsageLedger;

pub use context::ContextUsage;

/// Chat tuning knobs. The defaults document the design: the last ten
/// messages reach the prompt, the pressure estimate assumes four characters
/// per token against an 8k budget, and the warning trips at half.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Most recent messages included when assembling a model call. Older
    /// messages stay persisted for display only.
    pub history_limit: usize,
    /// Approximate context budget in tokens.
    pub context_limit: i64,
    /// `warning` trips once `used / limit` reaches this ratio.
    pub warning_ratio: f64,
    /// Length-heuristic divisor; approximate, not a tokenizer.
    pub chars_per_token: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            context_limit: 8_000,
            warning_ratio: 0.5,
            chars_per_token: 4,
        }
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// The stored assistant message.
    pub message: ChatMessage,
    pub tokens_used: i64,
    /// Pressure signal for the call that produced this reply.
    pub context: ContextUsage,
}

/// Plan-derived context for the system prompt.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub vehicle: String,
    pub goals: String,
    /// "Phase — mods" lines from the execution plan.
    pub phases: Vec<String>,
    pub assumptions: Vec<String>,
}

/// The chat service: an independent consumer of the generator that shares
/// the usage ledger with the pipeline.
#[derive(Clone)]
pub struct ChatService {
    generator: Arc<dyn Generator>,
    threads: Arc<dyn ThreadStore>,
    builds: Arc<dyn BuildStore>,
    ledger: UsageLedger,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        generator: Arc<dyn Generator>,
        threads: Arc<dyn ThreadStore>,
        builds: Arc<dyn BuildStore>,
        ledger: UsageLedger,
    ) -> Self {
        Self {
            generator,
            threads,
            builds,
            ledger,
            config: ChatConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// The thread for `(user, build)`, created on first access. At most one
    /// thread exists per pair.
    pub async fn resolve_thread(
        &self,
        user_id: Uuid,
        build_id: Option<Uuid>,
    ) -> Result<ChatThread, ChatError> {
        Ok(self.threads.resolve(user_id, build_id).await?)
    }

    /// One chat turn: quota gate, bounded-history prompt, generator call,
    /// thread append, best-effort usage accounting.
    pub async fn send(
        &self,
        user_id: Uuid,
        build_id: Option<Uuid>,
        text: &str,
    ) -> Result<ChatReply, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        // Same pre-call gate as the pipeline: no generator call when blocked.
        let usage = self.ledger.snapshot(user_id).await?;
        if usage.is_blocked() {
            return Err(ChatError::QuotaExceeded {
                used: usage.used,
                limit: usage.limit,
            });
        }

        let thread = self.threads.resolve(user_id, build_id).await?;
        let history = self.threads.list_messages(thread.id).await?;
        let bounded = bounded_history(&history, self.config.history_limit);

        let plan = match build_id {
            Some(id) => self.plan_context(id).await?,
            None => None,
        };
        let system_prompt = build_system_prompt(plan.as_ref());

        // Advisory pressure signal; the model input is never truncated
        // beyond the fixed history bound.
        let context = context::compute_context_usage(&system_prompt, bounded, text, &self.config);
        if context.warning {
            debug!(
                thread_id = %thread.id,
                used = context.used,
                limit = context.limit,
                "context pressure warning"
            );
        }

        let prompt = render_conversation(bounded, text);
        let response = self
            .generator
            .generate(GenerateRequest::text(prompt, system_prompt))
            .await?;
        let reply_text = match response.data.as_str() {
            Some(s) => s.to_owned(),
            None => response.data.to_string(),
        };

        self.threads
            .append_message(thread.id, ChatRole::User, text)
            .await?;
        let message = self
            .threads
            .append_message(thread.id, ChatRole::Assistant, &reply_text)
            .await?;

        self.ledger.track(user_id, response.tokens_used).await;

        Ok(ChatReply {
            message,
            tokens_used: response.tokens_used,
            context,
        })
    }

    /// Explicit reset: clears every message in the pair's thread.
    pub async fn reset_thread(
        &self,
        user_id: Uuid,
        build_id: Option<Uuid>,
    ) -> Result<(), ChatError> {
        let thread = self.threads.resolve(user_id, build_id).await?;
        self.threads.clear_messages(thread.id).await?;
        Ok(())
    }

    /// Assemble plan context from a build's persisted stage outputs.
    /// Returns `None` when the build is unknown or has no outputs yet.
    async fn plan_context(&self, build_id: Uuid) -> Result<Option<PlanContext>, ChatError> {
        let Some(record) = self.builds.get_build(build_id).await? else {
            return Ok(None);
        };
        let raw = self.builds.get_stage_outputs(build_id).await?;
        if raw.is_empty() {
            return Ok(None);
        }

        let mut plan = PlanContext {
            vehicle: record.vehicle.clone(),
            goals: record.goals.clone(),
            ..PlanContext::default()
        };
        for (name, value) in &raw {
            let Ok(stage) = StageName::from_str(name) else {
                warn!(build_id = %build_id, stage = %name, "unknown stage name in store, skipping");
                continue;
            };
            // Outputs were validated before persistence; a mismatch here
            // means the store was written by something else. Skip it.
            let Ok(output) = StageOutput::parse(stage, value) else {
                warn!(build_id = %build_id, stage = %stage, "persisted stage output no longer parses, skipping");
                continue;
            };
            apply_output(&mut plan, output);
        }
        Ok(Some(plan))
    }
}

/// The last `limit` messages, oldest first.
fn bounded_history(messages: &[ChatMessage], limit: usize) -> &[ChatMessage] {
    &messages[messages.len().saturating_sub(limit)..]
}

fn apply_output(plan: &mut PlanContext, output: StageOutput) {
    match output {
        StageOutput::Normalize(vehicle) => {
            let year = vehicle
                .year
                .map(|y| format!("{y} "))
                .unwrap_or_default();
            plan.vehicle = format!("{year}{} {}", vehicle.make, vehicle.model);
            plan.assumptions = vehicle.assumptions;
        }
        StageOutput::Execution(exec) => {
            plan.phases = exec
                .0
                .iter()
                .map(|phase| {
                    let mods: Vec<&str> = phase.mods.iter().map(|m| m.name.as_str()).collect();
                    format!("{} — {}", phase.name, mods.join(", "))
                })
                .collect();
        }
        // The remaining stages refine the plan but do not change the
        // prompt context.
        _ => {}
    }
}

/// Deterministic system prompt from the plan context, with a generic
/// fallback when no build (or no plan yet) is attached.
pub fn build_system_prompt(plan: Option<&PlanContext>) -> String {
    let Some(plan) = plan else {
        return "You are a knowledgeable automotive modification assistant. \
                Give practical, specific advice about car builds, parts, and \
                tuning. Be honest about tradeoffs."
            .to_string();
    };

    let mut prompt = String::from(
        "You are the automotive assistant for this owner's build plan. \
         Answer against the plan below; be honest about tradeoffs.\n",
    );
    prompt.push_str(&format!("\nVehicle: {}", plan.vehicle));
    prompt.push_str(&format!("\nGoals: {}", plan.goals));
    if !plan.phases.is_empty() {
        prompt.push_str("\nPlanned phases:");
        for phase in &plan.phases {
            prompt.push_str(&format!("\n- {phase}"));
        }
    }
    if !plan.assumptions.is_empty() {
        prompt.push_str("\nAssumptions made while planning:");
        for assumption in &plan.assumptions {
            prompt.push_str(&format!("\n- {assumption}"));
        }
    }
    prompt
}

/// Render the bounded history plus the new message as the model prompt.
fn render_conversation(history: &[ChatMessage], new_message: &str) -> String {
    let mut prompt = String::new();
    for message in history {
        prompt.push_str(&format!("{}: {}\n", message.role, message.content));
    }
    prompt.push_str(&format!("user: {new_message}"));
    prompt
}
