//! Core orchestration for revline: the staged build-plan pipeline, the chat
//! context manager, and the usage ledger they share.
//!
//! # Architecture
//!
//! ```text
//! caller input
//!     |
//!     v
//! Pipeline::run ---(per stage)--> UsageLedger gate
//!     |                               |
//!     |                          Generator call
//!     |                               |
//!     |                          schema validation
//!     |                               |
//!     |                          BuildStore write (fatal on error)
//!     |                               |
//!     +---- ordered PipelineEvent stream (one terminal event per run)
//!
//! chat message --> ChatService (system prompt from plan, last-K history,
//!                  context pressure) --> Generator --> ThreadStore append
//! ```
//!
//! The seven stages run strictly sequentially because each stage's prompt
//! embeds the full structured output of the stages it depends on.

pub mod chat;
pub mod error;
pub mod pipeline;
pub mod stage;
pub mod state;
pub mod usage;
pub mod validate;

pub use chat::{ChatConfig, ChatReply, ChatService, ContextUsage};
pub use error::{ChatError, PipelineError, ValidationError};
pub use pipeline::{
    CompleteEvent, ErrorEvent, Pipeline, PipelineConfig, PipelineEvent, ProgressEvent, StageStatus,
};
pub use stage::{StageDefinition, StageName, output::StageOutput, stage_registry};
pub use state::{PipelineState, RunPhase, StageSlot};
pub use usage::UsageLedger;
pub use validate::validate_build_request;
