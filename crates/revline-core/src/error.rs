//! Error taxonomy for the pipeline and chat layers.
//!
//! The split matters to callers: quota exhaustion should prompt an upgrade
//! path, generator failures (including schema mismatches) are generation
//! failures, and only stage-output persistence is fatal -- usage-accounting
//! writes are best-effort and swallowed in [`crate::usage::UsageLedger`].

use revline_genai::GeneratorError;
use revline_store::StoreError;

use crate::stage::StageName;

/// Failures that terminate a pipeline run. Exactly one terminal error
/// event is emitted per failed run; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pre-call quota gate refused the stage. No generator call was made.
    #[error("token quota exhausted: {used} of {limit} tokens used")]
    QuotaExceeded { used: i64, limit: i64 },

    /// The external generator call failed (transport, timeout, API error,
    /// or malformed payload).
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// The generator answered but the payload did not conform to the
    /// stage's declared schema. Treated identically to a generator failure.
    #[error("stage {stage} output failed schema validation: {reason}")]
    Schema { stage: StageName, reason: String },

    /// A stage output could not be persisted. Fatal: later stages consume
    /// the persisted output as their input.
    #[error("failed to persist output for stage {stage}")]
    StageWrite {
        stage: StageName,
        #[source]
        source: StoreError,
    },

    /// Storage failure outside a stage-output write (build row creation,
    /// usage reads for the quota gate).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Malformed caller input. Resolved at the request boundary; never reaches
/// the orchestrator.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("vehicle description must not be empty")]
    EmptyVehicle,

    #[error("build goals must not be empty")]
    EmptyGoals,

    #[error("budget must be positive when given")]
    NonPositiveBudget,
}

/// Failures of a single chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("token quota exhausted: {used} of {limit} tokens used")]
    QuotaExceeded { used: i64, limit: i64 },

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
