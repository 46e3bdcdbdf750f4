//! The pipeline orchestrator: drives the stage registry against the
//! generator and the usage ledger, persists stage outputs, and emits one
//! ordered event stream per run.
//!
//! Per-stage protocol:
//! 1. Cancellation check (a cancel between stages ends the stream with no
//!    further events).
//! 2. Quota gate (no generator call when the user is blocked; a refused
//!    stage never starts and emits no progress event, only the terminal
//!    error).
//! 3. Emit `running`.
//! 4. Generator call, bounded by the stage timeout.
//! 5. Schema validation of the payload.
//! 6. Persist the output (fatal on failure -- later stages consume it),
//!    mark the slot `Done`, record usage (best-effort), emit `completed`.
//! 7. On a failure of a started stage: mark the slot `Failed`, emit
//!    `failed`, emit the terminal error event, stop.
//!
//! Stages run strictly sequentially on one logical thread of control; the
//! orchestrator is the sole writer of a build's [`PipelineState`].
//! Concurrent runs against one build id are the caller's job to prevent.

pub mod events;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use revline_genai::{GenerateRequest, Generator, GeneratorError};
use revline_store::models::{BuildStatus, NewBuild};
use revline_store::BuildStore;

use crate::error::PipelineError;
use crate::stage::output::StageOutput;
use crate::stage::{prompts, stage_registry, StageName};
use crate::state::{PipelineState, RunPhase};
use crate::usage::UsageLedger;

pub use events::{CompleteEvent, ErrorEvent, PipelineEvent, ProgressEvent, StageStatus};

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wall time limit per generator call. Elapse fails the stage like any
    /// other generator error; there is no retry.
    pub stage_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(120),
        }
    }
}

/// Outcome of one stage's generator call, validation, and persistence.
enum StageCall {
    Done { output: StageOutput, tokens: i64 },
    Failed(PipelineError),
    Cancelled,
}

/// The pipeline orchestrator. Cheap to clone; all collaborators are shared
/// handles.
#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn Generator>,
    builds: Arc<dyn BuildStore>,
    ledger: UsageLedger,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn Generator>,
        builds: Arc<dyn BuildStore>,
        ledger: UsageLedger,
    ) -> Self {
        Self {
            generator,
            builds,
            ledger,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the full pipeline for a validated build request.
    ///
    /// Returns the ordered event stream, terminated by exactly one
    /// `Complete` or `Error` event. Cancelling `cancel` aborts the
    /// in-flight generator call, or the run itself when between stages,
    /// and ends the stream with no further events; already-persisted
    /// stages remain fetchable.
    pub fn run(
        &self,
        request: NewBuild,
        cancel: CancellationToken,
    ) -> impl Stream<Item = PipelineEvent> + Send + 'static {
        let this = self.clone();
        stream! {
            let user_id = request.user_id;
            let build = match this.builds.create_build(&request).await {
                Ok(build) => build,
                Err(e) => {
                    let err = PipelineError::Store(e);
                    yield PipelineEvent::Error(ErrorEvent {
                        step: StageName::Normalize,
                        error: err.to_string(),
                        partial: false,
                        build_id: None,
                    });
                    return;
                }
            };
            let build_id = build.id;
            info!(build_id = %build_id, user_id = %user_id, "pipeline run starting");
            this.set_status(build_id, BuildStatus::Running).await;

            let mut state = PipelineState::new(build_id);
            let mut outputs: BTreeMap<StageName, StageOutput> = BTreeMap::new();
            let mut total_tokens: i64 = 0;
            let mut phase = RunPhase::Pending;

            for definition in stage_registry() {
                let stage = definition.name;

                // Cancellation is honored between stages too, before the
                // gate runs and before the next `running` event.
                if cancel.is_cancelled() {
                    info!(
                        build_id = %build_id,
                        stage = %stage,
                        "run cancelled between stages"
                    );
                    return;
                }

                let next = RunPhase::Running { stage: definition.ordinal };
                debug_assert!(RunPhase::is_valid_transition(phase, next));
                phase = next;

                // 1. Quota gate: read before every call, abort with no
                // generator invocation when the user is over limit.
                let mut failure = match this.ledger.snapshot(user_id).await {
                    Ok(usage) if usage.is_blocked() => Some(PipelineError::QuotaExceeded {
                        used: usage.used,
                        limit: usage.limit,
                    }),
                    Ok(_) => None,
                    Err(e) => Some(PipelineError::Store(e)),
                };

                let stage_started = failure.is_none();
                if stage_started {
                    // 2. The running event precedes the call.
                    yield PipelineEvent::Progress(ProgressEvent::running(stage));

                    match this
                        .call_stage(stage, &request, build_id, &outputs, &cancel)
                        .await
                    {
                        StageCall::Cancelled => {
                            info!(
                                build_id = %build_id,
                                stage = %stage,
                                "run cancelled, aborting in-flight stage"
                            );
                            return;
                        }
                        StageCall::Failed(err) => failure = Some(err),
                        StageCall::Done { output, tokens } => {
                            if let Err(state_err) =
                                state.mark_done(stage, output.clone(), tokens)
                            {
                                // Unreachable under the loop's sequencing.
                                warn!(build_id = %build_id, error = %state_err, "state slot rejected completion");
                            }
                            total_tokens += tokens;
                            this.ledger.track(user_id, tokens).await;
                            outputs.insert(stage, output.clone());
                            debug!(
                                build_id = %build_id,
                                stage = %stage,
                                tokens = tokens,
                                total = total_tokens,
                                "stage completed"
                            );
                            yield PipelineEvent::Progress(ProgressEvent::completed(
                                stage,
                                output,
                                tokens,
                                total_tokens,
                            ));
                        }
                    }
                }

                if let Some(err) = failure {
                    let next = RunPhase::Failed { stage: definition.ordinal };
                    debug_assert!(RunPhase::is_valid_transition(phase, next));

                    if let Err(state_err) = state.mark_failed(stage, err.to_string()) {
                        warn!(build_id = %build_id, error = %state_err, "state slot rejected failure");
                    }
                    warn!(
                        build_id = %build_id,
                        stage = %stage,
                        error = %err,
                        "pipeline run failed"
                    );
                    this.set_status(build_id, BuildStatus::Failed).await;
                    // A stage the gate refused never started; the terminal
                    // error alone reports it.
                    if stage_started {
                        yield PipelineEvent::Progress(ProgressEvent::failed(stage, err.to_string()));
                    }
                    yield PipelineEvent::Error(ErrorEvent {
                        step: stage,
                        error: err.to_string(),
                        partial: state.has_partial(),
                        build_id: Some(build_id),
                    });
                    return;
                }
            }

            let next = RunPhase::Completed;
            debug_assert!(RunPhase::is_valid_transition(phase, next));
            this.set_status(build_id, BuildStatus::Completed).await;
            info!(
                build_id = %build_id,
                total_tokens = total_tokens,
                "pipeline run completed"
            );
            yield PipelineEvent::Complete(CompleteEvent {
                build_id,
                success: true,
                total_tokens,
            });
        }
    }

    /// One stage: generator call (with timeout and cancellation), schema
    /// validation, and the required stage-output write.
    async fn call_stage(
        &self,
        stage: StageName,
        request: &NewBuild,
        build_id: Uuid,
        outputs: &BTreeMap<StageName, StageOutput>,
        cancel: &CancellationToken,
    ) -> StageCall {
        let prompt = match prompts::build_stage_prompt(stage, request, outputs) {
            Ok(prompt) => prompt,
            Err(e) => {
                return StageCall::Failed(PipelineError::Schema {
                    stage,
                    reason: format!("failed to encode dependency outputs: {e}"),
                });
            }
        };
        let generate = GenerateRequest::structured(
            prompt,
            prompts::system_instruction(stage),
            stage.wants_array(),
        );

        let call = tokio::time::timeout(self.config.stage_timeout, self.generator.generate(generate));
        let outcome = tokio::select! {
            // Biased so cancellation wins even when the call is also ready.
            biased;
            _ = cancel.cancelled() => return StageCall::Cancelled,
            outcome = call => outcome,
        };

        let response = match outcome {
            Err(_elapsed) => {
                return StageCall::Failed(PipelineError::Generator(GeneratorError::Timeout(
                    self.config.stage_timeout,
                )));
            }
            Ok(Err(e)) => return StageCall::Failed(PipelineError::Generator(e)),
            Ok(Ok(response)) => response,
        };

        // Structurally non-conforming output fails the stage exactly like a
        // generator error.
        let output = match StageOutput::parse(stage, &response.data) {
            Ok(output) => output,
            Err(e) => {
                return StageCall::Failed(PipelineError::Schema {
                    stage,
                    reason: e.to_string(),
                });
            }
        };

        // Required write: later stages consume this as input.
        if let Err(e) = self
            .builds
            .upsert_stage_output(build_id, stage.as_str(), &response.data, response.tokens_used)
            .await
        {
            return StageCall::Failed(PipelineError::StageWrite { stage, source: e });
        }

        StageCall::Done {
            output,
            tokens: response.tokens_used,
        }
    }

    /// Build-status bookkeeping is best-effort: stage outputs, not the
    /// status column, are what later stages and readers depend on.
    async fn set_status(&self, build_id: Uuid, status: BuildStatus) {
        if let Err(e) = self.builds.update_build_status(build_id, status).await {
            warn!(
                build_id = %build_id,
                status = %status,
                error = %e,
                "failed to update build status, continuing"
            );
        }
    }

    /// The partial projection of a build: validated outputs for the
    /// longest prefix of stages with persisted results. Usable after a
    /// failed or cancelled run.
    pub async fn partial_plan(
        &self,
        build_id: Uuid,
    ) -> Result<Vec<(StageName, StageOutput)>, PipelineError> {
        let raw = self.builds.get_stage_outputs(build_id).await?;
        let mut plan = Vec::new();
        for stage in StageName::ORDER {
            let Some(value) = raw.get(stage.as_str()) else {
                break;
            };
            let output = StageOutput::parse(stage, value).map_err(|e| PipelineError::Schema {
                stage,
                reason: e.to_string(),
            })?;
            plan.push((stage, output));
        }
        Ok(plan)
    }
}
