//! Pipeline run state: per-stage slots and the run-level state machine.
//!
//! "Partial build" is a well-defined prefix projection here, not an ad hoc
//! null check: `Done` slots always form a strict prefix of the stage order,
//! and at most one slot is `Failed`.

use uuid::Uuid;

use crate::stage::output::StageOutput;
use crate::stage::StageName;

/// Terminal-or-not record for one stage slot.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSlot {
    NotStarted,
    Done {
        output: StageOutput,
        tokens_cost: i64,
    },
    Failed {
        error: String,
    },
}

impl StageSlot {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Errors from illegal slot mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("stage {stage} cannot resolve before all earlier stages are done")]
    OutOfOrder { stage: StageName },

    #[error("stage {stage} already has a result")]
    AlreadyResolved { stage: StageName },

    #[error("run already failed at stage {failed_at}; {stage} may not proceed")]
    RunAlreadyFailed {
        stage: StageName,
        failed_at: StageName,
    },
}

/// The ordered record of the seven stage slots for one build.
///
/// Mutated only by the orchestrator; one instance per build id.
#[derive(Debug, Clone)]
pub struct PipelineState {
    build_id: Uuid,
    slots: Vec<StageSlot>,
}

impl PipelineState {
    pub fn new(build_id: Uuid) -> Self {
        Self {
            build_id,
            slots: vec![StageSlot::NotStarted; StageName::COUNT],
        }
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn slot(&self, stage: StageName) -> &StageSlot {
        &self.slots[stage.ordinal()]
    }

    /// The stage that failed, if any.
    pub fn failed_stage(&self) -> Option<StageName> {
        StageName::ORDER
            .into_iter()
            .find(|s| matches!(self.slot(*s), StageSlot::Failed { .. }))
    }

    fn check_is_next(&self, stage: StageName) -> Result<(), StateError> {
        if let Some(failed_at) = self.failed_stage() {
            return Err(StateError::RunAlreadyFailed { stage, failed_at });
        }
        if !matches!(self.slot(stage), StageSlot::NotStarted) {
            return Err(StateError::AlreadyResolved { stage });
        }
        let all_prior_done = StageName::ORDER[..stage.ordinal()]
            .iter()
            .all(|s| self.slot(*s).is_done());
        if !all_prior_done {
            return Err(StateError::OutOfOrder { stage });
        }
        Ok(())
    }

    /// Record a successful stage. Legal only for the first unresolved
    /// stage of a run with no failure.
    pub fn mark_done(
        &mut self,
        stage: StageName,
        output: StageOutput,
        tokens_cost: i64,
    ) -> Result<(), StateError> {
        self.check_is_next(stage)?;
        self.slots[stage.ordinal()] = StageSlot::Done {
            output,
            tokens_cost,
        };
        Ok(())
    }

    /// Record a failed stage; the run is terminal afterwards.
    pub fn mark_failed(
        &mut self,
        stage: StageName,
        error: impl Into<String>,
    ) -> Result<(), StateError> {
        self.check_is_next(stage)?;
        self.slots[stage.ordinal()] = StageSlot::Failed {
            error: error.into(),
        };
        Ok(())
    }

    /// The `Done` prefix: stage names with persisted, validated outputs.
    pub fn done_prefix(&self) -> Vec<StageName> {
        StageName::ORDER
            .into_iter()
            .take_while(|s| self.slot(*s).is_done())
            .collect()
    }

    /// The partial projection: outputs of the `Done` prefix, in order.
    pub fn partial_outputs(&self) -> Vec<(StageName, &StageOutput)> {
        StageName::ORDER
            .into_iter()
            .map_while(|s| match self.slot(s) {
                StageSlot::Done { output, .. } => Some((s, output)),
                _ => None,
            })
            .collect()
    }

    /// Whether at least one stage completed (the `partial` flag of the
    /// terminal error event).
    pub fn has_partial(&self) -> bool {
        self.slots[0].is_done()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(StageSlot::is_done)
    }

    /// Sum of token costs across `Done` slots.
    pub fn total_tokens(&self) -> i64 {
        self.slots
            .iter()
            .map(|s| match s {
                StageSlot::Done { tokens_cost, .. } => *tokens_cost,
                _ => 0,
            })
            .sum()
    }
}

/// Run-level state machine: `Pending -> Running(stage) -> Completed |
/// Failed(stage)`. Transitions move forward only; there is no retry edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Running { stage: usize },
    Completed,
    Failed { stage: usize },
}

impl RunPhase {
    /// Check whether `from -> to` is an edge of the run state graph.
    pub fn is_valid_transition(from: RunPhase, to: RunPhase) -> bool {
        match (from, to) {
            (Self::Pending, Self::Running { stage }) => stage == 0,
            (Self::Running { stage: a }, Self::Running { stage: b }) => b == a + 1,
            (Self::Running { stage }, Self::Completed) => stage == StageName::COUNT - 1,
            (Self::Running { stage: a }, Self::Failed { stage: b }) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::output::{NormalizedVehicle, ToneSummary};

    fn normalize_output() -> StageOutput {
        StageOutput::Normalize(NormalizedVehicle {
            make: "Subaru".into(),
            model: "WRX".into(),
            year: None,
            trim: None,
            engine: None,
            drivetrain: None,
            assumptions: vec![],
        })
    }

    fn output_for(stage: StageName) -> StageOutput {
        // The state layer does not cross-check variant against slot, so a
        // stand-in payload keeps these tests focused on ordering rules.
        match stage {
            StageName::Tone => StageOutput::Tone(ToneSummary {
                headline: "h".into(),
                summary: "s".into(),
            }),
            _ => normalize_output(),
        }
    }

    #[test]
    fn done_slots_form_a_prefix() {
        let mut state = PipelineState::new(Uuid::new_v4());
        state
            .mark_done(StageName::Normalize, output_for(StageName::Normalize), 100)
            .unwrap();
        state
            .mark_done(StageName::Strategy, output_for(StageName::Strategy), 150)
            .unwrap();

        assert_eq!(
            state.done_prefix(),
            vec![StageName::Normalize, StageName::Strategy]
        );
        assert_eq!(state.total_tokens(), 250);
        assert!(state.has_partial());
        assert!(!state.is_complete());
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut state = PipelineState::new(Uuid::new_v4());
        let err = state
            .mark_done(StageName::Synergy, output_for(StageName::Synergy), 10)
            .unwrap_err();
        assert_eq!(
            err,
            StateError::OutOfOrder {
                stage: StageName::Synergy
            }
        );
    }

    #[test]
    fn no_done_after_failure() {
        let mut state = PipelineState::new(Uuid::new_v4());
        state
            .mark_done(StageName::Normalize, output_for(StageName::Normalize), 100)
            .unwrap();
        state
            .mark_failed(StageName::Strategy, "generator unavailable")
            .unwrap();

        let err = state
            .mark_done(StageName::Synergy, output_for(StageName::Synergy), 10)
            .unwrap_err();
        assert_eq!(
            err,
            StateError::RunAlreadyFailed {
                stage: StageName::Synergy,
                failed_at: StageName::Strategy,
            }
        );
        assert_eq!(state.failed_stage(), Some(StageName::Strategy));
        assert!(state.has_partial());
    }

    #[test]
    fn double_resolution_is_rejected() {
        let mut state = PipelineState::new(Uuid::new_v4());
        state
            .mark_done(StageName::Normalize, output_for(StageName::Normalize), 100)
            .unwrap();
        let err = state
            .mark_done(StageName::Normalize, output_for(StageName::Normalize), 100)
            .unwrap_err();
        assert_eq!(
            err,
            StateError::AlreadyResolved {
                stage: StageName::Normalize
            }
        );
    }

    #[test]
    fn partial_projection_stops_at_first_unresolved() {
        let mut state = PipelineState::new(Uuid::new_v4());
        for stage in &StageName::ORDER[..3] {
            state.mark_done(*stage, output_for(*stage), 1).unwrap();
        }
        state.mark_failed(StageName::Execution, "boom").unwrap();

        let partial = state.partial_outputs();
        assert_eq!(partial.len(), 3);
        assert_eq!(partial[2].0, StageName::Synergy);
    }

    #[test]
    fn complete_run_accumulates_all_tokens() {
        let mut state = PipelineState::new(Uuid::new_v4());
        let costs = [100, 150, 300, 400, 250, 200, 80];
        for (stage, cost) in StageName::ORDER.into_iter().zip(costs) {
            state.mark_done(stage, output_for(stage), cost).unwrap();
        }
        assert!(state.is_complete());
        assert_eq!(state.total_tokens(), 1480);
    }

    #[test]
    fn run_phase_moves_forward_only() {
        use RunPhase::*;

        assert!(RunPhase::is_valid_transition(Pending, Running { stage: 0 }));
        assert!(RunPhase::is_valid_transition(
            Running { stage: 0 },
            Running { stage: 1 }
        ));
        assert!(RunPhase::is_valid_transition(
            Running { stage: 6 },
            Completed
        ));
        assert!(RunPhase::is_valid_transition(
            Running { stage: 3 },
            Failed { stage: 3 }
        ));

        // No backward edges, no skips, no retry edge.
        assert!(!RunPhase::is_valid_transition(Pending, Running { stage: 2 }));
        assert!(!RunPhase::is_valid_transition(
            Running { stage: 2 },
            Running { stage: 1 }
        ));
        assert!(!RunPhase::is_valid_transition(
            Running { stage: 2 },
            Completed
        ));
        assert!(!RunPhase::is_valid_transition(
            Failed { stage: 2 },
            Running { stage: 2 }
        ));
        assert!(!RunPhase::is_valid_transition(Completed, Pending));
    }
}
