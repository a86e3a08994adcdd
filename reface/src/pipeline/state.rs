//! Pipeline run state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// States of a single pipeline run.
///
/// ```text
/// Init -> ContentCheck -> Stage -> Process -> Reassemble -> Finalize -> Succeeded
///   \________ any non-terminal state may fail _______________________/ -> Failed
/// ```
///
/// Image runs go `Stage -> Process -> Finalize`, skipping `Reassemble`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Init,
    ContentCheck,
    Stage,
    Process,
    Reassemble,
    Finalize,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Check whether moving from `self` to `target` is a legal step.
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Succeeded | Failed, _) => false,
            (_, Failed) => true,
            (Init, ContentCheck) => true,
            (ContentCheck, Stage) => true,
            (Stage, Process) => true,
            (Process, Reassemble | Finalize) => true,
            (Reassemble, Finalize) => true,
            (Finalize, Succeeded) => true,
            _ => false,
        }
    }

    /// Step to `target`, or fail if the step is not allowed.
    pub fn transition_to(&self, target: PipelineState) -> Result<PipelineState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }
}
