//! Outcome model: how one pass over a group's check/run phase ended.
//!
//! Check failures and cancellations are ordinary values here, not errors
//! unwinding out of the execution loop. The group turns a non-success
//! outcome into a rollback trigger and a terminal status.

use serde_json::Value;

use super::errors::TaskError;
use super::state::GroupStatus;

#[derive(Debug)]
pub enum Outcome {
    /// Every task ran. Holds the last task's result.
    Success(Value),

    /// The check of task `index` returned false.
    CheckFailed { index: usize },

    /// The run of task `index` failed (or panicked).
    RunFailed { index: usize, source: TaskError },

    /// Cancellation was observed after `completed` tasks had run.
    Cancelled { completed: usize },
}

impl Outcome {
    /// Terminal status this outcome maps to.
    pub fn status(&self) -> GroupStatus {
        match self {
            Outcome::Success(_) => GroupStatus::Success,
            Outcome::CheckFailed { .. } | Outcome::RunFailed { .. } => GroupStatus::Failed,
            Outcome::Cancelled { .. } => GroupStatus::Cancelled,
        }
    }

    /// Index of the task whose own check/run ended the pass.
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            Outcome::CheckFailed { index } | Outcome::RunFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Number of tasks whose run completed before a non-success outcome.
    pub fn completed(&self) -> Option<usize> {
        match self {
            Outcome::Success(_) => None,
            Outcome::CheckFailed { index } | Outcome::RunFailed { index, .. } => Some(*index),
            Outcome::Cancelled { completed } => Some(*completed),
        }
    }
}
