//! Rollback trigger handed to `Task::rollback`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::GroupError;

/// Why a rollback was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackKind {
    /// A task's check returned false.
    CurrentCheckError,

    /// A task's run returned an error.
    CurrentRunError,

    /// The submitter cancelled the group.
    UserCancel,
}

/// Rollback trigger.
///
/// `CurrentCheckError` and `CurrentRunError` always carry a cause; the
/// constructors are the only way to build one, so that holds by construction.
///
/// `is_current()` tells a task whether it is the one whose check/run failed,
/// or an already-completed task being compensated.
#[derive(Debug, Clone)]
pub struct RollbackInfo {
    kind: RollbackKind,
    cause: Option<Arc<GroupError>>,
    current: bool,
}

impl RollbackInfo {
    pub fn check_failed(cause: Arc<GroupError>) -> Self {
        Self {
            kind: RollbackKind::CurrentCheckError,
            cause: Some(cause),
            current: true,
        }
    }

    pub fn run_failed(cause: Arc<GroupError>) -> Self {
        Self {
            kind: RollbackKind::CurrentRunError,
            cause: Some(cause),
            current: true,
        }
    }

    pub fn user_cancel(cause: Option<Arc<GroupError>>) -> Self {
        Self {
            kind: RollbackKind::UserCancel,
            cause,
            current: false,
        }
    }

    pub fn kind(&self) -> RollbackKind {
        self.kind
    }

    pub fn cause(&self) -> Option<&Arc<GroupError>> {
        self.cause.as_ref()
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    /// True for the task whose own check/run triggered the rollback.
    pub fn is_current_error(&self) -> bool {
        self.current && self.kind != RollbackKind::UserCancel
    }

    /// Same trigger, as seen by an already-completed task.
    pub(crate) fn for_completed(&self) -> Self {
        Self {
            current: false,
            ..self.clone()
        }
    }
}
