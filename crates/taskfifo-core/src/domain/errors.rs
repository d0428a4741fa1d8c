//! Errors - エラー型と分類
//!
//! - `SubmitError`: submit 時に同期的に返る検証エラー（キューには入らない）
//! - `TaskError`: Task::run / Task::rollback が返す失敗
//! - `ContextError`: Context のプロパティ取得失敗（未登録 / 型不一致）
//! - `GroupError`: タスクグループの失敗理由（fail コールバックに渡される）

use std::sync::Arc;

use thiserror::Error;

/// Rejection of a submission. Raised synchronously, never queued.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("task group has no tasks")]
    EmptyGroup,

    #[error("task manager '{manager}' has been shut down, no new groups are accepted")]
    Shutdown { manager: String },

    #[error("task '{task}' already belongs to a pending group")]
    DuplicateTask { task: String },
}

/// Failure reported by a task body.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    /// A panic caught at the task boundary.
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskError::Other(Box::new(err))
    }
}

/// Property bag lookup failure.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("property '{key}' not found")]
    NotFound { key: String },

    #[error("property '{key}' is not a {expected}: {source}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("property '{key}' cannot be stored: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a task group did not succeed.
///
/// Shared between the status handle, the rollback info and the fail
/// callback, so it travels as `Arc<GroupError>`.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group '{group}': check of task '{task}' did not pass")]
    CheckFailed { group: String, task: String },

    #[error("group '{group}': task '{task}' failed: {source}")]
    RunFailed {
        group: String,
        task: String,
        #[source]
        source: TaskError,
    },

    #[error("group '{group}' was cancelled")]
    Cancelled { group: String },

    #[error("group '{group}': result cannot be decoded: {source}")]
    ResultDecode {
        group: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GroupError {
    /// Short stable label (snake_case) for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            GroupError::CheckFailed { .. } => "check_failed",
            GroupError::RunFailed { .. } => "run_failed",
            GroupError::Cancelled { .. } => "cancelled",
            GroupError::ResultDecode { .. } => "result_decode",
        }
    }

    pub fn group(&self) -> &str {
        match self {
            GroupError::CheckFailed { group, .. }
            | GroupError::RunFailed { group, .. }
            | GroupError::Cancelled { group }
            | GroupError::ResultDecode { group, .. } => group,
        }
    }

    pub(crate) fn shared(self) -> Arc<GroupError> {
        Arc::new(self)
    }
}
