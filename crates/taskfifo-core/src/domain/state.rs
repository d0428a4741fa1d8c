//! State - タスクグループの状態
//!
//! # 状態遷移
//! - Ready -> Running -> Success / Failed / Cancelled
//! - Ready -> Cancelled（開始前にキャンセルされた場合）
//!
//! 終端状態からの遷移は存在しない。

use serde::{Deserialize, Serialize};

/// Lifecycle of a task group.
///
/// Serialized as SCREAMING_SNAKE_CASE: READY / RUNNING / SUCCESS / FAILED / CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    /// Accepted and waiting in the queue.
    Ready,

    /// Being executed by the worker thread.
    Running,

    Success,

    Failed,

    Cancelled,
}

impl GroupStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GroupStatus::Success | GroupStatus::Failed | GroupStatus::Cancelled
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: GroupStatus) -> bool {
        match self {
            GroupStatus::Ready => matches!(next, GroupStatus::Running | GroupStatus::Cancelled),
            GroupStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}
