//! Status - 投入者に返すハンドル
//!
//! `TaskStatus` は `GroupState` への共有参照。worker が状態を更新し、
//! 投入者は任意のスレッドから読み取り / cancel / wait できる。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::domain::{GroupError, GroupId, GroupStatus, RollbackInfo};
use crate::sync::lock;

/// Shared between a queued/running group and every `TaskStatus` clone.
pub(crate) struct GroupState {
    id: GroupId,
    name: String,
    total: usize,
    status: watch::Sender<GroupStatus>,
    cancel: AtomicBool,
    record: Mutex<Record>,
}

struct Record {
    completed: usize,
    value: Option<Value>,
    error: Option<Arc<GroupError>>,
    rollback: Option<RollbackInfo>,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Terminal facts, written once by the worker.
pub(crate) struct Settlement {
    pub(crate) status: GroupStatus,
    pub(crate) value: Option<Value>,
    pub(crate) error: Option<Arc<GroupError>>,
    pub(crate) rollback: Option<RollbackInfo>,
}

impl GroupState {
    pub(crate) fn new(name: String, total: usize) -> Self {
        let (status, _) = watch::channel(GroupStatus::Ready);
        Self {
            id: GroupId::generate(),
            name,
            total,
            status,
            cancel: AtomicBool::new(false),
            record: Mutex::new(Record {
                completed: 0,
                value: None,
                error: None,
                rollback: None,
                submitted_at: Utc::now(),
                started_at: None,
                finished_at: None,
            }),
        }
    }

    pub(crate) fn id(&self) -> GroupId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn status(&self) -> GroupStatus {
        *self.status.borrow()
    }

    /// Apply `next` only if it is a legal successor of the current status.
    fn transition(&self, next: GroupStatus) -> bool {
        self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn mark_running(&self) -> bool {
        lock(&self.record).started_at = Some(Utc::now());
        self.transition(GroupStatus::Running)
    }

    pub(crate) fn advance(&self, completed: usize) {
        lock(&self.record).completed = completed.min(self.total);
    }

    pub(crate) fn progress(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        lock(&self.record).completed as f32 / self.total as f32
    }

    pub(crate) fn request_cancel(&self) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        !self.cancel.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Record the terminal facts, then publish the terminal status.
    pub(crate) fn settle(&self, settlement: Settlement) -> bool {
        {
            let mut record = lock(&self.record);
            if settlement.status == GroupStatus::Success {
                record.value = settlement.value;
            }
            record.error = settlement.error;
            record.rollback = settlement.rollback;
            record.finished_at = Some(Utc::now());
        }
        self.transition(settlement.status)
    }
}

/// Handle returned by `TaskManager::submit`.
///
/// Cheap to clone; every clone observes the same group.
#[derive(Clone)]
pub struct TaskStatus {
    state: Arc<GroupState>,
}

impl TaskStatus {
    pub(crate) fn new(state: Arc<GroupState>) -> Self {
        Self { state }
    }

    pub fn id(&self) -> GroupId {
        self.state.id()
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// Number of tasks in the group.
    pub fn task_count(&self) -> usize {
        self.state.total
    }

    pub fn status(&self) -> GroupStatus {
        self.state.status()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Last task's result, present only once the group reached `Success`.
    pub fn value(&self) -> Option<Value> {
        lock(&self.state.record).value.clone()
    }

    /// `value()` decoded as `T`. `None` if absent or not a `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.value().and_then(|value| serde_json::from_value(value).ok())
    }

    /// Fraction of tasks whose run completed, in `[0, 1]`.
    pub fn process(&self) -> f32 {
        self.state.progress()
    }

    /// Failure cause once the group ended in `Failed` or `Cancelled`.
    pub fn error(&self) -> Option<Arc<GroupError>> {
        lock(&self.state.record).error.clone()
    }

    /// Rollback trigger the group was compensated with, if any.
    pub fn rollback(&self) -> Option<RollbackInfo> {
        lock(&self.state.record).rollback.clone()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        lock(&self.state.record).submitted_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.state.record).started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.state.record).finished_at
    }

    /// Request cancellation.
    ///
    /// Observed by the worker before the next task starts; a running
    /// check/run/rollback is never interrupted. No-op once terminal.
    pub fn cancel(&self) {
        if self.state.request_cancel() {
            tracing::debug!(group = %self.state.name(), id = %self.state.id(), "cancel requested");
        }
    }

    /// Resolves once the group reaches a terminal status.
    pub async fn wait(&self) -> GroupStatus {
        let mut rx = self.state.status.subscribe();
        match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }
}

impl std::fmt::Debug for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStatus")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .field("process", &self.process())
            .finish()
    }
}
