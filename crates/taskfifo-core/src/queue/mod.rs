//! GroupQueue - FIFO キュー + active-task 集合
//!
//! # 実装詳細
//! - `Mutex<QueueState>` で排他制御（submit と worker が同じロックを使う）
//! - `Condvar` で submit / shutdown 時に worker を起こす
//! - pop は「空なら待つ / shutdown 済みかつ空なら None」

mod state;

use std::sync::{Condvar, Mutex};

use tracing::debug;

use self::state::QueueState;
use crate::app::group::TaskGroup;
use crate::domain::SubmitError;
use crate::sync::{lock, wait};
use crate::typed::task::TaskRef;

pub(crate) struct GroupQueue {
    manager: String,
    state: Mutex<QueueState>,
    condvar: Condvar,
}

impl GroupQueue {
    pub(crate) fn new(manager: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            state: Mutex::new(QueueState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Validate and enqueue under one lock.
    ///
    /// On rejection nothing is mutated: neither the queue nor the active set.
    pub(crate) fn push(&self, group: TaskGroup) -> Result<(), SubmitError> {
        if group.tasks().is_empty() {
            return Err(SubmitError::EmptyGroup);
        }

        let mut state = lock(&self.state);
        if state.shutdown {
            return Err(SubmitError::Shutdown {
                manager: self.manager.clone(),
            });
        }
        if let Some(task) = state.first_active(group.tasks()) {
            return Err(SubmitError::DuplicateTask {
                task: task.task_name().to_string(),
            });
        }

        state.claim(group.tasks());
        debug!(
            manager = %self.manager,
            group = %group.name(),
            tasks = group.tasks().len(),
            queued = state.groups.len() + 1,
            "group accepted"
        );
        state.groups.push_back(group);
        drop(state);

        self.condvar.notify_all();
        Ok(())
    }

    /// Blocks until a group is available. `None` once shut down and empty.
    pub(crate) fn pop(&self) -> Option<TaskGroup> {
        let mut state = lock(&self.state);
        loop {
            if let Some(group) = state.groups.pop_front() {
                return Some(group);
            }
            if state.is_drained() {
                return None;
            }
            state = wait(&self.condvar, state);
        }
    }

    /// Drop a finished group's tasks from the active set.
    pub(crate) fn release(&self, tasks: &[TaskRef]) {
        lock(&self.state).release(tasks);
    }

    /// Close intake and wake the worker. Returns `false` if already closed.
    pub(crate) fn shutdown(&self) -> bool {
        let mut state = lock(&self.state);
        let first = !state.shutdown;
        state.shutdown = true;
        drop(state);

        self.condvar.notify_all();
        first
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        lock(&self.state).shutdown
    }

    /// Mean progress of the queued groups, `0.0` when none are queued.
    pub(crate) fn process(&self) -> f32 {
        let state = lock(&self.state);
        if state.groups.is_empty() {
            return 0.0;
        }
        let total: f32 = state.groups.iter().map(|g| g.progress()).sum();
        total / state.groups.len() as f32
    }

    /// Number of tasks in the queued groups.
    pub(crate) fn size(&self) -> usize {
        lock(&self.state).groups.iter().map(|g| g.tasks().len()).sum()
    }

    pub(crate) fn pending_groups(&self) -> usize {
        lock(&self.state).groups.len()
    }

    pub(crate) fn active_tasks(&self) -> usize {
        lock(&self.state).active.len()
    }
}
