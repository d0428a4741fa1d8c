//! Queue bookkeeping guarded by the manager's single mutex.

use std::collections::{HashSet, VecDeque};

use crate::app::group::TaskGroup;
use crate::typed::task::{TaskKey, TaskRef};

/// Everything `submit` and the worker touch, kept behind one lock so that
/// duplicate detection and enqueueing are a single atomic step.
#[derive(Default)]
pub(crate) struct QueueState {
    /// Accepted groups, head runs next.
    pub(crate) groups: VecDeque<TaskGroup>,

    /// Tasks of every queued or running group.
    pub(crate) active: HashSet<TaskKey>,

    /// Set once, never cleared.
    pub(crate) shutdown: bool,
}

impl QueueState {
    /// First task of `tasks` that is already owned by a pending group.
    pub(crate) fn first_active<'a>(&self, tasks: &'a [TaskRef]) -> Option<&'a TaskRef> {
        tasks.iter().find(|task| self.active.contains(&TaskKey::of(task)))
    }

    pub(crate) fn claim(&mut self, tasks: &[TaskRef]) {
        self.active.extend(tasks.iter().map(TaskKey::of));
    }

    pub(crate) fn release(&mut self, tasks: &[TaskRef]) {
        for task in tasks {
            self.active.remove(&TaskKey::of(task));
        }
    }

    /// Queue drained and intake closed: the worker may exit.
    pub(crate) fn is_drained(&self) -> bool {
        self.shutdown && self.groups.is_empty()
    }
}
