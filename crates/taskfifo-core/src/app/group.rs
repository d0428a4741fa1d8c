//! TaskGroup - check → run → rollback → close の実行プロトコル
//!
//! # フロー
//! 1. 各タスクの直前に cancel を確認（USER_CANCEL）
//! 2. check が false なら CURRENT_CHECK_ERROR
//! 3. run が Err / panic なら CURRENT_RUN_ERROR、成功なら last_result を更新
//! 4. 失敗時は rollback（失敗したタスク → 完了済みタスクを逆順）
//! 5. Context の close はどの経路でも必ず実行（`ContextScope` の Drop）

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::callback::Dispatch;
use super::status::{GroupState, Settlement, TaskStatus};
use crate::domain::{GroupError, GroupStatus, Outcome, RollbackInfo, TaskError};
use crate::typed::{Context, TaskRef};

/// An accepted submission: ordered tasks, their shared context, the status
/// they report to and the callback still to be dispatched.
pub(crate) struct TaskGroup {
    tasks: Vec<TaskRef>,
    context: Context,
    state: Arc<GroupState>,
    dispatch: Option<Dispatch>,
}

/// What the worker needs once a group has run.
pub(crate) struct GroupReport {
    pub(crate) status: GroupStatus,
    pub(crate) result: Result<Value, Arc<GroupError>>,
    pub(crate) rollback: Option<RollbackInfo>,
}

impl TaskGroup {
    pub(crate) fn new(name: String, tasks: Vec<TaskRef>, dispatch: Dispatch) -> Self {
        let state = Arc::new(GroupState::new(name.clone(), tasks.len()));
        Self {
            tasks,
            context: Context::new(name),
            state,
            dispatch: Some(dispatch),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.state.name()
    }

    pub(crate) fn tasks(&self) -> &[TaskRef] {
        &self.tasks
    }

    pub(crate) fn progress(&self) -> f32 {
        self.state.progress()
    }

    pub(crate) fn status_handle(&self) -> TaskStatus {
        TaskStatus::new(Arc::clone(&self.state))
    }

    pub(crate) fn take_dispatch(&mut self) -> Option<Dispatch> {
        self.dispatch.take()
    }

    /// Run the whole protocol on the calling thread. Never panics out.
    pub(crate) fn run(&mut self, manager: &str) -> GroupReport {
        let name = self.state.name().to_string();
        let mut scope = ContextScope::open(&mut self.context, manager);

        let outcome = execute(&self.tasks, &self.state, &mut scope);
        let status = outcome.status();
        let failed = outcome.failed_index();
        let completed = outcome.completed();

        let (result, rollback) = match outcome {
            Outcome::Success(value) => (Ok(value), None),
            Outcome::CheckFailed { index } => {
                let task = self.tasks[index].task_name().to_string();
                warn!(manager, group = %name, task = %task, "check did not pass");
                let cause = GroupError::CheckFailed { group: name, task }.shared();
                (Err(Arc::clone(&cause)), Some(RollbackInfo::check_failed(cause)))
            }
            Outcome::RunFailed { index, source } => {
                let task = self.tasks[index].task_name().to_string();
                error!(manager, group = %name, task = %task, error = %source, "run failed");
                let cause = GroupError::RunFailed {
                    group: name,
                    task,
                    source,
                }
                .shared();
                (Err(Arc::clone(&cause)), Some(RollbackInfo::run_failed(cause)))
            }
            Outcome::Cancelled { completed } => {
                warn!(manager, group = %name, completed, "cancelled");
                let cause = GroupError::Cancelled { group: name }.shared();
                (Err(cause), Some(RollbackInfo::user_cancel(None)))
            }
        };

        if let (Some(info), Some(completed)) = (&rollback, completed) {
            compensate(manager, &self.tasks, info, failed, completed);
        }

        drop(scope);
        GroupReport {
            status,
            result,
            rollback,
        }
    }

    /// Publish the terminal status. Called after the active set is released.
    pub(crate) fn settle(&self, report: &GroupReport) -> bool {
        self.state.settle(Settlement {
            status: report.status,
            value: report.result.as_ref().ok().cloned(),
            error: report.result.as_ref().err().cloned(),
            rollback: report.rollback.clone(),
        })
    }
}

/// The check/run phase.
fn execute(tasks: &[TaskRef], state: &GroupState, ctx: &mut Context) -> Outcome {
    for (index, task) in tasks.iter().enumerate() {
        if state.cancel_requested() {
            return Outcome::Cancelled { completed: index };
        }
        if index == 0 {
            state.mark_running();
        }

        match guarded(|| task.check_dyn(ctx)) {
            Ok(true) => {}
            Ok(false) => return Outcome::CheckFailed { index },
            Err(panic) => {
                return Outcome::RunFailed {
                    index,
                    source: TaskError::Panicked(panic),
                };
            }
        }

        match guarded(|| task.run_dyn(ctx)) {
            Ok(Ok(value)) => {
                ctx.set_last_result(value);
                state.advance(index + 1);
            }
            Ok(Err(source)) => return Outcome::RunFailed { index, source },
            Err(panic) => {
                return Outcome::RunFailed {
                    index,
                    source: TaskError::Panicked(panic),
                };
            }
        }
    }

    Outcome::Success(ctx.last_result_raw().cloned().unwrap_or(Value::Null))
}

/// Best-effort rollback: the failing task first, then completed tasks in
/// reverse order. Tasks that never ran are not touched.
fn compensate(
    manager: &str,
    tasks: &[TaskRef],
    info: &RollbackInfo,
    failed: Option<usize>,
    completed: usize,
) {
    let current = failed.map(|index| (index, info.clone()));
    let previous = (0..completed).rev().map(|index| (index, info.for_completed()));

    for (index, info) in current.into_iter().chain(previous) {
        let task = &tasks[index];
        match guarded(|| task.rollback_dyn(&info)) {
            Ok(Ok(())) => {
                debug!(manager, task = %task.task_name(), kind = ?info.kind(), "rolled back");
            }
            Ok(Err(err)) => {
                error!(manager, task = %task.task_name(), error = %err, "rollback failed");
            }
            Err(panic) => {
                error!(manager, task = %task.task_name(), panic = %panic, "rollback panicked");
            }
        }
    }
}

/// Context borrowed for one execution; closed when the scope ends, whichever
/// way it ends.
struct ContextScope<'a> {
    context: &'a mut Context,
    manager: &'a str,
}

impl<'a> ContextScope<'a> {
    fn open(context: &'a mut Context, manager: &'a str) -> Self {
        Self { context, manager }
    }
}

impl Deref for ContextScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.context
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.context
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.context.close();
        debug!(manager = self.manager, group = %self.context.group(), "context closed");
    }
}

fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|panic| panic_message(panic.as_ref()))
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
