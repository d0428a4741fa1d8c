//! Task trait - タスクグループを構成する1ステップ
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait - `Output` 型を持つ
//! - **内部（Dyn）**: `DynTask` trait - object-safe, 結果は `serde_json::Value` に消去
//!
//! `Task` を実装すれば blanket impl で `DynTask` になるので、
//! `Arc<MyTask>` をそのまま `TaskRef` として submit できる。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::context::Context;
use crate::domain::{RollbackInfo, TaskError};

/// One step of a task group.
///
/// # 使用例
/// ```ignore
/// struct PutUser(String);
///
/// impl Task for PutUser {
///     type Output = String;
///
///     fn name(&self) -> &str {
///         "user.put"
///     }
///
///     fn run(&self, ctx: &mut Context) -> Result<String, TaskError> {
///         ctx.set("user.name", &self.0)?;
///         Ok(self.0.clone())
///     }
/// }
/// ```
///
/// `check` and `rollback` default to "always passes" and "nothing to undo".
pub trait Task: Send + Sync + 'static {
    /// Stored as the group's last result after a successful `run`.
    type Output: Serialize;

    fn name(&self) -> &str;

    /// Precondition, evaluated right before `run`. `false` fails the group.
    fn check(&self, _ctx: &Context) -> bool {
        true
    }

    fn run(&self, ctx: &mut Context) -> Result<Self::Output, TaskError>;

    /// Compensation. Errors are logged and otherwise ignored.
    fn rollback(&self, _info: &RollbackInfo) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Object-safe form of [`Task`], used by the manager.
pub trait DynTask: Send + Sync {
    fn task_name(&self) -> &str;
    fn check_dyn(&self, ctx: &Context) -> bool;
    fn run_dyn(&self, ctx: &mut Context) -> Result<Value, TaskError>;
    fn rollback_dyn(&self, info: &RollbackInfo) -> Result<(), TaskError>;
}

impl<T: Task> DynTask for T {
    fn task_name(&self) -> &str {
        self.name()
    }

    fn check_dyn(&self, ctx: &Context) -> bool {
        self.check(ctx)
    }

    fn run_dyn(&self, ctx: &mut Context) -> Result<Value, TaskError> {
        let output = self.run(ctx)?;
        serde_json::to_value(output).map_err(TaskError::other)
    }

    fn rollback_dyn(&self, info: &RollbackInfo) -> Result<(), TaskError> {
        self.rollback(info)
    }
}

/// Shared handle to a submitted task. Identity is the allocation, not the value.
pub type TaskRef = Arc<dyn DynTask>;

/// Identity of a `TaskRef`, used by the active-task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskKey(usize);

impl TaskKey {
    pub(crate) fn of(task: &TaskRef) -> Self {
        Self(Arc::as_ptr(task) as *const () as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ProbeLog, ProbeTask};

    #[test]
    fn erased_run_serializes_output() {
        let task: TaskRef = Arc::new(ProbeTask::ok(
            "a",
            serde_json::json!({"n": 1}),
            ProbeLog::default(),
        ));
        let mut ctx = Context::new("g");
        let value = task.run_dyn(&mut ctx).unwrap();
        assert_eq!(value, serde_json::json!({"n": 1}));
        assert_eq!(task.task_name(), "a");
    }

    #[test]
    fn key_follows_identity_not_value() {
        let log = ProbeLog::default();
        let a: TaskRef = Arc::new(ProbeTask::ok("same", Value::Null, log.clone()));
        let b: TaskRef = Arc::new(ProbeTask::ok("same", Value::Null, log));
        assert_eq!(TaskKey::of(&a), TaskKey::of(&a.clone()));
        assert_ne!(TaskKey::of(&a), TaskKey::of(&b));
    }

    #[test]
    fn typed_arc_and_erased_ref_share_identity() {
        let typed = Arc::new(ProbeTask::ok("a", Value::Null, ProbeLog::default()));
        let erased: TaskRef = typed.clone();
        let again: TaskRef = typed;
        assert_eq!(TaskKey::of(&erased), TaskKey::of(&again));
    }

    struct Unit;

    impl Task for Unit {
        type Output = ();

        fn name(&self) -> &str {
            "unit"
        }

        fn run(&self, _ctx: &mut Context) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn defaults_pass_check_and_ignore_rollback() {
        let task: TaskRef = Arc::new(Unit);
        let mut ctx = Context::new("g");
        assert!(task.check_dyn(&ctx));
        assert_eq!(task.run_dyn(&mut ctx).unwrap(), Value::Null);
        assert!(task.rollback_dyn(&RollbackInfo::user_cancel(None)).is_ok());
    }
}
