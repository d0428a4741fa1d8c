//! taskfifo-core
//!
//! In-process FIFO task orchestration: submit an ordered group of tasks,
//! the manager runs groups one at a time on a dedicated worker thread.
//! Each task's `check` guards its `run`; a failure or cancellation rolls the
//! group back and is reported through the submitter's callback.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, rollback, outcome, errors）
//! - **typed**: Task trait, DynTask, Context
//! - **queue**: FIFO キュー + active-task 集合
//! - **app**: TaskManager, worker loop, TaskGroup, TaskStatus, callbacks

pub mod app;
pub mod domain;
pub mod typed;

mod queue;
mod sync;

#[cfg(test)]
mod testing;

pub use app::{
    BuildError, Callback, CallbackDispatcher, ManagerBuilder, ManagerConfig, TaskManager,
    TaskStatus,
};
pub use domain::{
    ContextError, GroupError, GroupId, GroupStatus, RollbackInfo, RollbackKind, SubmitError,
    TaskError,
};
pub use typed::{Context, DynTask, Task, TaskRef};
