//! Typed - タスク API
//!
//! - **Task**: 利用者が実装する check / run / rollback
//! - **DynTask**: object-safe 版（manager 内部で使う）
//! - **Context**: グループ単位のプロパティ袋

pub mod context;
pub mod task;

pub use self::context::Context;
pub use self::task::{DynTask, Task, TaskRef};
