//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **TaskManager**: submit / shutdown と FIFO キューの所有者
//! - **ManagerBuilder**: 構築と起動時検証
//! - **WorkerLoop**: 専用スレッドでグループを1つずつ実行
//! - **TaskGroup**: check → run → rollback → close のプロトコル
//! - **TaskStatus**: 投入者に返すハンドル（status / value / cancel / wait）
//! - **CallbackDispatcher**: コールバックを worker の外で実行するプール

pub mod builder;
pub mod callback;
pub mod config;
pub(crate) mod group;
pub mod manager;
pub mod status;
mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, ManagerBuilder};
pub use self::callback::{Callback, CallbackDispatcher};
pub use self::config::ManagerConfig;
pub use self::manager::TaskManager;
pub use self::status::TaskStatus;
