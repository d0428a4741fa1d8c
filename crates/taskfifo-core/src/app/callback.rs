//! Callback - 投入者のコールバックと、それを実行するプール
//!
//! # 学習ポイント
//! - `Callback<T>` は型付き（成功値を `T` にデコード）
//! - worker には型消去済みの `Dispatch` として渡す
//! - 実行は manager 専用の tokio runtime の blocking pool 上。
//!   遅いコールバックが次のグループの実行を止めない。

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::domain::GroupError;

type SuccessFn<T> = Box<dyn FnOnce(T) + Send>;
type FailFn = Box<dyn FnOnce(Arc<GroupError>) + Send>;

/// Type-erased callback, ready to run with the group's result.
pub(crate) type Dispatch = Box<dyn FnOnce(Result<Value, Arc<GroupError>>) + Send>;

/// Success/fail pair supplied at submit time. Exactly one side runs, once.
///
/// # 使用例
/// ```ignore
/// let callback = Callback::new(
///     |age: u32| println!("ok: {age}"),
///     |err| eprintln!("failed: {err}"),
/// );
/// manager.submit("users", tasks, callback)?;
/// ```
pub struct Callback<T> {
    success: SuccessFn<T>,
    fail: FailFn,
}

impl<T: DeserializeOwned + Send + 'static> Callback<T> {
    pub fn new<S, F>(success: S, fail: F) -> Self
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(Arc<GroupError>) + Send + 'static,
    {
        Self {
            success: Box::new(success),
            fail: Box::new(fail),
        }
    }

    /// Only the success side; failures are dropped.
    pub fn on_success<S>(success: S) -> Self
    where
        S: FnOnce(T) + Send + 'static,
    {
        Self::new(success, |_| {})
    }

    /// Decode the last result as `T` before handing it to `success`.
    /// A decode failure goes to `fail` as `GroupError::ResultDecode`.
    pub(crate) fn erase(self, group: String) -> Dispatch {
        let Callback { success, fail } = self;
        Box::new(move |result| match result {
            Ok(value) => match serde_json::from_value::<T>(value) {
                Ok(value) => success(value),
                Err(source) => fail(GroupError::ResultDecode { group, source }.shared()),
            },
            Err(cause) => fail(cause),
        })
    }
}

impl Callback<Value> {
    /// Only the fail side; the success value is ignored.
    pub fn on_fail<F>(fail: F) -> Self
    where
        F: FnOnce(Arc<GroupError>) + Send + 'static,
    {
        Self::new(|_| {}, fail)
    }

    /// Fire-and-forget: observe the group through its `TaskStatus` only.
    pub fn noop() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

/// Pool that runs callbacks off the worker thread.
///
/// Owned by exactly one manager; `close()` waits for every dispatched
/// callback, then shuts the pool down.
pub struct CallbackDispatcher {
    name: String,
    runtime: Option<Runtime>,
    pending: Vec<JoinHandle<()>>,
}

impl CallbackDispatcher {
    /// `workers` caps how many callbacks may run at the same time.
    pub fn new(name: impl Into<String>, workers: usize) -> io::Result<Self> {
        let name = name.into();
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name(format!("{name}-callback"))
            .build()?;
        Ok(Self {
            name,
            runtime: Some(runtime),
            pending: Vec::new(),
        })
    }

    pub(crate) fn dispatch(
        &mut self,
        group: &str,
        dispatch: Dispatch,
        result: Result<Value, Arc<GroupError>>,
    ) {
        let Some(runtime) = &self.runtime else {
            error!(manager = %self.name, group, "callback pool already closed");
            return;
        };
        self.pending.retain(|handle| !handle.is_finished());

        let manager = self.name.clone();
        let group = group.to_string();
        let handle = runtime.spawn_blocking(move || {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| dispatch(result))) {
                error!(
                    manager = %manager,
                    group = %group,
                    panic = %crate::app::group::panic_message(panic.as_ref()),
                    "callback panicked"
                );
            }
        });
        self.pending.push(handle);
    }

    /// Wait for in-flight callbacks, then release the pool threads.
    pub(crate) fn close(mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let pending = std::mem::take(&mut self.pending);

        debug!(manager = %self.name, pending = pending.len(), "closing callback pool");
        runtime.block_on(async {
            for handle in pending {
                if let Err(err) = handle.await {
                    error!(manager = %self.name, error = %err, "callback did not complete");
                }
            }
        });
        runtime.shutdown_background();
    }
}

impl Drop for CallbackDispatcher {
    /// Never blocks: an unclosed pool is released in the background.
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
