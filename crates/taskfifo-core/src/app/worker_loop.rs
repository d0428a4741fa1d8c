//! WorkerLoop - グループを1つずつ実行する専用スレッド
//!
//! # フロー
//! 1. GroupQueue::pop() でグループ取得（空なら待つ）
//! 2. TaskGroup::run() で check → run → rollback → close
//! 3. active-task 集合から解放
//! 4. 終端状態を公開
//! 5. コールバックを CallbackDispatcher に渡す
//!
//! shutdown 済みかつキューが空になったら pool を close して終了。

use std::sync::Arc;

use tracing::{debug, info};

use super::callback::CallbackDispatcher;
use crate::queue::GroupQueue;

pub(crate) fn worker_loop(
    manager: String,
    queue: Arc<GroupQueue>,
    mut dispatcher: CallbackDispatcher,
) {
    debug!(manager = %manager, "worker started");

    while let Some(mut group) = queue.pop() {
        let status = group.status_handle();
        debug!(manager = %manager, group = %group.name(), id = %status.id(), "group started");

        let report = group.run(&manager);
        queue.release(group.tasks());
        group.settle(&report);

        info!(
            manager = %manager,
            group = %group.name(),
            id = %status.id(),
            status = ?report.status,
            error = report.result.as_ref().err().map(|e| e.as_label()),
            "group finished"
        );

        if let Some(dispatch) = group.take_dispatch() {
            dispatcher.dispatch(group.name(), dispatch, report.result);
        }
    }

    dispatcher.close();
    debug!(manager = %manager, "worker stopped");
}
