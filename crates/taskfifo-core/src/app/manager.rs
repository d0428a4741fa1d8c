//! TaskManager - FIFO 単一スレッド直列スケジューラ
//!
//! # 保証
//! - 投入順に1グループずつ実行（グループ同士が重なることはない）
//! - 同じタスク（Arc の同一性）は、所属グループが終わるまで再投入できない
//! - shutdown 後は新規投入を拒否するが、キュー済みのグループは最後まで実行する

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::builder::{BuildError, ManagerBuilder};
use super::callback::{Callback, CallbackDispatcher};
use super::group::TaskGroup;
use super::status::TaskStatus;
use super::worker_loop::worker_loop;
use crate::domain::SubmitError;
use crate::queue::GroupQueue;
use crate::typed::TaskRef;

/// Owns the FIFO queue, the active-task set and the worker thread.
///
/// Dropping the manager requests shutdown without waiting; use
/// [`TaskManager::shutdown_and_join`] to wait for the queue to drain.
pub struct TaskManager {
    name: String,
    queue: Arc<GroupQueue>,
    worker: Option<JoinHandle<()>>,
}

impl TaskManager {
    /// Manager with default settings and the given name.
    pub fn new(name: impl Into<String>) -> Result<Self, BuildError> {
        ManagerBuilder::new().name(name).build()
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub(crate) fn start(name: String, dispatcher: CallbackDispatcher) -> Result<Self, BuildError> {
        let queue = Arc::new(GroupQueue::new(name.clone()));
        let worker = thread::Builder::new().name(name.clone()).spawn({
            let name = name.clone();
            let queue = Arc::clone(&queue);
            move || worker_loop(name, queue, dispatcher)
        })?;

        debug!(manager = %name, "task manager started");
        Ok(Self {
            name,
            queue,
            worker: Some(worker),
        })
    }

    /// Enqueue `tasks` as one group and return its status handle right away.
    ///
    /// Fails without touching the queue when `tasks` is empty, the manager
    /// is shut down, or any task already belongs to a pending group.
    pub fn submit<T>(
        &self,
        name: impl Into<String>,
        tasks: Vec<TaskRef>,
        callback: Callback<T>,
    ) -> Result<TaskStatus, SubmitError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let name = name.into();
        let group = TaskGroup::new(name.clone(), tasks, callback.erase(name));
        let status = group.status_handle();
        self.queue.push(group)?;
        Ok(status)
    }

    /// Stop intake. Queued groups still run. Idempotent, does not block.
    pub fn shutdown(&self) {
        if self.queue.shutdown() {
            debug!(
                manager = %self.name,
                pending = self.queue.pending_groups(),
                "shutdown requested"
            );
        }
    }

    /// Shut down, then wait until every queued group has run and every
    /// callback has returned.
    ///
    /// Must not be called from inside a callback of this manager.
    pub fn shutdown_and_join(mut self) {
        self.shutdown();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(manager = %self.name, "worker thread panicked");
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.is_shutdown()
    }

    /// Mean progress of queued (not yet started) groups. Advisory.
    pub fn process(&self) -> f32 {
        self.queue.process()
    }

    /// Total tasks across queued groups. Advisory.
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    pub fn pending_groups(&self) -> usize {
        self.queue.pending_groups()
    }

    /// Tasks currently reserved by queued or running groups.
    pub fn active_tasks(&self) -> usize {
        self.queue.active_tasks()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Barrier, OnceLock, mpsc};
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::domain::{GroupError, GroupStatus, RollbackKind};
    use crate::testing::{ProbeLog, ProbeTask};

    fn manager() -> TaskManager {
        TaskManager::builder().name("test-manager").build().unwrap()
    }

    fn ok(name: &str, log: &ProbeLog) -> TaskRef {
        Arc::new(ProbeTask::ok(name, Value::Null, log.clone()))
    }

    #[tokio::test]
    async fn check_failure_rolls_back_and_fails_the_callback() {
        let log = ProbeLog::default();
        let manager = manager();
        let (tx, rx) = mpsc::channel();

        let status = manager
            .submit(
                "users",
                vec![
                    Arc::new(ProbeTask::ok("a", json!("x"), log.clone())),
                    Arc::new(ProbeTask::check_fails("b", log.clone())),
                ],
                Callback::new(
                    {
                        let tx = tx.clone();
                        move |_: Value| tx.send(Err("success fired".to_string())).unwrap()
                    },
                    move |err| tx.send(Ok(err)).unwrap(),
                ),
            )
            .unwrap();

        assert_eq!(status.wait().await, GroupStatus::Failed);
        let err = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(matches!(&*err, GroupError::CheckFailed { task, .. } if task == "b"));
        assert_eq!(status.rollback().unwrap().kind(), RollbackKind::CurrentCheckError);
        assert!(status.value().is_none());
        assert_eq!(status.process(), 0.5);
        assert_eq!(
            log.calls(),
            [
                "check:a",
                "run:a",
                "check:b",
                "rollback:b:CurrentCheckError:current",
                "rollback:a:CurrentCheckError:completed",
            ]
        );
    }

    #[tokio::test]
    async fn success_delivers_last_result_to_callback() {
        let log = ProbeLog::default();
        let manager = manager();
        let (tx, rx) = mpsc::channel();

        let status = manager
            .submit(
                "ages",
                vec![
                    Arc::new(ProbeTask::ok("a", json!("x"), log.clone())),
                    Arc::new(ProbeTask::ok("b", json!(18), log.clone())),
                ],
                Callback::on_success(move |age: u32| tx.send(age).unwrap()),
            )
            .unwrap();

        assert_eq!(status.wait().await, GroupStatus::Success);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 18);
        assert_eq!(status.value_as::<u32>(), Some(18));
        assert_eq!(status.process(), 1.0);
        assert!(status.error().is_none());
        assert!(status.started_at() <= status.finished_at());
    }

    #[rstest]
    #[case::success(true, GroupStatus::Success)]
    #[case::failure(false, GroupStatus::Failed)]
    fn callback_fires_once_after_terminal_status(
        #[case] passes: bool,
        #[case] expected: GroupStatus,
    ) {
        let log = ProbeLog::default();
        let manager = manager();
        let (gated, gate) = ProbeTask::gated("blocker", Value::Null, log.clone());
        manager
            .submit("first", vec![Arc::new(gated)], Callback::noop())
            .unwrap();
        gate.wait_started();

        let task: TaskRef = if passes {
            ok("target", &log)
        } else {
            Arc::new(ProbeTask::check_fails("target", log.clone()))
        };
        let slot: Arc<OnceLock<TaskStatus>> = Arc::default();
        let (tx, rx) = mpsc::channel();
        let observe = |slot: &Arc<OnceLock<TaskStatus>>, tx: &mpsc::Sender<_>| {
            let (slot, tx) = (Arc::clone(slot), tx.clone());
            move || tx.send(slot.get().map(TaskStatus::status)).unwrap()
        };
        let on_success = observe(&slot, &tx);
        let on_fail = observe(&slot, &tx);
        drop(tx);

        let status = manager
            .submit(
                "target",
                vec![task],
                Callback::new(move |_: Value| on_success(), move |_| on_fail()),
            )
            .unwrap();
        assert!(slot.set(status).is_ok());
        gate.release();

        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen, Some(expected));
        manager.shutdown_and_join();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[tokio::test]
    async fn groups_run_in_submission_order_without_overlap() {
        let log = ProbeLog::default();
        let manager = manager();

        let mut handles = Vec::new();
        for i in 0..5 {
            let tasks = vec![ok(&format!("g{i}-a"), &log), ok(&format!("g{i}-b"), &log)];
            handles.push(manager.submit(format!("g{i}"), tasks, Callback::noop()).unwrap());
        }
        for handle in &handles {
            assert_eq!(handle.wait().await, GroupStatus::Success);
        }

        let expected: Vec<String> = (0..5)
            .flat_map(|i| {
                ["a", "b"]
                    .into_iter()
                    .flat_map(move |t| [format!("check:g{i}-{t}"), format!("run:g{i}-{t}")])
            })
            .collect();
        assert_eq!(log.calls(), expected);
    }

    #[tokio::test]
    async fn duplicate_task_is_rejected_while_pending() {
        let log = ProbeLog::default();
        let manager = manager();
        let (gated, gate) = ProbeTask::gated("blocker", Value::Null, log.clone());
        let shared = ok("shared", &log);

        let first = manager
            .submit("first", vec![Arc::new(gated), shared.clone()], Callback::noop())
            .unwrap();
        gate.wait_started();

        let err = manager
            .submit("second", vec![ok("fresh", &log), shared.clone()], Callback::noop())
            .unwrap_err();
        assert!(matches!(err, SubmitError::DuplicateTask { task } if task == "shared"));
        assert_eq!(manager.pending_groups(), 0);
        assert_eq!(manager.active_tasks(), 2);

        gate.release();
        assert_eq!(first.wait().await, GroupStatus::Success);

        let again = manager
            .submit("third", vec![shared], Callback::noop())
            .unwrap();
        assert_eq!(again.wait().await, GroupStatus::Success);
    }

    #[tokio::test]
    async fn concurrent_submitters_of_one_task_admit_exactly_one_group() {
        const SUBMITTERS: usize = 8;
        let log = ProbeLog::default();
        let manager = manager();
        let (gated, gate) = ProbeTask::gated("blocker", Value::Null, log.clone());
        let shared = ok("shared", &log);

        let first = manager
            .submit("first", vec![Arc::new(gated)], Callback::noop())
            .unwrap();
        gate.wait_started();
        let barrier = Barrier::new(SUBMITTERS);

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..SUBMITTERS)
                .map(|i| {
                    let shared = shared.clone();
                    let (manager, barrier) = (&manager, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        manager
                            .submit(format!("g{i}"), vec![shared], Callback::noop())
                            .map(|status| status.name().to_string())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let (accepted, rejected): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
        assert_eq!(accepted.len(), 1);
        assert!(rejected.iter().all(|r| matches!(
            r,
            Err(SubmitError::DuplicateTask { task }) if task == "shared"
        )));
        assert_eq!(manager.pending_groups(), 1);
        assert_eq!(manager.active_tasks(), 2);

        gate.release();
        assert_eq!(first.wait().await, GroupStatus::Success);
    }

    #[test]
    fn empty_submission_is_rejected() {
        let manager = manager();
        let err = manager
            .submit("empty", Vec::new(), Callback::noop())
            .unwrap_err();
        assert!(matches!(err, SubmitError::EmptyGroup));
    }

    #[tokio::test]
    async fn cancel_before_start_skips_every_task() {
        let log = ProbeLog::default();
        let manager = manager();
        let (gated, gate) = ProbeTask::gated("blocker", Value::Null, log.clone());
        let (tx, rx) = mpsc::channel();

        let first = manager
            .submit("first", vec![Arc::new(gated)], Callback::noop())
            .unwrap();
        gate.wait_started();

        let second = manager
            .submit(
                "second",
                vec![ok("never", &log)],
                Callback::on_fail(move |err| tx.send(err).unwrap()),
            )
            .unwrap();
        second.cancel();
        gate.release();

        assert_eq!(first.wait().await, GroupStatus::Success);
        assert_eq!(second.wait().await, GroupStatus::Cancelled);
        assert!(second.started_at().is_none());
        assert_eq!(second.rollback().unwrap().kind(), RollbackKind::UserCancel);
        let err = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(&*err, GroupError::Cancelled { .. }));
        assert!(!log.calls().iter().any(|c| c.ends_with(":never")));
    }

    #[tokio::test]
    async fn cancel_mid_execution_stops_at_task_boundary() {
        let log = ProbeLog::default();
        let manager = manager();
        let (gated, gate) = ProbeTask::gated("b", Value::Null, log.clone());

        let status = manager
            .submit(
                "steps",
                vec![ok("a", &log), Arc::new(gated), ok("c", &log)],
                Callback::noop(),
            )
            .unwrap();
        gate.wait_started();
        status.cancel();
        gate.release();

        assert_eq!(status.wait().await, GroupStatus::Cancelled);
        assert_eq!(
            log.calls(),
            [
                "check:a",
                "run:a",
                "check:b",
                "run:b",
                "rollback:b:UserCancel:completed",
                "rollback:a:UserCancel:completed",
            ]
        );
        assert!((status.process() - 2.0 / 3.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn run_failure_does_not_stop_the_worker() {
        let log = ProbeLog::default();
        let manager = manager();

        let failing = manager
            .submit(
                "failing",
                vec![Arc::new(ProbeTask::run_panics("p", log.clone()))],
                Callback::noop(),
            )
            .unwrap();
        let next = manager
            .submit("next", vec![ok("n", &log)], Callback::noop())
            .unwrap();

        assert_eq!(failing.wait().await, GroupStatus::Failed);
        assert_eq!(next.wait().await, GroupStatus::Success);
    }

    #[test]
    fn shutdown_drains_queue_and_rejects_new_work() {
        let log = ProbeLog::default();
        let manager = manager();
        let (tx, rx) = mpsc::channel();

        for i in 0..3 {
            let tx = tx.clone();
            manager
                .submit(
                    format!("g{i}"),
                    vec![ok(&format!("t{i}"), &log)],
                    Callback::on_success(move |_: Value| tx.send(i).unwrap()),
                )
                .unwrap();
        }
        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shutdown());

        let err = manager
            .submit("late", vec![ok("late", &log)], Callback::noop())
            .unwrap_err();
        assert!(matches!(err, SubmitError::Shutdown { .. }));

        manager.shutdown_and_join();
        drop(tx);
        let fired: Vec<i32> = rx.iter().collect();
        assert_eq!(fired.len(), 3);
        assert!(!log.calls().iter().any(|c| c.ends_with(":late")));
    }

    #[test]
    fn slow_callback_does_not_hold_back_the_next_group() {
        let log = ProbeLog::default();
        let manager = manager();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        manager
            .submit(
                "slow-callback",
                vec![ok("a", &log)],
                Callback::on_success(move |_: Value| {
                    let _ = release_rx.recv_timeout(Duration::from_secs(5));
                }),
            )
            .unwrap();
        manager
            .submit(
                "next",
                vec![ok("b", &log)],
                Callback::on_success(move |_: Value| done_tx.send(()).unwrap()),
            )
            .unwrap();

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        release_tx.send(()).unwrap();
        manager.shutdown_and_join();
    }

    #[tokio::test]
    async fn queue_metrics_reflect_waiting_groups() {
        let log = ProbeLog::default();
        let manager = manager();
        let (gated, gate) = ProbeTask::gated("blocker", Value::Null, log.clone());

        let first = manager
            .submit("first", vec![Arc::new(gated)], Callback::noop())
            .unwrap();
        gate.wait_started();
        manager
            .submit("second", vec![ok("a", &log), ok("b", &log)], Callback::noop())
            .unwrap();

        assert_eq!(manager.pending_groups(), 1);
        assert_eq!(manager.size(), 2);
        assert_eq!(manager.process(), 0.0);
        assert_eq!(manager.active_tasks(), 3);

        gate.release();
        first.wait().await;
    }
}
