//! Test fixtures: a task that records every call it receives.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::app::callback::Callback;
use crate::app::group::TaskGroup;
use crate::domain::{RollbackInfo, TaskError};
use crate::sync::lock;
use crate::typed::{Context, Task, TaskRef};

/// Shared, ordered record of task calls across groups.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProbeLog(Arc<Mutex<Vec<String>>>);

impl ProbeLog {
    pub(crate) fn push(&self, entry: String) {
        lock(&self.0).push(entry);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        lock(&self.0).clone()
    }
}

enum RunMode {
    Ok(Value),
    Fail,
    Panic,
}

enum RollbackMode {
    Ok,
    Fail,
    Panic,
}

/// Blocks a probe's run until released, and reports when it started.
pub(crate) struct Gate {
    started: Receiver<()>,
    release: Sender<()>,
}

impl Gate {
    pub(crate) fn wait_started(&self) {
        self.started
            .recv_timeout(Duration::from_secs(5))
            .expect("gated task never started");
    }

    pub(crate) fn release(&self) {
        let _ = self.release.send(());
    }
}

pub(crate) struct ProbeTask {
    name: String,
    check: bool,
    run: RunMode,
    rollback: RollbackMode,
    gate: Option<(Sender<()>, Mutex<Receiver<()>>)>,
    log: ProbeLog,
}

impl ProbeTask {
    fn new(name: &str, check: bool, run: RunMode, log: ProbeLog) -> Self {
        Self {
            name: name.to_string(),
            check,
            run,
            rollback: RollbackMode::Ok,
            gate: None,
            log,
        }
    }

    pub(crate) fn ok(name: &str, output: Value, log: ProbeLog) -> Self {
        Self::new(name, true, RunMode::Ok(output), log)
    }

    pub(crate) fn check_fails(name: &str, log: ProbeLog) -> Self {
        Self::new(name, false, RunMode::Ok(Value::Null), log)
    }

    pub(crate) fn run_fails(name: &str, log: ProbeLog) -> Self {
        Self::new(name, true, RunMode::Fail, log)
    }

    pub(crate) fn run_panics(name: &str, log: ProbeLog) -> Self {
        Self::new(name, true, RunMode::Panic, log)
    }

    /// Run waits for `Gate::release` before returning.
    pub(crate) fn gated(name: &str, output: Value, log: ProbeLog) -> (Self, Gate) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut task = Self::ok(name, output, log);
        task.gate = Some((started_tx, Mutex::new(release_rx)));
        (
            task,
            Gate {
                started: started_rx,
                release: release_tx,
            },
        )
    }

    pub(crate) fn rollback_fails(mut self) -> Self {
        self.rollback = RollbackMode::Fail;
        self
    }

    pub(crate) fn rollback_panics(mut self) -> Self {
        self.rollback = RollbackMode::Panic;
        self
    }
}

impl Task for ProbeTask {
    type Output = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, _ctx: &Context) -> bool {
        self.log.push(format!("check:{}", self.name));
        self.check
    }

    fn run(&self, ctx: &mut Context) -> Result<Value, TaskError> {
        self.log.push(format!("run:{}", self.name));
        if let Some((started, release)) = &self.gate {
            let _ = started.send(());
            let _ = lock(release).recv_timeout(Duration::from_secs(5));
        }
        match &self.run {
            RunMode::Ok(value) => {
                ctx.set(format!("ran.{}", self.name), true)?;
                Ok(value.clone())
            }
            RunMode::Fail => Err(TaskError::failed(format!("{} failed", self.name))),
            RunMode::Panic => panic!("{} exploded", self.name),
        }
    }

    fn rollback(&self, info: &RollbackInfo) -> Result<(), TaskError> {
        let role = if info.is_current() { "current" } else { "completed" };
        self.log
            .push(format!("rollback:{}:{:?}:{}", self.name, info.kind(), role));
        match self.rollback {
            RollbackMode::Ok => Ok(()),
            RollbackMode::Fail => Err(TaskError::failed("rollback refused")),
            RollbackMode::Panic => panic!("rollback of {} exploded", self.name),
        }
    }
}

pub(crate) fn group_of(name: &str, tasks: Vec<TaskRef>) -> TaskGroup {
    TaskGroup::new(name.to_string(), tasks, Callback::noop().erase(name.to_string()))
}
