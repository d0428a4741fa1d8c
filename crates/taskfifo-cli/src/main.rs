use std::sync::Arc;

use serde::{Deserialize, Serialize};
use taskfifo_core::{
    Callback, Context, GroupStatus, RollbackInfo, Task, TaskError, TaskManager, TaskRef,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    name: String,
    age: u32,
}

/// Stores the user name in the group context.
struct PutUserTask {
    name: String,
}

impl Task for PutUserTask {
    type Output = String;

    fn name(&self) -> &str {
        "user.task"
    }

    fn run(&self, ctx: &mut Context) -> Result<String, TaskError> {
        info!(name = %self.name, "put user");
        ctx.set("user.name", &self.name)?;
        Ok(self.name.clone())
    }
}

/// Name must be longer than three characters. Stores the age on success.
struct CheckUserTask {
    age: u32,
}

impl Task for CheckUserTask {
    type Output = ();

    fn name(&self) -> &str {
        "user.task.check"
    }

    fn check(&self, ctx: &Context) -> bool {
        let last: Option<String> = ctx.last_result().ok().flatten();
        info!(last = ?last, "previous task returned");
        ctx.get::<String>("user.name")
            .map(|name| name.len() > 3)
            .unwrap_or(false)
    }

    fn run(&self, ctx: &mut Context) -> Result<(), TaskError> {
        info!("name accepted");
        ctx.set("user.age", self.age)?;
        Ok(())
    }

    fn rollback(&self, info: &RollbackInfo) -> Result<(), TaskError> {
        if info.is_current_error() {
            error!("name rejected");
        } else {
            info!(kind = ?info.kind(), "rolled back");
        }
        Ok(())
    }
}

/// Age must be at least eighteen.
struct CheckAgeTask;

impl Task for CheckAgeTask {
    type Output = User;

    fn name(&self) -> &str {
        "user.task.check.age"
    }

    fn check(&self, ctx: &Context) -> bool {
        ctx.get::<u32>("user.age").map(|age| age >= 18).unwrap_or(false)
    }

    fn run(&self, ctx: &mut Context) -> Result<User, TaskError> {
        info!("age accepted");
        Ok(User {
            name: ctx.get("user.name")?,
            age: ctx.get("user.age")?,
        })
    }

    fn rollback(&self, info: &RollbackInfo) -> Result<(), TaskError> {
        if info.is_current_error() {
            error!("age rejected");
        } else {
            info!(kind = ?info.kind(), "rolled back");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let user = args.next().unwrap_or_else(|| "dragon".to_string());
    let age = args.next().and_then(|a| a.parse().ok()).unwrap_or(16);

    // (A) manager を用意（worker スレッドが1本起動する）
    let manager = match TaskManager::new("hello-task-manager") {
        Ok(manager) => manager,
        Err(err) => {
            error!(error = %err, "cannot start task manager");
            std::process::exit(1);
        }
    };

    // (B) タスクグループを投入
    let tasks: Vec<TaskRef> = vec![
        Arc::new(PutUserTask { name: user }),
        Arc::new(CheckUserTask { age }),
        Arc::new(CheckAgeTask),
    ];
    let callback = Callback::new(
        |user: User| println!("group succeeded: {} ({})", user.name, user.age),
        |err| println!("group failed: {err}"),
    );
    let status = match manager.submit("hello-tasks", tasks, callback) {
        Ok(status) => status,
        Err(err) => {
            error!(error = %err, "submit rejected");
            std::process::exit(1);
        }
    };
    println!(
        "submitted: {} ({}, {} tasks)",
        status.name(),
        status.id(),
        status.task_count()
    );

    // (C) 終端状態まで待つ
    let final_status = status.wait().await;
    println!(
        "final status: {:?} process={:.2} error={:?}",
        final_status,
        status.process(),
        status.error().map(|e| e.to_string())
    );

    // (D) キューを空にしてから止める（コールバックの完了も待つ）
    tokio::task::spawn_blocking(move || manager.shutdown_and_join())
        .await
        .ok();

    if final_status != GroupStatus::Success {
        std::process::exit(2);
    }
}
