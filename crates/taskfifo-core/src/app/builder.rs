//! ManagerBuilder - TaskManager の構築
//!
//! # Fail-fast 設計
//! - build() 時に設定を検証（名前が空 / callback worker が 0）
//! - worker スレッドや callback pool の起動失敗も BuildError として返す

use std::io;

use super::callback::CallbackDispatcher;
use super::config::ManagerConfig;
use super::manager::TaskManager;

/// Builds a [`TaskManager`].
///
/// # 使用例
/// ```ignore
/// let manager = TaskManager::builder()
///     .name("users")
///     .callback_workers(4)
///     .build()?;
/// ```
pub struct ManagerBuilder {
    config: ManagerConfig,
    dispatcher: Option<CallbackDispatcher>,
}

/// BuildError は TaskManager 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("task manager name must not be empty")]
    EmptyName,

    #[error("at least one callback worker is required")]
    NoCallbackWorkers,

    #[error("failed to start task manager: {0}")]
    Spawn(#[from] io::Error),
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            dispatcher: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn callback_workers(mut self, workers: usize) -> Self {
        self.config.callback_workers = workers;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing callback pool instead of creating one from the config.
    pub fn dispatcher(mut self, dispatcher: CallbackDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> Result<TaskManager, BuildError> {
        if self.config.name.trim().is_empty() {
            return Err(BuildError::EmptyName);
        }
        if self.config.callback_workers == 0 && self.dispatcher.is_none() {
            return Err(BuildError::NoCallbackWorkers);
        }

        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => CallbackDispatcher::new(&self.config.name, self.config.callback_workers)?,
        };
        TaskManager::start(self.config.name, dispatcher)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
