//! Manager configuration.

use serde::{Deserialize, Serialize};

/// Settings for one `TaskManager`.
///
/// Every field has a default, so a partial JSON/TOML document is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Used for the worker thread name and in log fields.
    pub name: String,

    /// Threads available to run submitters' callbacks.
    pub callback_workers: usize,
}

impl ManagerConfig {
    pub const DEFAULT_NAME: &'static str = "task-manager";
    pub const DEFAULT_CALLBACK_WORKERS: usize = 2;
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            callback_workers: Self::DEFAULT_CALLBACK_WORKERS,
        }
    }
}
