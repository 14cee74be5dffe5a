//! Runtime configuration for the default execution contexts.
//!
//! Priority: environment (`ITEMLIST_*`) → JSON file → built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_DIFF_THREADS: &str = "ITEMLIST_DIFF_THREADS";
pub const ENV_IDLE_SLEEP_MS: &str = "ITEMLIST_IDLE_SLEEP_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Diff worker threads, 0 = auto
    pub diff_threads: usize,
    /// Thread name prefix of diff workers
    pub worker_name: String,
    /// Thread name of the build scheduler
    pub scheduler_name: String,
    /// Idle back-off of diff workers
    pub idle_sleep_ms: u64,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            diff_threads: 0,
            worker_name: "itemlist-diff".to_string(),
            scheduler_name: "itemlist-bg".to_string(),
            idle_sleep_ms: 1,
        }
    }
}

impl ListConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Read config {} error: {}", path.display(), e))?;
        serde_json::from_str(&json)
            .map_err(|e| format!("Parse config {} error: {}", path.display(), e))
    }

    /// Override fields from `ITEMLIST_*` environment variables
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with a custom lookup.
    /// Unparsable values are ignored with a warning.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DIFF_THREADS) {
            match raw.trim().parse() {
                Ok(n) => self.diff_threads = n,
                Err(_) => log::warn!("Ignoring {}={:?}: not a number", ENV_DIFF_THREADS, raw),
            }
        }
        if let Some(raw) = lookup(ENV_IDLE_SLEEP_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.idle_sleep_ms = ms,
                Err(_) => log::warn!("Ignoring {}={:?}: not a number", ENV_IDLE_SLEEP_MS, raw),
            }
        }
        self
    }

    /// Thread count with `0` resolved to three quarters of the CPUs
    pub fn resolved_diff_threads(&self) -> usize {
        if self.diff_threads > 0 {
            self.diff_threads
        } else {
            (num_cpus::get() * 3 / 4).max(1)
        }
    }
}
