//! Process-wide default execution contexts.
//!
//! Components take their executors as constructor arguments; these are the
//! values used when a caller does not care. Installed once, either
//! explicitly through [`init`] at startup or lazily from the environment on
//! first use.

use std::sync::Arc;

use log::debug;
use once_cell::sync::OnceCell;

use crate::config::ListConfig;
use crate::entities::{DelayedExecutor, Executor};

use super::commit::Immediate;
use super::scheduler::Scheduler;
use super::workers::Workers;

/// Default executors shared by every list that does not inject its own
pub struct Defaults {
    /// Full diffs
    pub diff_executor: Arc<dyn Executor>,
    /// Delayed and next-cycle build passes
    pub scheduler: Arc<dyn DelayedExecutor>,
    /// Latching and dispatch of diff results
    pub commit_executor: Arc<dyn Executor>,
}

impl Defaults {
    pub fn from_config(config: &ListConfig) -> std::io::Result<Self> {
        Ok(Self {
            diff_executor: Arc::new(Workers::from_config(config)?),
            scheduler: Arc::new(Scheduler::new(&config.scheduler_name)?),
            commit_executor: Arc::new(Immediate),
        })
    }
}

static DEFAULTS: OnceCell<Defaults> = OnceCell::new();

/// Install defaults from `config`.
///
/// Returns `Ok(false)` if defaults were already installed; they are never
/// replaced.
pub fn init(config: &ListConfig) -> std::io::Result<bool> {
    if DEFAULTS.get().is_some() {
        return Ok(false);
    }
    let defaults = Defaults::from_config(config)?;
    // a concurrent init may have won, ours is dropped then
    let installed = DEFAULTS.set(defaults).is_ok();
    if installed {
        debug!("Default executors installed: {:?}", config);
    }
    Ok(installed)
}

/// Installed defaults, created from the environment on first use
pub fn get() -> std::io::Result<&'static Defaults> {
    DEFAULTS.get_or_try_init(|| Defaults::from_config(&ListConfig::default().apply_env()))
}

pub fn diff_executor() -> std::io::Result<Arc<dyn Executor>> {
    Ok(Arc::clone(&get()?.diff_executor))
}

pub fn scheduler() -> std::io::Result<Arc<dyn DelayedExecutor>> {
    Ok(Arc::clone(&get()?.scheduler))
}

pub fn commit_executor() -> std::io::Result<Arc<dyn Executor>> {
    Ok(Arc::clone(&get()?.commit_executor))
}
