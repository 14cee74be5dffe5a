//! Abstract traits for dependency inversion.
//!
//! These traits define the interfaces items and list components need from
//! infrastructure (threads, timers, views), so `core` can take them as
//! constructor parameters instead of reaching for global singletons.
//!
//! Implementations live in `core/` (`Workers`, `Scheduler`, `TickScheduler`,
//! `CommitQueue`, `Immediate`).

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use super::item::Item;

/// Unit of work handed to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle of a scheduled job, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Runs a job, possibly on another thread.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs a job after a delay, with cancel-by-handle.
pub trait DelayedExecutor: Send + Sync {
    /// Schedule `job` to run once `delay` has elapsed.
    fn schedule(&self, delay: Duration, job: Job) -> TaskId;

    /// Drop a job that has not started yet. Returns false if it already ran
    /// (or is running) or was never scheduled.
    fn cancel(&self, task: TaskId) -> bool;
}

/// Blanket impl: Arc<T> implements traits if T does
impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

impl<T: DelayedExecutor + ?Sized> DelayedExecutor for Arc<T> {
    fn schedule(&self, delay: Duration, job: Job) -> TaskId {
        (**self).schedule(delay, job)
    }

    fn cancel(&self, task: TaskId) -> bool {
        (**self).cancel(task)
    }
}

/// Opaque per-view state created by an [`ItemView`]
pub type Holder = Box<dyn Any + Send>;

/// Rendering capability of an item.
///
/// The adapter drives the lifecycle itself: listener pre-hook, view hook,
/// listener post-hook. Implementations never need to call a base method.
pub trait ItemView: Send + Sync + 'static {
    /// Layout identifier, also the default view type
    fn layout(&self) -> i32 {
        0
    }

    fn create_holder(&self) -> Holder {
        Box::new(())
    }

    fn bind(&self, _item: &Item, _holder: &mut Holder) {}

    fn unbind(&self, _item: &Item, _holder: &mut Holder) {}
}

/// View with a fixed layout id and no binding logic
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainView {
    pub layout: i32,
}

impl ItemView for PlainView {
    fn layout(&self) -> i32 {
        self.layout
    }
}

/// Observer of item lifecycle events on an adapter. All hooks default to no-op.
pub trait ItemListener: Send + Sync {
    fn on_create_holder(&self, _item: &Item, _holder: &mut Holder) {}
    fn pre_bind(&self, _item: &Item, _holder: &mut Holder) {}
    fn post_bind(&self, _item: &Item, _holder: &mut Holder) {}
    fn pre_unbind(&self, _item: &Item, _holder: &mut Holder) {}
    fn post_unbind(&self, _item: &Item, _holder: &mut Holder) {}
}
