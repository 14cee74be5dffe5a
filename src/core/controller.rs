//! Build controller - schedules and coalesces list rebuilds.
//!
//! A build pass clears the buffer, runs the user's [`ItemBuilder`] (which
//! calls `add` any number of times), runs interceptors and hands the
//! resulting list to the adapter for diffing.
//!
//! Request coalescing:
//! - a pending delayed build is cancelled and replaced by any new request
//! - a pending next-cycle build absorbs every later request
//! - delay 0 means "next cycle" of the scheduler
//!
//! So `delayed(500)` followed by `delayed(0)` yields exactly one pass on the
//! next cycle, while `delayed(0)` followed by `delayed(500)` also yields one
//! pass on the next cycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use log::{debug, error, trace};

use crate::entities::{DelayedExecutor, Item, ItemListener, TaskId};
use crate::error::{ListError, Result};

use super::adapter::{ListAdapter, ListenerId};
use super::defaults;
use super::diff::{DiffResult, RenderSink};

/// Produces the items of one build pass
pub trait ItemBuilder: Send + 'static {
    fn build_items(&mut self, scope: &BuildScope) -> Result<()>;
}

impl<F> ItemBuilder for F
where
    F: FnMut(&BuildScope) -> Result<()> + Send + 'static,
{
    fn build_items(&mut self, scope: &BuildScope) -> Result<()> {
        self(scope)
    }
}

/// Rewrites the built list before it is submitted
pub type Interceptor = Arc<dyn Fn(&mut Vec<Arc<Item>>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingBuild {
    None,
    NextCycle(TaskId),
    Delayed(TaskId),
}

struct ControllerInner {
    adapter: ListAdapter,
    scheduler: Arc<dyn DelayedExecutor>,
    /// Also serializes build passes
    builder: Mutex<Box<dyn ItemBuilder>>,
    pending: Mutex<PendingBuild>,
    building: AtomicBool,
    has_built_ever: AtomicBool,
    buffer: Mutex<Vec<Arc<Item>>>,
    interceptors: RwLock<Vec<Interceptor>>,
    builds: AtomicU64,
}

impl ControllerInner {
    fn lock_pending(&self) -> MutexGuard<'_, PendingBuild> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Vec<Arc<Item>>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn add_sealed(&self, item: Arc<Item>) -> Result<()> {
        if !self.building.load(Ordering::Acquire) {
            return Err(ListError::NotBuilding);
        }
        if !item.is_sealed() {
            return Err(ListError::NotSealed { id: item.id() });
        }
        self.lock_buffer().push(item);
        Ok(())
    }
}

/// Resets the building flag when a pass ends, including on error or panic
struct BuildingFlag<'a>(&'a AtomicBool);

impl<'a> BuildingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handed to the builder during a pass
pub struct BuildScope {
    inner: Arc<ControllerInner>,
}

impl BuildScope {
    /// Seal `item` and append it to the list being built
    pub fn add(&self, item: Item) -> Result<()> {
        self.inner.add_sealed(item.seal()?)
    }

    /// Append an item sealed earlier
    pub fn add_sealed(&self, item: Arc<Item>) -> Result<()> {
        self.inner.add_sealed(item)
    }

    pub fn add_all<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = Item>,
    {
        items.into_iter().try_for_each(|item| self.add(item))
    }

    /// Items added so far in this pass
    pub fn len(&self) -> usize {
        self.inner.lock_buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn controller(&self) -> BuildController {
        BuildController {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Owner of a list's build passes. Cloning shares the controller.
#[derive(Clone)]
pub struct BuildController {
    inner: Arc<ControllerInner>,
}

impl BuildController {
    pub fn new<B: ItemBuilder>(
        builder: B,
        adapter: ListAdapter,
        scheduler: Arc<dyn DelayedExecutor>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                adapter,
                scheduler,
                builder: Mutex::new(Box::new(builder)),
                pending: Mutex::new(PendingBuild::None),
                building: AtomicBool::new(false),
                has_built_ever: AtomicBool::new(false),
                buffer: Mutex::new(Vec::new()),
                interceptors: RwLock::new(Vec::new()),
                builds: AtomicU64::new(0),
            }),
        }
    }

    /// Closure builder, signature inferred
    pub fn from_fn<F>(builder: F, adapter: ListAdapter, scheduler: Arc<dyn DelayedExecutor>) -> Self
    where
        F: FnMut(&BuildScope) -> Result<()> + Send + 'static,
    {
        Self::new(builder, adapter, scheduler)
    }

    /// Controller on the process-wide default executors
    pub fn with_defaults<F>(builder: F, sink: Arc<dyn RenderSink>) -> std::io::Result<Self>
    where
        F: FnMut(&BuildScope) -> Result<()> + Send + 'static,
    {
        let adapter = ListAdapter::with_defaults(sink)?;
        Ok(Self::new(builder, adapter, defaults::scheduler()?))
    }

    pub fn adapter(&self) -> &ListAdapter {
        &self.inner.adapter
    }

    pub fn is_building(&self) -> bool {
        self.inner.building.load(Ordering::Acquire)
    }

    pub fn has_built_ever(&self) -> bool {
        self.inner.has_built_ever.load(Ordering::Acquire)
    }

    /// Completed build passes
    pub fn build_count(&self) -> u64 {
        self.inner.builds.load(Ordering::Relaxed)
    }

    pub fn has_pending_build(&self) -> bool {
        *self.inner.lock_pending() != PendingBuild::None
    }

    // ========== Requests ==========

    /// Build now if nothing was ever built, otherwise on the next cycle
    pub fn request_build(&self) -> Result<()> {
        if self.has_built_ever() {
            self.request_delayed_build(Duration::ZERO)
        } else {
            self.request_immediate_build()
        }
    }

    /// Run a build pass on the calling thread
    pub fn request_immediate_build(&self) -> Result<()> {
        if self.is_building() {
            return Err(ListError::BuildInProgress);
        }
        self.run_build()
    }

    /// Schedule a build pass after `delay`, replacing a pending delayed one
    pub fn request_delayed_build(&self, delay: Duration) -> Result<()> {
        if self.is_building() {
            return Err(ListError::BuildInProgress);
        }

        let mut pending = self.inner.lock_pending();
        match *pending {
            PendingBuild::Delayed(task) => {
                self.inner.scheduler.cancel(task);
            }
            PendingBuild::NextCycle(_) => {
                trace!("BuildController: next-cycle build already pending");
                return Ok(());
            }
            PendingBuild::None => {}
        }

        let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
        let task = self.inner.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    BuildController { inner }.run_scheduled();
                }
            }),
        );
        *pending = if delay.is_zero() {
            PendingBuild::NextCycle(task)
        } else {
            PendingBuild::Delayed(task)
        };
        trace!("BuildController: scheduled build {:?} in {}ms", task, delay.as_millis());
        Ok(())
    }

    pub fn request_delayed_build_ms(&self, delay_ms: u64) -> Result<()> {
        self.request_delayed_build(Duration::from_millis(delay_ms))
    }

    /// Drop the scheduled build, if any. Idempotent.
    pub fn cancel_pending_build(&self) {
        let mut pending = self.inner.lock_pending();
        if let PendingBuild::NextCycle(task) | PendingBuild::Delayed(task) = *pending {
            self.inner.scheduler.cancel(task);
            trace!("BuildController: cancelled pending build {:?}", task);
        }
        *pending = PendingBuild::None;
    }

    // ========== Build pass ==========

    /// Seal `item` and add it to the current pass. Fails outside of a pass.
    pub fn add(&self, item: Item) -> Result<()> {
        if !self.is_building() {
            return Err(ListError::NotBuilding);
        }
        self.inner.add_sealed(item.seal()?)
    }

    pub fn add_all<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = Item>,
    {
        items.into_iter().try_for_each(|item| self.add(item))
    }

    fn run_scheduled(&self) {
        if let Err(e) = self.run_build() {
            error!("Scheduled build failed: {}", e);
        }
    }

    fn run_build(&self) -> Result<()> {
        self.cancel_pending_build();

        let mut builder = self.inner.builder.lock().unwrap_or_else(|e| e.into_inner());
        let built = {
            let _flag = BuildingFlag::raise(&self.inner.building);
            self.inner.lock_buffer().clear();
            let scope = BuildScope {
                inner: Arc::clone(&self.inner),
            };
            // a panicking builder fails this pass instead of the scheduler thread
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| builder.build_items(&scope)))
                .unwrap_or_else(|payload| Err(ListError::Builder(panic_message(payload.as_ref()))))
        };
        let mut items = std::mem::take(&mut *self.inner.lock_buffer());
        drop(builder);
        built?;

        let interceptors =
            self.inner.interceptors.read().unwrap_or_else(|e| e.into_inner()).clone();
        for intercept in interceptors {
            intercept(&mut items);
        }

        let count = items.len();
        self.inner.adapter.set_items(items)?;
        self.inner.has_built_ever.store(true, Ordering::Release);
        let pass = self.inner.builds.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("BuildController: pass {} built {} items", pass, count);
        Ok(())
    }

    // ========== Listeners ==========

    /// Rewrite every built list before it is diffed (filter, reorder, ...)
    pub fn on_intercept<F>(&self, intercept: F)
    where
        F: Fn(&mut Vec<Arc<Item>>) + Send + Sync + 'static,
    {
        self.inner
            .interceptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(intercept));
    }

    /// Observe every result dispatched to the render sink
    pub fn on_build_result<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DiffResult) + Send + Sync + 'static,
    {
        self.inner.adapter.add_result_listener(listener)
    }

    pub fn add_item_listener(&self, listener: Arc<dyn ItemListener>) -> ListenerId {
        self.inner.adapter.add_item_listener(listener)
    }

    pub fn remove_item_listener(&self, id: ListenerId) -> bool {
        self.inner.adapter.remove_item_listener(id)
    }
}

/// Controller whose builder renders a data value.
///
/// No pass runs until data is set; `set_data` stores it and requests a build.
pub struct TypedController<T> {
    controller: BuildController,
    data: Arc<Mutex<Option<T>>>,
}

impl<T: Send + 'static> TypedController<T> {
    pub fn new<F>(mut build: F, adapter: ListAdapter, scheduler: Arc<dyn DelayedExecutor>) -> Self
    where
        F: FnMut(&T, &BuildScope) -> Result<()> + Send + 'static,
    {
        let data: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let source = Arc::clone(&data);
        let controller = BuildController::from_fn(
            move |scope| {
                let data = source.lock().unwrap_or_else(|e| e.into_inner());
                match data.as_ref() {
                    Some(value) => build(value, scope),
                    None => Ok(()),
                }
            },
            adapter,
            scheduler,
        );
        Self { controller, data }
    }

    pub fn set_data(&self, data: T) -> Result<()> {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = Some(data);
        self.controller.request_build()
    }

    pub fn has_data(&self) -> bool {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Rebuild from the current data; no-op without data
    pub fn request_build(&self) -> Result<()> {
        if !self.has_data() {
            return Ok(());
        }
        self.controller.request_build()
    }

    pub fn controller(&self) -> &BuildController {
        &self.controller
    }
}

impl<T: Clone + Send + 'static> TypedController<T> {
    pub fn current_data(&self) -> Option<T> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panicked".to_string()
    }
}
