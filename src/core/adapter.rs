//! List adapter - glue between the differ, the render sink and item views.
//!
//! Responsibilities:
//! - validate submitted items (sealed, unique ids) and hand them to the differ
//! - forward committed results to the render sink and result listeners
//! - direct mutations (`add_item`, `move_item`, ...) that skip diffing and
//!   dispatch exactly one operation
//! - drive the item lifecycle: listener pre-hook, view hook, listener post-hook

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::entities::{Executor, Holder, Item, ItemListener};
use crate::error::{ListError, Result};

use super::defaults;
use super::diff::{DiffResult, EditOp, RenderSink, Snapshot, check_duplicates};
use super::differ::AsyncDiffer;

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback receiving every dispatched result
pub type ResultListener = Arc<dyn Fn(&DiffResult) + Send + Sync>;

/// Fans a committed result out to the sink, then to result listeners
struct Dispatcher {
    sink: Arc<dyn RenderSink>,
    listeners: RwLock<Vec<(ListenerId, ResultListener)>>,
}

impl RenderSink for Dispatcher {
    fn on_result(&self, result: &DiffResult) {
        self.sink.on_result(result);
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner()).clone();
        for (_, listener) in listeners {
            listener(result);
        }
    }
}

struct AdapterInner {
    differ: AsyncDiffer,
    dispatcher: Arc<Dispatcher>,
    item_listeners: RwLock<Vec<(ListenerId, Arc<dyn ItemListener>)>>,
    next_listener: AtomicU64,
    /// Last item found for a view type
    last_lookup: Mutex<Option<Arc<Item>>>,
}

/// Adapter over one live list. Cloning shares the list.
#[derive(Clone)]
pub struct ListAdapter {
    inner: Arc<AdapterInner>,
}

impl ListAdapter {
    pub fn new(
        sink: Arc<dyn RenderSink>,
        diff_executor: Arc<dyn Executor>,
        commit_executor: Arc<dyn Executor>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            sink,
            listeners: RwLock::new(Vec::new()),
        });
        let differ = AsyncDiffer::new(diff_executor, commit_executor, dispatcher.clone());
        Self {
            inner: Arc::new(AdapterInner {
                differ,
                dispatcher,
                item_listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                last_lookup: Mutex::new(None),
            }),
        }
    }

    /// Adapter on the process-wide default executors
    pub fn with_defaults(sink: Arc<dyn RenderSink>) -> std::io::Result<Self> {
        Ok(Self::new(sink, defaults::diff_executor()?, defaults::commit_executor()?))
    }

    pub fn differ(&self) -> &AsyncDiffer {
        &self.inner.differ
    }

    // ========== Submission ==========

    /// Diff `items` against the live list and dispatch the result
    pub fn set_items(&self, items: Vec<Arc<Item>>) -> Result<()> {
        check_sealed(&items)?;
        self.inner.differ.submit_list(items.into())
    }

    /// Replace the live list without diffing or dispatching anything
    pub fn override_items(&self, items: Vec<Arc<Item>>) -> Result<()> {
        check_sealed(&items)?;
        check_duplicates(&items)?;
        self.inner.differ.force_list_override(items.into());
        Ok(())
    }

    pub fn cancel_diff(&self) -> bool {
        self.inner.differ.cancel_diff()
    }

    pub fn is_diff_in_progress(&self) -> bool {
        self.inner.differ.is_diff_in_progress()
    }

    // ========== Live list ==========

    pub fn current_items(&self) -> Snapshot {
        self.inner.differ.current_list()
    }

    pub fn len(&self) -> usize {
        self.current_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_items().is_empty()
    }

    pub fn item_at(&self, index: usize) -> Result<Arc<Item>> {
        let items = self.current_items();
        items
            .get(index)
            .cloned()
            .ok_or(ListError::IndexOutOfBounds { index, len: items.len() })
    }

    /// Stable id of the item at `index`
    pub fn item_id(&self, index: usize) -> Result<i64> {
        self.item_at(index).map(|item| item.id())
    }

    /// View type at `index`; also primes the holder lookup cache
    pub fn view_type_at(&self, index: usize) -> Result<i32> {
        let item = self.item_at(index)?;
        let view_type = item.view_type();
        *self.inner.last_lookup.lock().unwrap_or_else(|e| e.into_inner()) = Some(item);
        Ok(view_type)
    }

    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.current_items().iter().position(|item| item.id() == id)
    }

    // ========== Direct mutations ==========

    /// Append one item
    pub fn add_item(&self, item: Arc<Item>) -> Result<()> {
        self.add_items(vec![item])
    }

    pub fn add_items(&self, items: Vec<Arc<Item>>) -> Result<()> {
        self.splice_items(None, items)
    }

    pub fn insert_item(&self, index: usize, item: Arc<Item>) -> Result<()> {
        self.insert_items(index, vec![item])
    }

    pub fn insert_items(&self, index: usize, items: Vec<Arc<Item>>) -> Result<()> {
        self.splice_items(Some(index), items)
    }

    /// Insert at `index`, or append when `None`
    fn splice_items(&self, index: Option<usize>, items: Vec<Arc<Item>>) -> Result<()> {
        check_sealed(&items)?;
        self.inner.differ.apply_edit(|live| {
            let index = index.unwrap_or(live.len());
            if index > live.len() {
                return Err(ListError::IndexOutOfBounds { index, len: live.len() });
            }
            if items.is_empty() {
                return Ok(None);
            }
            let count = items.len();
            let mut next = live.to_vec();
            next.splice(index..index, items);
            check_duplicates(&next)?;
            Ok(Some((next, EditOp::Insert { position: index, count })))
        })?;
        Ok(())
    }

    /// Remove the item with `id`. Returns false if it is not in the list.
    pub fn remove_item(&self, id: i64) -> bool {
        let applied = self.inner.differ.apply_edit(|live| {
            let Some(index) = live.iter().position(|item| item.id() == id) else {
                return Ok(None);
            };
            let mut next = live.to_vec();
            next.remove(index);
            Ok(Some((next, EditOp::Remove { position: index, count: 1 })))
        });
        matches!(applied, Ok(true))
    }

    pub fn remove_item_at(&self, index: usize) -> Result<Arc<Item>> {
        let mut removed = None;
        self.inner.differ.apply_edit(|live| {
            if index >= live.len() {
                return Err(ListError::IndexOutOfBounds { index, len: live.len() });
            }
            let mut next = live.to_vec();
            removed = Some(next.remove(index));
            Ok(Some((next, EditOp::Remove { position: index, count: 1 })))
        })?;
        removed.ok_or(ListError::IndexOutOfBounds { index, len: 0 })
    }

    /// Move the item at `from` so it ends up at `to`
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.inner.differ.apply_edit(|live| {
            let len = live.len();
            for index in [from, to] {
                if index >= len {
                    return Err(ListError::IndexOutOfBounds { index, len });
                }
            }
            if from == to {
                return Ok(None);
            }
            let mut next = live.to_vec();
            let item = next.remove(from);
            next.insert(to, item);
            Ok(Some((next, EditOp::Move { from, to })))
        })?;
        Ok(())
    }

    /// Remove everything. Returns false if the list was already empty.
    pub fn clear_items(&self) -> bool {
        let cleared = self.inner.differ.apply_edit(|live| {
            if live.is_empty() {
                return Ok(None);
            }
            Ok(Some((Vec::new(), EditOp::Remove { position: 0, count: live.len() })))
        });
        matches!(cleared, Ok(true))
    }

    // ========== Listeners ==========

    fn next_id(&self) -> ListenerId {
        ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_item_listener(&self, listener: Arc<dyn ItemListener>) -> ListenerId {
        let id = self.next_id();
        self.inner
            .item_listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    pub fn remove_item_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.item_listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Called with every dispatched result, after the render sink
    pub fn add_result_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DiffResult) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.inner
            .dispatcher
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    pub fn remove_result_listener(&self, id: ListenerId) -> bool {
        let mut listeners =
            self.inner.dispatcher.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn item_listeners(&self) -> Vec<Arc<dyn ItemListener>> {
        self.inner
            .item_listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    // ========== Item lifecycle ==========

    /// Create a holder for `view_type` using the view of a live item of
    /// that type. None if no live item has it.
    pub fn create_holder(&self, view_type: i32) -> Option<Holder> {
        let item = {
            let mut cache = self.inner.last_lookup.lock().unwrap_or_else(|e| e.into_inner());
            match cache.as_ref() {
                Some(item) if item.view_type() == view_type => Arc::clone(item),
                _ => {
                    let found = self
                        .current_items()
                        .iter()
                        .find(|item| item.view_type() == view_type)
                        .cloned()?;
                    *cache = Some(Arc::clone(&found));
                    found
                }
            }
        };
        let mut holder = item.view().create_holder();
        for listener in self.item_listeners() {
            listener.on_create_holder(&item, &mut holder);
        }
        Some(holder)
    }

    /// Bind the item at `position` into `holder`. Returns the bound item,
    /// which the host passes back to [`unbind`](Self::unbind).
    pub fn bind(&self, position: usize, holder: &mut Holder) -> Result<Arc<Item>> {
        let item = self.item_at(position)?;
        let listeners = self.item_listeners();
        for listener in &listeners {
            listener.pre_bind(&item, holder);
        }
        item.view().bind(&item, holder);
        for listener in &listeners {
            listener.post_bind(&item, holder);
        }
        Ok(item)
    }

    pub fn unbind(&self, item: &Item, holder: &mut Holder) {
        let listeners = self.item_listeners();
        for listener in &listeners {
            listener.pre_unbind(item, holder);
        }
        item.view().unbind(item, holder);
        for listener in &listeners {
            listener.post_unbind(item, holder);
        }
    }
}

fn check_sealed(items: &[Arc<Item>]) -> Result<()> {
    match items.iter().find(|item| !item.is_sealed()) {
        Some(item) => Err(ListError::NotSealed { id: item.id() }),
        None => Ok(()),
    }
}
