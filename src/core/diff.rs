//! List diffing - edit operations between two snapshots of sealed items.
//!
//! Items are matched by id ("same item") and compared by full equality
//! ("same content"). Shared ids keep the longest run that is already in
//! order (a longest increasing subsequence of old positions, found by
//! patience sorting); every other shared item becomes a move.
//!
//! Operations are emitted so that replaying them in order against the old
//! list yields the new list:
//! 1. removals, back to front
//! 2. moves, in new-list order
//! 3. insertions, front to back (positions are final positions)
//! 4. changes, with the old item as payload

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::entities::Item;
use crate::error::{ListError, Result};

/// Immutable ordered list of sealed items
pub type Snapshot = Arc<[Arc<Item>]>;

pub fn empty_snapshot() -> Snapshot {
    Vec::new().into()
}

/// One primitive edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Insert { position: usize, count: usize },
    Remove { position: usize, count: usize },
    Move { from: usize, to: usize },
    /// Same id, different content. `payload` is the old item.
    Change {
        position: usize,
        count: usize,
        payload: Option<Arc<Item>>,
    },
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::Insert { position, count } => write!(f, "insert {} at {}", count, position),
            EditOp::Remove { position, count } => write!(f, "remove {} at {}", count, position),
            EditOp::Move { from, to } => write!(f, "move {} -> {}", from, to),
            EditOp::Change { position, count, .. } => write!(f, "change {} at {}", count, position),
        }
    }
}

/// Receiver of edit operations, notified in replay order.
pub trait ListUpdateCallback {
    fn on_inserted(&mut self, position: usize, count: usize);
    fn on_removed(&mut self, position: usize, count: usize);
    fn on_moved(&mut self, from: usize, to: usize);
    fn on_changed(&mut self, position: usize, count: usize, payload: Option<&Arc<Item>>);
}

/// Records operations as values
impl ListUpdateCallback for Vec<EditOp> {
    fn on_inserted(&mut self, position: usize, count: usize) {
        self.push(EditOp::Insert { position, count });
    }

    fn on_removed(&mut self, position: usize, count: usize) {
        self.push(EditOp::Remove { position, count });
    }

    fn on_moved(&mut self, from: usize, to: usize) {
        self.push(EditOp::Move { from, to });
    }

    fn on_changed(&mut self, position: usize, count: usize, payload: Option<&Arc<Item>>) {
        self.push(EditOp::Change {
            position,
            count,
            payload: payload.cloned(),
        });
    }
}

/// Consumer of committed diff results (the on-screen list).
///
/// Must apply operations in the order they are dispatched.
pub trait RenderSink: Send + Sync {
    fn on_result(&self, result: &DiffResult);
}

impl<F> RenderSink for F
where
    F: Fn(&DiffResult) + Send + Sync,
{
    fn on_result(&self, result: &DiffResult) {
        self(result)
    }
}

/// Edit sequence between two snapshots
#[derive(Debug, Clone)]
pub struct DiffResult {
    previous: Snapshot,
    next: Snapshot,
    ops: Vec<EditOp>,
}

impl DiffResult {
    /// Lists are content-equal, nothing to dispatch
    pub fn noop(previous: Snapshot, next: Snapshot) -> Self {
        Self::from_ops(previous, next, Vec::new())
    }

    /// Previous list was empty
    pub fn inserted(next: Snapshot) -> Self {
        let ops = if next.is_empty() {
            Vec::new()
        } else {
            vec![EditOp::Insert { position: 0, count: next.len() }]
        };
        Self::from_ops(empty_snapshot(), next, ops)
    }

    /// New list is empty
    pub fn cleared(previous: Snapshot) -> Self {
        let ops = if previous.is_empty() {
            Vec::new()
        } else {
            vec![EditOp::Remove { position: 0, count: previous.len() }]
        };
        Self::from_ops(previous, empty_snapshot(), ops)
    }

    /// Full comparison
    pub fn diff(previous: Snapshot, next: Snapshot) -> Self {
        let ops = diff_items(&previous, &next);
        Self::from_ops(previous, next, ops)
    }

    pub fn from_ops(previous: Snapshot, next: Snapshot, ops: Vec<EditOp>) -> Self {
        Self { previous, next, ops }
    }

    pub fn previous(&self) -> &Snapshot {
        &self.previous
    }

    pub fn next(&self) -> &Snapshot {
        &self.next
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// Notify `callback` of every operation, in order
    pub fn dispatch_to<C: ListUpdateCallback + ?Sized>(&self, callback: &mut C) {
        for op in &self.ops {
            match op {
                EditOp::Insert { position, count } => callback.on_inserted(*position, *count),
                EditOp::Remove { position, count } => callback.on_removed(*position, *count),
                EditOp::Move { from, to } => callback.on_moved(*from, *to),
                EditOp::Change { position, count, payload } => {
                    callback.on_changed(*position, *count, payload.as_ref())
                }
            }
        }
    }

    /// Apply the operations to a copy of the previous list.
    ///
    /// Inserted and changed items are taken from the next list. For a diff
    /// computed by this module the output equals `next()` element-wise.
    pub fn replay(&self) -> Vec<Arc<Item>> {
        let mut mirror = Mirror {
            items: self.previous.to_vec(),
            next: &self.next,
        };
        self.dispatch_to(&mut mirror);
        mirror.items
    }
}

/// Mutable copy of a list that follows dispatched operations
struct Mirror<'a> {
    items: Vec<Arc<Item>>,
    next: &'a [Arc<Item>],
}

impl Mirror<'_> {
    fn source(&self, position: usize, count: usize) -> &[Arc<Item>] {
        let start = position.min(self.next.len());
        let end = position.saturating_add(count).min(self.next.len());
        &self.next[start..end]
    }
}

impl ListUpdateCallback for Mirror<'_> {
    fn on_inserted(&mut self, position: usize, count: usize) {
        let at = position.min(self.items.len());
        let src = self.source(position, count).to_vec();
        self.items.splice(at..at, src);
    }

    fn on_removed(&mut self, position: usize, count: usize) {
        let start = position.min(self.items.len());
        let end = position.saturating_add(count).min(self.items.len());
        self.items.drain(start..end);
    }

    fn on_moved(&mut self, from: usize, to: usize) {
        if from < self.items.len() {
            let item = self.items.remove(from);
            let to = to.min(self.items.len());
            self.items.insert(to, item);
        }
    }

    fn on_changed(&mut self, position: usize, count: usize, _payload: Option<&Arc<Item>>) {
        let src = self.source(position, count).to_vec();
        for (offset, item) in src.into_iter().enumerate() {
            if let Some(slot) = self.items.get_mut(position + offset) {
                *slot = item;
            }
        }
    }
}

/// Reject lists where two items share an id
pub fn check_duplicates(items: &[Arc<Item>]) -> Result<()> {
    let mut seen: HashMap<i64, usize> = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if let Some(first) = seen.insert(item.id(), index) {
            return Err(ListError::DuplicateId {
                id: item.id(),
                first,
                second: index,
            });
        }
    }
    Ok(())
}

/// Indices into `seq` of one longest strictly increasing subsequence,
/// in increasing order.
///
/// Patience sorting: O(n log n) time, O(n) space.
pub fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    // tails[len - 1] = index of the smallest tail of a run of length len
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, value) in seq.iter().enumerate() {
        let len = tails.partition_point(|&t| seq[t] < *value);
        if len > 0 {
            prev[i] = Some(tails[len - 1]);
        }
        if len == tails.len() {
            tails.push(i);
        } else {
            tails[len] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut at = tails.last().copied();
    while let Some(i) = at {
        run.push(i);
        at = prev[i];
    }
    run.reverse();
    run
}

/// Compute the edit sequence turning `old` into `new`.
///
/// Both lists must have unique ids (see [`check_duplicates`]).
pub fn diff_items(old: &[Arc<Item>], new: &[Arc<Item>]) -> Vec<EditOp> {
    let mut ops = Vec::new();
    diff_into(old, new, &mut ops);
    ops
}

/// Compute the edit sequence and stream it into `callback`
pub fn diff_into<C: ListUpdateCallback + ?Sized>(
    old: &[Arc<Item>],
    new: &[Arc<Item>],
    callback: &mut C,
) {
    let old_ids: HashSet<i64> = old.iter().map(|item| item.id()).collect();
    let new_ids: HashSet<i64> = new.iter().map(|item| item.id()).collect();

    // mirror of ids, kept in sync with emitted ops
    let mut mirror: Vec<i64> = old.iter().map(|item| item.id()).collect();

    // 1. removals, runs coalesced, from the back so earlier indices stay valid
    let mut i = old.len();
    while i > 0 {
        if new_ids.contains(&old[i - 1].id()) {
            i -= 1;
            continue;
        }
        let end = i;
        while i > 0 && !new_ids.contains(&old[i - 1].id()) {
            i -= 1;
        }
        callback.on_removed(i, end - i);
        mirror.drain(i..end);
    }

    // 2. moves: everything shared but outside the LCS goes right after its
    // predecessor in new order (or to the front)
    let common_new: Vec<i64> = new
        .iter()
        .map(|item| item.id())
        .filter(|id| old_ids.contains(id))
        .collect();
    // both orderings hold the same unique ids, so their LCS is the longest
    // increasing run of old positions taken in new order
    let old_pos: HashMap<i64, usize> =
        mirror.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let order: Vec<usize> =
        common_new.iter().filter_map(|id| old_pos.get(id).copied()).collect();
    let stable: HashSet<i64> = longest_increasing(&order)
        .into_iter()
        .map(|i| common_new[i])
        .collect();

    for (t, id) in common_new.iter().enumerate() {
        if stable.contains(id) {
            continue;
        }
        let Some(from) = mirror.iter().position(|x| x == id) else {
            continue;
        };
        let to = match t.checked_sub(1).map(|p| common_new[p]) {
            Some(pred) => match mirror.iter().position(|x| *x == pred) {
                Some(p) if from < p => p,
                Some(p) => p + 1,
                None => continue,
            },
            None => 0,
        };
        if from != to {
            callback.on_moved(from, to);
            let moved = mirror.remove(from);
            mirror.insert(to, moved);
        }
    }

    // 3. insertions at their final positions
    let mut i = 0;
    while i < new.len() {
        if old_ids.contains(&new[i].id()) {
            i += 1;
            continue;
        }
        let start = i;
        while i < new.len() && !old_ids.contains(&new[i].id()) {
            i += 1;
        }
        callback.on_inserted(start, i - start);
    }

    // 4. content changes
    let old_by_id: HashMap<i64, &Arc<Item>> = old.iter().map(|item| (item.id(), item)).collect();
    for (position, item) in new.iter().enumerate() {
        if let Some(&previous) = old_by_id.get(&item.id()) {
            if previous.as_ref() != item.as_ref() {
                callback.on_changed(position, 1, Some(previous));
            }
        }
    }
}
