//! Property tests for the diff/apply law: replaying the emitted operations
//! against a mirror of the old list yields the new list.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use itemlist::core::commit::Immediate;
use itemlist::core::diff::{DiffResult, EditOp, ListUpdateCallback, diff_items};
use itemlist::{AsyncDiffer, Item};
use proptest::prelude::*;

/// Applies operations to a copy of `old`, pulling new items from `new`
struct Mirror<'a> {
    items: Vec<Arc<Item>>,
    new: &'a [Arc<Item>],
}

impl ListUpdateCallback for Mirror<'_> {
    fn on_inserted(&mut self, position: usize, count: usize) {
        let src = self.new[position..position + count].to_vec();
        self.items.splice(position..position, src);
    }

    fn on_removed(&mut self, position: usize, count: usize) {
        self.items.drain(position..position + count);
    }

    fn on_moved(&mut self, from: usize, to: usize) {
        let item = self.items.remove(from);
        self.items.insert(to, item);
    }

    fn on_changed(&mut self, position: usize, count: usize, payload: Option<&Arc<Item>>) {
        let old = payload.expect("change carries the old item");
        assert_eq!(old.id(), self.items[position].id());
        for offset in 0..count {
            self.items[position + offset] = Arc::clone(&self.new[position + offset]);
        }
    }
}

fn item(id: i64, text: u8) -> Arc<Item> {
    Item::plain(1)
        .with_id(id)
        .with_prop("text", format!("t{}", text))
        .seal()
        .unwrap()
}

/// Unique ids from a small pool, random order, random content
fn list_strategy() -> impl Strategy<Value = Vec<Arc<Item>>> {
    proptest::sample::subsequence((1i64..=20).collect::<Vec<_>>(), 0..=20)
        .prop_shuffle()
        .prop_flat_map(|ids| {
            let n = ids.len();
            (Just(ids), proptest::collection::vec(0u8..3, n))
        })
        .prop_map(|(ids, texts)| ids.into_iter().zip(texts).map(|(id, t)| item(id, t)).collect())
}

fn ids(items: &[Arc<Item>]) -> HashSet<i64> {
    items.iter().map(|i| i.id()).collect()
}

proptest! {
    #[test]
    fn replay_reproduces_new_list(old in list_strategy(), new in list_strategy()) {
        let result = DiffResult::diff(old.clone().into(), new.clone().into());
        let mut mirror = Mirror { items: old.clone(), new: &new };
        result.dispatch_to(&mut mirror);
        prop_assert_eq!(&mirror.items, &new);
        prop_assert_eq!(result.replay(), new);
    }

    #[test]
    fn ranges_cover_exactly_removed_and_inserted(old in list_strategy(), new in list_strategy()) {
        let ops = diff_items(&old, &new);
        let (old_ids, new_ids) = (ids(&old), ids(&new));

        let removed: usize = ops
            .iter()
            .map(|op| match op { EditOp::Remove { count, .. } => *count, _ => 0 })
            .sum();
        let inserted: usize = ops
            .iter()
            .map(|op| match op { EditOp::Insert { count, .. } => *count, _ => 0 })
            .sum();
        let moves = ops.iter().filter(|op| matches!(op, EditOp::Move { .. })).count();

        prop_assert_eq!(removed, old_ids.difference(&new_ids).count());
        prop_assert_eq!(inserted, new_ids.difference(&old_ids).count());
        prop_assert!(moves <= old_ids.intersection(&new_ids).count());
    }

    #[test]
    fn same_list_has_no_ops(list in list_strategy()) {
        prop_assert!(diff_items(&list, &list).is_empty());
    }

    #[test]
    fn differ_latches_new_list(old in list_strategy(), new in list_strategy()) {
        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let d = Arc::clone(&dispatched);
        let sink = move |r: &DiffResult| d.lock().unwrap().push(r.clone());
        let differ = AsyncDiffer::new(Arc::new(Immediate), Arc::new(Immediate), Arc::new(sink));

        differ.submit_list(old.clone().into()).unwrap();
        differ.submit_list(new.clone().into()).unwrap();

        prop_assert_eq!(differ.current_list().to_vec(), new.clone());
        let results = dispatched.lock().unwrap();
        prop_assert_eq!(results.len(), 2);
        prop_assert_eq!(results[1].replay(), new);
    }
}
