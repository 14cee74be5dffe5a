//! Async differ - reconciles submitted lists against the live list.
//!
//! Every submission allocates a generation under the same lock that reads
//! the live list. Cheap cases (equal, cleared, first insert) are resolved
//! on the calling thread; anything else is diffed on the diff executor.
//! Either way the result is posted to the commit executor, which latches
//! the new list only if its generation is still the newest. Stale results
//! are dropped silently.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};

use crate::entities::{Executor, Item};
use crate::error::Result;

use super::diff::{DiffResult, EditOp, RenderSink, Snapshot, check_duplicates, empty_snapshot};
use super::generation::GenerationTracker;

struct DifferState {
    tracker: GenerationTracker,
    list: Snapshot,
    /// Results of direct edits, in the order they were applied
    edits: VecDeque<DiffResult>,
}

impl DifferState {
    /// Poison in-flight diffs and latch `list` under a fresh generation
    fn override_list(&mut self, list: Snapshot) -> bool {
        let interrupted = self.tracker.finish_max();
        let generation = self.tracker.next_scheduled();
        if self.tracker.finish(generation) {
            self.list = list;
        }
        trace!("AsyncDiffer: forced list at generation {}", generation);
        interrupted
    }
}

struct DifferInner {
    state: Mutex<DifferState>,
    diff_executor: Arc<dyn Executor>,
    commit_executor: Arc<dyn Executor>,
    sink: Arc<dyn RenderSink>,
}

impl DifferInner {
    fn lock(&self) -> MutexGuard<'_, DifferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `list` live if `generation` is still the newest
    fn try_latch(&self, list: Snapshot, generation: u64) -> bool {
        let mut state = self.lock();
        if state.tracker.finish(generation) {
            state.list = list;
            true
        } else {
            false
        }
    }
}

/// Generation-tracked list differ.
///
/// Cloning shares the same live list and counters.
#[derive(Clone)]
pub struct AsyncDiffer {
    inner: Arc<DifferInner>,
}

impl AsyncDiffer {
    /// # Arguments
    ///
    /// * `diff_executor` - runs full diffs, should not be the commit thread
    /// * `commit_executor` - owner of the live list, receives every result
    /// * `sink` - gets each committed, non-null result
    pub fn new(
        diff_executor: Arc<dyn Executor>,
        commit_executor: Arc<dyn Executor>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            inner: Arc::new(DifferInner {
                state: Mutex::new(DifferState {
                    tracker: GenerationTracker::new(),
                    list: empty_snapshot(),
                    edits: VecDeque::new(),
                }),
                diff_executor,
                commit_executor,
                sink,
            }),
        }
    }

    /// Last latched list
    pub fn current_list(&self) -> Snapshot {
        Arc::clone(&self.inner.lock().list)
    }

    pub fn is_diff_in_progress(&self) -> bool {
        self.inner.lock().tracker.has_unfinished()
    }

    /// `(scheduled, finished)` generations
    pub fn generations(&self) -> (u64, u64) {
        let state = self.inner.lock();
        (state.tracker.scheduled(), state.tracker.finished())
    }

    /// Poison every in-flight diff. Returns whether one was in flight.
    pub fn cancel_diff(&self) -> bool {
        let interrupted = self.inner.lock().tracker.finish_max();
        if interrupted {
            trace!("AsyncDiffer: cancelled in-flight diff");
        }
        interrupted
    }

    /// Make `list` live right away without computing or dispatching a diff.
    ///
    /// Returns whether an in-flight diff was interrupted.
    pub fn force_list_override(&self, list: Snapshot) -> bool {
        self.inner.lock().override_list(list)
    }

    /// Apply one direct edit to the live list and dispatch exactly that op.
    ///
    /// `edit` sees the live list under the state lock and returns the new
    /// list with the op that produces it, or `None` to leave the list as is.
    /// The new list is live on return; the op reaches the sink through the
    /// commit executor, in the order edits were applied.
    /// Returns whether an edit was applied.
    pub fn apply_edit<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&Snapshot) -> Result<Option<(Vec<Arc<Item>>, EditOp)>>,
    {
        {
            let mut state = self.inner.lock();
            let Some((next, op)) = edit(&state.list)? else {
                return Ok(false);
            };
            trace!("AsyncDiffer: direct {}", op);
            let next: Snapshot = if next.is_empty() { empty_snapshot() } else { next.into() };
            let previous = Arc::clone(&state.list);
            state.override_list(Arc::clone(&next));
            state.edits.push_back(DiffResult::from_ops(previous, next, vec![op]));
        }

        let inner = Arc::clone(&self.inner);
        self.inner.commit_executor.execute(Box::new(move || {
            // jobs are interchangeable, each dispatches the oldest pending edit
            let result = inner.lock().edits.pop_front();
            if let Some(result) = result {
                inner.sink.on_result(&result);
            }
        }));
        Ok(true)
    }

    /// Submit the next desired list.
    ///
    /// Fails before any work is scheduled if two items share an id.
    pub fn submit_list(&self, list: Snapshot) -> Result<()> {
        check_duplicates(&list)?;

        let (generation, previous) = {
            let mut state = self.inner.lock();
            (state.tracker.next_scheduled(), Arc::clone(&state.list))
        };

        if *previous == *list {
            trace!("AsyncDiffer: generation {} noop", generation);
            let result = DiffResult::noop(previous, Arc::clone(&list));
            self.on_run_completed(generation, list, Some(result));
            return Ok(());
        }

        if list.is_empty() {
            trace!("AsyncDiffer: generation {} cleared", generation);
            let result = (!previous.is_empty()).then(|| DiffResult::cleared(previous));
            self.on_run_completed(generation, empty_snapshot(), result);
            return Ok(());
        }

        if previous.is_empty() {
            trace!("AsyncDiffer: generation {} inserted from empty", generation);
            let result = DiffResult::inserted(Arc::clone(&list));
            self.on_run_completed(generation, list, Some(result));
            return Ok(());
        }

        let this = self.clone();
        self.inner.diff_executor.execute(Box::new(move || {
            let result = DiffResult::diff(previous, Arc::clone(&list));
            debug!(
                "AsyncDiffer: generation {} diffed {} -> {} items, {} ops",
                generation,
                result.previous().len(),
                result.next().len(),
                result.ops().len()
            );
            this.on_run_completed(generation, list, Some(result));
        }));
        Ok(())
    }

    fn on_run_completed(&self, generation: u64, list: Snapshot, result: Option<DiffResult>) {
        let inner = Arc::clone(&self.inner);
        self.inner.commit_executor.execute(Box::new(move || {
            let latched = inner.try_latch(list, generation);
            match result {
                Some(result) if latched => inner.sink.on_result(&result),
                _ if !latched => trace!("AsyncDiffer: generation {} stale, dropped", generation),
                _ => {}
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commit::Immediate;
    use crate::core::diff::EditOp;
    use crate::entities::{Item, Job};
    use crate::error::ListError;

    /// Collects jobs so tests choose the completion order
    #[derive(Default)]
    struct Manual {
        jobs: Mutex<Vec<Job>>,
    }

    impl Executor for Manual {
        fn execute(&self, job: Job) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    impl Manual {
        fn take(&self) -> Vec<Job> {
            std::mem::take(&mut *self.jobs.lock().unwrap())
        }
    }

    #[derive(Default)]
    struct Recorder {
        results: Mutex<Vec<DiffResult>>,
    }

    impl RenderSink for Recorder {
        fn on_result(&self, result: &DiffResult) {
            self.results.lock().unwrap().push(result.clone());
        }
    }

    impl Recorder {
        fn ops(&self) -> Vec<Vec<EditOp>> {
            self.results.lock().unwrap().iter().map(|r| r.ops().to_vec()).collect()
        }
    }

    fn snapshot(items: &[(i64, &str)]) -> Snapshot {
        items
            .iter()
            .map(|(id, text)| Item::plain(1).with_id(*id).with_prop("text", *text).seal().unwrap())
            .collect::<Vec<_>>()
            .into()
    }

    fn ids(list: &Snapshot) -> Vec<i64> {
        list.iter().map(|i| i.id()).collect()
    }

    fn inline_differ() -> (AsyncDiffer, Arc<Recorder>) {
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(Arc::new(Immediate), Arc::new(Immediate), sink.clone());
        (differ, sink)
    }

    #[test]
    fn test_noop_submission_replaces_instances() {
        let (differ, sink) = inline_differ();
        differ.submit_list(snapshot(&[(1, "x")])).unwrap();

        let same = snapshot(&[(1, "x")]);
        differ.submit_list(Arc::clone(&same)).unwrap();

        let ops = sink.ops();
        assert_eq!(ops.len(), 2);
        assert!(ops[1].is_empty());
        assert!(Arc::ptr_eq(&differ.current_list()[0], &same[0]));
    }

    #[test]
    fn test_clear_and_insert_fast_paths() {
        let (differ, sink) = inline_differ();
        differ.submit_list(snapshot(&[(1, "a"), (2, "b"), (3, "c")])).unwrap();
        differ.submit_list(empty_snapshot()).unwrap();

        assert_eq!(
            sink.ops(),
            vec![
                vec![EditOp::Insert { position: 0, count: 3 }],
                vec![EditOp::Remove { position: 0, count: 3 }],
            ]
        );
        assert!(differ.current_list().is_empty());
        assert!(!differ.is_diff_in_progress());
    }

    #[test]
    fn test_empty_to_empty_is_noop() {
        let (differ, sink) = inline_differ();
        differ.submit_list(empty_snapshot()).unwrap();
        assert_eq!(sink.ops(), vec![Vec::<EditOp>::new()]);
    }

    #[test]
    fn test_full_diff_runs_on_diff_executor() {
        let diff_exec = Arc::new(Manual::default());
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(diff_exec.clone(), Arc::new(Immediate), sink.clone());

        differ.submit_list(snapshot(&[(1, "a"), (2, "b")])).unwrap();
        differ.submit_list(snapshot(&[(2, "b"), (1, "a")])).unwrap();
        assert!(differ.is_diff_in_progress());
        assert_eq!(ids(&differ.current_list()), vec![1, 2]);

        for job in diff_exec.take() {
            job();
        }
        assert!(!differ.is_diff_in_progress());
        assert_eq!(ids(&differ.current_list()), vec![2, 1]);
        assert_eq!(sink.ops()[1].len(), 1);
    }

    #[test]
    fn test_stale_completion_discarded() {
        let diff_exec = Arc::new(Manual::default());
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(diff_exec.clone(), Arc::new(Immediate), sink.clone());
        differ.submit_list(snapshot(&[(1, "a"), (2, "b")])).unwrap();

        // S1 then S2, both full diffs against [1, 2]
        differ.submit_list(snapshot(&[(2, "b"), (1, "a")])).unwrap();
        differ.submit_list(snapshot(&[(1, "a"), (2, "b"), (3, "c")])).unwrap();

        // S2 finishes first, S1 afterwards
        let mut jobs = diff_exec.take();
        assert_eq!(jobs.len(), 2);
        while let Some(job) = jobs.pop() {
            job();
        }

        assert_eq!(ids(&differ.current_list()), vec![1, 2, 3]);
        // initial insert + S2 only
        let ops = sink.ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1], vec![EditOp::Insert { position: 2, count: 1 }]);
    }

    #[test]
    fn test_stale_commit_through_queue() {
        let commits = Arc::new(Manual::default());
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(Arc::new(Immediate), commits.clone(), sink.clone());

        differ.submit_list(snapshot(&[(1, "a")])).unwrap();
        differ.submit_list(snapshot(&[(1, "a"), (2, "b")])).unwrap();
        let mut jobs = commits.take();
        while let Some(job) = jobs.pop() {
            job();
        }
        // the second commit ran first and won, the first is older and dropped
        assert_eq!(ids(&differ.current_list()), vec![1, 2]);
        assert_eq!(sink.ops().len(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected_before_scheduling() {
        let (differ, sink) = inline_differ();
        let err = differ.submit_list(snapshot(&[(1, "a"), (1, "b")])).unwrap_err();
        assert!(matches!(err, ListError::DuplicateId { id: 1, .. }));
        assert_eq!(differ.generations(), (0, 0));
        assert!(sink.ops().is_empty());
    }

    #[test]
    fn test_cancel_diff() {
        let diff_exec = Arc::new(Manual::default());
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(diff_exec.clone(), Arc::new(Immediate), sink.clone());
        differ.submit_list(snapshot(&[(1, "a"), (2, "b")])).unwrap();
        differ.submit_list(snapshot(&[(2, "b"), (1, "a")])).unwrap();

        assert!(differ.cancel_diff());
        assert!(!differ.cancel_diff());
        for job in diff_exec.take() {
            job();
        }
        assert_eq!(ids(&differ.current_list()), vec![1, 2]);
        assert_eq!(sink.ops().len(), 1);
    }

    #[test]
    fn test_force_list_override() {
        let diff_exec = Arc::new(Manual::default());
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(diff_exec.clone(), Arc::new(Immediate), sink.clone());
        differ.submit_list(snapshot(&[(1, "a"), (2, "b")])).unwrap();
        differ.submit_list(snapshot(&[(2, "b"), (1, "a")])).unwrap();

        assert!(differ.force_list_override(snapshot(&[(9, "z")])));
        assert_eq!(ids(&differ.current_list()), vec![9]);
        assert!(!differ.is_diff_in_progress());

        for job in diff_exec.take() {
            job();
        }
        assert_eq!(ids(&differ.current_list()), vec![9]);
        assert_eq!(sink.ops().len(), 1);
        assert!(!differ.force_list_override(empty_snapshot()));
    }

    #[test]
    fn test_direct_edits_dispatch_in_apply_order() {
        let commits = Arc::new(Manual::default());
        let sink = Arc::new(Recorder::default());
        let differ = AsyncDiffer::new(Arc::new(Immediate), commits.clone(), sink.clone());
        let extra = snapshot(&[(1, "a"), (2, "b")]);

        for item in extra.iter() {
            let item = Arc::clone(item);
            let applied = differ
                .apply_edit(|live| {
                    let mut next = live.to_vec();
                    next.push(item);
                    let op = EditOp::Insert { position: live.len(), count: 1 };
                    Ok(Some((next, op)))
                })
                .unwrap();
            assert!(applied);
        }
        assert!(!differ.apply_edit(|_| Ok(None)).unwrap());

        // live right away, dispatched only by the commit executor
        assert_eq!(ids(&differ.current_list()), vec![1, 2]);
        assert!(sink.ops().is_empty());

        let mut jobs = commits.take();
        assert_eq!(jobs.len(), 2);
        while let Some(job) = jobs.pop() {
            job();
        }
        assert_eq!(
            sink.ops(),
            vec![
                vec![EditOp::Insert { position: 0, count: 1 }],
                vec![EditOp::Insert { position: 1, count: 1 }],
            ]
        );
    }

    #[test]
    fn test_failed_edit_leaves_list() {
        let (differ, sink) = inline_differ();
        differ.submit_list(snapshot(&[(1, "a")])).unwrap();
        let err = differ
            .apply_edit(|live| Err(ListError::IndexOutOfBounds { index: 3, len: live.len() }))
            .unwrap_err();
        assert_eq!(err, ListError::IndexOutOfBounds { index: 3, len: 1 });
        assert_eq!(ids(&differ.current_list()), vec![1]);
        assert_eq!(sink.ops().len(), 1);
    }
}
