//! End-to-end build -> diff -> commit flow on real threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use itemlist::core::commit::{CommitQueue, Immediate};
use itemlist::core::scheduler::Scheduler;
use itemlist::core::workers::Workers;
use itemlist::{AsyncDiffer, BuildController, DiffResult, Item, ListAdapter};

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn workers() -> Arc<Workers> {
    Arc::new(Workers::new(2, "flow-diff", Duration::from_millis(1)).unwrap())
}

fn live_ids(adapter: &ListAdapter) -> Vec<i64> {
    adapter.current_items().iter().map(|i| i.id()).collect()
}

/// Controller rendering the ids in `data`
fn controller_for(
    data: Arc<Mutex<Vec<i64>>>,
    adapter: ListAdapter,
    scheduler: Arc<Scheduler>,
) -> BuildController {
    BuildController::from_fn(
        move |scope| {
            let ids = data.lock().unwrap().clone();
            for id in ids {
                scope.add(Item::plain(1).with_id(id).with_prop("label", format!("row {}", id)))?;
            }
            Ok(())
        },
        adapter,
        scheduler,
    )
}

#[test]
fn debounced_builds_reach_the_sink() {
    let results = Arc::new(Mutex::new(Vec::<DiffResult>::new()));
    let r = Arc::clone(&results);
    let sink = move |result: &DiffResult| r.lock().unwrap().push(result.clone());
    let adapter = ListAdapter::new(Arc::new(sink), workers(), Arc::new(Immediate));
    let scheduler = Arc::new(Scheduler::new("flow-bg").unwrap());
    let data = Arc::new(Mutex::new(vec![1, 2, 3]));
    let controller = controller_for(Arc::clone(&data), adapter.clone(), scheduler);

    // first request runs on this thread
    controller.request_build().unwrap();
    assert_eq!(controller.build_count(), 1);
    assert_eq!(live_ids(&adapter), vec![1, 2, 3]);

    // a burst of delayed requests collapses into one pass
    for next in [vec![3, 2, 1], vec![2, 3], vec![4, 3, 2]] {
        *data.lock().unwrap() = next;
        controller.request_delayed_build_ms(30).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || live_ids(&adapter) == vec![4, 3, 2]));
    assert!(wait_until(Duration::from_secs(5), || !adapter.is_diff_in_progress()));
    assert!(wait_until(Duration::from_secs(5), || controller.build_count() == 2));
    thread::sleep(Duration::from_millis(60));
    assert_eq!(controller.build_count(), 2);

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 2);
    let replayed: Vec<i64> = results[1].replay().iter().map(|i| i.id()).collect();
    assert_eq!(replayed, vec![4, 3, 2]);
}

#[test]
fn commits_wait_for_the_owner() {
    let owner = thread::current().id();
    let commit_threads = Arc::new(Mutex::new(Vec::new()));
    let c = Arc::clone(&commit_threads);
    let sink = move |_: &DiffResult| c.lock().unwrap().push(thread::current().id());

    let commits = Arc::new(CommitQueue::new());
    let adapter = ListAdapter::new(Arc::new(sink), workers(), commits.clone());
    let scheduler = Arc::new(Scheduler::new("flow-bg-owner").unwrap());
    let data = Arc::new(Mutex::new(vec![1, 2]));
    let controller = controller_for(Arc::clone(&data), adapter.clone(), scheduler);

    controller.request_build().unwrap();
    assert_eq!(live_ids(&adapter), vec![1, 2]);

    *data.lock().unwrap() = vec![2, 1, 5];
    controller.request_build().unwrap();

    // build pass and diff happen elsewhere, the commit is parked
    assert!(wait_until(Duration::from_secs(5), || commits.len() == 1));
    assert_eq!(live_ids(&adapter), vec![1, 2]);

    assert_eq!(commits.run_pending(), 1);
    assert_eq!(live_ids(&adapter), vec![2, 1, 5]);
    assert!(commit_threads.lock().unwrap().iter().all(|id| *id == owner));
    assert_eq!(commit_threads.lock().unwrap().len(), 2);
}

#[test]
fn rapid_submissions_settle_on_the_last_list() {
    let dispatched = Arc::new(AtomicUsize::new(0));
    let d = Arc::clone(&dispatched);
    let last = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&last);
    let sink = move |result: &DiffResult| {
        d.fetch_add(1, Ordering::SeqCst);
        *l.lock().unwrap() = result.next().iter().map(|i| i.id()).collect::<Vec<i64>>();
    };
    let differ = AsyncDiffer::new(workers(), Arc::new(Immediate), Arc::new(sink));

    let list = |ids: &[i64]| -> Vec<Arc<Item>> {
        ids.iter().map(|id| Item::plain(1).with_id(*id).seal().unwrap()).collect()
    };
    differ.submit_list(list(&[1, 2, 3, 4]).into()).unwrap();

    let mut expected = Vec::new();
    for round in 0..50i64 {
        let mut ids: Vec<i64> = (1..=8).collect();
        ids.rotate_left((round % 8) as usize);
        ids.truncate(4 + (round % 4) as usize);
        expected = ids.clone();
        differ.submit_list(list(&ids).into()).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || !differ.is_diff_in_progress()));
    let live: Vec<i64> = differ.current_list().iter().map(|i| i.id()).collect();
    assert_eq!(live, expected);
    assert_eq!(*last.lock().unwrap(), expected);
    assert!(dispatched.load(Ordering::SeqCst) <= 51);
}
