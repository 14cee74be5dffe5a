//! Delayed execution for build requests.
//!
//! Two implementations of [`DelayedExecutor`]:
//! - [`Scheduler`]: one named background thread with a deadline heap, fed
//!   through a channel. Scheduled build passes run on that thread.
//! - [`TickScheduler`]: host-driven virtual clock. Nothing runs until the
//!   host calls `tick()` or `advance()`, which run due jobs on the calling
//!   thread. Deterministic, used by tests and frame-loop hosts.
//!
//! Both cancel by [`TaskId`]: a cancelled job is dropped, never run.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, trace};

use crate::entities::{DelayedExecutor, Executor, Job, TaskId};

enum Command {
    Schedule { id: TaskId, at: Instant, job: Job },
    Shutdown,
}

/// Thread-backed deadline scheduler
pub struct Scheduler {
    tx: Sender<Command>,
    /// Ids scheduled and neither run nor cancelled yet
    pending: Arc<Mutex<HashSet<TaskId>>>,
    next_id: AtomicU64,
    handle: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let thread_pending = Arc::clone(&pending);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(rx, thread_pending))?;
        debug!("Scheduler '{}' started", name);
        Ok(Self {
            tx,
            pending,
            next_id: AtomicU64::new(1),
            handle: Some(handle),
        })
    }

    /// Number of jobs waiting for their deadline
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn run_loop(rx: Receiver<Command>, pending: Arc<Mutex<HashSet<TaskId>>>) {
    let mut heap: BinaryHeap<Reverse<(Instant, TaskId)>> = BinaryHeap::new();
    let mut jobs: HashMap<TaskId, Job> = HashMap::new();

    loop {
        let now = Instant::now();
        while let Some(Reverse((at, id))) = heap.peek().copied() {
            if at > now {
                break;
            }
            heap.pop();
            let Some(job) = jobs.remove(&id) else { continue };
            // removal decides the race with cancel()
            let live = pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            if live {
                trace!("Scheduler: running task {}", id.0);
                job();
            }
        }

        let msg = match heap.peek() {
            Some(Reverse((at, _))) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(Command::Schedule { id, at, job }) => {
                heap.push(Reverse((at, id)));
                jobs.insert(id, job);
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    trace!("Scheduler stopped, {} jobs dropped", jobs.len());
}

impl DelayedExecutor for Scheduler {
    fn schedule(&self, delay: Duration, job: Job) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
        let at = Instant::now() + delay;
        if self.tx.send(Command::Schedule { id, at, job }).is_err() {
            self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            debug!("Scheduler: thread gone, task {} dropped", id.0);
        }
        id
    }

    fn cancel(&self, task: TaskId) -> bool {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&task)
    }
}

impl Executor for Scheduler {
    fn execute(&self, job: Job) {
        self.schedule(Duration::ZERO, job);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            // dropped from a scheduled job: the loop exits on its own
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[derive(Default)]
struct TickState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, TaskId), Job>,
    deadlines: HashMap<TaskId, Duration>,
}

/// Virtual-clock scheduler driven by the host.
///
/// # Usage
/// ```ignore
/// // request side:
/// scheduler.schedule(Duration::ZERO, job);   // runs on next tick
///
/// // in update loop:
/// scheduler.tick();
/// ```
#[derive(Default)]
pub struct TickScheduler {
    state: Mutex<TickState>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Run every job due at the current virtual time (including jobs
    /// scheduled with zero delay by the jobs themselves). Returns how many ran.
    pub fn tick(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.pop_due() {
            job();
            ran += 1;
        }
        ran
    }

    /// Move the clock forward by `by`, then tick
    pub fn advance(&self, by: Duration) -> usize {
        self.lock().now += by;
        self.tick()
    }

    fn pop_due(&self) -> Option<Job> {
        let mut state = self.lock();
        let now = state.now;
        let key = *state.queue.keys().next().filter(|(due, _)| *due <= now)?;
        state.deadlines.remove(&key.1);
        state.queue.remove(&key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TickState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DelayedExecutor for TickScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> TaskId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = TaskId(state.next_id);
        let due = state.now + delay;
        state.queue.insert((due, id), job);
        state.deadlines.insert(id, due);
        id
    }

    fn cancel(&self, task: TaskId) -> bool {
        let mut state = self.lock();
        match state.deadlines.remove(&task) {
            Some(due) => state.queue.remove(&(due, task)).is_some(),
            None => false,
        }
    }
}

impl Executor for TickScheduler {
    fn execute(&self, job: Job) {
        self.schedule(Duration::ZERO, job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Job) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let make = move |n: u32| -> Job {
            let l = Arc::clone(&l);
            Box::new(move || l.lock().unwrap().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_tick_runs_in_deadline_order() {
        let s = TickScheduler::new();
        let (log, job) = recorder();
        s.schedule(Duration::from_millis(20), job(2));
        s.schedule(Duration::from_millis(10), job(1));
        s.schedule(Duration::ZERO, job(0));

        assert_eq!(s.tick(), 1);
        assert_eq!(s.advance(Duration::from_millis(10)), 1);
        assert_eq!(s.advance(Duration::from_millis(10)), 1);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(s.now(), Duration::from_millis(20));
    }

    #[test]
    fn test_tick_cancel() {
        let s = TickScheduler::new();
        let (log, job) = recorder();
        let id = s.schedule(Duration::from_millis(5), job(1));
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        assert_eq!(s.advance(Duration::from_millis(10)), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_tick_job_can_schedule() {
        let s = Arc::new(TickScheduler::new());
        let hits = Arc::new(Mutex::new(0));
        let (s2, h2) = (Arc::clone(&s), Arc::clone(&hits));
        s.execute(Box::new(move || {
            let h3 = Arc::clone(&h2);
            s2.execute(Box::new(move || *h3.lock().unwrap() += 1));
        }));
        assert_eq!(s.tick(), 2);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_scheduler_runs_after_delay() {
        let s = Scheduler::new("test-bg").unwrap();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        s.schedule(
            Duration::from_millis(30),
            Box::new(move || {
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            }),
        );
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(name.as_deref(), Some("test-bg"));
    }

    #[test]
    fn test_scheduler_cancel() {
        let s = Scheduler::new("test-bg-cancel").unwrap();
        let (log, job) = recorder();
        let id = s.schedule(Duration::from_millis(50), job(1));
        assert_eq!(s.pending(), 1);
        assert!(s.cancel(id));
        s.schedule(Duration::from_millis(60), job(2));

        thread::sleep(Duration::from_millis(200));
        assert_eq!(*log.lock().unwrap(), vec![2]);
        assert!(!s.cancel(id));
    }
}
