//! Thread pool for off-thread diff computation.
//!
//! Uses work-stealing deques:
//! - external jobs go to a global injector
//! - each worker drains its own deque first, then the injector, then steals
//! - idle workers back off with a short sleep
//!
//! Staleness is not handled here. Diff jobs always run to completion and
//! the differ's generation check drops outdated results on commit.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{debug, trace};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ListConfig;
use crate::entities::{Executor, Job};

/// How long `Drop` waits for busy workers before detaching them
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Work-stealing pool implementing [`Executor`].
///
/// # Example
/// ```ignore
/// let workers = Arc::new(Workers::new(4, "itemlist-diff", Duration::from_millis(1))?);
/// let differ = AsyncDiffer::new(workers, commits, sink);
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers named `{name}-{i}`.
    ///
    /// Fails only if the OS refuses to spawn a thread.
    pub fn new(num_threads: usize, name: &str, idle_sleep: Duration) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(|w| w.stealer()).collect();

        let mut handles = Vec::with_capacity(num_threads);
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, worker_id))
                .spawn(move || {
                    trace!("Diff worker {} started", worker_id);
                    loop {
                        if let Some(job) = find_job(&local, &injector, &stealers) {
                            job();
                            continue;
                        }
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        thread::sleep(idle_sleep);
                    }
                    trace!("Diff worker {} stopped", worker_id);
                })?;
            handles.push(handle);
        }

        debug!("Workers initialized: {} threads ({})", num_threads, name);

        Ok(Self {
            injector,
            handles,
            shutdown,
        })
    }

    /// Pool sized and named from `config`
    pub fn from_config(config: &ListConfig) -> std::io::Result<Self> {
        Self::new(
            config.resolved_diff_threads(),
            &config.worker_name,
            Duration::from_millis(config.idle_sleep_ms),
        )
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    /// Queue a closure
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }
}

fn find_job(
    local: &Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
) -> Option<Job> {
    local.pop().or_else(|| {
        std::iter::repeat_with(|| {
            injector
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(|s| s.steal()).collect())
        })
        .find(|s| !s.is_retry())
        .and_then(|s| s.success())
    })
}

impl Executor for Workers {
    fn execute(&self, job: Job) {
        self.injector.push(job);
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        let current = thread::current().id();
        for handle in std::mem::take(&mut self.handles) {
            // last reference may be dropped from inside a job
            if handle.thread().id() == current {
                continue;
            }
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Workers shutdown timeout reached, detaching");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    #[test]
    fn test_runs_all_jobs() {
        let workers = Workers::new(3, "test-diff", Duration::from_millis(1)).unwrap();
        assert_eq!(workers.num_threads(), 3);

        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..50 {
            let count = Arc::clone(&count);
            let tx = tx.clone();
            workers.execute(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            }));
        }
        for _ in 0..50 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_thread_names() {
        let workers = Workers::new(1, "named-pool", Duration::from_millis(1)).unwrap();
        let (tx, rx) = mpsc::channel();
        workers.spawn(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        });
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("named-pool-0"));
    }

    #[test]
    fn test_zero_threads_clamped() {
        let workers = Workers::new(0, "tiny", Duration::from_millis(1)).unwrap();
        assert_eq!(workers.num_threads(), 1);
    }
}
