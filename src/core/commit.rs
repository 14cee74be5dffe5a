//! Commit executors - where diff results are latched and dispatched.
//!
//! The live list belongs to one owner (a UI loop, an actor, a test). Results
//! computed elsewhere are posted back to it:
//! - [`CommitQueue`]: jobs posted on the owner thread run inline, jobs from
//!   other threads queue until the owner calls [`CommitQueue::run_pending`]
//! - [`Immediate`]: runs every job on the posting thread

use std::sync::Mutex;
use std::thread::{self, ThreadId};

use log::{trace, warn};

use crate::entities::{Executor, Job};

/// Jobs queued before a warning is logged (owner probably stopped polling)
const BACKLOG_WARN: usize = 1000;

/// Owner-thread executor with deferred processing.
///
/// # Example
/// ```ignore
/// let commits = Arc::new(CommitQueue::new());
/// // in the owner's loop:
/// commits.run_pending();
/// ```
pub struct CommitQueue {
    owner: ThreadId,
    queue: Mutex<Vec<Job>>,
}

impl Default for CommitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitQueue {
    /// Queue owned by the calling thread
    pub fn new() -> Self {
        Self::with_owner(thread::current().id())
    }

    pub fn with_owner(owner: ThreadId) -> Self {
        Self {
            owner,
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run every queued job in posting order. Returns how many ran.
    ///
    /// Jobs posted while draining are picked up in the same call.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let jobs = self.take_jobs();
            if jobs.is_empty() {
                break;
            }
            ran += jobs.len();
            for job in jobs {
                job();
            }
        }
        if ran > 0 {
            trace!("CommitQueue: ran {} jobs", ran);
        }
        ran
    }

    /// Remove queued jobs without running them
    pub fn take_jobs(&self) -> Vec<Job> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Executor for CommitQueue {
    fn execute(&self, job: Job) {
        if self.is_owner() {
            job();
            return;
        }
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push(job);
        if queue.len() == BACKLOG_WARN {
            warn!("CommitQueue backlog reached {} jobs, is the owner polling?", BACKLOG_WARN);
        }
    }
}

/// Runs jobs inline on the posting thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Executor for Immediate {
    fn execute(&self, job: Job) {
        job()
    }
}
