//! The worker pool that runs queued jobs.
//!
//! One shared FIFO queue, a fixed set of worker threads, and a three-state
//! lifecycle. Workers dequeue in submission order; actual script execution
//! is serialized by the global execution lock, so extra workers only buy
//! concurrency for whatever a run does outside that lock. That asymmetry is
//! the point: the pool wraps a runtime that admits one thread at a time, and
//! no amount of local parallelism should try to beat that.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::error::ScriptError;
use crate::job::Job;

/// The scheduler's lifecycle state.
///
/// Legal transitions are `Stopped → Started → Stopping → Stopped`; anything
/// else is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not running. Submissions are queued for a future start.
    Stopped,
    /// Accepting and executing jobs.
    Started,
    /// Draining: in-flight jobs finish, queued jobs stay queued, workers exit.
    Stopping,
}

struct QueueState {
    state: SchedulerState,
    jobs: VecDeque<Job>,
}

struct SchedulerShared {
    queue: Mutex<QueueState>,
    work_available: Condvar,
}

/// A fixed-size pool of worker threads over one FIFO queue.
pub struct Scheduler {
    worker_count: usize,
    shared: Arc<SchedulerShared>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Create a stopped scheduler that will run `worker_count` threads.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is zero.
    pub fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be at least 1");
        Self {
            worker_count,
            shared: Arc::new(SchedulerShared {
                queue: Mutex::new(QueueState {
                    state: SchedulerState::Stopped,
                    jobs: VecDeque::new(),
                }),
                work_available: Condvar::new(),
            }),
            workers: Vec::new(),
        }
    }

    /// Start the worker threads.
    ///
    /// Returns `Ok(true)` if the scheduler transitioned to `Started`,
    /// `Ok(false)` if it was not `Stopped`, and an error if a worker thread
    /// could not be spawned (in which case the scheduler is stopped again
    /// and already-spawned workers are joined).
    pub fn start(&mut self) -> Result<bool, ScriptError> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.state != SchedulerState::Stopped {
                return Ok(false);
            }
            queue.state = SchedulerState::Started;
        }
        tracing::debug!("[scheduler] starting {} workers", self.worker_count);

        for index in 0..self.worker_count {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("script-worker-{index}"))
                .spawn(move || run_worker(index, shared));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(cause) => {
                    self.halt_workers();
                    return Err(ScriptError::Spawn(cause));
                }
            }
        }
        Ok(true)
    }

    /// Queue a job at the FIFO tail.
    ///
    /// Submission always succeeds; the job stays queued even when the
    /// scheduler is not running. The return value reports whether the
    /// scheduler was accepting (`Started`) at submission time; `false`
    /// means "queued for a future start", not "rejected".
    pub fn submit(&self, job: Job) -> bool {
        let mut queue = self.shared.queue.lock();
        tracing::trace!("[scheduler] queueing job '{}'", job.source_id());
        queue.jobs.push_back(job);
        let accepting = queue.state == SchedulerState::Started;
        drop(queue);
        if accepting {
            self.shared.work_available.notify_one();
        }
        accepting
    }

    /// Stop the pool, blocking until in-flight jobs finish.
    ///
    /// Queued jobs that never started stay queued and run on the next
    /// start. Returns whether the scheduler was `Started` when called.
    pub fn stop(&mut self) -> bool {
        {
            let mut queue = self.shared.queue.lock();
            if queue.state != SchedulerState::Started {
                return false;
            }
            queue.state = SchedulerState::Stopping;
        }
        tracing::debug!("[scheduler] stopping; draining in-flight jobs");
        self.shared.work_available.notify_all();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        self.shared.queue.lock().state = SchedulerState::Stopped;
        tracing::debug!("[scheduler] stopped");
        true
    }

    /// A snapshot of the current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.shared.queue.lock().state
    }

    /// How many jobs are queued and not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    fn halt_workers(&mut self) {
        self.shared.queue.lock().state = SchedulerState::Stopping;
        self.shared.work_available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.shared.queue.lock().state = SchedulerState::Stopped;
    }
}

impl Drop for Scheduler {
    /// Stops the pool, then cancels every job still queued (settling each
    /// future with a cancellation).
    fn drop(&mut self) {
        self.stop();
        let mut queue = self.shared.queue.lock();
        let remaining = queue.jobs.len();
        queue.jobs.clear();
        if remaining > 0 {
            tracing::debug!("[scheduler] cancelled {remaining} queued jobs at teardown");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker loop
// ─────────────────────────────────────────────────────────────────────────────

fn run_worker(index: usize, shared: Arc<SchedulerShared>) {
    tracing::debug!("[worker:{index}] started");
    while let Some(mut job) = wait_for_next_job(&shared) {
        let id = job.source_id().to_string();
        tracing::trace!("[worker:{index}] running '{id}'");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.invoke())) {
            tracing::warn!("[worker:{index}] job '{id}' panicked; settling its future");
            job.flag_error(payload);
        }
    }
    tracing::debug!("[worker:{index}] exiting");
}

/// Pop the next job, or block until one arrives. Returns `None` once the
/// scheduler leaves `Started`, leaving any queued jobs untouched.
fn wait_for_next_job(shared: &SchedulerShared) -> Option<Job> {
    let mut queue = shared.queue.lock();
    loop {
        if queue.state != SchedulerState::Started {
            return None;
        }
        match queue.jobs.pop_front() {
            Some(job) => return Some(job),
            None => shared.work_available.wait(&mut queue),
        }
    }
}
