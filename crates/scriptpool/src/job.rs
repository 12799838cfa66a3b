//! One scheduled script run and its result future.
//!
//! A job carries everything one run needs: the source, the pre/post hooks,
//! a handle to the installed runtime, and a result channel that resolves
//! exactly once. Jobs are built by the engine, queued by the scheduler, and
//! executed by a worker; the submitter only ever sees the [`JobFuture`].

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::ScriptError;
use crate::lock::GlobalExecutionLock;
use crate::runtime::RuntimeHost;
use crate::scope::ScriptScope;
use crate::source::SourceRef;

/// A callback run around script execution, with the execution lock held.
///
/// The pre-hook populates the scope with arguments; the post-hook reads
/// results back out. A hook failure fails the run.
pub type Hook = Box<dyn FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// Result channel
// ─────────────────────────────────────────────────────────────────────────────

/// One-writer/one-reader handoff between a worker and the submitter.
///
/// Resolves exactly once. The writer is whichever path settles the run
/// first: successful completion, a captured failure, or cancellation at
/// teardown. A second resolution attempt is ignored, and trips an assertion
/// in debug builds when it comes from the execution path.
struct ResultChannel {
    state: Mutex<ChannelState>,
    resolved: Condvar,
}

struct ChannelState {
    resolved: bool,
    outcome: Option<Result<bool, ScriptError>>,
}

impl ResultChannel {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                resolved: false,
                outcome: None,
            }),
            resolved: Condvar::new(),
        }
    }

    /// Resolve the channel; loud in debug builds if already resolved.
    fn resolve(&self, outcome: Result<bool, ScriptError>) {
        let first = self.try_resolve(outcome);
        debug_assert!(first, "result channel resolved twice");
    }

    /// Resolve the channel if it is still unresolved.
    fn try_resolve(&self, outcome: Result<bool, ScriptError>) -> bool {
        let mut state = self.state.lock();
        if state.resolved {
            return false;
        }
        state.resolved = true;
        state.outcome = Some(outcome);
        drop(state);
        self.resolved.notify_all();
        true
    }

    fn wait_take(&self) -> Result<bool, ScriptError> {
        let mut state = self.state.lock();
        loop {
            if state.resolved {
                return state
                    .outcome
                    .take()
                    .expect("result channel outcome already consumed");
            }
            self.resolved.wait(&mut state);
        }
    }

    fn is_resolved(&self) -> bool {
        self.state.lock().resolved
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// One scheduled script run.
///
/// Internal housekeeping for the scheduler; callers interact with the
/// [`JobFuture`] obtained from [`Job::future`] instead.
pub struct Job {
    source: SourceRef,
    runtime: Arc<RuntimeHost>,
    pre_hook: Option<Hook>,
    post_hook: Option<Hook>,
    channel: Arc<ResultChannel>,
    future_taken: bool,
}

impl Job {
    pub fn new(source: SourceRef, runtime: Arc<RuntimeHost>, pre_hook: Hook, post_hook: Hook) -> Self {
        Self {
            source,
            runtime,
            pre_hook: Some(pre_hook),
            post_hook: Some(post_hook),
            channel: Arc::new(ResultChannel::new()),
            future_taken: false,
        }
    }

    pub fn source_id(&self) -> &str {
        self.source.id()
    }

    /// The future the submitter waits on.
    ///
    /// # Panics
    ///
    /// Panics if called more than once; a job has exactly one submitter.
    pub fn future(&mut self) -> JobFuture {
        assert!(!self.future_taken, "job future already taken");
        self.future_taken = true;
        JobFuture {
            channel: Arc::clone(&self.channel),
        }
    }

    /// Execute the run and settle the future.
    ///
    /// Blocks until the global execution lock is acquired, then runs
    /// pre-hook → script → post-hook against a fresh scope. The lock is
    /// released on every exit path. Every failure (hook error, lazy-load
    /// error, script error) is captured into the future; nothing is raised
    /// on the calling thread.
    pub(crate) fn invoke(&mut self) {
        tracing::trace!("[job:{}] waiting for execution lock", self.source.id());
        let outcome = {
            let _execution = GlobalExecutionLock::acquire();
            tracing::trace!("[job:{}] executing", self.source.id());
            self.run_locked()
        };
        if let Err(err) = &outcome {
            tracing::debug!("[job:{}] failed: {err}", self.source.id());
        }
        self.channel.resolve(outcome.map(|()| true));
    }

    fn run_locked(&mut self) -> Result<(), ScriptError> {
        let mut slot = self.runtime.slot();
        let runtime = slot.as_deref_mut().ok_or(ScriptError::RuntimeUnavailable)?;

        let mut scope = ScriptScope::new();
        if let Some(pre_hook) = self.pre_hook.take() {
            pre_hook(&mut scope).map_err(|cause| self.execution_failure("pre-hook", cause))?;
        }
        let code = self.source.code()?;
        runtime
            .exec(&code, &mut scope)
            .map_err(|cause| self.execution_failure("script", cause))?;
        if let Some(post_hook) = self.post_hook.take() {
            post_hook(&mut scope).map_err(|cause| self.execution_failure("post-hook", cause))?;
        }
        Ok(())
    }

    /// Settle the future with a failure that escaped [`invoke`](Self::invoke).
    ///
    /// The scheduler's dispatch loop calls this with the panic payload when a
    /// run unwinds, so a broken job settles its future instead of killing the
    /// worker.
    pub(crate) fn flag_error(&self, payload: Box<dyn Any + Send>) {
        self.channel.try_resolve(Err(ScriptError::ExecutionFailure {
            id: self.source.id().to_string(),
            message: panic_message(payload.as_ref()),
        }));
    }

    fn execution_failure(&self, stage: &str, cause: anyhow::Error) -> ScriptError {
        ScriptError::ExecutionFailure {
            id: self.source.id().to_string(),
            message: format!("{stage} failed: {cause:#}"),
        }
    }
}

impl Drop for Job {
    /// A job discarded before it ran still settles its future, with a
    /// cancellation naming the script, so no submitter waits forever.
    fn drop(&mut self) {
        let cancelled = self
            .channel
            .try_resolve(Err(ScriptError::Cancelled(self.source.id().to_string())));
        if cancelled {
            tracing::debug!("[job:{}] cancelled before running", self.source.id());
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Future
// ─────────────────────────────────────────────────────────────────────────────

/// The submitter's handle to one run's outcome.
///
/// Resolves to `Ok(true)` on success, or to the captured failure. Dropping
/// the future without waiting silently drops the outcome; that is the
/// accepted cost of fire-and-forget submission.
pub struct JobFuture {
    channel: Arc<ResultChannel>,
}

impl JobFuture {
    /// Block until the run settles and return its outcome.
    pub fn wait(self) -> Result<bool, ScriptError> {
        self.channel.wait_take()
    }

    /// Whether the run has settled yet.
    pub fn is_resolved(&self) -> bool {
        self.channel.is_resolved()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::runtime::{BasicRuntime, ScriptRuntime};
    use crate::source::BufferedSource;

    fn noop_hook() -> Hook {
        Box::new(|_| Ok(()))
    }

    fn test_host() -> Arc<RuntimeHost> {
        let mut runtime = BasicRuntime::new();
        runtime.initialize().unwrap();
        let host = Arc::new(RuntimeHost::new());
        host.install(Box::new(runtime)).unwrap();
        host
    }

    fn job(id: &str, code: &str, host: &Arc<RuntimeHost>) -> Job {
        Job::new(
            Arc::new(BufferedSource::new(id, code)),
            Arc::clone(host),
            noop_hook(),
            noop_hook(),
        )
    }

    #[test]
    fn test_invoke_resolves_success() {
        let host = test_host();
        let mut job = job("ok", "x = 1", &host);
        let future = job.future();
        job.invoke();
        assert!(future.is_resolved());
        assert_eq!(future.wait().unwrap(), true);
    }

    #[test]
    fn test_invoke_captures_script_failure() {
        let host = test_host();
        let mut job = job("bad", "raise boom", &host);
        let future = job.future();
        job.invoke();
        match future.wait() {
            Err(ScriptError::ExecutionFailure { id, message }) => {
                assert_eq!(id, "bad");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_invoke_captures_pre_hook_failure() {
        let host = test_host();
        let mut job = Job::new(
            Arc::new(BufferedSource::new("hooked", "x = 1")),
            Arc::clone(&host),
            Box::new(|_| Err(anyhow::anyhow!("missing argument"))),
            noop_hook(),
        );
        let future = job.future();
        job.invoke();
        match future.wait() {
            Err(ScriptError::ExecutionFailure { message, .. }) => {
                assert!(message.contains("pre-hook"));
                assert!(message.contains("missing argument"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_invoke_without_runtime_fails() {
        let host = Arc::new(RuntimeHost::new());
        let mut job = job("orphan", "x = 1", &host);
        let future = job.future();
        job.invoke();
        assert!(matches!(future.wait(), Err(ScriptError::RuntimeUnavailable)));
    }

    #[test]
    fn test_drop_before_run_cancels() {
        let host = test_host();
        let mut job = job("queued", "x = 1", &host);
        let future = job.future();
        drop(job);
        match future.wait() {
            Err(ScriptError::Cancelled(id)) => assert_eq!(id, "queued"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_flag_error_settles_future() {
        let host = test_host();
        let mut job = job("panicky", "x = 1", &host);
        let future = job.future();
        job.flag_error(Box::new("dispatch blew up"));
        drop(job);
        match future.wait() {
            Err(ScriptError::ExecutionFailure { message, .. }) => {
                assert!(message.contains("dispatch blew up"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "job future already taken")]
    fn test_future_taken_once() {
        let host = test_host();
        let mut job = job("greedy", "x = 1", &host);
        let _first = job.future();
        let _second = job.future();
    }

    #[test]
    fn test_wait_blocks_until_resolution() {
        let host = test_host();
        let mut job = job("slow", "x = 1", &host);
        let future = job.future();

        let waiter = thread::spawn(move || future.wait());
        thread::sleep(Duration::from_millis(20));
        job.invoke();

        assert_eq!(waiter.join().unwrap().unwrap(), true);
    }
}
