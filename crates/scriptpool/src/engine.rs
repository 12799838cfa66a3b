//! The engine facade.
//!
//! `ScriptEngine` ties the pieces together: it owns the scheduler, the
//! module and source registries, and the lifecycle of the embedded runtime.
//! The intended shape of a session:
//!
//! 1. Register native modules and script sources.
//! 2. `start()`: imports the modules, initializes the runtime, starts the
//!    worker pool.
//! 3. `execute(...)` / `execute_and_wait(...)` as needed.
//! 4. `stop()`: drains in-flight runs, tears the runtime down. Runs that
//!    never started stay queued for a later `start()`.
//!
//! One engine instance per process is the supported arrangement, matching
//! the single logical runtime the whole crate is built around.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ScriptError;
use crate::job::{Job, JobFuture};
use crate::module::ModuleRegistry;
use crate::runtime::{BasicRuntime, RuntimeHost, ScriptRuntime};
use crate::scheduler::Scheduler;
use crate::scope::ScriptScope;
use crate::source::{SourceRef, SourceRegistry};

/// Builds a fresh runtime for each engine start.
pub type RuntimeFactory = Box<dyn Fn() -> Box<dyn ScriptRuntime> + Send>;

struct EngineCore {
    scheduler: Scheduler,
    factory: RuntimeFactory,
    running: bool,
}

/// The script engine: scheduler, registries, and runtime lifecycle.
///
/// All methods take `&self`; the engine can be shared across threads behind
/// an `Arc`. Dropping the engine stops it, cancelling any still-queued runs.
pub struct ScriptEngine {
    core: Mutex<EngineCore>,
    runtime: Arc<RuntimeHost>,
    modules: ModuleRegistry,
    sources: SourceRegistry,
}

impl ScriptEngine {
    /// An engine running the built-in [`BasicRuntime`] on `worker_count`
    /// workers.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is zero.
    pub fn new(worker_count: usize) -> Self {
        Self::with_runtime_factory(worker_count, || {
            Box::new(BasicRuntime::new()) as Box<dyn ScriptRuntime>
        })
    }

    /// An engine over a custom runtime. The factory is invoked on every
    /// start, so a stop/start cycle gets a fresh runtime.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is zero.
    pub fn with_runtime_factory<F>(worker_count: usize, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ScriptRuntime> + Send + 'static,
    {
        Self {
            core: Mutex::new(EngineCore {
                scheduler: Scheduler::new(worker_count),
                factory: Box::new(factory),
                running: false,
            }),
            runtime: Arc::new(RuntimeHost::new()),
            modules: ModuleRegistry::new(),
            sources: SourceRegistry::new(),
        }
    }

    /// Bring the engine up: import modules, initialize the runtime, start
    /// the worker pool.
    ///
    /// Returns `Ok(false)` if already running. Any failure aborts the
    /// sequence and leaves the engine not running.
    pub fn start(&self) -> Result<bool, ScriptError> {
        let mut core = self.core.lock();
        if core.running {
            return Ok(false);
        }
        tracing::debug!("[engine] starting");

        let mut runtime = (core.factory)();
        self.modules.import_modules(runtime.as_mut())?;
        runtime
            .initialize()
            .map_err(|cause| ScriptError::RuntimeInit(format!("{cause:#}")))?;
        self.runtime.install(runtime)?;

        if let Err(err) = core.scheduler.start() {
            if let Some(mut runtime) = self.runtime.take() {
                runtime.shutdown();
            }
            return Err(err);
        }
        core.running = true;
        tracing::debug!("[engine] started");
        Ok(true)
    }

    /// Take the engine down: stop the pool (waiting for in-flight runs),
    /// then shut the runtime down. Runs still queued stay queued.
    ///
    /// Returns `false` if the engine was not running.
    pub fn stop(&self) -> bool {
        let mut core = self.core.lock();
        if !core.running {
            return false;
        }
        tracing::debug!("[engine] stopping");
        core.scheduler.stop();
        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown();
        }
        core.running = false;
        tracing::debug!("[engine] stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.core.lock().running
    }

    /// Schedule a run of `source` and return its future immediately.
    ///
    /// The run is queued even when the engine is not running; it executes
    /// once the engine starts. Ignoring the returned future silently drops
    /// whatever failure the run captures.
    pub fn execute<Pre, Post>(&self, source: SourceRef, pre_hook: Pre, post_hook: Post) -> JobFuture
    where
        Pre: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
        Post: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
    {
        let mut job = Job::new(
            source,
            Arc::clone(&self.runtime),
            Box::new(pre_hook),
            Box::new(post_hook),
        );
        let future = job.future();
        let accepted = self.core.lock().scheduler.submit(job);
        if !accepted {
            tracing::debug!("[engine] run queued while the scheduler is stopped");
        }
        future
    }

    /// Schedule a run of the registered source `id`.
    ///
    /// Fails with [`ScriptError::NotFound`] if no such source is registered.
    pub fn execute_by_id<Pre, Post>(
        &self,
        id: &str,
        pre_hook: Pre,
        post_hook: Post,
    ) -> Result<JobFuture, ScriptError>
    where
        Pre: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
        Post: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
    {
        let source = self.sources.get_source(id)?;
        Ok(self.execute(source, pre_hook, post_hook))
    }

    /// [`execute`](Self::execute), then block on the future, surfacing any
    /// captured failure.
    pub fn execute_and_wait<Pre, Post>(
        &self,
        source: SourceRef,
        pre_hook: Pre,
        post_hook: Post,
    ) -> Result<bool, ScriptError>
    where
        Pre: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
        Post: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
    {
        self.execute(source, pre_hook, post_hook).wait()
    }

    /// [`execute_by_id`](Self::execute_by_id), then block on the future.
    pub fn execute_and_wait_by_id<Pre, Post>(
        &self,
        id: &str,
        pre_hook: Pre,
        post_hook: Post,
    ) -> Result<bool, ScriptError>
    where
        Pre: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
        Post: FnOnce(&mut ScriptScope) -> anyhow::Result<()> + Send + 'static,
    {
        self.execute_by_id(id, pre_hook, post_hook)?.wait()
    }

    /// The module registry. Registrations are picked up at the next start.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// The source registry.
    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
