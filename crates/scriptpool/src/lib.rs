//! scriptpool runs scripts on a worker pool, one at a time inside the
//! runtime.
//!
//! Embedded scripting runtimes are typically single-threaded: many threads
//! may *want* to run scripts, but only one may be inside the runtime at any
//! instant. This crate packages that discipline:
//!
//! - a [`GlobalExecutionLock`] serializing all runtime entry process-wide,
//! - a [`Scheduler`] running a fixed pool of worker threads over one FIFO
//!   queue of [`Job`]s,
//! - a blocking, resolve-exactly-once [`JobFuture`] per submitted run,
//! - a [`ScriptEngine`] facade coupling the scheduler's lifecycle to the
//!   embedded runtime's, with module and source registries on the side.
//!
//! # Architecture
//!
//! - Callers register native modules and script sources, then `start()` the
//!   engine: modules are imported, the runtime is initialized, the pool
//!   spins up.
//! - `execute(...)` queues a run and returns its future immediately; a
//!   worker dequeues it, acquires the execution lock, runs
//!   pre-hook → script → post-hook against a fresh [`ScriptScope`], and
//!   settles the future.
//! - `stop()` drains in-flight runs and tears the runtime down; runs that
//!   never started stay queued for the next `start()`.
//!
//! The scripting language itself is behind the [`ScriptRuntime`] trait; the
//! built-in [`BasicRuntime`] is a minimal implementation, and foreign
//! interpreters plug in the same way.

pub mod engine;
pub mod error;
pub mod job;
pub mod lock;
pub mod module;
pub mod runtime;
pub mod scheduler;
pub mod scope;
pub mod source;

pub use engine::{RuntimeFactory, ScriptEngine};
pub use error::ScriptError;
pub use job::{Hook, Job, JobFuture};
pub use lock::{ExecutionGuard, GlobalExecutionLock};
pub use module::{ModuleInitializer, ModuleRegistry, NativeFn, NativeModule};
pub use runtime::{BasicRuntime, RuntimeHost, ScriptRuntime};
pub use scheduler::{Scheduler, SchedulerState};
pub use scope::ScriptScope;
pub use source::{BufferedSource, FileSource, ScriptSource, SourceRef, SourceRegistry};

/// The value type bound in a [`ScriptScope`] and passed to native functions.
pub use serde_json::Value;
