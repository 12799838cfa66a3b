//! The embedded-runtime boundary.
//!
//! The engine never looks inside the scripting language; it only needs four
//! capabilities from whatever runtime is embedded: accept native modules
//! before startup, initialize, execute a chunk of code against a scope, and
//! shut down. Anything providing those capabilities, whether an in-process
//! interpreter or a foreign-VM binding, plugs in through [`ScriptRuntime`].

mod basic;

pub use basic::BasicRuntime;

use parking_lot::{Mutex, MutexGuard};

use crate::error::ScriptError;
use crate::module::NativeModule;
use crate::scope::ScriptScope;

/// An embedded scripting runtime.
///
/// Implementations are `Send` but not required to be `Sync`: the runtime may
/// be driven from any worker thread, but never from two threads at once. The
/// engine enforces that by routing every call below (other than module
/// installation and initialization, which happen before the pool starts)
/// through the global execution lock.
///
/// Lifecycle order is fixed: [`install_module`](Self::install_module) calls,
/// then [`initialize`](Self::initialize), then any number of
/// [`exec`](Self::exec) calls, then [`shutdown`](Self::shutdown). The reverse
/// order applies on teardown: the worker pool stops before `shutdown` runs.
pub trait ScriptRuntime: Send {
    /// Make a native module available to scripts under `name`.
    ///
    /// Called once per registered module, before `initialize`.
    fn install_module(&mut self, name: &str, module: NativeModule) -> anyhow::Result<()>;

    /// Bring the runtime up. Called exactly once, after all modules are
    /// installed.
    fn initialize(&mut self) -> anyhow::Result<()>;

    /// Execute `code` against `scope`.
    ///
    /// The caller holds the global execution lock for the whole call.
    fn exec(&mut self, code: &str, scope: &mut ScriptScope) -> anyhow::Result<()>;

    /// Tear the runtime down. No `exec` call is in flight or will follow.
    fn shutdown(&mut self);
}

/// The slot holding the currently installed runtime.
///
/// The engine installs a runtime here as the last initialization step before
/// starting the worker pool, and takes it back out after the pool has
/// stopped. Jobs reach the runtime through this slot while holding the
/// global execution lock, so the slot's own mutex is never contended during
/// execution; it exists to make the install/take/execute handoff safe.
#[derive(Default)]
pub struct RuntimeHost {
    slot: Mutex<Option<Box<dyn ScriptRuntime>>>,
}

impl RuntimeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a runtime. Fails if one is already installed.
    pub fn install(&self, runtime: Box<dyn ScriptRuntime>) -> Result<(), ScriptError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(ScriptError::RuntimeInit(
                "a runtime is already installed".to_string(),
            ));
        }
        *slot = Some(runtime);
        Ok(())
    }

    /// Remove and return the installed runtime, if any.
    pub fn take(&self) -> Option<Box<dyn ScriptRuntime>> {
        self.slot.lock().take()
    }

    pub fn is_installed(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub(crate) fn slot(&self) -> MutexGuard<'_, Option<Box<dyn ScriptRuntime>>> {
        self.slot.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_take() {
        let host = RuntimeHost::new();
        assert!(!host.is_installed());

        host.install(Box::new(BasicRuntime::new())).unwrap();
        assert!(host.is_installed());

        let second = host.install(Box::new(BasicRuntime::new()));
        assert!(matches!(second, Err(ScriptError::RuntimeInit(_))));

        assert!(host.take().is_some());
        assert!(!host.is_installed());
        assert!(host.take().is_none());
    }
}
