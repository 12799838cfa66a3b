//! Native modules and their registry.
//!
//! A native module is a named bag of host functions that scripts can call.
//! Modules are registered with an initializer; the engine consumes every
//! initializer exactly once when it starts, handing the produced modules to
//! the runtime before the runtime is initialized. Registrations made while
//! the engine is running take effect on the next start.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use crate::error::ScriptError;
use crate::runtime::ScriptRuntime;

/// A host function callable from scripts.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Builds a [`NativeModule`] when the engine starts.
pub type ModuleInitializer = Arc<dyn Fn() -> anyhow::Result<NativeModule> + Send + Sync>;

/// A set of native functions exposed to scripts under one module name.
#[derive(Default)]
pub struct NativeModule {
    functions: HashMap<String, NativeFn>,
}

impl NativeModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function, builder-style.
    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Registry of module initializers, keyed by module name.
///
/// Thread-safe; registrations are immutable once added and are consumed by
/// the one-time import step at engine start.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<String, ModuleInitializer>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module initializer under a unique name.
    pub fn add_module<F>(&self, name: impl Into<String>, initializer: F) -> Result<(), ScriptError>
    where
        F: Fn() -> anyhow::Result<NativeModule> + Send + Sync + 'static,
    {
        let name = name.into();
        debug_assert!(!name.is_empty(), "module name must not be empty");
        match self.modules.entry(name.clone()) {
            Entry::Occupied(_) => Err(ScriptError::DuplicateRegistration(name)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(initializer));
                Ok(())
            }
        }
    }

    /// Remove a registered module. The removal affects the next engine
    /// start; modules already imported into a live runtime stay imported.
    pub fn remove_module(&self, name: &str) -> Result<(), ScriptError> {
        self.modules
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Run every initializer and install the results into `runtime`.
    ///
    /// The engine calls this once per start, before the runtime is
    /// initialized; it is not meant to be re-invoked against a live runtime.
    pub fn import_modules(&self, runtime: &mut dyn ScriptRuntime) -> Result<(), ScriptError> {
        for entry in self.modules.iter() {
            let initializer = entry.value().as_ref();
            let module = initializer().map_err(|cause| {
                ScriptError::RuntimeInit(format!(
                    "module '{}' failed to initialize: {cause:#}",
                    entry.key()
                ))
            })?;
            tracing::debug!(
                "[modules] importing '{}' ({} functions)",
                entry.key(),
                module.len()
            );
            runtime.install_module(entry.key(), module).map_err(|cause| {
                ScriptError::RuntimeInit(format!(
                    "module '{}' failed to install: {cause:#}",
                    entry.key()
                ))
            })?;
        }
        Ok(())
    }
}
