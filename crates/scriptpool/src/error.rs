//! Error types for the script engine.

use std::io;
use std::path::PathBuf;

/// Errors reported by the engine, its registries, and its futures.
///
/// Registry operations fail synchronously with one of these. Failures that
/// happen inside a worker are never raised on the worker thread; they are
/// captured into the job's future and surface when the caller waits on it.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A module or source with this id is already registered.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// No module or source is registered under this id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file-backed source could not be read.
    #[error("unable to load script {id} from {path:?}")]
    LoadFailure {
        id: String,
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// A file-backed source was asked to load a buffer it already holds.
    #[error("script already loaded: {0}")]
    AlreadyLoaded(String),

    /// The job was discarded before it ever ran.
    #[error("script run cancelled: {0}")]
    Cancelled(String),

    /// The pre-hook, script body, or post-hook failed.
    #[error("script {id} failed: {message}")]
    ExecutionFailure { id: String, message: String },

    /// Module import or runtime initialization failed during engine start.
    #[error("runtime initialization failed: {0}")]
    RuntimeInit(String),

    /// A job ran while no runtime was installed.
    #[error("no script runtime is installed")]
    RuntimeUnavailable,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
}

impl ScriptError {
    /// The script id the error refers to, when it refers to one.
    pub fn id(&self) -> Option<&str> {
        match self {
            ScriptError::DuplicateRegistration(id)
            | ScriptError::NotFound(id)
            | ScriptError::AlreadyLoaded(id)
            | ScriptError::Cancelled(id) => Some(id.as_str()),
            ScriptError::LoadFailure { id, .. } | ScriptError::ExecutionFailure { id, .. } => {
                Some(id.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_id() {
        let err = ScriptError::Cancelled("boot".to_string());
        assert_eq!(err.to_string(), "script run cancelled: boot");
        assert_eq!(err.id(), Some("boot"));
    }

    #[test]
    fn test_load_failure_keeps_cause() {
        let err = ScriptError::LoadFailure {
            id: "main".to_string(),
            path: PathBuf::from("/missing/main.script"),
            cause: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/missing/main.script"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
