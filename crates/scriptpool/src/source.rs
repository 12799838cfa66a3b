//! Script sources and their registry.
//!
//! A source is a named piece of script code. Sources are shared by
//! reference: the registry holds one reference, every queued job holds
//! another, so removing a source from the registry never invalidates runs
//! already scheduled against it. The code lives until the last holder is
//! gone.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::error::ScriptError;

/// Access to one script's code.
///
/// `code()` may materialize lazily and may therefore fail; a failure is
/// reported to whoever triggered the load, including a job's future when the
/// load happens at execution time.
pub trait ScriptSource: Send + Sync {
    /// The unique id of this source.
    fn id(&self) -> &str;

    /// The script code.
    fn code(&self) -> Result<String, ScriptError>;
}

/// A shared reference to a source.
pub type SourceRef = Arc<dyn ScriptSource>;

/// A source holding its code in memory.
pub struct BufferedSource {
    id: String,
    code: String,
}

impl BufferedSource {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        let id = id.into();
        debug_assert!(!id.is_empty(), "source id must not be empty");
        Self {
            id,
            code: code.into(),
        }
    }
}

impl ScriptSource for BufferedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn code(&self) -> Result<String, ScriptError> {
        Ok(self.code.clone())
    }
}

/// A source that reads its code from a file, eagerly or on first use.
pub struct FileSource {
    id: String,
    path: PathBuf,
    cache: Mutex<Option<String>>,
}

impl FileSource {
    /// Create a file-backed source.
    ///
    /// With `defer_load` set, the file is read on first `code()` call;
    /// otherwise it is read here and an unreadable file fails construction.
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        defer_load: bool,
    ) -> Result<Self, ScriptError> {
        let id = id.into();
        debug_assert!(!id.is_empty(), "source id must not be empty");
        let source = Self {
            id,
            path: path.into(),
            cache: Mutex::new(None),
        };
        if !defer_load {
            source.load()?;
        }
        Ok(source)
    }

    /// Read the file into the buffer now.
    pub fn load(&self) -> Result<(), ScriptError> {
        let mut cache = self.cache.lock();
        if cache.is_some() {
            return Err(ScriptError::AlreadyLoaded(self.id.clone()));
        }
        *cache = Some(self.read()?);
        Ok(())
    }

    /// Whether the code is currently buffered.
    pub fn loaded(&self) -> bool {
        self.cache.lock().is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String, ScriptError> {
        fs::read_to_string(&self.path).map_err(|cause| ScriptError::LoadFailure {
            id: self.id.clone(),
            path: self.path.clone(),
            cause,
        })
    }
}

impl ScriptSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn code(&self) -> Result<String, ScriptError> {
        let mut cache = self.cache.lock();
        if let Some(code) = cache.as_ref() {
            return Ok(code.clone());
        }
        let code = self.read()?;
        *cache = Some(code.clone());
        Ok(code)
    }
}

/// Registry of sources, keyed by id.
///
/// Thread-safe. Handing out `SourceRef`s is how callers pin a source across
/// registry removal.
#[derive(Default)]
pub struct SourceRegistry {
    sources: DashMap<String, SourceRef>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an in-memory source and register it.
    pub fn create_source(
        &self,
        id: impl Into<String>,
        code: impl Into<String>,
    ) -> Result<SourceRef, ScriptError> {
        self.add_source(Arc::new(BufferedSource::new(id, code)))
    }

    /// Create a file-backed source and register it. Nothing is registered if
    /// an eager load fails.
    pub fn create_source_from_file(
        &self,
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        defer_load: bool,
    ) -> Result<SourceRef, ScriptError> {
        self.add_source(Arc::new(FileSource::new(id, path, defer_load)?))
    }

    /// Register an existing source under its own id.
    pub fn add_source(&self, source: SourceRef) -> Result<SourceRef, ScriptError> {
        let id = source.id().to_string();
        match self.sources.entry(id.clone()) {
            Entry::Occupied(_) => Err(ScriptError::DuplicateRegistration(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&source));
                Ok(source)
            }
        }
    }

    pub fn get_source(&self, id: &str) -> Result<SourceRef, ScriptError> {
        self.sources
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ScriptError::NotFound(id.to_string()))
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Drop the registry's reference. The source itself lives on while any
    /// queued run still holds it.
    pub fn remove_source(&self, id: &str) -> Result<(), ScriptError> {
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ScriptError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_buffered_source() {
        let source = BufferedSource::new("greet", "x = 1");
        assert_eq!(source.id(), "greet");
        assert_eq!(source.code().unwrap(), "x = 1");
    }

    #[test]
    fn test_registry_create_get_remove() {
        let registry = SourceRegistry::new();
        registry.create_source("a", "x = 1").unwrap();
        assert!(registry.has_source("a"));

        let duplicate = registry.create_source("a", "x = 2");
        assert!(matches!(
            duplicate,
            Err(ScriptError::DuplicateRegistration(id)) if id == "a"
        ));

        assert!(matches!(
            registry.get_source("missing"),
            Err(ScriptError::NotFound(_))
        ));

        registry.remove_source("a").unwrap();
        assert!(!registry.has_source("a"));
        assert!(matches!(
            registry.remove_source("a"),
            Err(ScriptError::NotFound(_))
        ));
    }

    #[test]
    fn test_removed_source_stays_usable_through_reference() {
        let registry = SourceRegistry::new();
        let source = registry.create_source("pinned", "x = 1").unwrap();
        registry.remove_source("pinned").unwrap();
        assert_eq!(source.code().unwrap(), "x = 1");
    }

    #[test]
    fn test_file_source_eager_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "x = 41").unwrap();

        let source = FileSource::new("disk", file.path(), false).unwrap();
        assert!(source.loaded());
        assert_eq!(source.code().unwrap(), "x = 41");

        assert!(matches!(
            source.load(),
            Err(ScriptError::AlreadyLoaded(id)) if id == "disk"
        ));
    }

    #[test]
    fn test_file_source_deferred_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "y = 2").unwrap();

        let source = FileSource::new("lazy", file.path(), true).unwrap();
        assert!(!source.loaded());
        assert_eq!(source.code().unwrap(), "y = 2");
        assert!(source.loaded());
    }

    #[test]
    fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.script");

        let eager = FileSource::new("absent", &path, false);
        assert!(matches!(eager, Err(ScriptError::LoadFailure { .. })));

        let deferred = FileSource::new("absent", &path, true).unwrap();
        assert!(matches!(
            deferred.code(),
            Err(ScriptError::LoadFailure { .. })
        ));
    }

    #[test]
    fn test_registry_skips_registration_when_eager_load_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new();
        let result =
            registry.create_source_from_file("ghost", dir.path().join("ghost.script"), false);
        assert!(matches!(result, Err(ScriptError::LoadFailure { .. })));
        assert!(!registry.has_source("ghost"));
    }
}
