//! Where file contents come from when a Compute entry needs extraction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::errors::{ExtractionError, ExtractionResult};
use crate::models::Scope;

pub trait ContentSource: Send + Sync {
    fn read(&self, scope: &Scope, path: &str) -> ExtractionResult<String>;
}

/// Reads from disk. Relative paths resolve against the scope directory.
#[derive(Clone, Debug)]
pub struct FsContentSource {
    max_file_bytes: u64,
}

impl FsContentSource {
    pub fn new(max_file_bytes: u64) -> Self {
        Self { max_file_bytes }
    }

    fn resolve(scope: &Scope, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            Path::new(&scope.directory).join(candidate)
        }
    }
}

impl ContentSource for FsContentSource {
    fn read(&self, scope: &Scope, path: &str) -> ExtractionResult<String> {
        let resolved = Self::resolve(scope, path);
        let read_err = |source| ExtractionError::Read {
            path: path.to_string(),
            source,
        };
        let size = std::fs::metadata(&resolved).map_err(read_err)?.len();
        if size > self.max_file_bytes {
            return Err(ExtractionError::TooLarge {
                path: path.to_string(),
                size,
                limit: self.max_file_bytes,
            });
        }
        let bytes = std::fs::read(&resolved).map_err(read_err)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// In-memory contents keyed by path, shared by every scope.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.write().insert(path.into(), contents.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.write().remove(path);
    }
}

impl ContentSource for MemoryContentSource {
    fn read(&self, _scope: &Scope, path: &str) -> ExtractionResult<String> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractionError::Read {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_source_resolves_relative_to_scope() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.go"), "package a\n").unwrap();
        let scope = Scope::code_snippets(dir.path().to_string_lossy(), "main");
        let source = FsContentSource::new(1024);
        assert_eq!(source.read(&scope, "a.go").unwrap(), "package a\n");

        let absolute = dir.path().join("a.go");
        let other = Scope::code_snippets("/elsewhere", "main");
        assert_eq!(
            source.read(&other, &absolute.to_string_lossy()).unwrap(),
            "package a\n"
        );
    }

    #[test]
    fn fs_source_enforces_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.go"), "x".repeat(100)).unwrap();
        let scope = Scope::code_snippets(dir.path().to_string_lossy(), "main");
        let err = FsContentSource::new(10).read(&scope, "big.go").unwrap_err();
        assert!(matches!(err, ExtractionError::TooLarge { size: 100, .. }));
    }

    #[test]
    fn missing_file_is_read_error() {
        let scope = Scope::code_snippets("/nowhere", "main");
        let source = MemoryContentSource::new();
        let err = source.read(&scope, "a.go").unwrap_err();
        assert!(matches!(err, ExtractionError::Read { .. }));

        source.insert("a.go", "package a");
        assert_eq!(source.read(&scope, "a.go").unwrap(), "package a");
        source.remove("a.go");
        assert!(matches!(source.read(&scope, "a.go"), Err(ExtractionError::Read { .. })));
    }
}
