//! File access used by the assembly engine.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Supplies file contents to the engine.
///
/// Implementations must be safe to call from several threads at once, since
/// sibling imports may be read in parallel.
pub trait FileSource: Send + Sync {
    /// Read `path` as UTF-8 text.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Whether `path` names a readable file.
    fn exists(&self, path: &Path) -> bool;
}

impl<T: FileSource + ?Sized> FileSource for Arc<T> {
    fn read(&self, path: &Path) -> io::Result<String> {
        (**self).read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl FileSource for FsSource {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory files, e.g. unsaved editor buffers or tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<PathBuf, String>>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with_file(self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.insert(normalize_path(path.as_ref()), content.into());
    }

    /// Remove a file, returning its content.
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<String> {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.remove(&normalize_path(path.as_ref()))
    }
}

impl FileSource for MemorySource {
    fn read(&self, path: &Path) -> io::Result<String> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.get(&normalize_path(path)).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.contains_key(&normalize_path(path))
    }
}

/// Lexically normalize `path`: drop `.` segments and fold `..` into its parent.
///
/// Symlinks are not resolved; two spellings of the same file only compare
/// equal when they normalize to the same text.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
