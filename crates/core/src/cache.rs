//! Per-file parse cache and the import dependency graph.
//!
//! Entries are keyed by path and only hit when the content fingerprint matches,
//! so a save that restores identical bytes counts as unchanged. The graph keeps
//! forward and reverse edges so invalidation cascades only touch importers.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::slide::ParsedFile;

/// SHA-256 of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint `content`.
    pub fn of(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Full lowercase hex digest.
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::new(), |mut acc, b| {
            // write! to String is infallible
            let _ = write!(acc, "{b:02x}");
            acc
        })
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A cached parse of one file.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Fingerprint of the bytes that were parsed.
    pub fingerprint: Fingerprint,
    /// Parse result.
    pub file: Arc<ParsedFile>,
}

/// Who imports whom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    imports: HashMap<PathBuf, BTreeSet<PathBuf>>,
    importers: HashMap<PathBuf, BTreeSet<PathBuf>>,
}

impl DependencyGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `importer` imports `imported`.
    pub fn add_edge(&mut self, importer: &Path, imported: &Path) {
        self.imports
            .entry(importer.to_path_buf())
            .or_default()
            .insert(imported.to_path_buf());
        self.importers
            .entry(imported.to_path_buf())
            .or_default()
            .insert(importer.to_path_buf());
    }

    /// Files `path` imports directly.
    pub fn imports_of(&self, path: &Path) -> impl Iterator<Item = &Path> {
        self.imports
            .get(path)
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
    }

    /// Files importing `path` directly.
    pub fn importers_of(&self, path: &Path) -> impl Iterator<Item = &Path> {
        self.importers
            .get(path)
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
    }

    /// Files importing `path` directly or transitively.
    pub fn dependents(&self, path: &Path) -> BTreeSet<PathBuf> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&Path> = VecDeque::from([path]);
        while let Some(current) = queue.pop_front() {
            for importer in self.importers_of(current) {
                if importer != path && found.insert(importer.to_path_buf()) {
                    queue.push_back(importer);
                }
            }
        }
        found
    }

    /// Drop every edge leaving `path`.
    pub fn remove_imports_of(&mut self, path: &Path) {
        let Some(targets) = self.imports.remove(path) else {
            return;
        };
        for target in targets {
            if let Some(importers) = self.importers.get_mut(&target) {
                importers.remove(path);
                if importers.is_empty() {
                    self.importers.remove(&target);
                }
            }
        }
    }
}

/// Changes from one successful parse, applied all at once.
#[derive(Debug, Default)]
pub(crate) struct CacheBatch {
    pub(crate) invalidated: BTreeSet<PathBuf>,
    pub(crate) staged: HashMap<PathBuf, CacheEntry>,
    pub(crate) graph: DependencyGraph,
    pub(crate) reachable: BTreeSet<PathBuf>,
}

/// Parse results of every file reachable from the deck root.
#[derive(Debug, Default)]
pub struct ParseCache {
    entries: HashMap<PathBuf, CacheEntry>,
    graph: DependencyGraph,
}

impl ParseCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `path` regardless of fingerprint.
    pub fn get(&self, path: &Path) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Parse result for `path` if it was produced from identical bytes.
    pub fn lookup(&self, path: &Path, fingerprint: Fingerprint) -> Option<Arc<ParsedFile>> {
        self.entries
            .get(path)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| Arc::clone(&entry.file))
    }

    /// Store a parse result.
    pub fn put(&mut self, path: impl Into<PathBuf>, fingerprint: Fingerprint, file: Arc<ParsedFile>) {
        self.entries
            .insert(path.into(), CacheEntry { fingerprint, file });
    }

    /// Forget `path`, returning its entry.
    pub fn invalidate(&mut self, path: &Path) -> Option<CacheEntry> {
        self.entries.remove(path)
    }

    /// Files importing `path` directly or transitively.
    pub fn dependents(&self, path: &Path) -> BTreeSet<PathBuf> {
        self.graph.dependents(path)
    }

    /// Import graph from the last committed parse.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Whether `path` has an entry.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn commit(&mut self, batch: CacheBatch) {
        for path in &batch.invalidated {
            self.invalidate(path);
        }
        for (path, entry) in batch.staged {
            self.put(path, entry.fingerprint, entry.file);
        }
        let before = self.entries.len();
        self.entries.retain(|path, _| batch.reachable.contains(path));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            log::debug!("evicted {evicted} unreachable cache entries");
        }
        self.graph = batch.graph;
    }
}
