//! Recursive import expansion and final deck assembly.
//!
//! Expansion walks files depth-first with an explicit [`ResolutionChain`].
//! Every branch fills its own [`Accumulator`]; branches are merged in
//! directive order, so parallel sibling imports yield the same deck as a
//! sequential walk.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use serde_json::Value;

use crate::cache::{CacheBatch, CacheEntry, DependencyGraph, Fingerprint, ParseCache};
use crate::config::SlideConfig;
use crate::error::{
    DeckError, ImportCycleError, ImportError, ParseDiagnostics, RecoverableError, SourceLocation,
};
use crate::features::{FeatureDetector, FeatureSet};
use crate::import::{ImportDirective, import_candidates, resolve_target};
use crate::model::{Deck, Provenance, Slide};
use crate::options::DeckOptions;
use crate::slide::{ParsedFile, parse_file};
use crate::source::FileSource;

/// Why an assembly stopped without a deck.
#[derive(Debug)]
pub(crate) enum Abort {
    Fatal(DeckError),
    Cancelled,
}

impl From<ImportCycleError> for Abort {
    fn from(err: ImportCycleError) -> Self {
        Abort::Fatal(DeckError::Cycle(err))
    }
}

/// Failure of one import: either a placeholder slide or the whole parse.
enum ImportFailure {
    Broken(ImportError),
    Abort(Abort),
}

impl From<ImportError> for ImportFailure {
    fn from(err: ImportError) -> Self {
        ImportFailure::Broken(err)
    }
}

impl From<Abort> for ImportFailure {
    fn from(abort: Abort) -> Self {
        ImportFailure::Abort(abort)
    }
}

impl From<ImportCycleError> for ImportFailure {
    fn from(err: ImportCycleError) -> Self {
        ImportFailure::Abort(err.into())
    }
}

/// Files currently being expanded, root first.
#[derive(Debug, Clone)]
struct ResolutionChain(Vec<PathBuf>);

impl ResolutionChain {
    fn root(path: &Path) -> Self {
        Self(vec![path.to_path_buf()])
    }

    /// Chain extended with `path`, or the cycle it would close.
    fn enter(&self, path: &Path) -> Result<Self, ImportCycleError> {
        let mut chain = self.0.clone();
        chain.push(path.to_path_buf());
        if self.0.iter().any(|entry| entry == path) {
            return Err(ImportCycleError { chain });
        }
        Ok(Self(chain))
    }
}

/// Per-parse state threaded through expansion.
#[derive(Debug, Default)]
struct Accumulator {
    diagnostics: ParseDiagnostics,
    edges: Vec<(PathBuf, PathBuf)>,
    files: BTreeSet<PathBuf>,
    visited: BTreeSet<PathBuf>,
}

impl Accumulator {
    fn visit(&mut self, file: &ParsedFile) {
        self.files.insert(file.path.clone());
        if !self.visited.insert(file.path.clone()) {
            return;
        }
        for warning in &file.warnings {
            self.diagnostics.add_warning(warning.clone());
        }
        for slide in &file.slides {
            if let Some(err) = &slide.config_error {
                self.diagnostics.add_error(RecoverableError::config(err.clone()));
            }
        }
    }

    fn absorb(&mut self, other: Accumulator) {
        self.diagnostics.extend(other.diagnostics);
        self.edges.extend(other.edges);
        self.files.extend(other.files);
        self.visited.extend(other.visited);
    }
}

/// A slide picked for the deck, before indices and head config are applied.
#[derive(Debug, Clone)]
struct Draft {
    file: Arc<ParsedFile>,
    slide: usize,
    config: SlideConfig,
    importers: Vec<Provenance>,
    broken: Option<ImportError>,
}

impl Draft {
    fn new(file: &Arc<ParsedFile>, slide: usize) -> Self {
        Self {
            config: file.slides[slide].config.clone(),
            file: Arc::clone(file),
            slide,
            importers: Vec::new(),
            broken: None,
        }
    }

    fn into_slide(self, index: usize, base: &SlideConfig) -> Slide {
        let parsed = &self.file.slides[self.slide];
        let mut config = base.clone();
        config.overlay(&self.config);

        let (content, note, features, heading) = if self.broken.is_some() {
            (String::new(), None, FeatureSet::new(), None)
        } else {
            (
                parsed.content.clone(),
                parsed.note.clone(),
                parsed.features.clone(),
                parsed.heading.clone(),
            )
        };
        let title = config
            .title()
            .map(str::to_owned)
            .or_else(|| heading.as_ref().map(|heading| heading.text.clone()));
        let level = config.level().or(heading.map(|heading| heading.level));

        Slide {
            index,
            title,
            level,
            content,
            note,
            features,
            source: Provenance::of(&parsed.block),
            importers: self.importers,
            broken_import: self.broken,
            config,
        }
    }
}

#[derive(Debug, Default)]
struct Branch {
    drafts: Vec<Draft>,
    acc: Accumulator,
}

/// How files are obtained during one assembly.
#[derive(Debug, Default)]
pub(crate) struct LoadPlan {
    /// Use cache entries without re-reading files that are not invalidated.
    pub(crate) trust_cache: bool,
    /// Files that must be parsed again.
    pub(crate) invalidated: BTreeSet<PathBuf>,
    /// Contents already read while checking fingerprints.
    pub(crate) prefetched: HashMap<PathBuf, String>,
}

/// Output of a successful assembly.
pub(crate) struct Assembly {
    pub(crate) deck: Deck,
    pub(crate) batch: CacheBatch,
}

pub(crate) struct Assembler<'a, S: ?Sized> {
    source: &'a S,
    cache: &'a ParseCache,
    detector: &'a FeatureDetector,
    options: &'a DeckOptions,
    plan: LoadPlan,
    root_dir: PathBuf,
    staged: Mutex<HashMap<PathBuf, CacheEntry>>,
    cancelled: &'a (dyn Fn() -> bool + Sync),
}

impl<'a, S: FileSource + ?Sized> Assembler<'a, S> {
    pub(crate) fn new(
        source: &'a S,
        cache: &'a ParseCache,
        detector: &'a FeatureDetector,
        options: &'a DeckOptions,
        plan: LoadPlan,
        cancelled: &'a (dyn Fn() -> bool + Sync),
    ) -> Self {
        Self {
            source,
            cache,
            detector,
            options,
            plan,
            root_dir: PathBuf::new(),
            staged: Mutex::new(HashMap::new()),
            cancelled,
        }
    }

    pub(crate) fn assemble(mut self, root: &Path) -> Result<Assembly, Abort> {
        self.root_dir = root.parent().map(Path::to_path_buf).unwrap_or_default();
        self.check_cancelled()?;

        let file = self.load(root).map_err(|source| {
            Abort::Fatal(DeckError::Root {
                path: root.to_path_buf(),
                source,
            })
        })?;
        let mut acc = Accumulator::default();
        acc.visit(&file);
        let drafts = self.expand_file(&file, &ResolutionChain::root(root), &mut acc)?;

        let head = file
            .slides
            .first()
            .map(|slide| slide.config.without("src"))
            .unwrap_or_default();
        let base = SlideConfig::inherited_from(&head);
        let slides: Vec<Slide> = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| draft.into_slide(index, &base))
            .collect();
        let features = slides
            .iter()
            .flat_map(|slide| slide.features.iter().cloned())
            .collect();

        let mut diagnostics = acc.diagnostics;
        diagnostics.dedup();
        let mut graph = DependencyGraph::new();
        for (importer, imported) in &acc.edges {
            graph.add_edge(importer, imported);
        }

        log::debug!(
            "assembled {} slides from {} files ({} diagnostics)",
            slides.len(),
            acc.files.len(),
            diagnostics.count()
        );

        let staged = self
            .staged
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Assembly {
            deck: Deck {
                root: root.to_path_buf(),
                head,
                slides,
                features,
                diagnostics,
                files: acc.files.clone(),
            },
            batch: CacheBatch {
                invalidated: self.plan.invalidated,
                staged,
                graph,
                reachable: acc.files,
            },
        })
    }

    fn check_cancelled(&self) -> Result<(), Abort> {
        if (self.cancelled)() {
            Err(Abort::Cancelled)
        } else {
            Ok(())
        }
    }

    fn stage(&self, path: &Path, entry: CacheEntry) {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), entry);
    }

    fn load(&self, path: &Path) -> std::io::Result<Arc<ParsedFile>> {
        if let Some(entry) = self
            .staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(Arc::clone(&entry.file));
        }

        let invalidated = self.plan.invalidated.contains(path);
        if self.plan.trust_cache
            && !invalidated
            && let Some(entry) = self.cache.get(path)
        {
            log::trace!("cache hit for {}", path.display());
            self.stage(path, entry.clone());
            return Ok(Arc::clone(&entry.file));
        }

        let text = match self.plan.prefetched.get(path) {
            Some(text) => text.clone(),
            None => self.source.read(path)?,
        };
        let fingerprint = Fingerprint::of(text.as_bytes());
        let file = match self.cache.lookup(path, fingerprint) {
            Some(file) if !invalidated => {
                log::trace!("unchanged content for {}", path.display());
                file
            }
            _ => {
                log::debug!("parsing {}", path.display());
                Arc::new(parse_file(path, &text, self.detector, self.options))
            }
        };
        self.stage(
            path,
            CacheEntry {
                fingerprint,
                file: Arc::clone(&file),
            },
        );
        Ok(file)
    }

    fn expand_file(
        &self,
        file: &Arc<ParsedFile>,
        chain: &ResolutionChain,
        acc: &mut Accumulator,
    ) -> Result<Vec<Draft>, Abort> {
        let count = file.slides.len();
        let branches: Vec<Result<Branch, Abort>> =
            if self.options.parallel_imports && file.import_count() > 1 {
                (0..count)
                    .into_par_iter()
                    .map(|slide| self.expand_slide(file, slide, chain))
                    .collect()
            } else {
                (0..count)
                    .map(|slide| self.expand_slide(file, slide, chain))
                    .collect()
            };

        let mut drafts = Vec::with_capacity(count);
        for branch in branches {
            let branch = branch?;
            acc.absorb(branch.acc);
            drafts.extend(branch.drafts);
        }
        Ok(drafts)
    }

    fn expand_slide(
        &self,
        file: &Arc<ParsedFile>,
        slide: usize,
        chain: &ResolutionChain,
    ) -> Result<Branch, Abort> {
        let parsed = &file.slides[slide];
        let mut branch = Branch::default();
        if self.options.skip_disabled && parsed.config.disabled() {
            return Ok(branch);
        }
        let Some(src) = parsed.config.get("src") else {
            branch.drafts.push(Draft::new(file, slide));
            return Ok(branch);
        };

        let origin = Provenance::of(&parsed.block);
        match self.resolve_import(file, src, chain, &mut branch.acc) {
            Ok(imported) => {
                let overrides = parsed.config.without("src");
                branch.drafts = imported
                    .into_iter()
                    .map(|mut draft| {
                        draft.config.overlay(&overrides);
                        draft.importers.insert(0, origin.clone());
                        draft
                    })
                    .collect();
            }
            Err(ImportFailure::Broken(err)) => {
                log::warn!("{err}; inserting a placeholder slide");
                let line = parsed
                    .block
                    .frontmatter
                    .as_ref()
                    .map_or(origin.span.start, |frontmatter| frontmatter.first_line);
                let location = SourceLocation::in_file(origin.file.clone(), line + 1, 1);
                branch
                    .acc
                    .diagnostics
                    .add_error(RecoverableError::import(err.clone(), location));
                let mut placeholder = Draft::new(file, slide);
                placeholder.broken = Some(err);
                branch.drafts.push(placeholder);
            }
            Err(ImportFailure::Abort(abort)) => return Err(abort),
        }
        Ok(branch)
    }

    fn resolve_import(
        &self,
        file: &Arc<ParsedFile>,
        src: &Value,
        chain: &ResolutionChain,
        acc: &mut Accumulator,
    ) -> Result<Vec<Draft>, ImportFailure> {
        let Some(raw) = src.as_str() else {
            return Err(ImportError::NotFound {
                request: src.to_string(),
                importer: file.path.clone(),
                resolved: PathBuf::new(),
                reason: "`src` must be a string".to_string(),
            }
            .into());
        };
        let directive = ImportDirective::parse(raw).map_err(|err| {
            let (path, selection) = raw.rsplit_once(':').unwrap_or((raw, ""));
            ImportError::Range {
                selection: selection.trim().to_string(),
                target: resolve_target(path.trim_end(), &file.path, &self.root_dir, self.source),
                reason: err.to_string(),
            }
        })?;

        let candidates = import_candidates(&directive.path, &file.path, &self.root_dir);
        let found = candidates
            .iter()
            .position(|candidate| self.source.exists(candidate));
        // Creating an earlier candidate changes the resolution, so every
        // candidate looked at is a dependency of the importer.
        let looked_at = found.map_or(candidates.len(), |position| position + 1);
        for candidate in &candidates[..looked_at] {
            acc.edges.push((file.path.clone(), candidate.clone()));
            acc.files.insert(candidate.clone());
        }
        let target = candidates
            .into_iter()
            .nth(found.unwrap_or(0))
            .unwrap_or_default();
        let chain = chain.enter(&target)?;
        self.check_cancelled()?;

        let imported = match self.load(&target) {
            Ok(imported) => imported,
            Err(err) => {
                return Err(ImportError::NotFound {
                    request: raw.to_string(),
                    importer: file.path.clone(),
                    resolved: target,
                    reason: err.to_string(),
                }
                .into());
            }
        };
        acc.visit(&imported);
        let expanded = self.expand_file(&imported, &chain, acc)?;

        let Some(selection) = &directive.selection else {
            return Ok(expanded);
        };
        let picked = selection
            .resolve(expanded.len())
            .map_err(|err| ImportError::Range {
                selection: selection.to_string(),
                target: target.clone(),
                reason: err.to_string(),
            })?;
        Ok(picked.into_iter().map(|index| expanded[index].clone()).collect())
    }
}
