//! Stateful deck engine: full parses and incremental reparses.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assemble::{Abort, Assembler, Assembly, LoadPlan};
use crate::cache::{Fingerprint, ParseCache};
use crate::error::DeckError;
use crate::features::FeatureDetector;
use crate::model::Deck;
use crate::options::DeckOptions;
use crate::source::{FileSource, normalize_path};

/// Result of [`Engine::reparse`].
#[derive(Debug, Clone)]
pub enum ReparseOutcome {
    /// No file of the deck changed; the previous deck stays current.
    NoChange,
    /// The deck was reassembled.
    Updated(Arc<Deck>),
    /// A newer request cancelled this one before it committed.
    Superseded,
}

impl ReparseOutcome {
    /// The new deck, if one was produced.
    pub fn deck(&self) -> Option<&Arc<Deck>> {
        match self {
            ReparseOutcome::Updated(deck) => Some(deck),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct DeckState {
    root: PathBuf,
    deck: Arc<Deck>,
}

/// Parses one deck and keeps it current as files change.
///
/// The engine owns the [`ParseCache`]. Cache changes from a parse are only
/// committed when that parse produces a deck.
pub struct Engine<S> {
    source: S,
    options: DeckOptions,
    detector: FeatureDetector,
    cache: ParseCache,
    state: Option<DeckState>,
    dirty: BTreeSet<PathBuf>,
}

impl<S: FileSource> Engine<S> {
    /// Engine with [`DeckOptions::new`].
    pub fn new(source: S) -> Self {
        Self {
            source,
            options: DeckOptions::new(),
            detector: FeatureDetector::builtin(),
            cache: ParseCache::new(),
            state: None,
            dirty: BTreeSet::new(),
        }
    }

    /// Engine with custom options.
    ///
    /// Fails with [`DeckError::Marker`] when a registered marker is not a
    /// valid regular expression.
    pub fn with_options(source: S, options: DeckOptions) -> Result<Self, DeckError> {
        let detector = FeatureDetector::new(&options)?;
        Ok(Self {
            source,
            options,
            detector,
            cache: ParseCache::new(),
            state: None,
            dirty: BTreeSet::new(),
        })
    }

    /// File source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Active options.
    pub fn options(&self) -> &DeckOptions {
        &self.options
    }

    /// Parse cache.
    pub fn cache(&self) -> &ParseCache {
        &self.cache
    }

    /// Last committed deck.
    pub fn deck(&self) -> Option<&Arc<Deck>> {
        self.state.as_ref().map(|state| &state.deck)
    }

    /// Parse the deck rooted at `root`.
    ///
    /// Cached files are reused when their bytes are unchanged. Parsing a
    /// different root replaces the current deck.
    pub fn parse(&mut self, root: impl AsRef<Path>) -> Result<Arc<Deck>, DeckError> {
        let root = normalize_path(root.as_ref());
        let plan = LoadPlan::default();
        match self.run(&root, plan, &|| false) {
            Ok(assembly) => Ok(self.commit(root, assembly)),
            Err(Abort::Fatal(err)) => Err(err),
            // never cancelled
            Err(Abort::Cancelled) => Err(DeckError::NotParsed),
        }
    }

    /// Reassemble after `changed` files were modified.
    pub fn reparse<I, P>(&mut self, changed: I) -> Result<ReparseOutcome, DeckError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.reparse_cancellable(changed, &|| false)
    }

    pub(crate) fn reparse_cancellable<I, P>(
        &mut self,
        changed: I,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<ReparseOutcome, DeckError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let Some(state) = &self.state else {
            return Err(DeckError::NotParsed);
        };
        let root = state.root.clone();
        let mut candidates: BTreeSet<PathBuf> = changed
            .into_iter()
            .map(|path| normalize_path(path.as_ref()))
            .filter(|path| state.deck.depends_on(path))
            .collect();
        candidates.append(&mut self.dirty.clone());

        let mut relevant = BTreeSet::new();
        let mut prefetched = HashMap::new();
        for path in candidates {
            match self.source.read(&path) {
                Ok(text) => {
                    let fingerprint = Fingerprint::of(text.as_bytes());
                    if self.cache.lookup(&path, fingerprint).is_some() {
                        log::trace!("{} is unchanged", path.display());
                        continue;
                    }
                    prefetched.insert(path.clone(), text);
                }
                Err(err) => log::debug!("{} is unreadable: {err}", path.display()),
            }
            relevant.insert(path);
        }
        if relevant.is_empty() {
            log::debug!("reparse: no deck file changed");
            self.dirty.clear();
            return Ok(ReparseOutcome::NoChange);
        }

        let mut invalidated = relevant.clone();
        for path in &relevant {
            invalidated.extend(self.cache.dependents(path));
        }
        log::debug!(
            "reparse: {} changed, {} invalidated",
            relevant.len(),
            invalidated.len()
        );

        let plan = LoadPlan {
            trust_cache: true,
            invalidated,
            prefetched,
        };
        match self.run(&root, plan, cancelled) {
            Ok(_) if cancelled() => {
                self.dirty = relevant;
                Ok(ReparseOutcome::Superseded)
            }
            Ok(assembly) => Ok(ReparseOutcome::Updated(self.commit(root, assembly))),
            Err(Abort::Cancelled) => {
                log::debug!("reparse superseded");
                self.dirty = relevant;
                Ok(ReparseOutcome::Superseded)
            }
            Err(Abort::Fatal(err)) => {
                self.dirty = relevant;
                Err(err)
            }
        }
    }

    fn run(
        &self,
        root: &Path,
        plan: LoadPlan,
        cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Assembly, Abort> {
        Assembler::new(
            &self.source,
            &self.cache,
            &self.detector,
            &self.options,
            plan,
            cancelled,
        )
        .assemble(root)
    }

    fn commit(&mut self, root: PathBuf, assembly: Assembly) -> Arc<Deck> {
        self.cache.commit(assembly.batch);
        self.dirty.clear();
        let deck = Arc::new(assembly.deck);
        self.state = Some(DeckState {
            root,
            deck: Arc::clone(&deck),
        });
        deck
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("cached_files", &self.cache.len())
            .field("root", &self.state.as_ref().map(|state| &state.root))
            .finish_non_exhaustive()
    }
}
