//! Serialized, coalescing reparse requests shared between threads.
//!
//! At most one reparse runs at a time. Paths submitted while one is in flight
//! join a pending set and bump a generation counter; the running reparse sees
//! the newer generation, abandons its work without committing, and the pending
//! set is drained as one batch.

use std::collections::BTreeSet;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use crate::engine::{Engine, ReparseOutcome};
use crate::error::DeckError;
use crate::model::Deck;
use crate::source::{FileSource, normalize_path};

/// What [`ReparseQueue::submit`] did with a request.
#[derive(Debug, Clone)]
pub enum QueueStatus {
    /// Another thread is reparsing and will pick the paths up.
    Queued,
    /// This thread ran the reparse.
    Processed(ReparseOutcome),
}

/// Thread-safe front of an [`Engine`].
#[derive(Debug)]
pub struct ReparseQueue<S> {
    engine: Mutex<Engine<S>>,
    pending: Mutex<BTreeSet<PathBuf>>,
    generation: AtomicU64,
    debounce: Duration,
}

impl<S: FileSource> ReparseQueue<S> {
    /// Queue over an engine that has already parsed its deck.
    pub fn new(engine: Engine<S>) -> Self {
        Self::with_debounce(engine, Duration::ZERO)
    }

    /// Queue that waits `debounce` before each batch so bursts of saves
    /// coalesce.
    pub fn with_debounce(engine: Engine<S>, debounce: Duration) -> Self {
        Self {
            engine: Mutex::new(engine),
            pending: Mutex::new(BTreeSet::new()),
            generation: AtomicU64::new(0),
            debounce,
        }
    }

    /// Report changed files.
    ///
    /// Runs pending batches on the calling thread unless another thread is
    /// already doing so, in which case the paths are left for that thread.
    pub fn submit<I, P>(&self, changed: I) -> Result<QueueStatus, DeckError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.lock_pending()
            .extend(changed.into_iter().map(|path| normalize_path(path.as_ref())));
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut last: Option<ReparseOutcome> = None;
        loop {
            let mut engine = match self.engine.try_lock() {
                Ok(engine) => engine,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    return Ok(last.map_or(QueueStatus::Queued, QueueStatus::Processed));
                }
            };
            loop {
                if !self.debounce.is_zero() {
                    std::thread::sleep(self.debounce);
                }
                let started = self.generation.load(Ordering::SeqCst);
                let batch = mem::take(&mut *self.lock_pending());
                // A superseded run kept its paths in the engine; rerun for them.
                if batch.is_empty() && !matches!(last, Some(ReparseOutcome::Superseded)) {
                    break;
                }
                log::debug!("reparse queue: draining {} paths", batch.len());
                let superseded = || self.generation.load(Ordering::SeqCst) != started;
                let outcome = engine.reparse_cancellable(&batch, &superseded)?;
                last = match (last, outcome) {
                    (Some(ReparseOutcome::Updated(deck)), ReparseOutcome::NoChange) => {
                        Some(ReparseOutcome::Updated(deck))
                    }
                    (_, outcome) => Some(outcome),
                };
            }
            drop(engine);
            // Paths may have arrived after the drain but before the unlock.
            if self.lock_pending().is_empty() {
                break;
            }
        }
        Ok(last.map_or(QueueStatus::Queued, QueueStatus::Processed))
    }

    /// Last committed deck.
    pub fn deck(&self) -> Option<Arc<Deck>> {
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deck()
            .cloned()
    }

    /// Paths waiting for the next batch.
    pub fn pending(&self) -> BTreeSet<PathBuf> {
        self.lock_pending().clone()
    }

    /// Take the engine back.
    pub fn into_engine(self) -> Engine<S> {
        self.engine
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
