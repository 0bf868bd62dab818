#![deny(missing_docs)]
//! Slidemark core: splits Markdown slide decks, resolves `src` imports, and
//! keeps the assembled deck current with incremental reparses.

mod assemble;

/// Per-file parse cache and dependency graph.
pub mod cache;
/// Code fence tracking.
pub mod code_fence;
/// Slide configuration and merge policy.
pub mod config;
/// Stateful parse and reparse engine.
pub mod engine;
/// Core error and diagnostic types.
pub mod error;
/// Feature detection.
pub mod features;
/// YAML frontmatter parsing.
pub mod frontmatter;
/// Import directives, selections, and path resolution.
pub mod import;
/// Deck output model.
pub mod model;
/// Parsing options.
pub mod options;
/// Serialized reparse queue.
pub mod queue;
/// File-level slide parsing.
pub mod slide;
/// File sources.
pub mod source;
/// Slide block splitting.
pub mod split;

pub use cache::{CacheEntry, DependencyGraph, Fingerprint, ParseCache};
pub use config::{KeyPolicy, SlideConfig, key_policy};
pub use engine::{Engine, ReparseOutcome};
pub use error::{
    ConfigParseError, DeckError, ImportCycleError, ImportError, ParseDiagnostics, ParseWarning,
    RecoverableError, SlideError, SourceLocation,
};
pub use features::{Feature, FeatureDetector, FeatureSet, MarkerRule};
pub use frontmatter::parse_config;
pub use import::{ImportDirective, Selection, SelectionError, SelectionSegment, resolve_target};
pub use model::{Deck, LineSpan, Provenance, Slide};
pub use options::DeckOptions;
pub use queue::{QueueStatus, ReparseQueue};
pub use slide::{Heading, ParsedFile, ParsedSlide, parse_file};
pub use source::{FileSource, FsSource, MemorySource, normalize_path};
pub use split::{FrontmatterStyle, RawFrontmatter, SlideBlock, SplitOutput, split_blocks};
