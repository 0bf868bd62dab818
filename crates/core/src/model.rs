//! Deck, slide, and provenance types handed to rendering collaborators.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::SlideConfig;
use crate::error::{ImportError, ParseDiagnostics};
use crate::features::FeatureSet;
use crate::split::SlideBlock;

/// A range of lines within one file (zero-based, end-exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct LineSpan {
    /// First line of the range.
    pub start: usize,
    /// One past the last line of the range.
    pub end: usize,
}

impl LineSpan {
    /// Create a span covering `start..end`.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of lines covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no lines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether zero-based `line` falls inside the span.
    pub fn contains(&self, line: usize) -> bool {
        (self.start..self.end).contains(&line)
    }
}

/// Where a piece of resolved content came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Originating file.
    pub file: PathBuf,
    /// Lines of the whole block, frontmatter included.
    pub span: LineSpan,
    /// First line of the block's Markdown content.
    pub content_start: usize,
}

impl Provenance {
    /// Provenance of a split block.
    pub fn of(block: &SlideBlock) -> Self {
        Self {
            file: block.path.clone(),
            span: block.span,
            content_start: block.content_start,
        }
    }
}

/// A fully resolved slide of the deck.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// Position in the deck (0-based, contiguous).
    pub index: usize,
    /// Effective configuration after head, slide, and importer merging.
    pub config: SlideConfig,
    /// Markdown body with frontmatter and speaker notes removed.
    pub content: String,
    /// `title` from the config, else the first heading.
    pub title: Option<String>,
    /// `level` from the config, else the first heading's depth.
    pub level: Option<u8>,
    /// Speaker notes taken from a trailing HTML comment.
    pub note: Option<String>,
    /// Optional features the content uses.
    pub features: FeatureSet,
    /// Block this slide was read from.
    pub source: Provenance,
    /// Importing slides, outermost first; empty for root-file slides.
    pub importers: Vec<Provenance>,
    /// Set on placeholder slides standing in for a failed import.
    pub broken_import: Option<ImportError>,
}

impl Slide {
    /// Whether the slide asked to be hidden from presentation.
    pub fn is_hidden(&self) -> bool {
        self.config.hide()
    }

    /// Whether this slide stands in for a failed import.
    pub fn is_placeholder(&self) -> bool {
        self.broken_import.is_some()
    }
}

/// The parsed presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    /// Root file the deck was parsed from.
    pub root: PathBuf,
    /// Deck-wide headmatter.
    pub head: SlideConfig,
    /// Slides in presentation order.
    pub slides: Vec<Slide>,
    /// Union of every slide's features.
    pub features: FeatureSet,
    /// Non-fatal problems found while parsing.
    pub diagnostics: ParseDiagnostics,
    /// Every file the deck was assembled from, including missing import targets
    /// and the lookup candidates tried before each resolved import.
    pub files: BTreeSet<PathBuf>,
}

impl Deck {
    /// Number of slides.
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Whether the deck has no slides.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Slide at `index`.
    pub fn slide(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    /// Whether `path` contributed to this deck.
    pub fn depends_on(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// First slide whose source block covers zero-based `line` of `file`.
    pub fn slide_at(&self, file: &Path, line: usize) -> Option<&Slide> {
        self.slides
            .iter()
            .find(|slide| slide.source.file == file && slide.source.span.contains(line))
    }
}
