//! File-level parsing: split, frontmatter, notes, headings, and features.
//!
//! The result depends only on one file's text, which is what makes it
//! cacheable per file.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::code_fence::{FenceTracker, LineKind};
use crate::config::SlideConfig;
use crate::error::{ConfigParseError, ParseWarning};
use crate::features::{FeatureDetector, FeatureSet};
use crate::frontmatter::parse_config;
use crate::options::DeckOptions;
use crate::split::{SlideBlock, split_blocks};

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").unwrap());
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--([\s\S]*?)-->").unwrap());

/// First ATX heading of a slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Heading text.
    pub text: String,
    /// Number of `#` characters.
    pub level: u8,
}

/// One block after frontmatter parsing and content scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSlide {
    /// Block as split from the file.
    pub block: SlideBlock,
    /// The block's own frontmatter (empty when absent or invalid).
    pub config: SlideConfig,
    /// Why the frontmatter was replaced with an empty config.
    pub config_error: Option<ConfigParseError>,
    /// Trimmed body with speaker notes removed.
    pub content: String,
    /// First heading outside fenced code.
    pub heading: Option<Heading>,
    /// Speaker notes.
    pub note: Option<String>,
    /// Features found in `content`.
    pub features: FeatureSet,
}

/// Every slide of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    /// Source path.
    pub path: PathBuf,
    /// Non-empty blocks in file order.
    pub slides: Vec<ParsedSlide>,
    /// Splitter warnings.
    pub warnings: Vec<ParseWarning>,
}

impl ParsedFile {
    /// Number of slides carrying a `src` key.
    pub fn import_count(&self) -> usize {
        self.slides
            .iter()
            .filter(|slide| slide.config.get("src").is_some())
            .count()
    }
}

/// Parse the text of one file.
pub fn parse_file(
    path: &Path,
    text: &str,
    detector: &FeatureDetector,
    options: &DeckOptions,
) -> ParsedFile {
    let output = split_blocks(text, path);
    let slides = output
        .blocks
        .into_iter()
        .filter(|block| !block.is_empty())
        .map(|block| parse_block(block, detector, options))
        .collect();
    ParsedFile {
        path: path.to_path_buf(),
        slides,
        warnings: output.warnings,
    }
}

fn parse_block(block: SlideBlock, detector: &FeatureDetector, options: &DeckOptions) -> ParsedSlide {
    let parsed = block
        .frontmatter
        .as_ref()
        .map(|frontmatter| parse_config(&frontmatter.text, &block.path, frontmatter.first_line))
        .transpose();
    let (config, config_error) = match parsed {
        Ok(config) => (config.unwrap_or_default(), None),
        Err(err) => {
            log::warn!("{err}; using an empty config for this slide");
            (SlideConfig::new(), Some(err))
        }
    };

    let mut content = block.body.trim().to_string();
    let note = if options.extract_notes {
        take_trailing_note(&mut content)
    } else {
        None
    };

    ParsedSlide {
        heading: first_heading(&content),
        features: detector.detect(&content),
        block,
        config,
        config_error,
        content,
        note,
    }
}

/// Remove a trailing `<!-- ... -->` from `content` and return its text.
fn take_trailing_note(content: &mut String) -> Option<String> {
    let last = COMMENT.captures_iter(content).last()?;
    let whole = last.get(0)?;
    if whole.end() != content.len() {
        return None;
    }
    let note = last.get(1).map(|inner| inner.as_str().trim().to_string())?;
    let start = whole.start();
    content.truncate(start);
    let trimmed = content.trim_end().len();
    content.truncate(trimmed);
    Some(note)
}

fn first_heading(content: &str) -> Option<Heading> {
    let mut fence = FenceTracker::new();
    for (index, line) in content.lines().enumerate() {
        if fence.advance(line, index) != LineKind::Text {
            continue;
        }
        if let Some(captures) = HEADING.captures(line) {
            let level = u8::try_from(captures[1].len()).ok()?;
            return Some(Heading {
                text: captures[2].trim().to_string(),
                level,
            });
        }
    }
    None
}
