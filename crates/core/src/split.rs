//! Splits a Markdown source into slide blocks.
//!
//! Slides are separated by lines made only of three or more hyphens. A
//! separator that is exactly `---` and is followed by YAML-shaped lines and a
//! closing `---` opens the next slide's frontmatter instead. Separators inside
//! fenced code never split.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::code_fence::{FenceTracker, LineKind};
use crate::error::{ParseWarning, SourceLocation};
use crate::model::LineSpan;

/// How a block's frontmatter was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FrontmatterStyle {
    /// Between `---` delimiters.
    Dashes,
    /// Inside a ```` ```yaml ```` fence at the top of the block.
    YamlFence,
}

/// Raw frontmatter captured from a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrontmatter {
    /// YAML text without delimiters.
    pub text: String,
    /// Zero-based line of the first YAML line.
    pub first_line: usize,
    /// Delimiter style.
    pub style: FrontmatterStyle,
}

/// One slide-sized segment of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideBlock {
    /// File the block was split from.
    pub path: PathBuf,
    /// Frontmatter, if the block has one.
    pub frontmatter: Option<RawFrontmatter>,
    /// Markdown after the frontmatter.
    pub body: String,
    /// Lines of the block, frontmatter delimiters included.
    pub span: LineSpan,
    /// First line of `body`.
    pub content_start: usize,
}

impl SlideBlock {
    /// Whether the block covers no lines at all (e.g. back-to-back separators).
    pub fn is_empty(&self) -> bool {
        self.span.is_empty() && self.frontmatter.is_none()
    }
}

/// Result of splitting one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitOutput {
    /// Blocks in file order; the first one carries the headmatter.
    pub blocks: Vec<SlideBlock>,
    /// Anomalies that did not stop splitting.
    pub warnings: Vec<ParseWarning>,
}

static YAML_KEY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[A-Za-z0-9_$'"][^:#]*:(\s|$)"#).unwrap());

/// Split `text` (read from `path`) into slide blocks.
pub fn split_blocks(text: &str, path: &Path) -> SplitOutput {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let mut splitter = Splitter {
        path,
        lines: &lines,
        output: SplitOutput::default(),
    };
    splitter.run();
    splitter.output
}

/// Whether `line` separates two slides.
pub fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line.len() >= 3 && line.bytes().all(|b| b == b'-')
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == "---"
}

fn is_yaml_key_line(line: &str) -> bool {
    YAML_KEY_LINE.is_match(line)
}

fn is_yaml_shaped(line: &str) -> bool {
    line.trim().is_empty()
        || is_yaml_key_line(line)
        || line.starts_with([' ', '\t', '#'])
        || line.starts_with("- ")
        || line.trim_end() == "-"
}

#[derive(Debug, Clone, Copy)]
struct PendingBlock {
    start: usize,
    frontmatter: Option<(usize, usize)>,
    content_start: usize,
}

impl PendingBlock {
    fn at(start: usize) -> Self {
        Self {
            start,
            frontmatter: None,
            content_start: start,
        }
    }
}

struct Splitter<'a> {
    path: &'a Path,
    lines: &'a [&'a str],
    output: SplitOutput,
}

impl Splitter<'_> {
    fn run(&mut self) {
        let mut fence = FenceTracker::new();
        let mut current = PendingBlock::at(0);
        let mut index = 0;

        if let Some((open, close)) = self.head_frontmatter() {
            current.frontmatter = Some((open + 1, close));
            current.content_start = close + 1;
            index = close + 1;
        }

        while index < self.lines.len() {
            let line = self.lines[index];
            if !fence.is_inside() && is_separator(line) {
                self.finish(current, index);
                current = PendingBlock::at(index + 1);
                if let Some(close) = self.slide_frontmatter(index) {
                    current = PendingBlock {
                        start: index,
                        frontmatter: Some((index + 1, close)),
                        content_start: close + 1,
                    };
                    index = close + 1;
                } else {
                    index += 1;
                }
                continue;
            }
            fence.advance(line, index);
            index += 1;
        }

        if let Some(opener) = fence.opener() {
            let context: String = self.lines[opener.line].chars().take(40).collect();
            self.output.warnings.push(ParseWarning::UnclosedCodeFence {
                location: SourceLocation::in_file(self.path, opener.line + 1, 1),
                marker: opener.marker,
                context,
            });
        }
        self.finish(current, self.lines.len());
    }

    /// `(open, close)` delimiter lines of the headmatter.
    fn head_frontmatter(&self) -> Option<(usize, usize)> {
        let open = self.lines.iter().position(|line| !line.trim().is_empty())?;
        if !is_delimiter(self.lines[open]) {
            return None;
        }
        let close = self.closing_delimiter(open + 1)?;
        let empty = close == open + 1;
        (empty || self.is_yaml_block(open + 1, close)).then_some((open, close))
    }

    /// Closing delimiter line of frontmatter opened by the separator at `separator`.
    fn slide_frontmatter(&mut self, separator: usize) -> Option<usize> {
        if !is_delimiter(self.lines[separator]) {
            return None;
        }
        let first = separator + 1;
        let key_line = self.first_key_line(first)?;
        let Some(close) = self.closing_delimiter(key_line + 1) else {
            if self.looks_unclosed(key_line) {
                self.output.warnings.push(ParseWarning::UnclosedFrontmatter {
                    location: SourceLocation::in_file(self.path, key_line + 1, 1),
                });
            }
            return None;
        };
        self.is_yaml_block(first, close).then_some(close)
    }

    /// First line from `from` that is neither blank nor a `#` comment, if it
    /// is a `key:` line. Stops at the next separator.
    fn first_key_line(&self, from: usize) -> Option<usize> {
        let index = (from..self.lines.len()).find(|&index| {
            let line = self.lines[index];
            !(line.trim().is_empty() || line.starts_with('#'))
        })?;
        let line = self.lines[index];
        (!is_separator(line) && is_yaml_key_line(line)).then_some(index)
    }

    /// Whether an unterminated run starting at `key_line` was meant as
    /// frontmatter: a lowercase key followed by YAML-shaped lines up to the
    /// first blank line. `Note: ...` style prose stays quiet.
    fn looks_unclosed(&self, key_line: usize) -> bool {
        self.lines[key_line].starts_with(|c: char| c.is_ascii_lowercase())
            && self.lines[key_line..]
                .iter()
                .take_while(|line| !line.trim().is_empty() && !is_separator(line))
                .all(|line| is_yaml_shaped(line))
    }

    fn closing_delimiter(&self, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&index| is_delimiter(self.lines[index]))
    }

    fn is_yaml_block(&self, from: usize, to: usize) -> bool {
        self.first_key_line(from).is_some_and(|key_line| key_line < to)
            && self.lines[from..to].iter().all(|line| is_yaml_shaped(line))
    }

    /// `(open, close)` fence lines of a ```` ```yaml ```` block opening the content.
    fn yaml_fence(&self, from: usize, end: usize) -> Option<(usize, usize)> {
        let open = (from..end).find(|&index| !self.lines[index].trim().is_empty())?;
        let mut tracker = FenceTracker::new();
        match tracker.advance(self.lines[open], open) {
            LineKind::Open { info: "yaml", .. } => {}
            _ => return None,
        }
        let close = (open + 1..end)
            .find(|&index| tracker.advance(self.lines[index], index) == LineKind::Close)?;
        Some((open, close))
    }

    fn finish(&mut self, pending: PendingBlock, end: usize) {
        let mut style = FrontmatterStyle::Dashes;
        let mut frontmatter = pending.frontmatter;
        let mut content_start = pending.content_start.min(end);

        if frontmatter.is_none()
            && let Some((open, close)) = self.yaml_fence(content_start, end)
        {
            style = FrontmatterStyle::YamlFence;
            frontmatter = Some((open + 1, close));
            content_start = close + 1;
        }

        let frontmatter = frontmatter.map(|(first, close)| RawFrontmatter {
            text: self.lines[first..close].join("\n"),
            first_line: first,
            style,
        });
        self.output.blocks.push(SlideBlock {
            path: self.path.to_path_buf(),
            frontmatter,
            body: self.lines[content_start..end].join("\n"),
            span: LineSpan::new(pending.start, end),
            content_start,
        });
    }
}
