//! `src` import directives and their selection ranges.
//!
//! A directive reads `path[:selection]`, where the selection is
//! `segment(','segment)*` and `segment := N | N'-'M | N'-'` with 1-based
//! positions into the imported file's fully expanded slides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::source::{FileSource, normalize_path};

/// Reasons a selection expression is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Two commas in a row, or a leading/trailing comma.
    #[error("empty selection segment")]
    EmptySegment,
    /// A position is not a number.
    #[error("`{0}` is not a slide position")]
    InvalidPosition(String),
    /// Positions are 1-based.
    #[error("slide positions start at 1")]
    ZeroPosition,
    /// `N-M` with `N > M`.
    #[error("range {start}-{end} is reversed")]
    Reversed {
        /// Range start.
        start: usize,
        /// Range end.
        end: usize,
    },
    /// A position past the last imported slide.
    #[error("slide {position} is out of range, the file has {available} slides")]
    OutOfRange {
        /// Requested position.
        position: usize,
        /// Number of imported slides.
        available: usize,
    },
}

/// One comma-separated part of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSegment {
    /// `N`
    Single(usize),
    /// `N-M`, inclusive.
    Range(usize, usize),
    /// `N-`, through the last slide.
    From(usize),
}

/// Parsed selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    segments: Vec<SelectionSegment>,
    raw: String,
}

impl Selection {
    /// Segments in expression order.
    pub fn segments(&self) -> &[SelectionSegment] {
        &self.segments
    }

    /// Expression as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Zero-based indices picked from `available` slides, in expression order.
    pub fn resolve(&self, available: usize) -> Result<Vec<usize>, SelectionError> {
        let check = |position: usize| {
            if position > available {
                Err(SelectionError::OutOfRange {
                    position,
                    available,
                })
            } else {
                Ok(position)
            }
        };
        let mut picked = Vec::new();
        for segment in &self.segments {
            match *segment {
                SelectionSegment::Single(position) => picked.push(check(position)? - 1),
                SelectionSegment::Range(start, end) => {
                    check(start)?;
                    picked.extend(start - 1..check(end)?);
                }
                SelectionSegment::From(start) => picked.extend(check(start)? - 1..available),
            }
        }
        Ok(picked)
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Selection {
    type Err = SelectionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let segments = raw
            .split(',')
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            segments,
            raw: raw.trim().to_string(),
        })
    }
}

fn parse_segment(raw: &str) -> Result<SelectionSegment, SelectionError> {
    let segment = raw.trim();
    if segment.is_empty() {
        return Err(SelectionError::EmptySegment);
    }
    match segment.split_once('-') {
        None => Ok(SelectionSegment::Single(parse_position(segment)?)),
        Some((start, end)) if end.trim().is_empty() => {
            Ok(SelectionSegment::From(parse_position(start)?))
        }
        Some((start, end)) => {
            let (start, end) = (parse_position(start)?, parse_position(end)?);
            if start > end {
                Err(SelectionError::Reversed { start, end })
            } else {
                Ok(SelectionSegment::Range(start, end))
            }
        }
    }
}

fn parse_position(raw: &str) -> Result<usize, SelectionError> {
    let raw = raw.trim();
    let position: usize = raw
        .parse()
        .map_err(|_| SelectionError::InvalidPosition(raw.to_string()))?;
    if position == 0 {
        return Err(SelectionError::ZeroPosition);
    }
    Ok(position)
}

/// A parsed `src` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    /// Referenced file as written.
    pub path: String,
    /// Positions to keep; `None` keeps every slide.
    pub selection: Option<Selection>,
}

impl ImportDirective {
    /// Parse `path[:selection]`.
    ///
    /// The text after the last `:` is only a selection when it is made of
    /// digits, commas, hyphens and spaces, so `C:\deck.md` stays a path.
    pub fn parse(raw: &str) -> Result<Self, SelectionError> {
        let raw = raw.trim();
        if let Some((path, tail)) = raw.rsplit_once(':')
            && !path.is_empty()
            && tail
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-' | ' '))
        {
            let selection = if tail.trim().is_empty() {
                None
            } else {
                Some(tail.parse()?)
            };
            return Ok(Self {
                path: path.trim_end().to_string(),
                selection,
            });
        }
        Ok(Self {
            path: raw.to_string(),
            selection: None,
        })
    }
}

/// Paths an import request may refer to, in lookup order.
///
/// - `./x` and `../x` are relative to the importing file.
/// - `/x` is relative to `root_dir`, the deck root's directory.
/// - Bare `x` is first the importing file's sibling, then `node_modules/x` in
///   each ancestor directory.
///
/// Never empty.
pub fn import_candidates(request: &str, importer: &Path, root_dir: &Path) -> Vec<PathBuf> {
    let importer_dir = importer.parent().unwrap_or_else(|| Path::new(""));
    if request.starts_with("./") || request.starts_with("../") {
        return vec![normalize_path(&importer_dir.join(request))];
    }
    if let Some(rooted) = request.strip_prefix('/') {
        return vec![normalize_path(&root_dir.join(rooted))];
    }

    let mut candidates = vec![normalize_path(&importer_dir.join(request))];
    candidates.extend(
        importer_dir
            .ancestors()
            .map(|dir| normalize_path(&dir.join("node_modules").join(request))),
    );
    candidates
}

/// Resolve an import request made from `importer`: the first
/// [`import_candidates`] entry that exists, else the first candidate.
///
/// The returned path may not exist; reading it reports the failure.
pub fn resolve_target<S: FileSource + ?Sized>(
    request: &str,
    importer: &Path,
    root_dir: &Path,
    source: &S,
) -> PathBuf {
    let candidates = import_candidates(request, importer, root_dir);
    let found = candidates.iter().position(|candidate| source.exists(candidate));
    candidates
        .into_iter()
        .nth(found.unwrap_or(0))
        .unwrap_or_default()
}
