//! Code fence tracking for slide splitting.
//!
//! Slide separators and frontmatter delimiters only count outside fenced
//! code, so the splitter feeds every line through a [`FenceTracker`].

/// The line that opened the fence currently being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceOpener {
    /// Fence marker character (``` or ~~~).
    pub marker: char,
    /// Length of the opening run (number of ` or ~ characters).
    pub length: usize,
    /// Zero-based line index of the opener.
    pub line: usize,
}

/// Classification of one line relative to fenced code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Ordinary text outside any fence.
    Text,
    /// Opens a fence; `info` is the trimmed info string (e.g. `ts {monaco}`).
    Open {
        /// Fence marker character.
        marker: char,
        /// Length of the marker run.
        length: usize,
        /// Trimmed text after the marker run.
        info: &'a str,
    },
    /// Content inside an open fence.
    Inside,
    /// Closes the current fence.
    Close,
}

/// Tracks fenced code regions line by line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceTracker {
    open: Option<FenceOpener>,
}

impl FenceTracker {
    /// Start outside any fence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next line would be inside a fence.
    pub fn is_inside(&self) -> bool {
        self.open.is_some()
    }

    /// The opener of the current fence, if any.
    pub fn opener(&self) -> Option<FenceOpener> {
        self.open
    }

    /// Classify `line` (at zero-based index `line_no`) and advance the state.
    pub fn advance<'a>(&mut self, line: &'a str, line_no: usize) -> LineKind<'a> {
        let (visual_indent, byte_offset) = leading_whitespace_info(line);
        let after_indent = &line[byte_offset..];

        match self.open {
            None => {
                // CommonMark: 4+ columns of indent is an indented code block
                if visual_indent > 3 {
                    return LineKind::Text;
                }
                match parse_opener(after_indent) {
                    Some((marker, length, info)) => {
                        self.open = Some(FenceOpener {
                            marker,
                            length,
                            line: line_no,
                        });
                        LineKind::Open {
                            marker,
                            length,
                            info,
                        }
                    }
                    None => LineKind::Text,
                }
            }
            Some(opener) => {
                if visual_indent <= 3
                    && let Some((marker, length)) = closing_run(after_indent)
                    && marker == opener.marker
                    && length >= opener.length
                {
                    self.open = None;
                    LineKind::Close
                } else {
                    LineKind::Inside
                }
            }
        }
    }
}

/// Returns (visual_columns, byte_offset) for leading whitespace.
/// Tabs advance to the next 4-column boundary.
fn leading_whitespace_info(line: &str) -> (usize, usize) {
    let mut col = 0;
    let mut bytes = 0;
    for b in line.bytes() {
        match b {
            b' ' => {
                col += 1;
                bytes += 1;
            }
            b'\t' => {
                col += 4 - (col % 4);
                bytes += 1;
            }
            _ => break,
        }
    }
    (col, bytes)
}

fn marker_run(after_indent: &str) -> Option<(char, usize)> {
    let first = after_indent.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run_len = after_indent.chars().take_while(|c| *c == first).count();
    (run_len >= 3).then_some((first, run_len))
}

fn parse_opener(after_indent: &str) -> Option<(char, usize, &str)> {
    let (marker, length) = marker_run(after_indent)?;
    let info = after_indent[length..].trim();
    // Backtick info strings may not contain backticks (inline code, not a fence)
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((marker, length, info))
}

/// A closing fence is a marker run followed only by whitespace.
fn closing_run(after_indent: &str) -> Option<(char, usize)> {
    let (marker, length) = marker_run(after_indent)?;
    after_indent[length..]
        .trim()
        .is_empty()
        .then_some((marker, length))
}
