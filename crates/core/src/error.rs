use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Source location information for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    /// Optional file path
    pub file: Option<PathBuf>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create a source location with file information
    pub fn in_file(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file.display(), self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Frontmatter of a single slide that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("invalid frontmatter at {}:{line}: {message}", .path.display())]
pub struct ConfigParseError {
    /// File containing the slide.
    pub path: PathBuf,
    /// Line of the offending YAML (1-indexed, relative to the file).
    pub line: usize,
    /// Parser message.
    pub message: String,
}

/// Import failures scoped to a single `src` directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ImportError {
    /// The referenced file is missing or unreadable.
    #[error("cannot import `{request}` from {}: {reason}", .importer.display())]
    #[serde(rename_all = "camelCase")]
    NotFound {
        /// Raw directive value.
        request: String,
        /// File holding the directive.
        importer: PathBuf,
        /// Path the directive resolved to.
        resolved: PathBuf,
        /// Underlying read failure.
        reason: String,
    },
    /// The selection is malformed or points past the imported slides.
    #[error("invalid selection `{selection}` for {}: {reason}", .target.display())]
    #[serde(rename_all = "camelCase")]
    Range {
        /// Raw selection expression.
        selection: String,
        /// Imported file the selection applies to.
        target: PathBuf,
        /// Why the selection was rejected.
        reason: String,
    },
}

/// A file re-imported while it is still being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportCycleError {
    /// Resolution chain from the root file, ending with the repeated file.
    pub chain: Vec<PathBuf>,
}

impl std::fmt::Display for ImportCycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("import cycle detected: ")?;
        for (position, path) in self.chain.iter().enumerate() {
            if position > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for ImportCycleError {}

/// Errors that abort a whole parse; no deck is produced.
#[derive(Debug, Error)]
pub enum DeckError {
    /// The root file could not be read.
    #[error("cannot read deck root {}: {source}", .path.display())]
    Root {
        /// Root file path.
        path: PathBuf,
        /// Read failure reported by the file source.
        #[source]
        source: std::io::Error,
    },
    /// Imports form a cycle, so the deck has no well-defined length.
    #[error(transparent)]
    Cycle(#[from] ImportCycleError),
    /// A registered marker pattern is not a valid regular expression.
    #[error("invalid marker pattern for `{feature}`: {source}")]
    Marker {
        /// Feature tag the pattern was registered for.
        feature: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
    /// `reparse` was requested before any successful `parse`.
    #[error("reparse requested before the first parse")]
    NotParsed,
}

/// Non-fatal warnings that don't prevent rendering
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParseWarning {
    /// Code fence opened but never closed
    UnclosedCodeFence {
        /// Source location where the fence started
        location: SourceLocation,
        /// Fence marker character (backtick or tilde)
        marker: char,
        /// Surrounding context for error message
        context: String,
    },
    /// A frontmatter-looking block after a separator has no closing `---`
    UnclosedFrontmatter {
        /// Source location of the first frontmatter line
        location: SourceLocation,
    },
}

impl ParseWarning {
    /// Get the location of this warning
    pub fn location(&self) -> &SourceLocation {
        match self {
            ParseWarning::UnclosedCodeFence { location, .. } => location,
            ParseWarning::UnclosedFrontmatter { location } => location,
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseWarning::UnclosedCodeFence {
                location,
                marker,
                context,
            } => {
                write!(
                    f,
                    "Unclosed code fence ({}): {}, near '{}'",
                    marker, location, context
                )
            }
            ParseWarning::UnclosedFrontmatter { location } => {
                write!(
                    f,
                    "{}: frontmatter is never closed, treated as slide content",
                    location
                )
            }
        }
    }
}

/// Slide-scoped failure kinds carried by [`RecoverableError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum SlideError {
    /// Frontmatter failed to parse; the slide uses an empty config.
    #[error(transparent)]
    Config(#[from] ConfigParseError),
    /// An import failed; the slide is replaced by a placeholder.
    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Recoverable error information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecoverableError {
    /// What went wrong
    pub error: SlideError,
    /// Source location
    pub location: SourceLocation,
}

impl RecoverableError {
    /// Wrap a frontmatter error, locating it at the offending YAML line.
    pub fn config(error: ConfigParseError) -> Self {
        let location = SourceLocation::in_file(error.path.clone(), error.line, 1);
        Self {
            error: SlideError::Config(error),
            location,
        }
    }

    /// Wrap an import error raised by the directive at `location`.
    pub fn import(error: ImportError, location: SourceLocation) -> Self {
        Self {
            error: SlideError::Import(error),
            location,
        }
    }
}

impl std::fmt::Display for RecoverableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error at {}: {}", self.location, self.error)
    }
}

/// Collection of parse diagnostics (warnings and recoverable errors)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostics {
    /// List of non-fatal warnings
    pub warnings: Vec<ParseWarning>,
    /// List of recoverable errors
    pub errors: Vec<RecoverableError>,
}

impl ParseDiagnostics {
    /// Create a new empty diagnostics collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning to the diagnostics collection
    pub fn add_warning(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    /// Add a recoverable error to the diagnostics collection
    pub fn add_error(&mut self, error: RecoverableError) {
        self.errors.push(error);
    }

    /// Append another collection, keeping its order.
    pub fn extend(&mut self, other: ParseDiagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    /// Drop repeated entries, keeping the first occurrence of each.
    pub fn dedup(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.warnings.retain(|warning| seen.insert(warning.clone()));
        let mut seen = std::collections::HashSet::new();
        self.errors.retain(|error| seen.insert(error.clone()));
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if there are any diagnostics
    pub fn has_any(&self) -> bool {
        self.has_warnings() || self.has_errors()
    }

    /// Get total count of all diagnostics
    pub fn count(&self) -> usize {
        self.warnings.len() + self.errors.len()
    }
}
