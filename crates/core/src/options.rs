//! Deck parsing options.

use serde::Deserialize;

use crate::features::MarkerRule;

/// Options controlling how decks are split, expanded, and scanned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeckOptions {
    /// Resolve sibling imports of one file on the rayon pool.
    pub parallel_imports: bool,
    /// Move a trailing HTML comment out of the content into speaker notes.
    pub extract_notes: bool,
    /// Recognize `$inline$` math in addition to `$$inline$$`.
    pub math_single_dollar: bool,
    /// Drop slides whose frontmatter sets `disabled: true`.
    pub skip_disabled: bool,
    /// Extra regex markers mapped to custom feature tags.
    pub markers: Vec<MarkerRule>,
}

impl DeckOptions {
    /// Defaults for interactive editing.
    pub const fn new() -> Self {
        Self {
            parallel_imports: true,
            extract_notes: true,
            math_single_dollar: true,
            skip_disabled: true,
            markers: Vec::new(),
        }
    }

    /// Same as [`DeckOptions::new`] with imports resolved on the calling thread.
    pub const fn sequential() -> Self {
        Self {
            parallel_imports: false,
            extract_notes: true,
            math_single_dollar: true,
            skip_disabled: true,
            markers: Vec::new(),
        }
    }
}

impl Default for DeckOptions {
    fn default() -> Self {
        Self::new()
    }
}
