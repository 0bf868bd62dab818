//! Detection of optional heavy features in slide content.
//!
//! Structural markers (math, diagram and live-editor code blocks) come from
//! the markdown-rs mdast so `$` inside code never counts as math. Registered
//! marker patterns are plain regexes over the raw content.

use std::collections::BTreeSet;

use markdown::mdast::Node;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::DeckError;
use crate::options::DeckOptions;

/// An optional capability a slide needs at render time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// Inline or block math.
    Math,
    /// ```` ```mermaid ```` diagrams.
    Mermaid,
    /// ```` ```plantuml ```` diagrams.
    PlantUml,
    /// Code blocks rendered as a live Monaco editor (`{monaco}` meta).
    Monaco,
    /// Embedded `<Tweet>` components.
    Tweet,
    /// Tag registered through [`MarkerRule`].
    Custom(String),
}

impl Feature {
    /// Resolve a tag name, falling back to [`Feature::Custom`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "math" => Feature::Math,
            "mermaid" => Feature::Mermaid,
            "plantuml" => Feature::PlantUml,
            "monaco" => Feature::Monaco,
            "tweet" => Feature::Tweet,
            other => Feature::Custom(other.to_string()),
        }
    }

    /// Tag name.
    pub fn as_str(&self) -> &str {
        match self {
            Feature::Math => "math",
            Feature::Mermaid => "mermaid",
            Feature::PlantUml => "plantuml",
            Feature::Monaco => "monaco",
            Feature::Tweet => "tweet",
            Feature::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Ordered set of detected features.
pub type FeatureSet = BTreeSet<Feature>;

/// A regex marker that tags matching slides with `feature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRule {
    /// Feature tag to report.
    pub feature: String,
    /// Regular expression matched against raw slide content.
    pub pattern: String,
}

static TWEET_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Tweet\b").unwrap());

/// Scans slide content for feature markers.
#[derive(Debug, Clone)]
pub struct FeatureDetector {
    math_single_dollar: bool,
    markers: Vec<(Feature, Regex)>,
}

impl FeatureDetector {
    /// Detector with only the built-in markers.
    pub fn builtin() -> Self {
        Self {
            math_single_dollar: true,
            markers: vec![(Feature::Tweet, TWEET_MARKER.clone())],
        }
    }

    /// Detector configured from deck options, compiling registered markers.
    pub fn new(options: &DeckOptions) -> Result<Self, DeckError> {
        let mut detector = Self::builtin();
        detector.math_single_dollar = options.math_single_dollar;
        for rule in &options.markers {
            detector.register(rule)?;
        }
        Ok(detector)
    }

    /// Add a marker pattern.
    pub fn register(&mut self, rule: &MarkerRule) -> Result<(), DeckError> {
        let regex = Regex::new(&rule.pattern).map_err(|source| DeckError::Marker {
            feature: rule.feature.clone(),
            source,
        })?;
        self.markers.push((Feature::from_name(&rule.feature), regex));
        Ok(())
    }

    /// Features triggered by `content`.
    pub fn detect(&self, content: &str) -> FeatureSet {
        let mut found = FeatureSet::new();
        match markdown::to_mdast(content, &self.parse_options()) {
            Ok(root) => collect_structural(&root, &mut found),
            Err(message) => log::warn!("structural feature scan failed: {}", message),
        }
        for (feature, regex) in &self.markers {
            if regex.is_match(content) {
                found.insert(feature.clone());
            }
        }
        found
    }

    fn parse_options(&self) -> markdown::ParseOptions {
        let constructs = markdown::Constructs {
            frontmatter: false,
            math_flow: true,
            math_text: true,
            html_flow: true,
            html_text: true,
            ..markdown::Constructs::gfm()
        };
        markdown::ParseOptions {
            constructs,
            math_text_single_dollar: self.math_single_dollar,
            ..markdown::ParseOptions::default()
        }
    }
}

impl Default for FeatureDetector {
    fn default() -> Self {
        Self::builtin()
    }
}

fn collect_structural(node: &Node, found: &mut FeatureSet) {
    match node {
        Node::Math(_) | Node::InlineMath(_) => {
            found.insert(Feature::Math);
        }
        Node::Code(code) => {
            match code.lang.as_deref() {
                Some("mermaid") => {
                    found.insert(Feature::Mermaid);
                }
                Some("plantuml") => {
                    found.insert(Feature::PlantUml);
                }
                _ => {}
            }
            if code.meta.as_deref().is_some_and(|meta| meta.contains("{monaco")) {
                found.insert(Feature::Monaco);
            }
        }
        _ => {}
    }
    if let Some(children) = node.children() {
        for child in children {
            collect_structural(child, found);
        }
    }
}
