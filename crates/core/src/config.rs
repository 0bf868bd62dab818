//! Slide configuration maps and the head/slide merge policy.
//!
//! Configs are layered as `inherited(head) ⊕ slide ⊕ importer overrides`.
//! Layering replaces values wholesale unless [`KEY_POLICIES`] lists the key
//! as additive.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a frontmatter key behaves when configs are layered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Inherited from the headmatter, replaced wholesale by slide values.
    Inherit,
    /// Only applies to the slide that declares it.
    Local,
    /// Arrays are unioned, base entries first.
    UnionArray,
    /// Maps are merged one level deep, overlay keys win.
    MergeMap,
}

/// Keys whose policy differs from [`KeyPolicy::Inherit`].
pub const KEY_POLICIES: &[(&str, KeyPolicy)] = &[
    ("layout", KeyPolicy::Local),
    ("class", KeyPolicy::Local),
    ("hide", KeyPolicy::Local),
    ("disabled", KeyPolicy::Local),
    ("src", KeyPolicy::Local),
    ("title", KeyPolicy::Local),
    ("level", KeyPolicy::Local),
    ("routeAlias", KeyPolicy::Local),
    ("clicks", KeyPolicy::Local),
    ("defaults", KeyPolicy::Local),
    ("addons", KeyPolicy::UnionArray),
    ("fonts", KeyPolicy::MergeMap),
    ("htmlAttrs", KeyPolicy::MergeMap),
];

/// Look up the layering policy for `key`.
pub fn key_policy(key: &str) -> KeyPolicy {
    KEY_POLICIES
        .iter()
        .find(|(name, _)| *name == key)
        .map_or(KeyPolicy::Inherit, |(_, policy)| *policy)
}

/// Frontmatter of a slide or deck as an ordered key/value map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlideConfig(Map<String, Value>);

impl SlideConfig {
    /// Empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config inherited by every slide from the headmatter: head keys
    /// without local ones, then the head's `defaults` map on top.
    pub fn inherited_from(head: &SlideConfig) -> Self {
        let mut base = Self(
            head.0
                .iter()
                .filter(|(key, _)| key_policy(key) != KeyPolicy::Local)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );
        if let Some(defaults) = head.defaults() {
            base.overlay(&Self(defaults.clone()));
        }
        base
    }

    /// Layer `other` on top of `self`.
    pub fn overlay(&mut self, other: &SlideConfig) {
        for (key, value) in &other.0 {
            let merged = match (key_policy(key), self.0.get(key)) {
                (KeyPolicy::UnionArray, Some(base)) => union_arrays(base, value),
                (KeyPolicy::MergeMap, Some(base)) => merge_maps(base, value),
                _ => value.clone(),
            };
            self.0.insert(key.clone(), merged);
        }
    }

    /// A copy without `key`.
    pub fn without(&self, key: &str) -> Self {
        let mut copy = self.clone();
        copy.0.remove(key);
        copy
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Whether no keys are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Layout name.
    pub fn layout(&self) -> Option<&str> {
        self.str_value("layout")
    }

    /// CSS class applied to the slide.
    pub fn class(&self) -> Option<&str> {
        self.str_value("class")
    }

    /// Explicit slide title.
    pub fn title(&self) -> Option<&str> {
        self.str_value("title")
    }

    /// Explicit heading level used for the table of contents.
    pub fn level(&self) -> Option<u8> {
        self.0
            .get("level")
            .and_then(Value::as_u64)
            .and_then(|level| u8::try_from(level).ok())
    }

    /// Import directive, when the value is a string.
    pub fn src(&self) -> Option<&str> {
        self.str_value("src")
    }

    /// `hide: true`.
    pub fn hide(&self) -> bool {
        self.bool_value("hide")
    }

    /// `disabled: true`.
    pub fn disabled(&self) -> bool {
        self.bool_value("disabled")
    }

    /// Per-slide defaults declared in the headmatter.
    pub fn defaults(&self) -> Option<&Map<String, Value>> {
        self.0.get("defaults").and_then(Value::as_object)
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn bool_value(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

impl From<Map<String, Value>> for SlideConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn union_arrays(base: &Value, overlay: &Value) -> Value {
    let mut items = as_items(base);
    for item in as_items(overlay) {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}

fn merge_maps(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}
