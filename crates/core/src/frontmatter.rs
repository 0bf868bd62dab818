use std::path::Path;

use serde_json::Value as JsonValue;

use crate::config::SlideConfig;
use crate::error::ConfigParseError;

/// Parses a block's raw frontmatter into a [`SlideConfig`].
///
/// `first_line` is the zero-based line of `raw`'s first line within the file,
/// so errors point at the offending YAML line of the source.
pub fn parse_config(
    raw: &str,
    path: &Path,
    first_line: usize,
) -> Result<SlideConfig, ConfigParseError> {
    if raw.trim().is_empty() {
        return Ok(SlideConfig::new());
    }

    let error = |line: usize, message: String| ConfigParseError {
        path: path.to_path_buf(),
        line: first_line + line,
        message,
    };

    let yaml_value: serde_yaml::Value = serde_yaml::from_str(raw).map_err(|err| {
        let line = err.location().map_or(1, |location| location.line());
        error(line, err.to_string())
    })?;
    let json_value = serde_json::to_value(yaml_value).map_err(|err| error(1, err.to_string()))?;

    match json_value {
        JsonValue::Null => Ok(SlideConfig::new()),
        JsonValue::Object(map) => Ok(SlideConfig::from(map)),
        _ => Err(error(
            1,
            "frontmatter must be a YAML mapping at the top level".to_string(),
        )),
    }
}
