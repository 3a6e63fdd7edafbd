//! Template options, loadable from TOML
//!
//! ```toml
//! left_delim = "[["
//! right_delim = "]]"
//! placeholder = "dollar"
//! mode = "parameterized"
//! max_depth = 50
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::exec::{Mode, Placeholder};

/// Errors that can occur when loading options
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Default limit on nested template invocations
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Parse and execution settings carried by a template handle
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Opening action delimiter
    pub left_delim: String,
    /// Closing action delimiter
    pub right_delim: String,
    pub placeholder: Placeholder,
    pub mode: Mode,
    /// Nested template invocations allowed before execution fails
    ///
    /// Execution recurses on the native stack, so the usable ceiling depends
    /// on the calling thread's stack size. The default of 100 fits a 2 MiB
    /// thread; raise it only on threads with larger stacks.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            left_delim: "{{".to_string(),
            right_delim: "}}".to_string(),
            placeholder: Placeholder::default(),
            mode: Mode::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load options from a TOML string; missing keys keep their defaults
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Empty delimiters select the defaults
    pub fn with_delims(mut self, left: &str, right: &str) -> Self {
        self.left_delim = if left.is_empty() { "{{" } else { left }.to_string();
        self.right_delim = if right.is_empty() { "}}" } else { right }.to_string();
        self
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.left_delim, "{{");
        assert_eq!(options.right_delim, "}}");
        assert_eq!(options.placeholder, Placeholder::Question);
        assert_eq!(options.mode, Mode::Parameterized);
        assert_eq!(options.max_depth, 100);
    }

    #[test]
    fn test_from_str_partial() {
        let options = Options::from_str(
            r#"
            left_delim = "[["
            right_delim = "]]"
            placeholder = "dollar"
            "#,
        )
        .expect("Should parse");
        assert_eq!(options.left_delim, "[[");
        assert_eq!(options.placeholder, Placeholder::Dollar);
        assert_eq!(options.max_depth, 100);
    }

    #[test]
    fn test_from_str_rejects_unknown_placeholder() {
        let err = Options::from_str(r#"placeholder = "percent""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_empty_delims_fall_back() {
        let options = Options::new().with_delims("", ">>");
        assert_eq!(options.left_delim, "{{");
        assert_eq!(options.right_delim, ">>");
    }
}
