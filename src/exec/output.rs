//! Output channel: rendered text plus the ordered argument list

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Marker written where a value is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Dollar,
    /// `:1`, `:2`, ...
    Colon,
    /// `@p1`, `@p2`, ...
    At,
}

impl Placeholder {
    /// Marker for the value at 1-based `position`
    pub fn marker(&self, position: usize) -> String {
        match self {
            Placeholder::Question => "?".to_string(),
            Placeholder::Dollar => format!("${}", position),
            Placeholder::Colon => format!(":{}", position),
            Placeholder::At => format!("@p{}", position),
        }
    }
}

/// Whether printed values are bound or written as text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Parameterized,
    /// Values are written as display text and no arguments are collected
    Inline,
}

/// Result of one execution
///
/// The i-th placeholder in `text` corresponds to `args[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rendered {
    pub text: String,
    pub args: Vec<Value>,
}

impl Rendered {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.text, self.args)
    }
}

pub(crate) struct Output<'a> {
    rendered: &'a mut Rendered,
    placeholder: Placeholder,
    mode: Mode,
}

impl<'a> Output<'a> {
    pub fn new(rendered: &'a mut Rendered, placeholder: Placeholder, mode: Mode) -> Self {
        Self {
            rendered,
            placeholder,
            mode,
        }
    }

    pub fn write_text(&mut self, text: &str) {
        self.rendered.text.push_str(text);
    }

    pub fn write_value(&mut self, value: Value) {
        match self.mode {
            Mode::Parameterized => {
                self.rendered.args.push(value);
                let marker = self.placeholder.marker(self.rendered.args.len());
                self.rendered.text.push_str(&marker);
            }
            Mode::Inline => self.rendered.text.push_str(&value.to_string()),
        }
    }
}
