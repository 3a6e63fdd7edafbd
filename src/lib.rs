//! sqltemplate - text templates that bind values instead of printing them
//!
//! Templates use the familiar `{{ }}` action syntax with pipelines,
//! conditionals, ranges and named sub-templates. Every printed value is
//! replaced by a placeholder and collected into an ordered argument list,
//! so the rendered text can be handed to a database driver as a
//! parameterized statement.
//!
//! # Example
//!
//! ```rust
//! use sqltemplate::{render, Value};
//!
//! let data = Value::map([("Name", "alice")]);
//! let out = render("select * from users where name = {{.Name}}", &data).unwrap();
//! assert_eq!(out.text, "select * from users where name = ?");
//! assert_eq!(out.args, vec![Value::from("alice")]);
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod funcs;
pub mod parser;
pub mod template;
pub mod value;

pub use config::{ConfigError, Options, DEFAULT_MAX_DEPTH};
pub use error::{LexError, ParseError};
pub use exec::{ExecError, Mode, Placeholder, Rendered};
pub use funcs::{builtins, Arity, Emit, FuncError, FuncMap, Function};
pub use template::{Namespace, Template};
pub use value::{AccessError, Object, Value};

use thiserror::Error;

/// Errors from compiling or executing a template
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("parse errors: {}", format_parse_errors(.0))]
    Parse(Vec<ParseError>),

    #[error("exec error: {0}")]
    Exec(#[from] ExecError),

    /// Data could not be converted into a [`Value`]
    #[error("data error: {0}")]
    Data(#[from] serde_json::Error),
}

impl From<Vec<ParseError>> for Error {
    fn from(errors: Vec<ParseError>) -> Self {
        Error::Parse(errors)
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Annotated diagnostics for compile errors; plain message otherwise
    pub fn format(&self, source: &str, filename: &str) -> String {
        match self {
            Error::Lex(e) => e.format(source, filename),
            Error::Parse(errors) => errors
                .iter()
                .map(|e| e.format(source, filename))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

/// Parse and execute `source` once with default options
///
/// # Example
///
/// ```rust
/// use sqltemplate::{render, Value};
///
/// let data = Value::map([("Ids", Value::list([1, 2]))]);
/// let out = render(
///     "select * from t where id in ({{range $i, $id := .Ids}}{{if $i}}, {{end}}{{$id}}{{end}})",
///     &data,
/// )
/// .unwrap();
/// assert_eq!(out.text, "select * from t where id in (?, ?)");
/// assert_eq!(out.args.len(), 2);
/// ```
pub fn render(source: &str, data: &Value) -> Result<Rendered, Error> {
    render_with_options(source, data, Options::default())
}

/// Parse and execute `source` once with the given options
pub fn render_with_options(
    source: &str,
    data: &Value,
    options: Options,
) -> Result<Rendered, Error> {
    Template::new("main")
        .with_options(options)
        .parse(source)?
        .execute(data)
}
