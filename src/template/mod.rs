//! Template handles over a shared namespace
//!
//! A [`Template`] is a name plus a reference to the namespace holding every
//! tree parsed through it or its siblings. Handles obtained from
//! [`Template::lookup`] and [`Template::new_template`] share that namespace;
//! `clone()` produces an independent copy, so overlays parsed into a clone
//! never leak back into the source template.
//!
//! # Example
//!
//! ```rust
//! use sqltemplate::{Template, Value};
//!
//! let base = Template::new("query")
//!     .parse(r#"select * from t where {{template "filter" .}}"#)
//!     .unwrap()
//!     .parse(r#"{{define "filter"}}id = {{.Id}}{{end}}"#)
//!     .unwrap();
//!
//! let by_name = base
//!     .clone()
//!     .parse(r#"{{define "filter"}}name = {{.Name}}{{end}}"#)
//!     .unwrap();
//!
//! let data = Value::map([("Id", Value::from(1)), ("Name", Value::from("x"))]);
//! assert_eq!(base.execute(&data).unwrap().text, "select * from t where id = ?");
//! assert_eq!(by_name.execute(&data).unwrap().text, "select * from t where name = ?");
//! ```

mod namespace;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

pub use namespace::Namespace;

use crate::config::Options;
use crate::exec::{self, ExecError, Rendered};
use crate::funcs::FuncMap;
use crate::parser::{self, Tree};
use crate::value::Value;
use crate::Error;

/// A named entry point into a namespace of parsed trees
#[derive(Debug)]
pub struct Template {
    name: String,
    namespace: Arc<Namespace>,
    options: Options,
}

impl Clone for Template {
    /// Deep copy: the clone gets its own namespace
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            namespace: Arc::new(self.namespace.deep_clone()),
            options: self.options.clone(),
        }
    }
}

impl Template {
    /// New template with an empty namespace and default options
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Arc::new(Namespace::new()),
            options: Options::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Set the action delimiters used by later parses; empty means default
    pub fn with_delims(mut self, left: &str, right: &str) -> Self {
        self.options = self.options.with_delims(left, right);
        self
    }

    /// Register functions in the shared namespace
    ///
    /// Must happen before parsing any source that calls them.
    pub fn with_funcs(self, funcs: FuncMap) -> Self {
        self.namespace.add_funcs(funcs);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The tree registered under this template's name, if any
    pub fn tree(&self) -> Option<Arc<Tree>> {
        self.namespace.lookup(&self.name)
    }

    /// Parse `source` as the body of this template
    ///
    /// Definitions in the source become sibling templates. Nothing is
    /// registered unless the whole source lexes, parses and checks.
    pub fn parse(self, source: &str) -> Result<Self, Error> {
        let funcs = self.namespace.funcs();
        let trees = parser::parse(
            &self.name,
            source,
            &self.options.left_delim,
            &self.options.right_delim,
            &funcs,
        )?;
        let parsed = trees.len();
        let installed = self.namespace.install(trees);
        debug!(template = %self.name, parsed, installed, "parsed template source");
        Ok(self)
    }

    /// Another handle on the same namespace
    pub fn new_template(&self, name: impl Into<String>) -> Template {
        Template {
            name: name.into(),
            namespace: Arc::clone(&self.namespace),
            options: self.options.clone(),
        }
    }

    /// Handle for an associated template, if one is registered
    pub fn lookup(&self, name: &str) -> Option<Template> {
        self.namespace
            .contains(name)
            .then(|| self.new_template(name))
    }

    /// Names of every template in the namespace, sorted
    pub fn templates(&self) -> Vec<String> {
        self.namespace.names()
    }

    /// Listing for error messages, empty when nothing is defined
    pub fn defined_templates(&self) -> String {
        let names = self.templates();
        if names.is_empty() {
            return String::new();
        }
        let quoted = names
            .iter()
            .map(|n| format!("{:?}", n))
            .collect::<Vec<_>>()
            .join(", ");
        format!("; defined templates are: {}", quoted)
    }

    /// Register an already parsed tree under `name`, replacing any existing one
    pub fn add_parse_tree(&self, name: &str, tree: Tree) -> Template {
        let tree = Tree { name: name.to_string(), ..tree };
        self.namespace.associate(tree);
        self.new_template(name)
    }

    pub fn execute(&self, data: &Value) -> Result<Rendered, Error> {
        let mut rendered = Rendered::new();
        self.execute_into(&mut rendered, data)?;
        Ok(rendered)
    }

    /// Execute, appending to `rendered`
    ///
    /// On error, `rendered` keeps the text and arguments written before
    /// the failure.
    pub fn execute_into(&self, rendered: &mut Rendered, data: &Value) -> Result<(), ExecError> {
        self.run(&self.name, rendered, data)
    }

    /// Execute the associated template `name`
    pub fn execute_template(&self, name: &str, data: &Value) -> Result<Rendered, Error> {
        let mut rendered = Rendered::new();
        self.run(name, &mut rendered, data)?;
        Ok(rendered)
    }

    /// Execute against any serializable data
    pub fn execute_serialize<T: Serialize + ?Sized>(&self, data: &T) -> Result<Rendered, Error> {
        let data = Value::from_serialize(data)?;
        self.execute(&data)
    }

    fn run(&self, name: &str, rendered: &mut Rendered, data: &Value) -> Result<(), ExecError> {
        debug!(template = %name, "executing template");
        let result = exec::execute(&self.namespace, name, data, &self.options, rendered);
        if let Err(err) = &result {
            debug!(template = %name, error = %err, "execution failed");
        }
        result
    }
}
