//! Parser for template source: lexing, grammar and scope checking

pub mod ast;
mod check;
mod grammar;
pub mod lexer;

use std::sync::Arc;

pub use ast::*;

use crate::funcs::FuncMap;
use crate::Error;

/// Parse `source` into trees using the given delimiters
///
/// The first tree returned is not guaranteed to be the one named `name`;
/// callers install them by name. Function names are checked against
/// `funcs`, so they must be registered before parsing.
pub fn parse(
    name: &str,
    source: &str,
    left: &str,
    right: &str,
    funcs: &FuncMap,
) -> Result<Vec<Tree>, Error> {
    let tokens = lexer::tokenize(source, left, right)?;
    let items = grammar::parse_items(source, tokens)?;
    let trees = check::lower(name, Arc::from(source), items, funcs).map_err(|e| vec![e])?;
    Ok(trees)
}
