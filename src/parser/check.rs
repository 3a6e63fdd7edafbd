//! Scope checking and lowering of parsed items into template trees
//!
//! Definitions are split out into their own trees, `block` becomes a
//! definition plus an invocation, and every variable and function reference
//! is validated before anything can execute.

use std::sync::Arc;

use crate::error::ParseError;
use crate::funcs::FuncMap;
use crate::parser::ast::*;
use crate::parser::grammar::{Item, RawBranch};

/// Lower the items of one source into trees
///
/// The tree named `name` holds the top-level body; every `define` and
/// `block` contributes one more tree.
pub(crate) fn lower(
    name: &str,
    source: Arc<str>,
    items: Vec<Spanned<Item>>,
    funcs: &FuncMap,
) -> Result<Vec<Tree>, ParseError> {
    let mut checker = Checker {
        funcs,
        source,
        vars: vec!["$".to_string()],
        range_depth: 0,
        trees: Vec::new(),
    };
    let end = items.last().map(|i| i.span.end).unwrap_or(0);
    let root = checker.list(items, true)?;
    let tree = Tree::new(name, root, checker.source.clone());
    checker.add_tree(tree, 0..end)?;
    Ok(checker.trees)
}

struct Checker<'f> {
    funcs: &'f FuncMap,
    source: Arc<str>,
    /// Declared variables, innermost last
    vars: Vec<String>,
    range_depth: usize,
    trees: Vec<Tree>,
}

impl Checker<'_> {
    fn list(&mut self, items: Vec<Spanned<Item>>, top_level: bool) -> Result<List, ParseError> {
        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            let span = item.span;
            let node = match item.node {
                Item::Text(text) => Node::Text(text),
                Item::Action(pipeline) => {
                    self.pipeline(&pipeline, "command", 1)?;
                    Node::Action(pipeline)
                }
                Item::If(branch) => Node::If(self.branch(branch, "if")?),
                Item::With(branch) => Node::With(self.branch(branch, "with")?),
                Item::Range(branch) => Node::Range(self.range(branch)?),
                Item::Define { name, body } => {
                    if !top_level {
                        return Err(ParseError::NestedDefine {
                            name: name.node,
                            span: name.span,
                        });
                    }
                    self.definition(name, body)?;
                    continue;
                }
                Item::Block {
                    name,
                    pipeline,
                    body,
                } => {
                    self.pipeline(&pipeline, "block", 1)?;
                    self.definition(name.clone(), body)?;
                    Node::Template(Invocation {
                        name: name.node,
                        pipeline: Some(pipeline),
                    })
                }
                Item::Template { name, pipeline } => {
                    if let Some(pipeline) = &pipeline {
                        self.pipeline(pipeline, "template", 1)?;
                    }
                    Node::Template(Invocation {
                        name: name.node,
                        pipeline,
                    })
                }
                Item::Break | Item::Continue => {
                    let is_break = matches!(item.node, Item::Break);
                    if self.range_depth == 0 {
                        return Err(ParseError::OutsideRange {
                            keyword: if is_break { "break" } else { "continue" }.to_string(),
                            span,
                        });
                    }
                    if is_break {
                        Node::Break
                    } else {
                        Node::Continue
                    }
                }
            };
            nodes.push(Spanned::new(node, span));
        }
        Ok(nodes)
    }

    fn branch(&mut self, raw: RawBranch, construct: &str) -> Result<Branch, ParseError> {
        let mark = self.vars.len();
        self.pipeline(&raw.pipeline, construct, 1)?;
        let declared = self.vars.len();
        let list = self.list(raw.list, false)?;
        self.vars.truncate(declared);
        let else_list = raw
            .else_list
            .map(|items| self.list(items, false))
            .transpose()?;
        self.vars.truncate(mark);
        Ok(Branch {
            pipeline: raw.pipeline,
            list,
            else_list,
        })
    }

    fn range(&mut self, raw: RawBranch) -> Result<Branch, ParseError> {
        let mark = self.vars.len();
        self.pipeline(&raw.pipeline, "range", 2)?;
        self.range_depth += 1;
        let list = self.list(raw.list, false);
        self.range_depth -= 1;
        let list = list?;
        self.vars.truncate(mark);
        let else_list = raw
            .else_list
            .map(|items| self.list(items, false))
            .transpose()?;
        self.vars.truncate(mark);
        Ok(Branch {
            pipeline: raw.pipeline,
            list,
            else_list,
        })
    }

    /// Definition bodies see only `$`
    fn definition(
        &mut self,
        name: Spanned<String>,
        body: Vec<Spanned<Item>>,
    ) -> Result<(), ParseError> {
        let saved_vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let saved_depth = std::mem::replace(&mut self.range_depth, 0);
        let root = self.list(body, false);
        self.vars = saved_vars;
        self.range_depth = saved_depth;

        let tree = Tree::new(name.node, root?, self.source.clone());
        self.add_tree(tree, name.span)
    }

    /// An empty body never displaces a non-empty one from the same source
    fn add_tree(&mut self, tree: Tree, span: Span) -> Result<(), ParseError> {
        match self.trees.iter().position(|t| t.name == tree.name) {
            Some(pos) => {
                if tree.is_empty() {
                    return Ok(());
                }
                if !self.trees[pos].is_empty() {
                    return Err(ParseError::Redefined {
                        name: tree.name,
                        span,
                    });
                }
                self.trees[pos] = tree;
            }
            None => self.trees.push(tree),
        }
        Ok(())
    }

    fn is_declared(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v == name)
    }

    fn pipeline(
        &mut self,
        pipeline: &Pipeline,
        construct: &str,
        max_decl: usize,
    ) -> Result<(), ParseError> {
        if pipeline.decl.len() > max_decl {
            return Err(ParseError::TooManyDeclarations {
                construct: construct.to_string(),
                span: pipeline.span.clone(),
            });
        }
        for (stage, command) in pipeline.commands.iter().enumerate() {
            self.command(command, stage)?;
        }
        for decl in &pipeline.decl {
            if pipeline.is_assign {
                if !self.is_declared(&decl.node) {
                    return Err(ParseError::UndefinedVariable {
                        name: decl.node.clone(),
                        span: decl.span.clone(),
                    });
                }
            } else {
                self.vars.push(decl.node.clone());
            }
        }
        Ok(())
    }

    fn command(&mut self, command: &Command, stage: usize) -> Result<(), ParseError> {
        if let Some(head) = command.head() {
            if matches!(head.node, Operand::Nil) && stage == 0 {
                return Err(ParseError::NilCommand {
                    span: head.span.clone(),
                });
            }
            let constant = head.node.is_literal() || matches!(head.node, Operand::Dot);
            if constant && stage > 0 {
                return Err(ParseError::NotExecutable {
                    stage: stage + 1,
                    span: command.span.clone(),
                });
            }
            if constant && command.operands.len() > 1 {
                return Err(ParseError::NotAFunction {
                    operand: head.node.to_string(),
                    span: command.span.clone(),
                });
            }
        }
        for operand in &command.operands {
            self.operand(operand)?;
        }
        Ok(())
    }

    fn operand(&mut self, operand: &Spanned<Operand>) -> Result<(), ParseError> {
        match &operand.node {
            Operand::Variable { name, .. } if !self.is_declared(name) => {
                Err(ParseError::UndefinedVariable {
                    name: name.clone(),
                    span: operand.span.clone(),
                })
            }
            Operand::Function(name) if !self.funcs.contains_key(name) => {
                Err(ParseError::UndefinedFunction {
                    name: name.clone(),
                    span: operand.span.clone(),
                })
            }
            Operand::Pipeline(inner) => self.pipeline(inner, "parenthesized pipeline", 1),
            _ => Ok(()),
        }
    }
}
