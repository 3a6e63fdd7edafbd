//! Syntax tree types for parsed templates

use std::fmt;
use std::sync::Arc;

use crate::error::line_col;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Sequence of nodes forming a template body
pub type List = Vec<Spanned<Node>>;

/// Numeric literal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// One word of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.` the current context
    Dot,
    Nil,
    Bool(bool),
    Number(Number),
    /// Quoted literal
    String(String),
    /// `.A.B` resolved against the current context
    Field(Vec<String>),
    /// `$x` or `$x.A.B`
    Variable { name: String, fields: Vec<String> },
    /// Bare identifier naming a registered function
    Function(String),
    /// Parenthesized pipeline
    Pipeline(Box<Pipeline>),
}

impl Operand {
    /// Constants written directly in the source
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Operand::Bool(_) | Operand::Number(_) | Operand::String(_) | Operand::Nil
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Dot => write!(f, "."),
            Operand::Nil => write!(f, "nil"),
            Operand::Bool(b) => write!(f, "{}", b),
            Operand::Number(Number::Int(n)) => write!(f, "{}", n),
            Operand::Number(Number::Float(n)) => write!(f, "{}", n),
            Operand::String(s) => write!(f, "{:?}", s),
            Operand::Field(fields) => write!(f, ".{}", fields.join(".")),
            Operand::Variable { name, fields } => {
                write!(f, "{}", name)?;
                for field in fields {
                    write!(f, ".{}", field)?;
                }
                Ok(())
            }
            Operand::Function(name) => write!(f, "{}", name),
            Operand::Pipeline(_) => write!(f, "(pipeline)"),
        }
    }
}

/// A callee followed by its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operands: Vec<Spanned<Operand>>,
    pub span: Span,
}

impl Command {
    /// The first operand, which decides how the command is evaluated
    pub fn head(&self) -> Option<&Spanned<Operand>> {
        self.operands.first()
    }
}

/// Commands joined by `|`, with optional variable declarations
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Declared or assigned variable names, `$` included
    pub decl: Vec<Spanned<String>>,
    /// `=` rather than `:=`
    pub is_assign: bool,
    pub commands: Vec<Command>,
    pub span: Span,
}

/// Template body node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, written verbatim
    Text(String),
    /// Value-printing action `{{pipeline}}`
    Action(Pipeline),
    If(Branch),
    Range(Branch),
    With(Branch),
    /// `{{template "name" pipeline}}`, resolved by name at execution time
    Template(Invocation),
    Break,
    Continue,
}

/// Shared shape of `if`, `range` and `with`
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pipeline: Pipeline,
    pub list: List,
    pub else_list: Option<List>,
}

/// Named template invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub pipeline: Option<Pipeline>,
}

/// Source position for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub template: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.template, self.line, self.column)
    }
}

/// A parsed template body registered under a name
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub name: String,
    pub root: List,
    /// Source the spans point into
    pub source: Arc<str>,
}

impl Tree {
    pub fn new(name: impl Into<String>, root: List, source: Arc<str>) -> Self {
        Self {
            name: name.into(),
            root,
            source,
        }
    }

    /// True when the body holds nothing but whitespace text
    pub fn is_empty(&self) -> bool {
        self.root.iter().all(|node| match &node.node {
            Node::Text(text) => text.trim().is_empty(),
            _ => false,
        })
    }

    /// Resolve a span of this tree to a line and column
    pub fn location(&self, span: &Span) -> Location {
        let (line, column) = line_col(&self.source, span.start);
        Location {
            template: self.name.clone(),
            line,
            column,
        }
    }
}
