//! Error types for lexing and parsing template source

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// 1-based line and column of a byte offset
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

/// Errors raised while splitting source into tokens
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unclosed action starting on line {line}")]
    UnclosedAction { line: usize, span: Span },

    #[error("unclosed comment starting on line {line}")]
    UnclosedComment { line: usize, span: Span },

    #[error("comment ends before closing delimiter on line {line}")]
    CommentNotClosed { line: usize, span: Span },

    #[error("unexpected {found:?} in action on line {line}")]
    UnexpectedInput {
        found: String,
        line: usize,
        span: Span,
    },

    #[error("delimiters must not be empty")]
    EmptyDelimiter,
}

impl LexError {
    pub fn span(&self) -> Option<&Span> {
        match self {
            Self::UnclosedAction { span, .. }
            | Self::UnclosedComment { span, .. }
            | Self::CommentNotClosed { span, .. }
            | Self::UnexpectedInput { span, .. } => Some(span),
            Self::EmptyDelimiter => None,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let span = self.span().cloned().unwrap_or(0..0);
        render_report(&self.to_string(), &[], span, source, filename)
    }
}

/// Errors raised while building or checking a template tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    #[error("unclosed {{{{{construct}}}}} opened on line {line}")]
    Unclosed {
        construct: String,
        line: usize,
        span: Span,
    },

    #[error("unexpected {{{{{keyword}}}}} on line {line}")]
    Unexpected {
        keyword: String,
        line: usize,
        span: Span,
    },

    #[error("undefined variable \"{name}\"")]
    UndefinedVariable { name: String, span: Span },

    #[error("function \"{name}\" not defined")]
    UndefinedFunction { name: String, span: Span },

    #[error("{{{{{keyword}}}}} outside {{{{range}}}}")]
    OutsideRange { keyword: String, span: Span },

    #[error("template \"{name}\" must be defined at the top level")]
    NestedDefine { name: String, span: Span },

    #[error("too many declarations in {construct}")]
    TooManyDeclarations { construct: String, span: Span },

    #[error("non executable command in pipeline stage {stage}")]
    NotExecutable { stage: usize, span: Span },

    #[error("can't give argument to non-function {operand}")]
    NotAFunction { operand: String, span: Span },

    #[error("nil is not a command")]
    NilCommand { span: Span },

    #[error("multiple definition of template \"{name}\"")]
    Redefined { name: String, span: Span },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            Self::Syntax { span, .. }
            | Self::Unclosed { span, .. }
            | Self::Unexpected { span, .. }
            | Self::UndefinedVariable { span, .. }
            | Self::UndefinedFunction { span, .. }
            | Self::OutsideRange { span, .. }
            | Self::NestedDefine { span, .. }
            | Self::TooManyDeclarations { span, .. }
            | Self::NotExecutable { span, .. }
            | Self::NotAFunction { span, .. }
            | Self::NilCommand { span }
            | Self::Redefined { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => render_report(message, expected, span.clone(), source, filename),
            other => render_report(&other.to_string(), &[], other.span().clone(), source, filename),
        }
    }
}

fn render_report(
    message: &str,
    expected: &[String],
    span: Span,
    source: &str,
    filename: &str,
) -> String {
    let expected_str = if expected.is_empty() {
        String::new()
    } else {
        format!("\nExpected: {}", expected.join(", "))
    };

    let mut buf = Vec::new();
    let written = Report::build(ReportKind::Error, filename, span.start)
        .with_message(message)
        .with_label(
            Label::new((filename, span))
                .with_message(format!("{}{}", message, expected_str))
                .with_color(Color::Red),
        )
        .finish()
        .write((filename, Source::from(source)), &mut buf);
    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => format!("{}: {}{}", filename, message, expected_str),
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::parser::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::parser::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                _ => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &crate::parser::lexer::Token) -> String {
    use crate::parser::lexer::{Lexeme, Token};
    match tok {
        Token::Text(_) => "text".to_string(),
        Token::LeftDelim => "left delimiter".to_string(),
        Token::RightDelim => "right delimiter".to_string(),
        Token::Action(lexeme) => match lexeme {
            Lexeme::Ident(s) => format!("identifier '{}'", s),
            Lexeme::Field(f) => format!("field '.{}'", f.join(".")),
            Lexeme::Variable(v) => format!("variable '{}'", v.join(".")),
            Lexeme::String(s) => format!("string \"{}\"", s),
            Lexeme::Int(n) => format!("number {}", n),
            Lexeme::Float(n) => format!("number {}", n),
            Lexeme::Pipe => "'|'".to_string(),
            Lexeme::Comma => "','".to_string(),
            Lexeme::Declare => "':='".to_string(),
            Lexeme::Assign => "'='".to_string(),
            Lexeme::ParenOpen => "'('".to_string(),
            Lexeme::ParenClose => "')'".to_string(),
            Lexeme::Dot => "'.'".to_string(),
            other => format!("keyword '{}'", other.keyword().unwrap_or("?")),
        },
    }
}
