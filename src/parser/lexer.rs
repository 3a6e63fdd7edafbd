//! Lexer for template source
//!
//! Source is split in a single forward pass into literal text and actions.
//! Action bodies are tokenized with logos; the text between actions is kept
//! verbatim apart from whitespace removed at trim markers.

use logos::Logos;

use crate::error::{line_col, LexError};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Tokens found between a pair of delimiters
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Lexeme {
    // Control keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("range")]
    Range,
    #[token("with")]
    With,
    #[token("define")]
    Define,
    #[token("block")]
    Block,
    #[token("template")]
    Template,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("nil")]
    Nil,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Operators (longer first)
    #[token(":=")]
    Declare,
    #[token("=")]
    Assign,
    #[token("|")]
    Pipe,
    #[token(",")]
    Comma,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(".")]
    Dot,

    /// `.Name.Other` chain on the current context
    #[regex(r"(\.[a-zA-Z_][a-zA-Z0-9_]*)+", |lex| split_path(&lex.slice()[1..]))]
    Field(Vec<String>),

    /// `$name` optionally followed by a field chain; first element keeps the `$`
    #[regex(r"\$[a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*", |lex| split_path(lex.slice()))]
    Variable(Vec<String>),

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len()-1])
    })]
    #[regex(r"`[^`]*`", |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    String(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"-?0[xX][0-9a-fA-F]+", |lex| parse_hex(lex.slice()))]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
}

impl Lexeme {
    /// Source spelling of keyword tokens
    pub fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            Lexeme::If => "if",
            Lexeme::Else => "else",
            Lexeme::End => "end",
            Lexeme::Range => "range",
            Lexeme::With => "with",
            Lexeme::Define => "define",
            Lexeme::Block => "block",
            Lexeme::Template => "template",
            Lexeme::Break => "break",
            Lexeme::Continue => "continue",
            Lexeme::Nil => "nil",
            Lexeme::True => "true",
            Lexeme::False => "false",
            _ => return None,
        })
    }
}

/// A token of the full template stream
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text outside actions
    Text(String),
    LeftDelim,
    RightDelim,
    Action(Lexeme),
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

fn parse_hex(slice: &str) -> Option<i64> {
    let (negative, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, slice),
    };
    let value = i64::from_str_radix(&digits[2..], 16).ok()?;
    Some(if negative { -value } else { value })
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return None;
                }
                char::from(u8::from_str_radix(&hex, 16).ok()?)
            }
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
            }
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// `-` followed by a space right after the left delimiter
fn has_left_trim(after_delim: &str) -> bool {
    let mut chars = after_delim.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

/// A space followed by `-` right before the right delimiter
fn has_right_trim(before_delim: &str) -> bool {
    let mut chars = before_delim.chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

/// Find the right delimiter closing an action body, skipping quoted strings
fn find_close(source: &str, body_start: usize, right: &str) -> Option<usize> {
    let body = &source[body_start..];
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q == '"' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '`' {
            quote = Some(c);
            continue;
        }
        if body[i..].starts_with(right) {
            return Some(body_start + i);
        }
    }
    None
}

/// Lex template source into tokens with spans
///
/// `left` and `right` are the action delimiters, `{{` and `}}` by default.
pub fn tokenize(source: &str, left: &str, right: &str) -> Result<Vec<(Token, Span)>, LexError> {
    if left.is_empty() || right.is_empty() {
        return Err(LexError::EmptyDelimiter);
    }

    let mut tokens = Vec::new();
    let mut cursor = 0;

    while cursor < source.len() {
        let Some(found) = source[cursor..].find(left) else {
            tokens.push((Token::Text(source[cursor..].to_string()), cursor..source.len()));
            break;
        };
        let open = cursor + found;
        let mut body_start = open + left.len();
        let trim_left = has_left_trim(&source[body_start..]);
        if trim_left {
            body_start += 2;
        }

        let mut text = &source[cursor..open];
        if trim_left {
            text = text.trim_end_matches(is_space);
        }
        if !text.is_empty() {
            tokens.push((Token::Text(text.to_string()), cursor..cursor + text.len()));
        }

        let line = line_col(source, open).0;

        // Comments produce no tokens but still honor trim markers
        if source[body_start..].starts_with("/*") {
            let Some(end) = source[body_start..].find("*/") else {
                return Err(LexError::UnclosedComment {
                    line,
                    span: open..source.len(),
                });
            };
            let after = body_start + end + 2;
            let rest = &source[after..];
            let (close, trim_right) = if rest.starts_with(right) {
                (after, false)
            } else if rest.get(..2).is_some_and(has_right_trim) && rest[2..].starts_with(right) {
                (after + 2, true)
            } else {
                return Err(LexError::CommentNotClosed {
                    line,
                    span: open..after,
                });
            };
            cursor = close + right.len();
            if trim_right {
                cursor = skip_space(source, cursor);
            }
            continue;
        }

        let Some(close) = find_close(source, body_start, right) else {
            return Err(LexError::UnclosedAction {
                line,
                span: open..source.len(),
            });
        };
        let trim_right = close > body_start + 1 && has_right_trim(&source[body_start..close]);
        let body_end = if trim_right { close - 1 } else { close };

        tokens.push((Token::LeftDelim, open..body_start));
        lex_action(source, body_start, body_end, &mut tokens)?;
        tokens.push((Token::RightDelim, body_end..close + right.len()));

        cursor = close + right.len();
        if trim_right {
            cursor = skip_space(source, cursor);
        }
    }

    Ok(tokens)
}

fn skip_space(source: &str, from: usize) -> usize {
    let rest = &source[from..];
    from + (rest.len() - rest.trim_start_matches(is_space).len())
}

fn lex_action(
    source: &str,
    start: usize,
    end: usize,
    tokens: &mut Vec<(Token, Span)>,
) -> Result<(), LexError> {
    for (result, span) in Lexeme::lexer(&source[start..end]).spanned() {
        let span = start + span.start..start + span.end;
        match result {
            Ok(lexeme) => tokens.push((Token::Action(lexeme), span)),
            Err(()) => {
                return Err(LexError::UnexpectedInput {
                    found: source[span.clone()].to_string(),
                    line: line_col(source, span.start).0,
                    span,
                })
            }
        }
    }
    Ok(())
}
