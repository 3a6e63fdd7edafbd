//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::{line_col, ParseError};
use crate::parser::ast::*;
use crate::parser::lexer::{Lexeme, Token};

/// Raw parse output, before definitions are split out and scopes are checked
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action(Pipeline),
    If(RawBranch),
    Range(RawBranch),
    With(RawBranch),
    Define {
        name: Spanned<String>,
        body: Vec<Spanned<Item>>,
    },
    Block {
        name: Spanned<String>,
        pipeline: Pipeline,
        body: Vec<Spanned<Item>>,
    },
    Template {
        name: Spanned<String>,
        pipeline: Option<Pipeline>,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawBranch {
    pub pipeline: Pipeline,
    pub list: Vec<Spanned<Item>>,
    pub else_list: Option<Vec<Spanned<Item>>>,
}

/// Parse a token stream into raw items
pub(crate) fn parse_items(
    source: &str,
    tokens: Vec<(Token, Span)>,
) -> Result<Vec<Spanned<Item>>, Vec<ParseError>> {
    check_nesting(source, &tokens).map_err(|e| vec![e])?;

    let len = source.len();
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    template_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Report unbalanced control actions by name and line before the grammar runs
fn check_nesting(source: &str, tokens: &[(Token, Span)]) -> Result<(), ParseError> {
    let mut open: Vec<(&'static str, Span)> = Vec::new();
    let mut iter = tokens.iter().peekable();

    while let Some((tok, span)) = iter.next() {
        if *tok != Token::LeftDelim {
            continue;
        }
        let Some((Token::Action(lexeme), _)) = iter.peek() else {
            continue;
        };
        match lexeme {
            Lexeme::If | Lexeme::Range | Lexeme::With | Lexeme::Define | Lexeme::Block => {
                open.push((lexeme.keyword().unwrap_or("?"), span.clone()));
            }
            Lexeme::Else => match open.last() {
                Some((construct, _)) if matches!(*construct, "if" | "range" | "with") => {}
                _ => {
                    return Err(ParseError::Unexpected {
                        keyword: "else".to_string(),
                        line: line_col(source, span.start).0,
                        span: span.clone(),
                    })
                }
            },
            Lexeme::End => {
                if open.pop().is_none() {
                    return Err(ParseError::Unexpected {
                        keyword: "end".to_string(),
                        line: line_col(source, span.start).0,
                        span: span.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    match open.pop() {
        Some((construct, span)) => Err(ParseError::Unclosed {
            construct: construct.to_string(),
            line: line_col(source, span.start).0,
            span,
        }),
        None => Ok(()),
    }
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn variable_operand(path: Vec<String>) -> Operand {
    let mut parts = path.into_iter();
    let name = parts.next().unwrap_or_else(|| "$".to_string());
    Operand::Variable {
        name,
        fields: parts.collect(),
    }
}

/// Fold `{{else if}}` / `{{else with}}` links into nested branches
fn chain_branches(
    pipeline: Pipeline,
    list: Vec<Spanned<Item>>,
    links: Vec<(Pipeline, Vec<Spanned<Item>>, Span)>,
    else_list: Option<Vec<Spanned<Item>>>,
    make: fn(RawBranch) -> Item,
) -> RawBranch {
    let mut tail = else_list;
    for (pipeline, list, span) in links.into_iter().rev() {
        let branch = RawBranch {
            pipeline,
            list,
            else_list: tail,
        };
        tail = Some(vec![Spanned::new(make(branch), span)]);
    }
    RawBranch {
        pipeline,
        list,
        else_list: tail,
    }
}

/// `{{keyword`
fn opens<'a, I>(lexeme: Lexeme) -> impl Parser<'a, I, (), extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    just(Token::LeftDelim)
        .ignore_then(just(Token::Action(lexeme)))
        .ignored()
}

/// `{{keyword}}`
fn closing<'a, I>(lexeme: Lexeme) -> impl Parser<'a, I, (), extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    opens(lexeme).then_ignore(just(Token::RightDelim))
}

fn template_parser<'a, I>(
) -> impl Parser<'a, I, Vec<Spanned<Item>>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let close = just(Token::RightDelim);

    let string_literal = select! {
        Token::Action(Lexeme::String(s)) => s,
    }
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
    .labelled("template name");

    let variable_name = select! {
        Token::Action(Lexeme::Variable(path)) => path,
    }
    .try_map(|path: Vec<String>, span| match path.as_slice() {
        [name] => Ok(name.clone()),
        _ => Err(Rich::custom(span, "cannot declare a field chain")),
    })
    .map_with(|name, e| Spanned::new(name, span_range(&e.span())));

    // Pipelines nest through parentheses
    let pipeline = recursive(|pipeline| {
        let atom = select! {
            Token::Action(Lexeme::Dot) => Operand::Dot,
            Token::Action(Lexeme::Nil) => Operand::Nil,
            Token::Action(Lexeme::True) => Operand::Bool(true),
            Token::Action(Lexeme::False) => Operand::Bool(false),
            Token::Action(Lexeme::Int(n)) => Operand::Number(Number::Int(n)),
            Token::Action(Lexeme::Float(n)) => Operand::Number(Number::Float(n)),
            Token::Action(Lexeme::String(s)) => Operand::String(s),
            Token::Action(Lexeme::Field(fields)) => Operand::Field(fields),
            Token::Action(Lexeme::Variable(path)) => variable_operand(path),
            Token::Action(Lexeme::Ident(name)) => Operand::Function(name),
        };

        let operand = choice((
            atom,
            pipeline
                .clone()
                .delimited_by(
                    just(Token::Action(Lexeme::ParenOpen)),
                    just(Token::Action(Lexeme::ParenClose)),
                )
                .map(|p| Operand::Pipeline(Box::new(p))),
        ))
        .map_with(|op, e| Spanned::new(op, span_range(&e.span())));

        let command = operand
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(|operands, e| Command {
                operands,
                span: span_range(&e.span()),
            })
            .labelled("command");

        // `$x :=`, `$i, $e :=` or `$x =`
        let declaration = variable_name
            .clone()
            .then(
                just(Token::Action(Lexeme::Comma))
                    .ignore_then(variable_name.clone())
                    .or_not(),
            )
            .then(choice((
                just(Token::Action(Lexeme::Declare)).to(false),
                just(Token::Action(Lexeme::Assign)).to(true),
            )))
            .map(|((first, second), is_assign)| {
                let mut decl = vec![first];
                decl.extend(second);
                (decl, is_assign)
            });

        declaration
            .or_not()
            .then(
                command
                    .separated_by(just(Token::Action(Lexeme::Pipe)))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map_with(|(decl, commands), e| {
                let (decl, is_assign) = decl.unwrap_or_default();
                Pipeline {
                    decl,
                    is_assign,
                    commands,
                    span: span_range(&e.span()),
                }
            })
            .boxed()
    });

    recursive(|list| {
        let text = select! {
            Token::Text(s) => Item::Text(s),
        };

        let else_clause = closing(Lexeme::Else).ignore_then(list.clone());
        let end_clause = closing(Lexeme::End);

        // `{{keyword pipeline}}`
        let header = |lexeme: Lexeme| {
            opens(lexeme)
                .ignore_then(pipeline.clone())
                .then_ignore(close.clone())
        };

        // `{{else keyword pipeline}} list`
        let link = |lexeme: Lexeme| {
            opens(Lexeme::Else)
                .ignore_then(just(Token::Action(lexeme)))
                .ignore_then(pipeline.clone())
                .then_ignore(close.clone())
                .then(list.clone())
                .map_with(|(pipeline, list), e| (pipeline, list, span_range(&e.span())))
        };

        let if_item = header(Lexeme::If)
            .then(list.clone())
            .then(link(Lexeme::If).repeated().collect::<Vec<_>>())
            .then(else_clause.clone().or_not())
            .then_ignore(end_clause.clone())
            .map(|(((pipeline, list), links), else_list)| {
                Item::If(chain_branches(pipeline, list, links, else_list, Item::If))
            });

        let with_item = header(Lexeme::With)
            .then(list.clone())
            .then(link(Lexeme::With).repeated().collect::<Vec<_>>())
            .then(else_clause.clone().or_not())
            .then_ignore(end_clause.clone())
            .map(|(((pipeline, list), links), else_list)| {
                Item::With(chain_branches(pipeline, list, links, else_list, Item::With))
            });

        let range_item = header(Lexeme::Range)
            .then(list.clone())
            .then(else_clause.or_not())
            .then_ignore(end_clause.clone())
            .map(|((pipeline, list), else_list)| {
                Item::Range(RawBranch {
                    pipeline,
                    list,
                    else_list,
                })
            });

        let define_item = opens(Lexeme::Define)
            .ignore_then(string_literal.clone())
            .then_ignore(close.clone())
            .then(list.clone())
            .then_ignore(end_clause.clone())
            .map(|(name, body)| Item::Define { name, body });

        let block_item = opens(Lexeme::Block)
            .ignore_then(string_literal.clone())
            .then(pipeline.clone())
            .then_ignore(close.clone())
            .then(list.clone())
            .then_ignore(end_clause)
            .map(|((name, pipeline), body)| Item::Block {
                name,
                pipeline,
                body,
            });

        let template_item = opens(Lexeme::Template)
            .ignore_then(string_literal.clone())
            .then(pipeline.clone().or_not())
            .then_ignore(close.clone())
            .map(|(name, pipeline)| Item::Template { name, pipeline });

        let break_item = closing(Lexeme::Break).to(Item::Break);
        let continue_item = closing(Lexeme::Continue).to(Item::Continue);

        let action = just(Token::LeftDelim)
            .ignore_then(pipeline.clone())
            .then_ignore(close.clone())
            .map(Item::Action);

        // Order matters: keyword forms before the plain action
        choice((
            text,
            if_item,
            range_item,
            with_item,
            define_item,
            block_item,
            template_item,
            break_item,
            continue_item,
            action,
        ))
        .map_with(|item, e| Spanned::new(item, span_range(&e.span())))
        .repeated()
        .collect::<Vec<_>>()
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::tokenize;

    fn parse(src: &str) -> Result<Vec<Spanned<Item>>, Vec<ParseError>> {
        let tokens = tokenize(src, "{{", "}}").expect("Should lex");
        parse_items(src, tokens)
    }

    fn head(pipeline: &Pipeline) -> &Operand {
        &pipeline.commands[0].operands[0].node
    }

    #[test]
    fn test_parse_text_and_action() {
        let items = parse("select {{.Id}}").expect("Should parse");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].node, Item::Text("select ".to_string()));
        match &items[1].node {
            Item::Action(p) => assert_eq!(head(p), &Operand::Field(vec!["Id".to_string()])),
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_stages() {
        let items = parse(r#"{{.Name | printf "%s" | len}}"#).expect("Should parse");
        match &items[0].node {
            Item::Action(p) => {
                assert_eq!(p.commands.len(), 3);
                assert_eq!(p.commands[1].operands.len(), 2);
                assert!(p.decl.is_empty());
            }
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_declaration() {
        let items = parse("{{$i, $e := .List}}{{$i = 3}}").expect("Should parse");
        match &items[0].node {
            Item::Action(p) => {
                let names: Vec<_> = p.decl.iter().map(|d| d.node.as_str()).collect();
                assert_eq!(names, vec!["$i", "$e"]);
                assert!(!p.is_assign);
            }
            other => panic!("Expected action, got {:?}", other),
        }
        match &items[1].node {
            Item::Action(p) => assert!(p.is_assign),
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parenthesized_pipeline() {
        let items = parse("{{len (index . 1)}}").expect("Should parse");
        match &items[0].node {
            Item::Action(p) => {
                assert!(matches!(
                    p.commands[0].operands[1].node,
                    Operand::Pipeline(_)
                ));
            }
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_else() {
        let items = parse("{{if .A}}a{{else}}b{{end}}").expect("Should parse");
        match &items[0].node {
            Item::If(b) => {
                assert_eq!(b.list.len(), 1);
                assert_eq!(b.else_list.as_ref().map(|l| l.len()), Some(1));
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_else_if_chain_nests() {
        let items = parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").expect("Should parse");
        let Item::If(outer) = &items[0].node else {
            panic!("Expected if");
        };
        let else_list = outer.else_list.as_ref().expect("else branch");
        let Item::If(inner) = &else_list[0].node else {
            panic!("Expected nested if");
        };
        assert_eq!(head(&inner.pipeline), &Operand::Field(vec!["B".to_string()]));
        assert_eq!(
            inner.else_list.as_ref().map(|l| l[0].node.clone()),
            Some(Item::Text("c".to_string()))
        );
    }

    #[test]
    fn test_parse_range_with_else() {
        let items = parse("{{range $i, $v := .}}{{$v}}{{break}}{{else}}none{{end}}")
            .expect("Should parse");
        match &items[0].node {
            Item::Range(b) => {
                assert_eq!(b.pipeline.decl.len(), 2);
                assert_eq!(b.list[1].node, Item::Break);
                assert!(b.else_list.is_some());
            }
            other => panic!("Expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_define_block_template() {
        let items = parse(r#"{{define "a"}}x{{end}}{{block "b" .}}y{{end}}{{template "a"}}"#)
            .expect("Should parse");
        assert!(matches!(&items[0].node, Item::Define { name, .. } if name.node == "a"));
        assert!(matches!(&items[1].node, Item::Block { name, .. } if name.node == "b"));
        assert!(
            matches!(&items[2].node, Item::Template { name, pipeline: None } if name.node == "a")
        );
    }

    #[test]
    fn test_unclosed_construct_names_keyword_and_line() {
        let errs = parse("a\n{{range .}}\n{{if .X}}x{{end}}").unwrap_err();
        assert_eq!(
            errs,
            vec![ParseError::Unclosed {
                construct: "range".to_string(),
                line: 2,
                span: 2..4,
            }]
        );
    }

    #[test]
    fn test_stray_end() {
        let errs = parse("x{{end}}").unwrap_err();
        assert!(matches!(
            &errs[0],
            ParseError::Unexpected { keyword, line: 1, .. } if keyword == "end"
        ));
    }

    #[test]
    fn test_else_in_define_is_unexpected() {
        let errs = parse(r#"{{define "x"}}{{else}}{{end}}"#).unwrap_err();
        assert!(matches!(&errs[0], ParseError::Unexpected { keyword, .. } if keyword == "else"));
    }

    #[test]
    fn test_malformed_pipeline_is_syntax_error() {
        let errs = parse("{{.A |}}").unwrap_err();
        assert!(matches!(errs[0], ParseError::Syntax { .. }));
    }

    #[test]
    fn test_empty_action_is_syntax_error() {
        let errs = parse("{{}}").unwrap_err();
        assert!(matches!(errs[0], ParseError::Syntax { .. }));
    }
}
