//! End-to-end rendering: text plus bound arguments

use pretty_assertions::assert_eq;
use serde::Serialize;

use sqltemplate::{
    render, Arity, ExecError, FuncMap, Function, Mode, Options, Placeholder, Rendered, Template,
    Value,
};

fn data(entries: &[(&str, Value)]) -> Value {
    Value::map(entries.iter().cloned())
}

#[test]
fn test_insert_values_are_bound() {
    let out = render(
        "insert into t values ({{.A}}, {{.B}})",
        &data(&[("A", Value::Int(1)), ("B", Value::from("x"))]),
    )
    .expect("Should render");
    insta::assert_snapshot!(out.text, @"insert into t values (?, ?)");
    assert_eq!(out.args, vec![Value::Int(1), Value::from("x")]);
}

#[test]
fn test_range_over_sequence() {
    let out = render("{{range .}}{{.}},{{end}}", &Value::list([1, 2, 3])).expect("Should render");
    insta::assert_snapshot!(out.text, @"?,?,?,");
    assert_eq!(out.args, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_false_branch_is_literal() {
    let out = render(
        "{{if .Flag}}{{.A}}{{else}}none{{end}}",
        &data(&[("Flag", Value::Bool(false)), ("A", Value::Int(5))]),
    )
    .expect("Should render");
    assert_eq!(out.text, "none");
    assert!(out.args.is_empty());
}

#[test]
fn test_missing_field_keeps_partial_output() {
    let template = Template::new("main")
        .parse("a = {{.A}}, b = {{.Missing}}, c = {{.A}}")
        .expect("Should parse");

    let mut rendered = Rendered::new();
    let err = template
        .execute_into(&mut rendered, &data(&[("A", Value::Int(1))]))
        .unwrap_err();

    match &err {
        ExecError::Accessor { name, location, .. } => {
            assert_eq!(name, "Missing");
            assert_eq!(location.template, "main");
            assert_eq!((location.line, location.column), (1, 19));
        }
        other => panic!("Expected accessor error, got {:?}", other),
    }
    assert_eq!(rendered.text, "a = ?, b = ");
    assert_eq!(rendered.args, vec![Value::Int(1)]);
}

#[test]
fn test_literals_are_never_bound() {
    let out = render(r#"limit {{10}} offset {{"0"}} -- {{true}} {{1.5}}"#, &Value::Nil)
        .expect("Should render");
    assert_eq!(out.text, "limit 10 offset 0 -- true 1.5");
    assert!(out.args.is_empty());
}

#[test]
fn test_placeholder_count_matches_arguments() {
    let source = "select {{.A}}, {{.B | len}}, {{printf \"%d\" .C}}, {{(.A)}} from t";
    let out = render(
        source,
        &data(&[
            ("A", Value::from("a")),
            ("B", Value::list([1, 2])),
            ("C", Value::Int(7)),
        ]),
    )
    .expect("Should render");
    assert_eq!(out.text, "select ?, ?, 7, ? from t");
    assert_eq!(out.text.matches('?').count(), out.args.len());
    assert_eq!(
        out.args,
        vec![Value::from("a"), Value::Int(2), Value::from("a")]
    );
}

#[test]
fn test_nested_invocation_interleaves_arguments() {
    let out = render(
        r#"{{define "cond"}}x = {{.X}}{{end}}select {{.A}} where {{template "cond" .}} and y = {{.Y}}"#,
        &data(&[
            ("A", Value::from("a")),
            ("X", Value::from("x")),
            ("Y", Value::from("y")),
        ]),
    )
    .expect("Should render");
    assert_eq!(out.text, "select ? where x = ? and y = ?");
    assert_eq!(
        out.args,
        vec![Value::from("a"), Value::from("x"), Value::from("y")]
    );
}

#[test]
fn test_numbered_placeholders() {
    let options = Options::new().with_placeholder(Placeholder::Dollar);
    let out = Template::new("q")
        .with_options(options)
        .parse("where a = {{.A}} and b = {{.B}}")
        .expect("Should parse")
        .execute(&data(&[("A", Value::Int(1)), ("B", Value::Int(2))]))
        .expect("Should execute");
    insta::assert_snapshot!(out.text, @"where a = $1 and b = $2");

    let options = Options::new().with_placeholder(Placeholder::At);
    let out = sqltemplate::render_with_options("{{.}} {{.}}", &Value::Int(1), options)
        .expect("Should render");
    assert_eq!(out.text, "@p1 @p2");
}

#[test]
fn test_custom_delimiters() {
    let out = Template::new("q")
        .with_delims("[[", "]]")
        .parse("select '{{raw}}' where id = [[.Id]]")
        .expect("Should parse")
        .execute(&data(&[("Id", Value::Int(3))]))
        .expect("Should execute");
    assert_eq!(out.text, "select '{{raw}}' where id = ?");
    assert_eq!(out.args, vec![Value::Int(3)]);
}

const LETTER: &str = r#"
Dear {{.Name}},
{{if .Attended}}
It was a pleasure to see you at the wedding.
{{- else}}
It is a shame you couldn't make it to the wedding.
{{- end}}
{{with .Gift -}}
Thank you for the lovely {{.}}.
{{end}}
Best wishes,
Josie
"#;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Recipient {
    name: &'static str,
    gift: &'static str,
    attended: bool,
}

fn recipients() -> Vec<Recipient> {
    vec![
        Recipient {
            name: "Aunt Mildred",
            gift: "bone china tea set",
            attended: true,
        },
        Recipient {
            name: "Uncle John",
            gift: "moleskin pants",
            attended: false,
        },
        Recipient {
            name: "Cousin Rodney",
            gift: "",
            attended: false,
        },
    ]
}

#[test]
fn test_letter_parameterized() {
    let template = Template::new("letter").parse(LETTER).expect("Should parse");
    let people = recipients();

    let out = template.execute_serialize(&people[0]).expect("Should execute");
    assert_eq!(
        out.text,
        "\nDear ?,\n\nIt was a pleasure to see you at the wedding.\nThank you for the lovely ?.\n\nBest wishes,\nJosie\n"
    );
    assert_eq!(
        out.args,
        vec![Value::from("Aunt Mildred"), Value::from("bone china tea set")]
    );

    let out = template.execute_serialize(&people[2]).expect("Should execute");
    assert_eq!(out.args, vec![Value::from("Cousin Rodney")]);
}

#[test]
fn test_letter_inline() {
    let template = Template::new("letter")
        .with_options(Options::new().with_mode(Mode::Inline))
        .parse(LETTER)
        .expect("Should parse");

    let letters: Vec<String> = recipients()
        .iter()
        .map(|r| template.execute_serialize(r).expect("Should execute").text)
        .collect();

    assert_eq!(
        letters.concat(),
        "
Dear Aunt Mildred,

It was a pleasure to see you at the wedding.
Thank you for the lovely bone china tea set.

Best wishes,
Josie

Dear Uncle John,

It is a shame you couldn't make it to the wedding.
Thank you for the lovely moleskin pants.

Best wishes,
Josie

Dear Cousin Rodney,

It is a shame you couldn't make it to the wedding.

Best wishes,
Josie
"
    );
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Post {
    title: &'static str,
    content: &'static str,
}

#[test]
fn test_multi_row_insert() {
    let source = "insert into posts (created_at, title, content) values
{{range $index, $item := .list -}}
('2024-12-12 16:09:56', {{.Title}}, {{.Content}}) {{if last $index $.list}}  {{else}} , {{end}}
{{end}}";

    let mut funcs = FuncMap::new();
    funcs.insert(
        "last".to_string(),
        Function::new(Arity::Exact(2), |args| match (&args[0], args[1].len()) {
            (Value::Int(i), Some(len)) => Ok(Value::Bool(*i + 1 == len as i64)),
            _ => Err(sqltemplate::FuncError::new("last wants an index and a list")),
        }),
    );

    let posts = vec![
        Post {
            title: "Aunt Mildred",
            content: "bone china tea set",
        },
        Post {
            title: "Uncle John",
            content: "moleskin pants",
        },
        Post {
            title: "Cousin Rodney",
            content: "",
        },
    ];
    let data = Value::map([("list", Value::from_serialize(&posts).expect("Should convert"))]);

    let out = Template::new("master")
        .with_funcs(funcs)
        .parse(source)
        .expect("Should parse")
        .execute(&data)
        .expect("Should execute");

    let row = "('2024-12-12 16:09:56', ?, ?) ";
    assert_eq!(
        out.text,
        format!(
            "insert into posts (created_at, title, content) values\n{row} , \n{row} , \n{row}  \n"
        )
    );
    assert_eq!(out.args.len(), 6);
    assert_eq!(out.args[4], Value::from("Cousin Rodney"));
    assert_eq!(out.args[5], Value::from(""));
}

#[test]
fn test_text_function_writes_sql_structure() {
    let mut funcs = FuncMap::new();
    funcs.insert(
        "ident".to_string(),
        Function::new(Arity::Exact(1), |args| {
            Ok(Value::String(format!("\"{}\"", args[0].to_string().replace('"', "\"\""))))
        })
        .text(),
    );
    let out = Template::new("q")
        .with_funcs(funcs)
        .parse("select * from {{ident .Table}} where id = {{.Id}}")
        .expect("Should parse")
        .execute(&data(&[("Table", Value::from("users")), ("Id", Value::Int(9))]))
        .expect("Should execute");
    assert_eq!(out.text, r#"select * from "users" where id = ?"#);
    assert_eq!(out.args, vec![Value::Int(9)]);
}

#[test]
fn test_trim_markers_and_comments() {
    let out = render(
        "select *\n  {{- /* only active rows */ -}}\n  from t where a = {{- .A -}} ;",
        &data(&[("A", Value::Int(1))]),
    )
    .expect("Should render");
    assert_eq!(out.text, "select *from t where a =?;");
}
