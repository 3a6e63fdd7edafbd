//! Shared namespaces, overlays via clone, and concurrent execution

use std::thread;

use pretty_assertions::assert_eq;

use sqltemplate::{Arity, Error, FuncMap, Function, Template, Value};

fn join_funcs() -> FuncMap {
    let mut funcs = FuncMap::new();
    funcs.insert(
        "join".to_string(),
        Function::new(Arity::Exact(2), |args| {
            let sep = args[1].to_string();
            match &args[0] {
                Value::List(items) => Ok(Value::String(
                    items
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(&sep),
                )),
                other => Ok(Value::String(other.to_string())),
            }
        })
        .text(),
    );
    funcs
}

fn guardians() -> Value {
    Value::list(["Gamora", "Groot", "Nebula", "Rocket", "Star-Lord"])
}

#[test]
fn test_block_overlay() {
    let master = r#"Names:{{block "list" .}}{{"\n"}}{{range .}}{{println "-" .}}{{end}}{{end}}"#;
    let overlay = r#"{{define "list"}} {{join . ", "}}{{end}} "#;

    let master_tmpl = Template::new("master")
        .with_funcs(join_funcs())
        .parse(master)
        .expect("Should parse master");
    let overlay_tmpl = master_tmpl
        .clone()
        .parse(overlay)
        .expect("Should parse overlay");

    let out = master_tmpl.execute(&guardians()).expect("Should execute");
    assert_eq!(
        out.text,
        "Names:\n- Gamora\n- Groot\n- Nebula\n- Rocket\n- Star-Lord\n"
    );
    assert!(out.args.is_empty());

    let out = overlay_tmpl.execute(&guardians()).expect("Should execute");
    assert_eq!(out.text, "Names: Gamora, Groot, Nebula, Rocket, Star-Lord");
}

#[test]
fn test_overlay_changes_every_reference() {
    let base = Template::new("q")
        .parse(
            r#"select * from a where {{block "cond" .}}a.id = {{.Id}}{{end}} union select * from b where {{template "cond" .}}"#,
        )
        .expect("Should parse");
    let by_name = base
        .clone()
        .parse(r#"{{define "cond"}}name = {{.Name}}{{end}}"#)
        .expect("Should parse overlay");

    let data = Value::map([("Id", Value::Int(1)), ("Name", Value::from("n"))]);

    let out = base.execute(&data).expect("Should execute");
    assert_eq!(
        out.text,
        "select * from a where a.id = ? union select * from b where a.id = ?"
    );
    assert_eq!(out.args, vec![Value::Int(1), Value::Int(1)]);

    let out = by_name.execute(&data).expect("Should execute");
    assert_eq!(
        out.text,
        "select * from a where name = ? union select * from b where name = ?"
    );
    assert_eq!(out.args, vec![Value::from("n"), Value::from("n")]);
}

#[test]
fn test_whitespace_root_does_not_replace_body() {
    let t = Template::new("q")
        .parse("select 1")
        .expect("Should parse")
        .parse("\n  \n")
        .expect("Should parse whitespace");
    assert_eq!(t.execute(&Value::Nil).expect("Should execute").text, "select 1");
}

#[test]
fn test_redefinition_across_parses_replaces() {
    let t = Template::new("q")
        .parse(r#"{{template "v"}}{{define "v"}}1{{end}}"#)
        .expect("Should parse")
        .parse(r#"{{define "v"}}2{{end}}"#)
        .expect("Should parse");
    assert_eq!(t.execute(&Value::Nil).expect("Should execute").text, "2");
}

#[test]
fn test_compilation_is_idempotent() {
    let source = r#"{{define "w"}}{{range $i, $c := .Cols}}{{if $i}} and {{end}}{{$c}} = {{index $.Vals $i}}{{end}}{{end}}update t set x = {{.X}} where {{template "w" .}}"#;
    let data = Value::map([
        ("X", Value::Int(0)),
        ("Cols", Value::list(["a", "b"])),
        ("Vals", Value::list([1, 2])),
    ]);

    let first = Template::new("u").parse(source).expect("Should parse");
    let second = Template::new("u").parse(source).expect("Should parse");
    assert_eq!(first.tree(), second.tree());

    let a = first.execute(&data).expect("Should execute");
    let b = second.execute(&data).expect("Should execute");
    assert_eq!(a, b);
    assert_eq!(a.text, "update t set x = ? where ? = ? and ? = ?");
    assert_eq!(a.args.len(), 5);
}

#[test]
fn test_failed_parse_registers_nothing() {
    let t = Template::new("q").parse("select 1").expect("Should parse");
    let sibling = t.new_template("broken");
    let err = sibling
        .parse(r#"{{define "half"}}x{{end}}{{undefined_func}}"#)
        .unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert_eq!(t.templates(), vec!["q".to_string()]);
}

#[test]
fn test_functions_must_be_registered_before_parse() {
    let err = Template::new("q").parse("{{join . \",\"}}").unwrap_err();
    assert!(matches!(err, Error::Parse(_)));

    let t = Template::new("q").with_funcs(join_funcs());
    assert!(t.parse("{{join . \",\"}}").is_ok());
}

#[test]
fn test_execute_associated_template() {
    let t = Template::new("q")
        .parse(r#"{{define "by_id"}}select * from t where id = {{.}}{{end}}"#)
        .expect("Should parse");
    let out = t.execute_template("by_id", &Value::Int(4)).expect("Should execute");
    assert_eq!(out.text, "select * from t where id = ?");
    assert_eq!(out.args, vec![Value::Int(4)]);

    let err = t.execute_template("nope", &Value::Nil).unwrap_err();
    assert_eq!(err.to_string(), "exec error: template \"nope\" is not defined");
}

#[test]
fn test_concurrent_execution() {
    let t = Template::new("q")
        .parse("select * from t where id = {{.}} and tag = {{printf \"%d\" .}}")
        .expect("Should parse");

    thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let t = &t;
                s.spawn(move || {
                    (0..50)
                        .map(|_| t.execute(&Value::Int(i)).expect("Should execute"))
                        .all(|out| {
                            out.text == format!("select * from t where id = ? and tag = {}", i)
                                && out.args == vec![Value::Int(i)]
                        })
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().expect("Thread should not panic"));
        }
    });
}
