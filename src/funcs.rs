//! Function table and the builtin functions
//!
//! Every name a template calls must be registered before the source that
//! calls it is parsed. Registered functions return one value or an error;
//! an error aborts execution.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Functions available to templates, by name
pub type FuncMap = HashMap<String, Function>;

/// Error returned by a template function
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct FuncError(pub String);

impl FuncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Number of arguments a function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// How a print action whose last command calls this function is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// Placeholder plus argument
    Parameter,
    /// The result's text goes straight into the output
    Text,
}

type Native = Arc<dyn Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Call {
    Native(Native),
    /// Short-circuiting; the engine evaluates arguments lazily
    And,
    Or,
}

/// A callable registered under a name
#[derive(Clone)]
pub struct Function {
    arity: Arity,
    emit: Emit,
    call: Call,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.call {
            Call::Native(_) => "native",
            Call::And => "and",
            Call::Or => "or",
        };
        f.debug_struct("Function")
            .field("arity", &self.arity)
            .field("emit", &self.emit)
            .field("call", &kind)
            .finish()
    }
}

impl Function {
    pub fn new<F>(arity: Arity, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync + 'static,
    {
        Self {
            arity,
            emit: Emit::Parameter,
            call: Call::Native(Arc::new(f)),
        }
    }

    /// Mark the result as SQL text rather than a bound value
    pub fn text(mut self) -> Self {
        self.emit = Emit::Text;
        self
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn emit(&self) -> Emit {
        self.emit
    }

    pub(crate) fn kind(&self) -> &Call {
        &self.call
    }

    /// Call with already evaluated arguments
    pub fn call(&self, args: &[Value]) -> Result<Value, FuncError> {
        if !self.arity.accepts(args.len()) {
            return Err(FuncError(format!(
                "wrong number of args: want {} got {}",
                self.arity,
                args.len()
            )));
        }
        match &self.call {
            Call::Native(f) => f(args),
            Call::And => Ok(args
                .iter()
                .find(|v| !v.is_true())
                .or(args.last())
                .cloned()
                .unwrap_or_default()),
            Call::Or => Ok(args
                .iter()
                .find(|v| v.is_true())
                .or(args.last())
                .cloned()
                .unwrap_or_default()),
        }
    }

    fn special(arity: Arity, call: Call) -> Self {
        Self {
            arity,
            emit: Emit::Parameter,
            call,
        }
    }
}

/// The builtin function set every namespace starts with
///
/// `print`, `printf` and `println` are text functions: their result goes into
/// the statement text verbatim, not into the argument list. Use them only to
/// build SQL structure, and never pass untrusted input through them.
pub fn builtins() -> FuncMap {
    let mut funcs = FuncMap::new();
    let mut add = |name: &str, f: Function| {
        funcs.insert(name.to_string(), f);
    };

    add("and", Function::special(Arity::AtLeast(1), Call::And));
    add("or", Function::special(Arity::AtLeast(1), Call::Or));
    add(
        "not",
        Function::new(Arity::Exact(1), |args| Ok(Value::Bool(!args[0].is_true()))),
    );
    add("len", Function::new(Arity::Exact(1), len));
    add("index", Function::new(Arity::AtLeast(1), index));
    add("slice", Function::new(Arity::AtLeast(1), slice));
    add(
        "print",
        Function::new(Arity::AtLeast(0), |args| Ok(Value::String(sprint(args)))).text(),
    );
    add(
        "println",
        Function::new(Arity::AtLeast(0), |args| Ok(Value::String(sprintln(args)))).text(),
    );
    add("printf", Function::new(Arity::AtLeast(1), printf).text());
    add("eq", Function::new(Arity::AtLeast(2), eq));
    add(
        "ne",
        Function::new(Arity::Exact(2), |args| {
            Ok(Value::Bool(!equal(&args[0], &args[1])?))
        }),
    );
    add("lt", ordering(|o| o == Ordering::Less));
    add("le", ordering(|o| o != Ordering::Greater));
    add("gt", ordering(|o| o == Ordering::Greater));
    add("ge", ordering(|o| o != Ordering::Less));

    funcs
}

fn len(args: &[Value]) -> Result<Value, FuncError> {
    let value = &args[0];
    value
        .len()
        .map(Value::from)
        .ok_or_else(|| FuncError(format!("len of type {}", value.type_name())))
}

fn index(args: &[Value]) -> Result<Value, FuncError> {
    let (item, keys) = args.split_first().ok_or_else(|| FuncError::new("index of nothing"))?;
    keys.iter().try_fold(item.clone(), |current, key| {
        current.index(key).map_err(|e| FuncError(e.to_string()))
    })
}

fn slice(args: &[Value]) -> Result<Value, FuncError> {
    let (item, bounds) = args.split_first().ok_or_else(|| FuncError::new("slice of nothing"))?;
    if bounds.len() > 2 {
        return Err(FuncError(format!("too many slice indexes: {}", bounds.len())));
    }
    let len = match item {
        Value::List(items) => items.len(),
        Value::String(s) => s.len(),
        other => {
            return Err(FuncError(format!(
                "can't slice item of type {}",
                other.type_name()
            )))
        }
    };
    let bound = |i: usize, default: usize| -> Result<usize, FuncError> {
        let Some(value) = bounds.get(i) else {
            return Ok(default);
        };
        let n = value.as_int().ok_or_else(|| {
            FuncError(format!("cannot index slice with {}", value.type_name()))
        })?;
        usize::try_from(n)
            .ok()
            .filter(|n| *n <= len)
            .ok_or_else(|| FuncError(format!("index out of range: {}", n)))
    };
    let start = bound(0, 0)?;
    let end = bound(1, len)?;
    if start > end {
        return Err(FuncError(format!("invalid slice index: {} > {}", start, end)));
    }
    match item {
        Value::List(items) => Ok(Value::list(items[start..end].iter().cloned())),
        Value::String(s) => s
            .get(start..end)
            .map(Value::from)
            .ok_or_else(|| FuncError(format!("slice {}:{} splits a character", start, end))),
        _ => Ok(Value::Nil),
    }
}

/// Spaces go between operands when neither side is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::String(_));
        if i > 0 && !is_string && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

fn sprintln(args: &[Value]) -> String {
    let mut out = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

fn printf(args: &[Value]) -> Result<Value, FuncError> {
    let (format, rest) = args.split_first().ok_or_else(|| FuncError::new("missing format"))?;
    let format = format.as_str().ok_or_else(|| {
        FuncError(format!(
            "printf format must be a string, got {}",
            format.type_name()
        ))
    })?;
    Ok(Value::String(sprintf(format, rest)))
}

/// Subset of Go-style formatting: `%v %s %d %f %q %t %x %%` with an
/// optional precision on `%f`
fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = digits.parse::<usize>().ok();
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next += 1;

        let formatted = match (verb, arg) {
            ('v' | 's', arg) => arg.to_string(),
            ('d', Value::Int(n)) => n.to_string(),
            ('f', Value::Float(x)) => format!("{:.*}", precision.unwrap_or(6), x),
            ('f', Value::Int(n)) => format!("{:.*}", precision.unwrap_or(6), *n as f64),
            ('q', arg) => format!("{:?}", arg.to_string()),
            ('t', Value::Bool(b)) => b.to_string(),
            ('x', Value::Int(n)) => format!("{:x}", n),
            ('x', Value::String(s)) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
            (verb, arg) => format!("%!{}({}={})", verb, arg.type_name(), arg),
        };
        out.push_str(&formatted);
    }

    if next < args.len() {
        let extra = args[next..]
            .iter()
            .map(|a| format!("{}={}", a.type_name(), a))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("%!(EXTRA {})", extra));
    }
    out
}

fn eq(args: &[Value]) -> Result<Value, FuncError> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| FuncError::new("missing argument for comparison"))?;
    for other in rest {
        if equal(first, other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn equal(a: &Value, b: &Value) -> Result<bool, FuncError> {
    match (a, b) {
        (Value::Nil, _) | (_, Value::Nil) => Ok(matches!((a, b), (Value::Nil, Value::Nil))),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => Err(
            FuncError(format!("non-comparable type {}", non_scalar(a, b))),
        ),
        _ => compare(a, b).map(|o| o == Ordering::Equal),
    }
}

fn non_scalar<'a>(a: &'a Value, b: &'a Value) -> &'a str {
    match a {
        Value::List(_) | Value::Map(_) => a.type_name(),
        _ => b.type_name(),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, FuncError> {
    let incomparable = || {
        FuncError(format!(
            "incompatible types for comparison: {} and {}",
            a.type_name(),
            b.type_name()
        ))
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (x, y) = (as_float(a), as_float(b));
            x.partial_cmp(&y).ok_or_else(incomparable)
        }
        _ => Err(incomparable()),
    }
}

fn as_float(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn ordering(accept: fn(Ordering) -> bool) -> Function {
    Function::new(Arity::Exact(2), move |args| {
        compare(&args[0], &args[1]).map(|o| Value::Bool(accept(o)))
    })
}
