//! Tree walker: evaluates pipelines against data and writes the output

use std::sync::Arc;

use tracing::trace;

use crate::config::Options;
use crate::exec::error::ExecError;
use crate::exec::output::{Output, Rendered};
use crate::funcs::{Call, Emit, FuncMap, Function};
use crate::parser::ast::*;
use crate::template::Namespace;
use crate::value::{AccessError, Value};

/// How a list finished
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Execute the tree registered as `name`, appending to `rendered`
pub(crate) fn execute(
    namespace: &Namespace,
    name: &str,
    data: &Value,
    options: &Options,
    rendered: &mut Rendered,
) -> Result<(), ExecError> {
    let tree = namespace.lookup(name).ok_or_else(|| ExecError::NotDefined {
        name: name.to_string(),
    })?;

    let mut engine = Engine {
        namespace,
        funcs: namespace.funcs(),
        out: Output::new(rendered, options.placeholder, options.mode),
        tree: tree.clone(),
        vars: vec![("$".to_string(), data.clone())],
        depth: 0,
        max_depth: options.max_depth,
    };
    engine.walk_list(data, &tree.root)?;
    Ok(())
}

struct Engine<'a, 'o> {
    namespace: &'a Namespace,
    funcs: FuncMap,
    out: Output<'o>,
    /// Tree currently being walked, for error locations
    tree: Arc<Tree>,
    /// Variable stack, innermost last
    vars: Vec<(String, Value)>,
    depth: usize,
    max_depth: usize,
}

impl Engine<'_, '_> {
    fn location(&self, span: &Span) -> Location {
        self.tree.location(span)
    }

    /// Run `f` and drop every variable it pushed, whatever the outcome
    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExecError>,
    ) -> Result<T, ExecError> {
        let mark = self.vars.len();
        let result = f(self);
        self.vars.truncate(mark);
        result
    }

    fn walk_list(&mut self, dot: &Value, list: &List) -> Result<Flow, ExecError> {
        for node in list {
            match self.walk(dot, node)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Value, node: &Spanned<Node>) -> Result<Flow, ExecError> {
        match &node.node {
            Node::Text(text) => self.out.write_text(text),
            Node::Action(pipeline) => {
                let value = self.eval_pipeline(dot, pipeline)?;
                if pipeline.decl.is_empty() {
                    self.print(pipeline, value);
                }
            }
            Node::If(branch) => return self.walk_if_or_with(dot, branch, false),
            Node::With(branch) => return self.walk_if_or_with(dot, branch, true),
            Node::Range(branch) => self.walk_range(dot, branch, &node.span)?,
            Node::Template(invocation) => self.walk_template(dot, invocation, &node.span)?,
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn print(&mut self, pipeline: &Pipeline, value: Value) {
        match self.emission(pipeline) {
            Emit::Text => self.out.write_text(&value.to_string()),
            Emit::Parameter => self.out.write_value(value),
        }
    }

    /// The last command's head decides between text and a bound value
    fn emission(&self, pipeline: &Pipeline) -> Emit {
        let Some(head) = pipeline.commands.last().and_then(Command::head) else {
            return Emit::Parameter;
        };
        match &head.node {
            op if op.is_literal() => Emit::Text,
            Operand::Function(name) => self
                .funcs
                .get(name)
                .map(Function::emit)
                .unwrap_or(Emit::Parameter),
            _ => Emit::Parameter,
        }
    }

    fn walk_if_or_with(
        &mut self,
        dot: &Value,
        branch: &Branch,
        is_with: bool,
    ) -> Result<Flow, ExecError> {
        self.scoped(|engine| {
            let value = engine.eval_pipeline(dot, &branch.pipeline)?;
            if value.is_true() {
                let dot = if is_with { &value } else { dot };
                engine.walk_list(dot, &branch.list)
            } else if let Some(else_list) = &branch.else_list {
                engine.walk_list(dot, else_list)
            } else {
                Ok(Flow::Normal)
            }
        })
    }

    /// Iterate lists by position, maps in key order and an integer `n` over
    /// `0..n`, one item at a time. Nil iterates zero times.
    fn walk_range(&mut self, dot: &Value, branch: &Branch, span: &Span) -> Result<(), ExecError> {
        self.scoped(|engine| {
            let value = engine.eval_commands(dot, &branch.pipeline)?;
            let mut ran = false;
            match &value {
                Value::List(items) => {
                    for (i, item) in items.iter().enumerate() {
                        ran = true;
                        if engine.range_step(branch, Value::from(i), item)? {
                            break;
                        }
                    }
                }
                Value::Map(entries) => {
                    for (key, item) in entries.iter() {
                        ran = true;
                        if engine.range_step(branch, Value::from(key.as_str()), item)? {
                            break;
                        }
                    }
                }
                Value::Int(n) => {
                    if branch.pipeline.decl.len() > 1 {
                        return Err(ExecError::RangeVariables {
                            value: value.to_string(),
                            location: engine.location(span),
                        });
                    }
                    for i in 0..*n {
                        ran = true;
                        if engine.range_step(branch, Value::Int(i), &Value::Int(i))? {
                            break;
                        }
                    }
                }
                Value::Nil => {}
                other => {
                    return Err(ExecError::NotIterable {
                        value: other.type_name().to_string(),
                        location: engine.location(span),
                    })
                }
            }

            if !ran {
                if let Some(else_list) = &branch.else_list {
                    engine.walk_list(dot, else_list)?;
                }
            }
            Ok(())
        })
    }

    /// One iteration in its own scope; true when the body hit `break`
    fn range_step(&mut self, branch: &Branch, key: Value, item: &Value) -> Result<bool, ExecError> {
        let flow = self.scoped(|engine| {
            engine.bind_range(&branch.pipeline, key, item.clone());
            engine.walk_list(item, &branch.list)
        })?;
        Ok(matches!(flow, Flow::Break))
    }

    fn bind_range(&mut self, pipeline: &Pipeline, key: Value, item: Value) {
        match pipeline.decl.as_slice() {
            [] => {}
            [elem] => self.bind(&elem.node, item, pipeline.is_assign),
            [index, elem, ..] => {
                self.bind(&index.node, key, pipeline.is_assign);
                self.bind(&elem.node, item, pipeline.is_assign);
            }
        }
    }

    fn walk_template(
        &mut self,
        dot: &Value,
        invocation: &Invocation,
        span: &Span,
    ) -> Result<(), ExecError> {
        let new_dot = match &invocation.pipeline {
            Some(pipeline) => self.eval_pipeline(dot, pipeline)?,
            None => Value::Nil,
        };
        if self.depth >= self.max_depth {
            return Err(ExecError::DepthExceeded {
                limit: self.max_depth,
                location: self.location(span),
            });
        }
        let tree = self
            .namespace
            .lookup(&invocation.name)
            .ok_or_else(|| ExecError::UndefinedTemplate {
                name: invocation.name.clone(),
                location: self.location(span),
            })?;

        trace!(template = %invocation.name, depth = self.depth + 1, "invoking template");
        let frame = vec![("$".to_string(), new_dot.clone())];
        let saved_vars = std::mem::replace(&mut self.vars, frame);
        let saved_tree = std::mem::replace(&mut self.tree, tree.clone());
        self.depth += 1;
        let result = self.walk_list(&new_dot, &tree.root);
        self.depth -= 1;
        self.tree = saved_tree;
        self.vars = saved_vars;
        result.map(|_| ())
    }

    fn bind(&mut self, name: &str, value: Value, is_assign: bool) {
        if is_assign {
            if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
        }
        self.vars.push((name.to_string(), value));
    }

    fn variable(&self, name: &str, span: &Span) -> Result<Value, ExecError> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ExecError::Accessor {
                name: name.to_string(),
                reason: "undefined variable".to_string(),
                location: self.location(span),
            })
    }

    /// Evaluate and bind any declared variables
    fn eval_pipeline(&mut self, dot: &Value, pipeline: &Pipeline) -> Result<Value, ExecError> {
        let value = self.eval_commands(dot, pipeline)?;
        for decl in &pipeline.decl {
            self.bind(&decl.node, value.clone(), pipeline.is_assign);
        }
        Ok(value)
    }

    /// Each command's result is passed as the final argument of the next
    fn eval_commands(&mut self, dot: &Value, pipeline: &Pipeline) -> Result<Value, ExecError> {
        let mut value = None;
        for command in &pipeline.commands {
            value = Some(self.eval_command(dot, command, value.take())?);
        }
        Ok(value.unwrap_or_default())
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        command: &Command,
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        let Some((head, args)) = command.operands.split_first() else {
            return Ok(Value::Nil);
        };
        match &head.node {
            Operand::Field(fields) => {
                self.eval_fields(dot, dot.clone(), fields, args, piped, &head.span)
            }
            Operand::Variable { name, fields } if !fields.is_empty() => {
                let receiver = self.variable(name, &head.span)?;
                self.eval_fields(dot, receiver, fields, args, piped, &head.span)
            }
            Operand::Function(name) => self.eval_function(dot, name, args, piped, &head.span),
            _ => {
                if !args.is_empty() || piped.is_some() {
                    return Err(ExecError::NotAFunction {
                        operand: head.node.to_string(),
                        location: self.location(&head.span),
                    });
                }
                self.eval_arg(dot, head)
            }
        }
    }

    fn eval_arg(&mut self, dot: &Value, operand: &Spanned<Operand>) -> Result<Value, ExecError> {
        Ok(match &operand.node {
            Operand::Dot => dot.clone(),
            Operand::Nil => Value::Nil,
            Operand::Bool(b) => Value::Bool(*b),
            Operand::Number(Number::Int(n)) => Value::Int(*n),
            Operand::Number(Number::Float(n)) => Value::Float(*n),
            Operand::String(s) => Value::String(s.clone()),
            Operand::Field(fields) => {
                return self.eval_fields(dot, dot.clone(), fields, &[], None, &operand.span)
            }
            Operand::Variable { name, fields } => {
                let value = self.variable(name, &operand.span)?;
                if fields.is_empty() {
                    value
                } else {
                    return self.eval_fields(dot, value, fields, &[], None, &operand.span);
                }
            }
            Operand::Function(name) => {
                return self.eval_function(dot, name, &[], None, &operand.span)
            }
            Operand::Pipeline(pipeline) => return self.eval_pipeline(dot, pipeline),
        })
    }

    fn eval_args(
        &mut self,
        dot: &Value,
        args: &[Spanned<Operand>],
        piped: Option<Value>,
    ) -> Result<Vec<Value>, ExecError> {
        let mut values = args
            .iter()
            .map(|arg| self.eval_arg(dot, arg))
            .collect::<Result<Vec<_>, _>>()?;
        values.extend(piped);
        Ok(values)
    }

    /// Walk `.A.B.C`; only the last element may receive arguments
    fn eval_fields(
        &mut self,
        dot: &Value,
        receiver: Value,
        fields: &[String],
        args: &[Spanned<Operand>],
        piped: Option<Value>,
        span: &Span,
    ) -> Result<Value, ExecError> {
        let Some((last, path)) = fields.split_last() else {
            return Ok(receiver);
        };
        let mut receiver = receiver;
        for name in path {
            receiver = receiver
                .field(name)
                .map_err(|e| self.access_error(name, e, span))?;
        }

        if args.is_empty() && piped.is_none() {
            return receiver
                .field(last)
                .map_err(|e| self.access_error(last, e, span));
        }
        if !matches!(receiver, Value::Object(_)) {
            return Err(ExecError::NotAFunction {
                operand: format!(".{}", last),
                location: self.location(span),
            });
        }
        let values = self.eval_args(dot, args, piped)?;
        receiver
            .call_method(last, &values)
            .map_err(|e| self.access_error(last, e, span))
    }

    fn access_error(&self, name: &str, err: AccessError, span: &Span) -> ExecError {
        match err {
            AccessError::Failed(e) => ExecError::Function {
                name: name.to_string(),
                message: e.to_string(),
                location: self.location(span),
            },
            other => ExecError::Accessor {
                name: name.to_string(),
                reason: other.to_string(),
                location: self.location(span),
            },
        }
    }

    fn eval_function(
        &mut self,
        dot: &Value,
        name: &str,
        args: &[Spanned<Operand>],
        piped: Option<Value>,
        span: &Span,
    ) -> Result<Value, ExecError> {
        let function = self.funcs.get(name).cloned().ok_or_else(|| {
            ExecError::UndefinedFunction {
                name: name.to_string(),
                location: self.location(span),
            }
        })?;

        let count = args.len() + usize::from(piped.is_some());
        if !function.arity().accepts(count) {
            return Err(ExecError::ArgCount {
                name: name.to_string(),
                expected: function.arity().to_string(),
                got: count,
                location: self.location(span),
            });
        }

        match function.kind() {
            Call::And | Call::Or => {
                let stop_when = matches!(function.kind(), Call::Or);
                let mut last = Value::Nil;
                for arg in args {
                    let value = self.eval_arg(dot, arg)?;
                    if value.is_true() == stop_when {
                        return Ok(value);
                    }
                    last = value;
                }
                Ok(piped.unwrap_or(last))
            }
            Call::Native(f) => {
                let values = self.eval_args(dot, args, piped)?;
                f(&values).map_err(|e| ExecError::Function {
                    name: name.to_string(),
                    message: e.to_string(),
                    location: self.location(span),
                })
            }
        }
    }
}
