//! Template execution: walks the parsed tree against a data value.

use std::fmt;

use super::parse::{Arg, Command, Node, Pipeline};
use super::value::Value;
use super::FuncMap;
use crate::error::{MailError, Result};

pub(crate) struct State<'t> {
    name: &'t str,
    funcs: &'t FuncMap,
    /// Variable stack, innermost last. `$` is always the root data.
    vars: Vec<(String, Value)>,
    out: Vec<u8>,
}

impl<'t> State<'t> {
    pub(crate) fn new(name: &'t str, funcs: &'t FuncMap, data: &Value) -> Self {
        Self {
            name,
            funcs,
            vars: vec![("$".to_string(), data.clone())],
            out: Vec::new(),
        }
    }

    pub(crate) fn run(mut self, nodes: &[Node], data: &Value) -> Result<Vec<u8>> {
        self.walk(data, nodes)?;
        Ok(self.out)
    }

    fn error(&self, line: usize, context: &dyn fmt::Display, reason: impl Into<String>) -> MailError {
        MailError::TemplateExec {
            name: self.name.to_string(),
            line,
            context: context.to_string(),
            reason: reason.into(),
        }
    }

    fn walk(&mut self, dot: &Value, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.extend_from_slice(text.as_bytes()),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(dot, pipe)?;
                    if pipe.decl.is_none() {
                        value.write_to(&mut self.out);
                    }
                }
                Node::If(branch) | Node::With(branch) => {
                    let scope = self.vars.len();
                    let value = self.eval_pipeline(dot, &branch.pipe)?;
                    if value.is_truthy() {
                        if matches!(node, Node::With(_)) {
                            self.walk(&value, &branch.list)?;
                        } else {
                            self.walk(dot, &branch.list)?;
                        }
                    } else {
                        self.walk(dot, &branch.else_list)?;
                    }
                    self.vars.truncate(scope);
                }
            }
        }
        Ok(())
    }

    fn eval_pipeline(&mut self, dot: &Value, pipe: &Pipeline) -> Result<Value> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(dot, cmd, value.take())?);
        }
        let value = value.unwrap_or(Value::Nil);

        if let Some(var) = &pipe.decl {
            if pipe.is_assign {
                let slot = self.vars.iter_mut().rev().find(|(name, _)| name == var);
                match slot {
                    Some((_, v)) => *v = value.clone(),
                    None => {
                        return Err(self.error(pipe.line, pipe, format!("undefined variable: {var}")))
                    }
                }
            } else {
                self.vars.push((var.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn eval_command(&mut self, dot: &Value, cmd: &Command, piped: Option<Value>) -> Result<Value> {
        let first = &cmd.args[0];
        if let Arg::Function(name) = first {
            return self.call(dot, cmd.line, cmd, name, &cmd.args[1..], piped);
        }

        if cmd.args.len() > 1 || piped.is_some() {
            return Err(self.error(
                cmd.line,
                first,
                format!("can't give argument to non-function {first}"),
            ));
        }
        self.eval_arg(dot, cmd.line, first)
    }

    fn eval_arg(&mut self, dot: &Value, line: usize, arg: &Arg) -> Result<Value> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Nil => Ok(Value::Nil),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Int(n) => Ok(Value::Int(*n)),
            Arg::Str(s) => Ok(Value::Str(s.clone())),
            Arg::Field(fields) => self.eval_fields(dot.clone(), fields, line, arg),
            Arg::Variable(name, fields) => {
                let value = self.variable(name).ok_or_else(|| {
                    self.error(line, arg, format!("undefined variable: {name}"))
                })?;
                self.eval_fields(value, fields, line, arg)
            }
            Arg::Function(name) => self.call(dot, line, arg, name, &[], None),
            Arg::Pipe(pipe) => {
                let scope = self.vars.len();
                let value = self.eval_pipeline(dot, pipe);
                self.vars.truncate(scope);
                value
            }
            Arg::Chain(inner, fields) => {
                let value = self.eval_arg(dot, line, inner)?;
                self.eval_fields(value, fields, line, arg)
            }
        }
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn eval_fields(&self, receiver: Value, fields: &[String], line: usize, context: &Arg) -> Result<Value> {
        let mut value = receiver;
        for field in fields {
            value = match &value {
                Value::Record(record) => record.field(field).ok_or_else(|| {
                    self.error(
                        line,
                        context,
                        format!("can't evaluate field {field} in type {}", record.type_name()),
                    )
                })?,
                Value::Nil => {
                    return Err(self.error(
                        line,
                        context,
                        format!("nil pointer evaluating .{field}"),
                    ))
                }
                other => {
                    return Err(self.error(
                        line,
                        context,
                        format!("can't evaluate field {field} in type {}", other.type_name()),
                    ))
                }
            };
        }
        Ok(value)
    }

    /// Call a function with literal arguments `args` plus the piped value.
    fn call(
        &mut self,
        dot: &Value,
        line: usize,
        context: &dyn fmt::Display,
        name: &str,
        args: &[Arg],
        piped: Option<Value>,
    ) -> Result<Value> {
        if name == "and" || name == "or" {
            return self.short_circuit(dot, line, context, name, args, piped);
        }

        let funcs = self.funcs;
        let func = funcs
            .get(name)
            .ok_or_else(|| self.error(line, context, format!("function {name:?} not defined")))?;

        let mut values = Vec::with_capacity(args.len() + 1);
        for arg in args {
            values.push(self.eval_arg(dot, line, arg)?);
        }
        values.extend(piped);

        func.check_arity(name, values.len())
            .map_err(|reason| self.error(line, context, reason))?;
        func.call(&values)
            .map_err(|reason| self.error(line, context, format!("error calling {name}: {reason}")))
    }

    /// `and` / `or`: evaluate arguments left to right, stopping at the first
    /// falsy (`and`) or truthy (`or`) one.
    fn short_circuit(
        &mut self,
        dot: &Value,
        line: usize,
        context: &dyn fmt::Display,
        name: &str,
        args: &[Arg],
        piped: Option<Value>,
    ) -> Result<Value> {
        let count = args.len() + usize::from(piped.is_some());
        if count == 0 {
            return Err(self.error(
                line,
                context,
                format!("wrong number of args for {name}: want at least 1 got 0"),
            ));
        }

        let stop_when = name == "or";
        let mut last = Value::Nil;
        for arg in args {
            last = self.eval_arg(dot, line, arg)?;
            if last.is_truthy() == stop_when {
                return Ok(last);
            }
        }
        Ok(piped.unwrap_or(last))
    }
}
