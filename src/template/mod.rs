//! A small text-template engine: `{{.Field}}` actions, pipelines, `if`,
//! `with`, variables and a set of predefined functions.
//!
//! The action syntax follows the widely used double-brace template
//! language. Loops and named sub-templates are not supported.

mod builtins;
mod exec;
mod lex;
mod parse;
mod value;

use std::io::Write;

use tracing::debug;

pub use builtins::{str_arg, Func, FuncMap};
pub use value::{Record, Value};

use crate::error::{MailError, Result};
use parse::Node;

/// A named template, parsed once and executable many times.
#[derive(Debug)]
pub struct Template {
    name: String,
    funcs: FuncMap,
    tree: Vec<Node>,
}

impl Template {
    /// An empty template carrying the predefined functions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            funcs: builtins::builtins(),
            tree: Vec::new(),
        }
    }

    /// Add functions, replacing predefined ones of the same name.
    pub fn funcs(mut self, funcs: FuncMap) -> Self {
        self.funcs.extend(funcs);
        self
    }

    /// Parse `src` as this template's body. Unknown functions and undeclared
    /// variables are reported here, before any data is seen.
    pub fn parse(mut self, src: &str) -> Result<Self> {
        let parse_error = |e: parse::ParseError| MailError::TemplateParse {
            name: self.name.clone(),
            line: e.line,
            reason: e.reason,
        };
        let tokens = lex::lex(src).map_err(|e| parse_error(e.into()))?;
        let funcs = &self.funcs;
        let tree = parse::parse(tokens, &|name| funcs.contains_key(name)).map_err(parse_error)?;
        debug!(name = %self.name, nodes = tree.len(), "parsed template");
        self.tree = tree;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render against `data`. Nothing is produced unless rendering succeeds.
    pub fn execute_to_bytes(&self, data: &Value) -> Result<Vec<u8>> {
        exec::State::new(&self.name, &self.funcs, data).run(&self.tree, data)
    }

    /// Render against `data` and write the complete result to `out`.
    pub fn execute<W: Write>(&self, out: &mut W, data: &Value) -> Result<()> {
        let bytes = self.execute_to_bytes(data)?;
        out.write_all(&bytes)
            .map_err(|e| MailError::io("output", e))
    }
}
