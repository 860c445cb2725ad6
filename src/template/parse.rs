//! Template parser: builds the node tree executed by [`super::exec`].

use std::fmt;

use super::lex::{Keyword, LexError, Tok, Token};

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    /// `{{pipeline}}`
    Action(Pipeline),
    /// `{{if pipeline}} list {{else}} else_list {{end}}`
    If(Branch),
    /// `{{with pipeline}} list {{else}} else_list {{end}}`
    With(Branch),
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub pipe: Pipeline,
    pub list: Vec<Node>,
    pub else_list: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    pub line: usize,
    /// Variable declared (`:=`) or assigned (`=`) by this pipeline.
    pub decl: Option<String>,
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub line: usize,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone)]
pub(crate) enum Arg {
    Dot,
    Nil,
    Bool(bool),
    Int(i64),
    Str(Vec<u8>),
    /// `.A.B`
    Field(Vec<String>),
    /// `$x.A.B`
    Variable(String, Vec<String>),
    /// A function name.
    Function(String),
    /// `(pipeline)`
    Pipe(Box<Pipeline>),
    /// `(pipeline).A` or `func.A`
    Chain(Box<Arg>, Vec<String>),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Dot => f.write_str("."),
            Arg::Nil => f.write_str("nil"),
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Int(n) => write!(f, "{n}"),
            Arg::Str(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Arg::Field(fields) => write_fields(f, fields),
            Arg::Variable(name, fields) => {
                f.write_str(name)?;
                write_fields(f, fields)
            }
            Arg::Function(name) => f.write_str(name),
            Arg::Pipe(p) => write!(f, "({p})"),
            Arg::Chain(inner, fields) => {
                write!(f, "{inner}")?;
                write_fields(f, fields)
            }
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[String]) -> fmt::Result {
    for field in fields {
        write!(f, ".{field}")?;
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(var) = &self.decl {
            let op = if self.is_assign { "=" } else { ":=" };
            write!(f, "{var} {op} ")?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    pub line: usize,
    pub reason: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            line: e.line,
            reason: e.reason,
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// How a list of nodes was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListEnd {
    Eof,
    End,
    /// `{{else` consumed; the rest of the action is still pending.
    Else,
}

/// Nesting limit for parenthesized pipelines and `if`/`with` blocks.
const MAX_DEPTH: usize = 100;

/// Parse a token stream. `is_func` reports whether a name is a known function.
pub(crate) fn parse(tokens: Vec<Token>, is_func: &dyn Fn(&str) -> bool) -> PResult<Vec<Node>> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        is_func,
        vars: vec!["$".to_string()],
        depth: 0,
    };
    let (nodes, end) = parser.parse_list()?;
    match end {
        ListEnd::Eof => Ok(nodes),
        ListEnd::End => Err(parser.error("unexpected {{end}}")),
        ListEnd::Else => Err(parser.error("unexpected {{else}}")),
    }
}

struct Parser<'f> {
    tokens: Vec<Token>,
    pos: usize,
    is_func: &'f dyn Fn(&str) -> bool,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    depth: usize,
}

impl Parser<'_> {
    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        self.pos += 1;
        tok
    }

    fn backup(&mut self) {
        self.pos -= 1;
    }

    /// The token stream always ends with `Eof`, which is returned forever.
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next_non_space(&mut self) -> Token {
        loop {
            let tok = self.next();
            if tok.kind != Tok::Space {
                return tok;
            }
        }
    }

    fn peek_non_space(&mut self) -> &Token {
        while self.peek().kind == Tok::Space {
            self.next();
        }
        self.peek()
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line(),
            reason: reason.into(),
        }
    }

    fn unexpected(&self, tok: &Token, context: &str) -> ParseError {
        ParseError {
            line: tok.line,
            reason: format!("unexpected {} in {context}", tok.kind),
        }
    }

    fn expect_right_delim(&mut self, context: &str) -> PResult<()> {
        let tok = self.next_non_space();
        match tok.kind {
            Tok::RightDelim => Ok(()),
            _ => Err(self.unexpected(&tok, context)),
        }
    }

    fn parse_list(&mut self) -> PResult<(Vec<Node>, ListEnd)> {
        let mut nodes = Vec::new();
        loop {
            let tok = self.next();
            match tok.kind {
                Tok::Eof => return Ok((nodes, ListEnd::Eof)),
                Tok::Text(text) => nodes.push(Node::Text(text)),
                Tok::LeftDelim => {
                    let Token { kind, line } = self.peek_non_space().clone();
                    match kind {
                        Tok::Keyword(Keyword::End) => {
                            self.next();
                            self.expect_right_delim("end")?;
                            return Ok((nodes, ListEnd::End));
                        }
                        Tok::Keyword(Keyword::Else) => {
                            self.next();
                            return Ok((nodes, ListEnd::Else));
                        }
                        Tok::Keyword(Keyword::If) => {
                            self.next();
                            nodes.push(Node::If(self.parse_control("if")?));
                        }
                        Tok::Keyword(Keyword::With) => {
                            self.next();
                            nodes.push(Node::With(self.parse_control("with")?));
                        }
                        Tok::Keyword(k) => {
                            return Err(ParseError {
                                line,
                                reason: format!("{{{{{}}}}} actions are not supported", k.as_str()),
                            })
                        }
                        _ => nodes.push(Node::Action(self.parse_pipeline("command", Tok::RightDelim)?)),
                    }
                }
                _ => return Err(self.unexpected(&tok, "input")),
            }
        }
    }

    /// Parse the remainder of `{{if ...}}` / `{{with ...}}` through its `{{end}}`.
    /// Run `f` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("max expression depth exceeded"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_control(&mut self, context: &'static str) -> PResult<Branch> {
        self.nested(|p| p.parse_branch(context))
    }

    fn parse_branch(&mut self, context: &'static str) -> PResult<Branch> {
        let scope = self.vars.len();
        let pipe = self.parse_pipeline(context, Tok::RightDelim)?;
        let branch_scope = self.vars.len();

        let (list, end) = self.parse_list()?;
        self.vars.truncate(branch_scope);

        let else_list = match end {
            ListEnd::End => Vec::new(),
            ListEnd::Eof => return Err(self.error("unexpected EOF")),
            ListEnd::Else => match self.peek_non_space().kind.clone() {
                // {{else if ...}} and {{else with ...}} share the outer {{end}}.
                Tok::Keyword(Keyword::If) => {
                    self.next();
                    vec![Node::If(self.parse_control("if")?)]
                }
                Tok::Keyword(Keyword::With) => {
                    self.next();
                    vec![Node::With(self.parse_control("with")?)]
                }
                _ => {
                    self.expect_right_delim("else")?;
                    let (else_list, end) = self.parse_list()?;
                    match end {
                        ListEnd::End => else_list,
                        ListEnd::Else => return Err(self.error("expected end; found {{else}}")),
                        ListEnd::Eof => return Err(self.error("unexpected EOF")),
                    }
                }
            },
        };

        self.vars.truncate(scope);
        Ok(Branch {
            pipe,
            list,
            else_list,
        })
    }

    fn parse_pipeline(&mut self, context: &str, end: Tok) -> PResult<Pipeline> {
        let line = self.peek_non_space().line;
        let mut decl = None;
        let mut is_assign = false;

        if let Tok::Variable(name) = self.peek_non_space().kind.clone() {
            let mark = self.pos;
            self.next();
            match self.next_non_space().kind {
                Tok::Declare => {
                    self.vars.push(name.clone());
                    decl = Some(name);
                }
                Tok::Assign => {
                    if !self.vars.contains(&name) {
                        return Err(self.error(format!("undefined variable {name:?}")));
                    }
                    decl = Some(name);
                    is_assign = true;
                }
                _ => self.pos = mark,
            }
        }

        let mut cmds = Vec::new();
        loop {
            let tok = self.next_non_space();
            if tok.kind == end {
                break;
            }
            match tok.kind {
                Tok::RightDelim | Tok::RightParen | Tok::Eof | Tok::Pipe => {
                    return Err(self.unexpected(&tok, context));
                }
                _ => {
                    self.backup();
                    cmds.push(self.parse_command(context)?);
                }
            }
        }

        if cmds.is_empty() {
            return Err(ParseError {
                line,
                reason: format!("missing value for {context}"),
            });
        }
        for (i, cmd) in cmds.iter().enumerate().skip(1) {
            if matches!(
                cmd.args[0],
                Arg::Bool(_) | Arg::Dot | Arg::Nil | Arg::Int(_) | Arg::Pipe(_) | Arg::Str(_)
            ) {
                return Err(ParseError {
                    line: cmd.line,
                    reason: format!("non executable command in pipeline stage {}", i + 1),
                });
            }
        }

        Ok(Pipeline {
            line,
            decl,
            is_assign,
            cmds,
        })
    }

    fn parse_command(&mut self, context: &str) -> PResult<Command> {
        let line = self.line();
        let mut args = Vec::new();
        loop {
            self.peek_non_space();
            if let Some(arg) = self.parse_operand()? {
                args.push(arg);
            }
            let tok = self.next();
            match tok.kind {
                Tok::Space => continue,
                Tok::RightDelim | Tok::RightParen => self.backup(),
                Tok::Pipe => {}
                _ => return Err(self.unexpected(&tok, "operand")),
            }
            break;
        }
        if args.is_empty() {
            return Err(ParseError {
                line,
                reason: format!("empty command in {context}"),
            });
        }
        if matches!(args[0], Arg::Nil) {
            return Err(ParseError {
                line,
                reason: "nil is not a command".to_string(),
            });
        }
        Ok(Command { line, args })
    }

    /// A term optionally followed by a `.Field` chain.
    fn parse_operand(&mut self) -> PResult<Option<Arg>> {
        let Some(term) = self.parse_term()? else {
            return Ok(None);
        };

        let mut chain = Vec::new();
        while let Tok::Field(name) = &self.peek().kind {
            chain.push(name.clone());
            self.next();
        }
        if chain.is_empty() {
            return Ok(Some(term));
        }

        Ok(Some(match term {
            Arg::Field(mut fields) => {
                fields.extend(chain);
                Arg::Field(fields)
            }
            Arg::Variable(name, mut fields) => {
                fields.extend(chain);
                Arg::Variable(name, fields)
            }
            Arg::Pipe(_) | Arg::Function(_) => Arg::Chain(Box::new(term), chain),
            other => return Err(self.error(format!("unexpected . after term {:?}", other.to_string()))),
        }))
    }

    fn parse_term(&mut self) -> PResult<Option<Arg>> {
        let tok = self.next();
        let arg = match tok.kind {
            Tok::Identifier(name) => {
                if !(self.is_func)(&name) {
                    return Err(ParseError {
                        line: tok.line,
                        reason: format!("function {name:?} not defined"),
                    });
                }
                Arg::Function(name)
            }
            Tok::Dot => Arg::Dot,
            Tok::Nil => Arg::Nil,
            Tok::Bool(b) => Arg::Bool(b),
            Tok::Number(n) => Arg::Int(n),
            Tok::Str(s) => Arg::Str(s),
            Tok::Field(name) => Arg::Field(vec![name]),
            Tok::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(ParseError {
                        line: tok.line,
                        reason: format!("undefined variable {name:?}"),
                    });
                }
                Arg::Variable(name, Vec::new())
            }
            Tok::LeftParen => Arg::Pipe(Box::new(self.nested(|p| {
                p.parse_pipeline("parenthesized pipeline", Tok::RightParen)
            })?)),
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(arg))
    }
}
