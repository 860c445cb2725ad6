//! Template lexer: splits source text into literal text and action tokens.

use std::str::Chars;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    If,
    Else,
    End,
    With,
    Range,
    Define,
    Template,
    Block,
    Break,
    Continue,
}

impl Keyword {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::With => "with",
            Keyword::Range => "range",
            Keyword::Define => "define",
            Keyword::Template => "template",
            Keyword::Block => "block",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "with" => Keyword::With,
            "range" => Keyword::Range,
            "define" => Keyword::Define,
            "template" => Keyword::Template,
            "block" => Keyword::Block,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tok {
    Text(String),
    LeftDelim,
    RightDelim,
    Space,
    Pipe,
    LeftParen,
    RightParen,
    /// `:=`
    Declare,
    /// `=`
    Assign,
    Dot,
    /// `.Name`, stored without the dot.
    Field(String),
    /// `$` or `$name`, stored with the dollar sign.
    Variable(String),
    Identifier(String),
    Keyword(Keyword),
    Bool(bool),
    Nil,
    Number(i64),
    /// Quoted or raw string literal, already unquoted.
    Str(Vec<u8>),
    Eof,
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tok::Text(t) => write!(f, "{t:?}"),
            Tok::LeftDelim => f.write_str("\"{{\""),
            Tok::RightDelim => f.write_str("\"}}\""),
            Tok::Space => f.write_str("space"),
            Tok::Pipe => f.write_str("\"|\""),
            Tok::LeftParen => f.write_str("\"(\""),
            Tok::RightParen => f.write_str("\")\""),
            Tok::Declare => f.write_str("\":=\""),
            Tok::Assign => f.write_str("\"=\""),
            Tok::Dot => f.write_str("\".\""),
            Tok::Field(name) => write!(f, "<.{name}>"),
            Tok::Variable(name) => write!(f, "<{name}>"),
            Tok::Identifier(name) => write!(f, "<{name}>"),
            Tok::Keyword(k) => write!(f, "<{}>", k.as_str()),
            Tok::Bool(b) => write!(f, "<{b}>"),
            Tok::Nil => f.write_str("<nil>"),
            Tok::Number(n) => write!(f, "<{n}>"),
            Tok::Str(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Tok::Eof => f.write_str("EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: Tok,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub line: usize,
    pub reason: String,
}

/// Tokenize a whole template source.
pub(crate) fn lex(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer {
        src,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        trim_next_text: false,
    }
    .run()
}

struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    /// Set by a ` -}}` marker: strip leading whitespace from the next text.
    trim_next_text: bool,
}

impl<'s> Lexer<'s> {
    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.src.len() {
            self.lex_text()?;
        }
        self.emit(Tok::Eof);
        Ok(self.tokens)
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn emit(&mut self, kind: Tok) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn advance(&mut self, n: usize) {
        self.line += self.src[self.pos..self.pos + n].matches('\n').count();
        self.pos += n;
    }

    fn error(&self, reason: impl Into<String>) -> LexError {
        LexError {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn lex_text(&mut self) -> Result<(), LexError> {
        let rest = self.rest();
        let delim = rest.find(LEFT_DELIM);
        let raw = &rest[..delim.unwrap_or(rest.len())];
        let trim_left = delim.is_some_and(|i| has_left_trim_marker(&rest[i + LEFT_DELIM.len()..]));

        let mut text = raw;
        if std::mem::take(&mut self.trim_next_text) {
            text = text.trim_start_matches(is_space);
        }
        if trim_left {
            text = text.trim_end_matches(is_space);
        }
        if !text.is_empty() {
            self.emit(Tok::Text(text.to_string()));
        }
        self.advance(raw.len());

        if delim.is_none() {
            return Ok(());
        }
        self.advance(LEFT_DELIM.len());
        if trim_left {
            self.advance(2);
        }

        if self.rest().starts_with("/*") {
            return self.lex_comment();
        }
        self.emit(Tok::LeftDelim);
        self.lex_inside_action()
    }

    fn lex_comment(&mut self) -> Result<(), LexError> {
        let Some(end) = self.rest()[2..].find("*/") else {
            return Err(self.error("unclosed comment"));
        };
        self.advance(2 + end + 2);
        match self.at_right_delim() {
            Some((n, trim)) => {
                self.advance(n);
                self.trim_next_text = trim;
                Ok(())
            }
            None => Err(self.error("comment ends before closing delimiter")),
        }
    }

    /// Length of the right delimiter at the current position (with its trim
    /// marker, if any) and whether it trims.
    fn at_right_delim(&self) -> Option<(usize, bool)> {
        let rest = self.rest();
        if rest.starts_with(RIGHT_DELIM) {
            return Some((RIGHT_DELIM.len(), false));
        }
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some(c), Some('-')) if is_space(c) && rest[2..].starts_with(RIGHT_DELIM) => {
                Some((2 + RIGHT_DELIM.len(), true))
            }
            _ => None,
        }
    }

    fn lex_inside_action(&mut self) -> Result<(), LexError> {
        loop {
            if let Some((n, trim)) = self.at_right_delim() {
                self.emit(Tok::RightDelim);
                self.advance(n);
                self.trim_next_text = trim;
                return Ok(());
            }

            let rest = self.rest();
            let Some(c) = rest.chars().next() else {
                return Err(self.error("unclosed action"));
            };

            match c {
                c if is_space(c) => self.lex_space(),
                '|' => self.single(Tok::Pipe),
                '(' => self.single(Tok::LeftParen),
                ')' => self.single(Tok::RightParen),
                '=' => self.single(Tok::Assign),
                ':' => {
                    if !rest.starts_with(":=") {
                        return Err(self.error("expected :="));
                    }
                    self.emit(Tok::Declare);
                    self.advance(2);
                }
                '"' => self.lex_quote()?,
                '`' => self.lex_raw_quote()?,
                '$' => {
                    let len = 1 + word_len(&rest[1..]);
                    self.emit(Tok::Variable(rest[..len].to_string()));
                    self.advance(len);
                }
                '.' => match rest[1..].chars().next() {
                    Some(d) if d.is_ascii_digit() => {
                        return Err(self.error(format!("bad number syntax: {:?}", &rest[..2])))
                    }
                    Some(a) if is_alnum(a) => {
                        let len = 1 + word_len(&rest[1..]);
                        self.emit(Tok::Field(rest[1..len].to_string()));
                        self.advance(len);
                    }
                    _ => self.single(Tok::Dot),
                },
                '+' | '-' | '0'..='9' => self.lex_number()?,
                c if is_alnum(c) => self.lex_identifier(),
                c => return Err(self.error(format!("unrecognized character in action: {c:?}"))),
            }
        }
    }

    fn single(&mut self, kind: Tok) {
        self.emit(kind);
        self.advance(1);
    }

    fn lex_space(&mut self) {
        let rest = self.rest();
        let mut n = rest.find(|c: char| !is_space(c)).unwrap_or(rest.len());
        // Leave the last space for a ` -}}` trim marker.
        if rest[n..].starts_with("-}}") {
            n -= rest[..n].chars().next_back().map_or(0, char::len_utf8);
        }
        if n > 0 {
            self.emit(Tok::Space);
            self.advance(n);
        }
    }

    fn lex_quote(&mut self) -> Result<(), LexError> {
        let rest = self.rest();
        let mut escaped = false;
        let mut end = None;
        for (i, c) in rest.char_indices().skip(1) {
            if c == '\n' {
                break;
            }
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                end = Some(i);
                break;
            }
        }
        let Some(end) = end else {
            return Err(self.error("unterminated quoted string"));
        };
        let value = unquote(&rest[1..end]).map_err(|e| self.error(e))?;
        self.emit(Tok::Str(value));
        self.advance(end + 1);
        Ok(())
    }

    fn lex_raw_quote(&mut self) -> Result<(), LexError> {
        let rest = self.rest();
        let Some(end) = rest[1..].find('`') else {
            return Err(self.error("unterminated raw quoted string"));
        };
        self.emit(Tok::Str(rest[1..1 + end].as_bytes().to_vec()));
        self.advance(end + 2);
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let rest = self.rest();
        let sign = usize::from(rest.starts_with(['+', '-']));
        let len = sign
            + rest[sign..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_'))
                .unwrap_or(rest.len() - sign);
        let literal = &rest[..len];
        let digits: String = literal.chars().filter(|&c| c != '_').collect();

        if digits.len() == sign || !digits[sign..].bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.error(format!("bad number syntax: {literal:?}")));
        }
        let n = digits
            .parse::<i64>()
            .map_err(|_| self.error(format!("number out of range: {literal:?}")))?;
        self.emit(Tok::Number(n));
        self.advance(len);
        Ok(())
    }

    fn lex_identifier(&mut self) {
        let rest = self.rest();
        let len = word_len(rest);
        let word = &rest[..len];
        let kind = match word {
            "true" => Tok::Bool(true),
            "false" => Tok::Bool(false),
            "nil" => Tok::Nil,
            _ => match Keyword::from_word(word) {
                Some(k) => Tok::Keyword(k),
                None => Tok::Identifier(word.to_string()),
            },
        };
        self.emit(kind);
        self.advance(len);
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_alnum(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn word_len(s: &str) -> usize {
    s.find(|c: char| !is_alnum(c)).unwrap_or(s.len())
}

/// `{{- ` trims: a dash followed by whitespace.
fn has_left_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

/// Resolve backslash escapes of a double-quoted literal.
///
/// `\x` and octal escapes produce single bytes, so the result need not be UTF-8.
fn unquote(raw: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        let escape = chars.next().ok_or("invalid syntax")?;
        let decoded = match escape {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0C',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0B',
            '\\' | '"' | '\'' => escape,
            'x' => {
                out.push(byte_escape(take_digits(&mut chars, 2, 16))?);
                continue;
            }
            'u' => take_digits(&mut chars, 4, 16)
                .and_then(char::from_u32)
                .ok_or("invalid \\u escape")?,
            'U' => take_digits(&mut chars, 8, 16)
                .and_then(char::from_u32)
                .ok_or("invalid \\U escape")?,
            '0'..='7' => {
                let rest = take_digits(&mut chars, 2, 8).ok_or("invalid octal escape")?;
                out.push(byte_escape(escape.to_digit(8).map(|d| d * 64 + rest))?);
                continue;
            }
            other => return Err(format!("invalid escape sequence \\{other}")),
        };
        push_char(&mut out, decoded);
    }
    Ok(out)
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn take_digits(chars: &mut Chars<'_>, n: usize, radix: u32) -> Option<u32> {
    (0..n).try_fold(0u32, |acc, _| {
        let digit = chars.next()?.to_digit(radix)?;
        Some(acc * radix + digit)
    })
}

fn byte_escape(code: Option<u32>) -> Result<u8, String> {
    match code {
        Some(c) => u8::try_from(c).map_err(|_| format!("octal escape value {c} > 255")),
        None => Err("invalid byte escape".to_string()),
    }
}
