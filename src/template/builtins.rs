//! Predefined template functions.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use super::value::Value;

type FuncImpl = dyn Fn(&[Value]) -> Result<Value, String>;

/// A callable template function with its accepted argument count.
pub struct Func {
    min_args: usize,
    max_args: Option<usize>,
    imp: Box<FuncImpl>,
}

impl Func {
    /// A function taking exactly `arity` arguments.
    pub fn new(arity: usize, f: impl Fn(&[Value]) -> Result<Value, String> + 'static) -> Self {
        Self {
            min_args: arity,
            max_args: Some(arity),
            imp: Box::new(f),
        }
    }

    /// A function taking `min` or more arguments.
    pub fn variadic(min: usize, f: impl Fn(&[Value]) -> Result<Value, String> + 'static) -> Self {
        Self {
            min_args: min,
            max_args: None,
            imp: Box::new(f),
        }
    }

    pub fn check_arity(&self, name: &str, got: usize) -> Result<(), String> {
        match self.max_args {
            Some(max) if got != max || got < self.min_args => Err(format!(
                "wrong number of args for {name}: want {max} got {got}"
            )),
            None if got < self.min_args => Err(format!(
                "wrong number of args for {name}: want at least {} got {got}",
                self.min_args
            )),
            _ => Ok(()),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.imp)(args)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

/// Functions available to a template, keyed by name.
pub type FuncMap = BTreeMap<String, Func>;

/// The functions every template gets.
pub fn builtins() -> FuncMap {
    let mut m = FuncMap::new();
    let mut add = |name: &str, f: Func| {
        m.insert(name.to_string(), f);
    };

    // and/or are evaluated lazily by the executor; these are only reached
    // through `call` from outside a template.
    add("and", Func::variadic(1, |a| Ok(first_or_last(a, false))));
    add("or", Func::variadic(1, |a| Ok(first_or_last(a, true))));
    add("not", Func::new(1, |a| Ok(Value::Bool(!a[0].is_truthy()))));
    add("len", Func::new(1, |a| length(&a[0])));

    add("eq", Func::variadic(1, eq));
    add("ne", Func::new(2, |a| Ok(Value::Bool(!equal(&a[0], &a[1])?))));
    add("lt", Func::new(2, |a| ordered(a, |o| o == Ordering::Less)));
    add("le", Func::new(2, |a| ordered(a, |o| o != Ordering::Greater)));
    add("gt", Func::new(2, |a| ordered(a, |o| o == Ordering::Greater)));
    add("ge", Func::new(2, |a| ordered(a, |o| o != Ordering::Less)));

    add("print", Func::variadic(0, |a| Ok(Value::Str(sprint(a)))));
    add("println", Func::variadic(0, |a| Ok(Value::Str(sprintln(a)))));
    add("printf", Func::variadic(1, printf));
    add("html", Func::variadic(0, |a| Ok(Value::Str(html_escape(&sprint(a))))));
    add("urlquery", Func::variadic(0, |a| Ok(Value::Str(query_escape(&sprint(a))))));
    add("slice", Func::variadic(1, slice));
    m
}

fn first_or_last(args: &[Value], stop_when: bool) -> Value {
    args.iter()
        .find(|v| v.is_truthy() == stop_when)
        .or_else(|| args.last())
        .cloned()
        .unwrap_or(Value::Nil)
}

/// Extract a string argument or report the type that was passed instead.
pub fn str_arg(value: &Value) -> Result<&[u8], String> {
    value.as_bytes().ok_or_else(|| {
        format!(
            "wrong type for value; expected string; got {}",
            value.type_name()
        )
    })
}

fn length(value: &Value) -> Result<Value, String> {
    match value {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        Value::Nil => Err("len of nil pointer".to_string()),
        other => Err(format!("len of type {}", other.type_name())),
    }
}

fn equal(a: &Value, b: &Value) -> Result<bool, String> {
    match (a, b) {
        (Value::Record(_), _) | (_, Value::Record(_)) => {
            Err("invalid type for comparison".to_string())
        }
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        _ => Err("incompatible types for comparison".to_string()),
    }
}

fn eq(args: &[Value]) -> Result<Value, String> {
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| "missing argument for comparison".to_string())?;
    if rest.is_empty() {
        return Err("missing argument for comparison".to_string());
    }
    for other in rest {
        if equal(first, other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ordered(args: &[Value], pred: impl Fn(Ordering) -> bool) -> Result<Value, String> {
    let ord = match (&args[0], &args[1]) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Int(_), Value::Str(_)) | (Value::Str(_), Value::Int(_)) => {
            return Err("incompatible types for comparison".to_string())
        }
        _ => return Err("invalid type for comparison".to_string()),
    };
    Ok(Value::Bool(pred(ord)))
}

/// Operand bytes as the fmt package prints them with `%v`.
fn plain(value: &Value) -> Vec<u8> {
    match value {
        Value::Nil => b"<nil>".to_vec(),
        other => other.to_bytes(),
    }
}

/// Spaces go between operands when neither side is a string.
fn sprint(args: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(b' ');
        }
        out.extend_from_slice(&plain(arg));
    }
    out
}

fn sprintln(args: &[Value]) -> Vec<u8> {
    let mut out = args.iter().map(plain).collect::<Vec<_>>().join(&b' ');
    out.push(b'\n');
    out
}

/// Characters in `bytes`, counting each invalid byte as one.
fn rune_count(bytes: &[u8]) -> usize {
    bytes
        .utf8_chunks()
        .map(|chunk| chunk.valid().chars().count() + chunk.invalid().len())
        .sum()
}

#[derive(Default)]
struct Directive {
    minus: bool,
    zero: bool,
    plus: bool,
    width: Option<usize>,
}

impl Directive {
    fn pad(&self, body: Vec<u8>, numeric: bool) -> Vec<u8> {
        let len = rune_count(&body);
        let width = match self.width {
            Some(w) if w > len => w,
            _ => return body,
        };
        let fill = width - len;
        let mut out = Vec::with_capacity(body.len() + fill);
        if self.minus {
            out.extend_from_slice(&body);
            out.resize(out.len() + fill, b' ');
        } else if self.zero && numeric {
            let digits = match body.first() {
                Some(sign @ (b'-' | b'+')) => {
                    out.push(*sign);
                    &body[1..]
                }
                _ => &body[..],
            };
            out.resize(out.len() + fill, b'0');
            out.extend_from_slice(digits);
        } else {
            out.resize(fill, b' ');
            out.extend_from_slice(&body);
        }
        out
    }
}

fn bad_verb(verb: char, value: &Value) -> Vec<u8> {
    match value {
        Value::Nil => format!("%!{verb}(<nil>)").into_bytes(),
        other => {
            let mut out = format!("%!{verb}({}=", other.type_name()).into_bytes();
            other.write_to(&mut out);
            out.push(b')');
            out
        }
    }
}

/// Double-quoted with escapes; bytes outside valid UTF-8 become `\xNN`.
fn quote(bytes: &[u8]) -> Vec<u8> {
    let mut out = String::from("\"");
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    let _ = write!(out, "\\u{:04x}", u32::from(c));
                }
                c => out.push(c),
            }
        }
        for b in chunk.invalid() {
            let _ = write!(out, "\\x{b:02x}");
        }
    }
    out.push('"');
    out.into_bytes()
}

fn hex(bytes: &[u8], upper: bool) -> Vec<u8> {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = if upper {
            write!(out, "{b:02X}")
        } else {
            write!(out, "{b:02x}")
        };
    }
    out.into_bytes()
}

fn format_one(verb: char, directive: &Directive, value: &Value) -> Vec<u8> {
    let text = match (verb, value) {
        ('v', v) => plain(v),
        ('s', Value::Str(s)) => s.clone(),
        ('s', Value::Record(_)) => plain(value),
        ('q', Value::Str(s)) => quote(s),
        ('t', Value::Bool(b)) => b.to_string().into_bytes(),
        ('d', Value::Int(n)) => {
            if directive.plus && *n >= 0 {
                format!("+{n}").into_bytes()
            } else {
                n.to_string().into_bytes()
            }
        }
        ('x', Value::Int(n)) => int_hex(*n, false).into_bytes(),
        ('X', Value::Int(n)) => int_hex(*n, true).into_bytes(),
        ('x', Value::Str(s)) => hex(s, false),
        ('X', Value::Str(s)) => hex(s, true),
        _ => return bad_verb(verb, value),
    };
    directive.pad(text, matches!(value, Value::Int(_)))
}

fn int_hex(n: i64, upper: bool) -> String {
    let digits = if upper {
        format!("{:X}", n.unsigned_abs())
    } else {
        format!("{:x}", n.unsigned_abs())
    };
    if n < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}

/// The character starting `bytes` and its encoded length.
fn next_char(bytes: &[u8]) -> Option<(char, usize)> {
    let chunk = bytes.utf8_chunks().next()?;
    match chunk.valid().chars().next() {
        Some(c) => Some((c, c.len_utf8())),
        None => Some((char::REPLACEMENT_CHARACTER, 1)),
    }
}

fn printf(args: &[Value]) -> Result<Value, String> {
    let format = str_arg(&args[0])?;
    let operands = &args[1..];
    let mut next = 0;
    let mut out = Vec::new();
    let mut i = 0;

    while i < format.len() {
        if format[i] != b'%' {
            out.push(format[i]);
            i += 1;
            continue;
        }
        i += 1;

        let mut directive = Directive::default();
        while let Some(&flag) = format.get(i) {
            match flag {
                b'-' => directive.minus = true,
                b'0' => directive.zero = true,
                b'+' => directive.plus = true,
                _ => break,
            }
            i += 1;
        }
        let digits = format[i..].iter().take_while(|b| b.is_ascii_digit()).count();
        directive.width = std::str::from_utf8(&format[i..i + digits])
            .ok()
            .and_then(|w| w.parse().ok());
        i += digits;

        let Some((verb, len)) = next_char(&format[i..]) else {
            out.extend_from_slice(b"%!(NOVERB)");
            break;
        };
        i += len;
        if verb == '%' {
            out.push(b'%');
            continue;
        }
        match operands.get(next) {
            Some(value) => out.extend_from_slice(&format_one(verb, &directive, value)),
            None => out.extend_from_slice(format!("%!{verb}(MISSING)").as_bytes()),
        }
        next += 1;
    }

    if next < operands.len() {
        out.extend_from_slice(b"%!(EXTRA ");
        for (n, v) in operands[next..].iter().enumerate() {
            if n > 0 {
                out.extend_from_slice(b", ");
            }
            match v {
                Value::Nil => out.extend_from_slice(b"<nil>"),
                other => {
                    out.extend_from_slice(other.type_name().as_bytes());
                    out.push(b'=');
                    other.write_to(&mut out);
                }
            }
        }
        out.push(b')');
    }
    Ok(Value::Str(out))
}

fn html_escape(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for &b in s {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'\'' => out.extend_from_slice(b"&#39;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            b'"' => out.extend_from_slice(b"&#34;"),
            0 => out.extend_from_slice("\u{FFFD}".as_bytes()),
            b => out.push(b),
        }
    }
    out
}

fn query_escape(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for &b in s {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b),
            b' ' => out.push(b'+'),
            _ => out.extend_from_slice(format!("%{b:02X}").as_bytes()),
        }
    }
    out
}

fn slice(args: &[Value]) -> Result<Value, String> {
    let s = match &args[0] {
        Value::Str(s) => s,
        other => return Err(format!("can't slice item of type {}", other.type_name())),
    };
    let indexes = &args[1..];
    if indexes.len() > 2 {
        return Err("cannot 3-index slice a string".to_string());
    }

    let mut bounds = [0, s.len()];
    for (slot, value) in bounds.iter_mut().zip(indexes) {
        let Value::Int(n) = value else {
            return Err(format!(
                "cannot index slice/array with type {}",
                value.type_name()
            ));
        };
        if *n < 0 || *n as usize > s.len() {
            return Err(format!("index out of range: {n}"));
        }
        *slot = *n as usize;
    }
    let [start, end] = bounds;
    if start > end {
        return Err(format!("invalid slice index: {start} > {end}"));
    }
    Ok(Value::Str(s[start..end].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, String> {
        let funcs = builtins();
        let f = &funcs[name];
        f.check_arity(name, args.len())?;
        f.call(args)
    }

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_arity_messages() {
        let funcs = builtins();
        assert_eq!(
            funcs["not"].check_arity("not", 0).unwrap_err(),
            "wrong number of args for not: want 1 got 0"
        );
        assert_eq!(
            funcs["printf"].check_arity("printf", 0).unwrap_err(),
            "wrong number of args for printf: want at least 1 got 0"
        );
        assert!(funcs["print"].check_arity("print", 0).is_ok());
    }

    #[test]
    fn test_comparisons() {
        assert!(call("eq", &[s("a"), s("b"), s("a")]).unwrap().is_truthy());
        assert!(!call("eq", &[Value::Int(1), Value::Int(2)]).unwrap().is_truthy());
        assert!(call("ne", &[s("a"), s("b")]).unwrap().is_truthy());
        assert!(call("lt", &[Value::Int(1), Value::Int(2)]).unwrap().is_truthy());
        assert!(call("ge", &[s("b"), s("a")]).unwrap().is_truthy());
        assert_eq!(
            call("eq", &[s("1"), Value::Int(1)]).unwrap_err(),
            "incompatible types for comparison"
        );
        assert_eq!(
            call("lt", &[Value::Bool(true), Value::Bool(false)]).unwrap_err(),
            "invalid type for comparison"
        );
        assert_eq!(
            call("eq", &[s("x")]).unwrap_err(),
            "missing argument for comparison"
        );
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(sprint(&[s("a"), s("b")]), b"ab");
        assert_eq!(sprint(&[Value::Int(1), Value::Int(2)]), b"1 2");
        assert_eq!(sprint(&[s("a"), Value::Int(2)]), b"a2");
        assert_eq!(sprintln(&[s("a"), Value::Int(2)]), b"a 2\n");
    }

    #[test]
    fn test_printf_verbs() {
        let out = call(
            "printf",
            &[s("%s|%v|%d|%q|%t|%x|%%"), s("hi"), Value::Int(3), Value::Int(-4), s("q"), Value::Bool(true), Value::Int(255)],
        )
        .unwrap();
        assert_eq!(out.to_string(), "hi|3|-4|\"q\"|true|ff|%");
    }

    #[test]
    fn test_printf_width() {
        let out = call("printf", &[s("[%5s][%-4d][%03d]"), s("ab"), Value::Int(7), Value::Int(-5)]).unwrap();
        assert_eq!(out.to_string(), "[   ab][7   ][-05]");
    }

    #[test]
    fn test_printf_errors_inline() {
        let out = call("printf", &[s("%d %s"), s("x")]).unwrap();
        assert_eq!(out.to_string(), "%!d(string=x) %!s(MISSING)");
        let out = call("printf", &[s("a"), Value::Int(1)]).unwrap();
        assert_eq!(out.to_string(), "a%!(EXTRA int=1)");
        let out = call("printf", &[s("50%")]).unwrap();
        assert_eq!(out.to_string(), "50%!(NOVERB)");
    }

    #[test]
    fn test_printf_needs_string_format() {
        assert_eq!(
            call("printf", &[Value::Int(1)]).unwrap_err(),
            "wrong type for value; expected string; got int"
        );
    }

    #[test]
    fn test_html_and_urlquery() {
        assert_eq!(
            call("html", &[s("<a href=\"x\">&'</a>")]).unwrap().to_string(),
            "&lt;a href=&#34;x&#34;&gt;&amp;&#39;&lt;/a&gt;"
        );
        assert_eq!(
            call("urlquery", &[s("a b&c=d/é")]).unwrap().to_string(),
            "a+b%26c%3Dd%2F%C3%A9"
        );
    }

    #[test]
    fn test_len_and_slice() {
        assert_eq!(call("len", &[s("héllo")]).unwrap().to_string(), "6");
        assert_eq!(
            call("slice", &[s("abcdef"), Value::Int(1), Value::Int(3)]).unwrap().to_string(),
            "bc"
        );
        assert_eq!(call("slice", &[s("abcdef"), Value::Int(4)]).unwrap().to_string(), "ef");
        assert_eq!(
            call("slice", &[s("abc"), Value::Int(5)]).unwrap_err(),
            "index out of range: 5"
        );
        assert!(call("len", &[Value::Int(1)]).unwrap_err().contains("len of type int"));
    }

    #[test]
    fn test_not() {
        assert!(call("not", &[s("")]).unwrap().is_truthy());
        assert!(!call("not", &[Value::Int(1)]).unwrap().is_truthy());
    }

    #[test]
    fn test_string_functions_keep_raw_bytes() {
        let latin1 = Value::from(&b"<Caf\xe9>"[..]);
        assert_eq!(
            call("html", &[latin1.clone()]).unwrap().to_bytes(),
            b"&lt;Caf\xe9&gt;"
        );
        assert_eq!(
            call("slice", &[latin1.clone(), Value::Int(4), Value::Int(5)]).unwrap().to_bytes(),
            b"\xe9"
        );
        assert_eq!(call("len", &[latin1.clone()]).unwrap().to_string(), "6");
        assert_eq!(
            call("printf", &[s("[%s|%q|%6s]"), latin1.clone(), latin1, s("é")])
                .unwrap()
                .to_bytes(),
            b"[<Caf\xe9>|\"<Caf\\xe9>\"|     \xc3\xa9]"
        );
    }
}

