//! Runtime values flowing through template pipelines.

use std::fmt;
use std::rc::Rc;

/// A structured value whose named fields templates can reach with `.Field`.
pub trait Record: fmt::Debug {
    /// Type name used in error messages.
    fn type_name(&self) -> &'static str;

    /// Value of an exported field, or `None` if the type has no such field.
    fn field(&self, name: &str) -> Option<Value>;

    /// All field values in declaration order (used when the record is printed).
    fn values(&self) -> Vec<Value>;
}

/// A template value.
///
/// Strings are byte strings: message text reaches the output exactly as it
/// was transmitted, whatever its charset.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(Vec<u8>),
    Record(Rc<dyn Record>),
}

impl Value {
    /// Wrap a record so templates can read its fields.
    pub fn record(record: impl Record + 'static) -> Self {
        Value::Record(Rc::new(record))
    }

    /// Template truth: false, 0, the empty string and nil are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Record(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Record(r) => r.type_name(),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(s: &[u8]) -> Self {
        Value::Str(s.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(s: Vec<u8>) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl Value {
    /// Append the form an action prints. String bytes are copied unchanged.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Nil => out.extend_from_slice(b"<no value>"),
            Value::Bool(b) => out.extend_from_slice(b.to_string().as_bytes()),
            Value::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
            Value::Str(s) => out.extend_from_slice(s),
            Value::Record(r) => {
                out.push(b'{');
                for (i, v) in r.values().iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    v.write_to(out);
                }
                out.push(b'}');
            }
        }
    }

    /// The printed form as an owned byte string.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

/// Printed form for diagnostics; invalid UTF-8 is replaced.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Pair;

    impl Record for Pair {
        fn type_name(&self) -> &'static str {
            "Pair"
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "A" => Some("left".into()),
                "B" => Some(Value::Int(2)),
                _ => None,
            }
        }

        fn values(&self) -> Vec<Value> {
            vec!["left".into(), Value::Int(2)]
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::record(Pair).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Nil.to_string(), "<no value>");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::from("text").to_string(), "text");
        assert_eq!(Value::record(Pair).to_string(), "{left 2}");
    }

    #[test]
    fn test_string_bytes_print_unchanged() {
        let value = Value::from(&b"Caf\xe9"[..]);
        assert_eq!(value.to_bytes(), b"Caf\xe9");
        assert_eq!(value.to_string(), "Caf\u{FFFD}");
        assert!(value.is_truthy());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::record(Pair).type_name(), "Pair");
    }
}
