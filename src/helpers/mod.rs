//! Helper functions exposed to templates alongside the builtins.

pub mod layout;

use tracing::trace;

use crate::model::Email;
use crate::template::{str_arg, Func, FuncMap, Value};

/// Helpers bound to one email: `datef` reads that email's `Date` header.
pub fn func_map(email: &Email) -> FuncMap {
    let mut funcs = FuncMap::new();

    let date = email.date.clone();
    funcs.insert(
        "datef".to_string(),
        Func::new(1, move |args| {
            let layout = str_arg(&args[0])?;
            datef(&date, layout).map(Value::Str)
        }),
    );
    funcs.insert(
        "underscore".to_string(),
        Func::new(1, |args| Ok(Value::from(underscore(str_arg(&args[0])?)))),
    );
    funcs
}

/// Reformat an RFC 1123 date (numeric zone) using a reference layout.
pub fn datef(date: &[u8], layout: &[u8]) -> Result<Vec<u8>, String> {
    // Bytes outside UTF-8 can never match the date layout.
    let date = String::from_utf8_lossy(date);
    let parsed = layout::parse(layout::RFC1123Z, &date).map_err(|e| e.to_string())?;
    let out = layout::format(&parsed, layout);
    trace!(
        date = %date,
        layout = %String::from_utf8_lossy(layout),
        out = %String::from_utf8_lossy(&out),
        "datef"
    );
    Ok(out)
}

/// Spaces become underscores; anything outside `[A-Za-z0-9_-]` is dropped.
pub fn underscore(s: impl AsRef<[u8]>) -> String {
    s.as_ref()
        .iter()
        .map(|&b| if b == b' ' { b'_' } else { b })
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore() {
        assert_eq!(underscore("a b-c_d!"), "a_b-c_d");
        assert_eq!(underscore("Héllo  wörld?"), "Hllo__wrld");
        assert_eq!(underscore(""), "");
    }

    #[test]
    fn test_underscore_drops_non_ascii_bytes() {
        assert_eq!(underscore(b"Caf\xe9 cr\xe8me"), "Caf_crme");
    }

    #[test]
    fn test_underscore_idempotent() {
        for s in ["a b-c_d!", "Re: [list] Weekly  report (3/4)", "tab\there", "ü"] {
            let once = underscore(s);
            assert_eq!(underscore(&once), once);
        }
    }

    #[test]
    fn test_datef() {
        assert_eq!(
            datef(b"Fri, 03 Jan 2025 10:00:00 +0000", b"2006-01-02").unwrap(),
            b"2025-01-03"
        );
        assert_eq!(
            datef(b"Tue, 15 Jul 2025 18:30:00 -0400", b"Jan 2, 3:04pm (-07:00)").unwrap(),
            b"Jul 15, 6:30pm (-04:00)"
        );
    }

    #[test]
    fn test_datef_rejects_other_formats() {
        let err = datef(b"2025-01-03", b"2006").unwrap_err();
        assert!(err.starts_with("parsing time \"2025-01-03\""), "{err}");
        assert!(datef(b"", b"2006").is_err());
        assert!(datef(b"Fri, 03 Jan 2025 10:00:00 +0000\xff", b"2006").is_err());
    }

    #[test]
    fn test_func_map_binds_date() {
        let email = Email {
            date: b"Fri, 03 Jan 2025 10:00:00 +0000".to_vec(),
            ..Email::default()
        };
        let funcs = func_map(&email);
        let out = funcs["datef"].call(&[Value::from("Monday")]).unwrap();
        assert_eq!(out.to_string(), "Friday");
        let err = funcs["underscore"].call(&[Value::Int(3)]).unwrap_err();
        assert_eq!(err, "wrong type for value; expected string; got int");
    }
}
