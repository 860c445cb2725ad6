//! RFC 5322 header blocks: line splitting, folding and validation.
//!
//! Field values are kept as the transmitted bytes; no charset is applied.

use crate::error::{MailError, Result};

/// An ordered header collection with case-insensitive, first-match lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<u8>)>,
}

impl Headers {
    /// Get the first value for a header name (ASCII case-insensitive).
    ///
    /// Returns `""` when the header is absent.
    pub fn get(&self, name: &str) -> &[u8] {
        self.find(name).unwrap_or_default()
    }

    /// Like [`Headers::get`], but distinguishes an absent header.
    pub fn find(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Number of header fields (repeated names count once per occurrence).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in transmission order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Parse a header block terminated by an empty line.
///
/// `base` is the offset of `data` inside the whole input and is only used for
/// error positions. Returns the headers and the number of bytes consumed,
/// including the terminating empty line.
pub fn parse_header_block(data: &[u8], base: usize) -> Result<(Headers, usize)> {
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    let mut pos = 0;

    loop {
        if pos >= data.len() {
            return Err(MailError::parse(
                base + pos,
                "unexpected end of input before header/body separator",
            ));
        }

        let (line, next) = next_line(data, pos);

        if line.is_empty() {
            return Ok((Headers { entries }, next));
        }

        if line[0] == b' ' || line[0] == b'\t' {
            // Continuation line
            let Some((_, value)) = entries.last_mut() else {
                return Err(MailError::parse(
                    base + pos,
                    "continuation line before the first header",
                ));
            };
            let folded = trim_ws(line);
            if !folded.is_empty() {
                if !value.is_empty() {
                    value.push(b' ');
                }
                value.extend_from_slice(folded);
            }
        } else {
            let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
                MailError::parse(
                    base + pos,
                    format!("malformed header line: {:?}", String::from_utf8_lossy(line)),
                )
            })?;
            let name = &line[..colon];
            if !is_valid_field_name(name) {
                return Err(MailError::parse(
                    base + pos,
                    format!("invalid header field name: {:?}", String::from_utf8_lossy(name)),
                ));
            }
            // Field names are printable ASCII, so this never loses data.
            let name = String::from_utf8_lossy(name).into_owned();
            entries.push((name, trim_ws(&line[colon + 1..]).to_vec()));
        }

        pos = next;
    }
}

/// Return the line starting at `pos` (without its `\n` or `\r\n`) and the
/// offset of the following line.
pub(crate) fn next_line(data: &[u8], pos: usize) -> (&[u8], usize) {
    let rest = &data[pos..];
    let (line, next) = match rest.iter().position(|&b| b == b'\n') {
        Some(nl) => (&rest[..nl], pos + nl + 1),
        None => (rest, data.len()),
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    (line, next)
}

/// RFC 5322 `ftext`: printable US-ASCII except colon.
fn is_valid_field_name(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(|&b| (33..=126).contains(&b) && b != b':')
}

fn trim_ws(bytes: &[u8]) -> &[u8] {
    let is_ws = |b: &u8| *b == b' ' || *b == b'\t';
    let start = bytes.iter().position(|b| !is_ws(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_ws(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}
