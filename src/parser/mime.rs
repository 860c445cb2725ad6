//! MIME handling: `Content-Type` parsing, a single-level multipart reader,
//! and extraction of the parts matching a content-type prefix.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::{MailError, Result};
use crate::parser::header::{self, Headers};
use crate::parser::message::Message;

/// Media type assumed when a message has no `Content-Type` header (RFC 2045 §5.2).
const DEFAULT_MEDIA_TYPE: &[u8] = b"text/plain";

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Lowercased `type/subtype` (or a bare `type`).
    pub essence: String,
    /// Parameters keyed by lowercased name. RFC 2231 extended and continued
    /// parameters (`name*`, `name*0`, ...) are stored under their base name.
    pub params: BTreeMap<String, Vec<u8>>,
}

impl MediaType {
    pub fn is_multipart(&self) -> bool {
        self.essence.starts_with("multipart/")
    }

    pub fn param(&self, name: &str) -> Option<&[u8]> {
        self.params.get(name).map(Vec::as_slice)
    }
}

/// Parse a `Content-Type` value such as `multipart/mixed; boundary="xyz"`.
pub fn parse_media_type(value: impl AsRef<[u8]>) -> Result<MediaType> {
    let value = value.as_ref();
    let fail = |reason: &str| MailError::ContentType {
        value: String::from_utf8_lossy(value).into_owned(),
        reason: reason.to_string(),
    };

    let split = value.iter().position(|&b| b == b';').unwrap_or(value.len());
    let (head, mut rest) = value.split_at(split);
    let head = head.trim_ascii().to_ascii_lowercase();

    let (main, after) = consume_token(&head);
    if main.is_empty() {
        return Err(fail("no media type"));
    }
    if !after.is_empty() {
        let Some(sub) = after.strip_prefix(b"/") else {
            return Err(fail("expected slash after first token"));
        };
        let (subtype, trailing) = consume_token(sub);
        if subtype.is_empty() {
            return Err(fail("expected token after slash"));
        }
        if !trailing.is_empty() {
            return Err(fail("unexpected content after media subtype"));
        }
    }

    let mut params = BTreeMap::new();
    let mut extended: BTreeMap<String, BTreeMap<String, Vec<u8>>> = BTreeMap::new();
    loop {
        rest = rest.trim_ascii_start();
        if rest.is_empty() {
            break;
        }
        match consume_param(rest) {
            Some((name, val, remaining)) => {
                let map = match name.split_once('*') {
                    Some((base, _)) => extended.entry(base.to_string()).or_default(),
                    None => &mut params,
                };
                // Repeats are tolerated only when they agree.
                if map.get(&name).is_some_and(|existing| *existing != val) {
                    return Err(fail("duplicate parameter name"));
                }
                map.insert(name, val);
                rest = remaining;
            }
            None if rest.trim_ascii() == b";" => break,
            None => return Err(fail("invalid media parameter")),
        }
    }

    for (base, pieces) in &extended {
        if let Some(joined) = join_extended(base, pieces) {
            params.insert(base.clone(), joined);
        }
    }

    Ok(MediaType {
        // Validated above as tokens, which are ASCII.
        essence: String::from_utf8_lossy(&head).into_owned(),
        params,
    })
}

/// RFC 2045 tspecials.
fn is_tspecial(b: u8) -> bool {
    b"()<>@,;:\\\"/[]?=".contains(&b)
}

/// Printable ASCII other than space and tspecials.
fn is_token_char(b: u8) -> bool {
    b > 0x20 && b < 0x7f && !is_tspecial(b)
}

fn consume_token(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|&b| !is_token_char(b)).unwrap_or(s.len());
    s.split_at(end)
}

/// Consume `; name=value`, returning the lowercased name, the value and the rest.
fn consume_param(s: &[u8]) -> Option<(String, Vec<u8>, &[u8])> {
    let s = s.strip_prefix(b";")?.trim_ascii_start();
    let (name, s) = consume_token(s);
    if name.is_empty() {
        return None;
    }
    let s = s.trim_ascii_start().strip_prefix(b"=")?.trim_ascii_start();
    let (value, rest) = consume_value(s)?;
    let name = String::from_utf8_lossy(name).to_ascii_lowercase();
    Some((name, value, rest))
}

/// A parameter value is a token or a quoted string.
///
/// Inside quotes a backslash only escapes a tspecial; before anything else
/// it is kept as a literal backslash.
fn consume_value(s: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let Some(quoted) = s.strip_prefix(b"\"") else {
        let (token, rest) = consume_token(s);
        if token.is_empty() {
            return None;
        }
        return Some((token.to_vec(), rest));
    };

    let mut value = Vec::new();
    let mut i = 0;
    while i < quoted.len() {
        match quoted[i] {
            b'"' => return Some((value, &quoted[i + 1..])),
            b'\\' if quoted.get(i + 1).is_some_and(|&b| is_tspecial(b)) => {
                value.push(quoted[i + 1]);
                i += 1;
            }
            b'\r' | b'\n' => return None,
            b => value.push(b),
        }
        i += 1;
    }
    None
}

/// Stitch the RFC 2231 pieces of one parameter back together.
///
/// `name*` is a single extended value; `name*0`, `name*1*`, ... are numbered
/// continuations, percent-decoded when their name ends in `*`.
fn join_extended(base: &str, pieces: &BTreeMap<String, Vec<u8>>) -> Option<Vec<u8>> {
    if let Some(value) = pieces.get(&format!("{base}*")) {
        return decode_extended(value);
    }

    let mut joined = Vec::new();
    let mut found = false;
    for n in 0usize.. {
        let plain = format!("{base}*{n}");
        if let Some(value) = pieces.get(&plain) {
            found = true;
            joined.extend_from_slice(value);
            continue;
        }
        let Some(value) = pieces.get(&format!("{plain}*")) else {
            break;
        };
        found = true;
        if n == 0 {
            joined.extend(decode_extended(value).unwrap_or_default());
        } else {
            joined.extend(percent_decode(value).unwrap_or_default());
        }
    }
    found.then_some(joined)
}

/// Decode `charset'language'percent-encoded`. Only ASCII and UTF-8 are accepted.
fn decode_extended(value: &[u8]) -> Option<Vec<u8>> {
    let mut fields = value.splitn(3, |&b| b == b'\'');
    let charset = fields.next()?;
    let _language = fields.next()?;
    let encoded = fields.next()?;
    if !charset.eq_ignore_ascii_case(b"us-ascii") && !charset.eq_ignore_ascii_case(b"utf-8") {
        return None;
    }
    percent_decode(encoded)
}

/// `%XX` unescaping; a malformed escape rejects the whole value.
fn percent_decode(value: &[u8]) -> Option<Vec<u8>> {
    let hex = |b: u8| char::from(b).to_digit(16);
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        if value[i] == b'%' {
            let hi = hex(*value.get(i + 1)?)?;
            let lo = hex(*value.get(i + 2)?)?;
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(value[i]);
            i += 1;
        }
    }
    Some(out)
}

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    /// The part's own header fields.
    pub headers: Headers,
    content: &'a [u8],
}

impl<'a> Part<'a> {
    /// Raw content bytes, without the line break preceding the next delimiter.
    pub fn content(&self) -> &'a [u8] {
        self.content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// Still in the preamble; no delimiter seen yet.
    Preamble,
    /// Positioned at the start of a delimiter line.
    AtDelimiter,
    /// Closing delimiter consumed.
    Finished,
}

/// Delimiter kinds recognised on a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Next,
    Close,
}

/// Iterates the parts of a multipart body exactly once, in order.
///
/// Nested multiparts are not descended into: they come back as opaque parts.
pub struct MultipartReader<'a> {
    body: &'a [u8],
    /// Offset of `body` inside the whole message, for error positions.
    base: usize,
    dash_boundary: Vec<u8>,
    pos: usize,
    state: ReaderState,
}

impl<'a> MultipartReader<'a> {
    pub fn new(body: &'a [u8], boundary: impl AsRef<[u8]>) -> Self {
        Self::with_offset(body, boundary, 0)
    }

    pub fn with_offset(body: &'a [u8], boundary: impl AsRef<[u8]>, base: usize) -> Self {
        let mut dash_boundary = b"--".to_vec();
        dash_boundary.extend_from_slice(boundary.as_ref());
        Self {
            body,
            base,
            dash_boundary,
            pos: 0,
            state: ReaderState::Preamble,
        }
    }

    /// Return the next part, or `None` once the closing delimiter is reached.
    pub fn next_part(&mut self) -> Result<Option<Part<'a>>> {
        match self.state {
            ReaderState::Finished => return Ok(None),
            ReaderState::Preamble => {
                if !self.skip_preamble()? {
                    return Ok(None);
                }
            }
            ReaderState::AtDelimiter => {
                let (line, next) = header::next_line(self.body, self.pos);
                match self.delimiter(line) {
                    Some(Delimiter::Close) => {
                        self.state = ReaderState::Finished;
                        return Ok(None);
                    }
                    Some(Delimiter::Next) => self.pos = next,
                    None => {
                        return Err(MailError::MimeError(format!(
                            "expected boundary delimiter at offset {}",
                            self.base + self.pos
                        )))
                    }
                }
            }
        }

        let start = self.pos;
        let (headers, consumed) =
            header::parse_header_block(&self.body[start..], self.base + start)?;
        let content_start = start + consumed;

        let Some(delim_at) = self.find_delimiter(content_start) else {
            return Err(MailError::MimeError(format!(
                "unexpected end of input in part starting at offset {}",
                self.base + start
            )));
        };

        let mut content_end = delim_at;
        if content_end > content_start && self.body[content_end - 1] == b'\n' {
            content_end -= 1;
            if content_end > content_start && self.body[content_end - 1] == b'\r' {
                content_end -= 1;
            }
        }

        self.pos = delim_at;
        self.state = ReaderState::AtDelimiter;

        Ok(Some(Part {
            headers,
            content: &self.body[content_start..content_end],
        }))
    }

    /// Skip preamble lines up to and including the first delimiter.
    ///
    /// Returns `false` when the first delimiter is already the closing one.
    fn skip_preamble(&mut self) -> Result<bool> {
        let mut pos = 0;
        while pos < self.body.len() {
            let (line, next) = header::next_line(self.body, pos);
            match self.delimiter(line) {
                Some(Delimiter::Next) => {
                    self.pos = next;
                    self.state = ReaderState::AtDelimiter;
                    return Ok(true);
                }
                Some(Delimiter::Close) => {
                    self.state = ReaderState::Finished;
                    return Ok(false);
                }
                None => pos = next,
            }
        }
        Err(MailError::MimeError(format!(
            "no boundary delimiter {:?} found in body",
            String::from_utf8_lossy(&self.dash_boundary)
        )))
    }

    /// Offset of the next line at or after `from` that is a delimiter.
    fn find_delimiter(&self, from: usize) -> Option<usize> {
        let mut pos = from;
        while pos < self.body.len() {
            let (line, next) = header::next_line(self.body, pos);
            if self.delimiter(line).is_some() {
                return Some(pos);
            }
            pos = next;
        }
        None
    }

    fn delimiter(&self, line: &[u8]) -> Option<Delimiter> {
        let rest = line.strip_prefix(self.dash_boundary.as_slice())?;
        let (kind, rest) = match rest.strip_prefix(b"--") {
            Some(after) => (Delimiter::Close, after),
            None => (Delimiter::Next, rest),
        };
        rest.iter()
            .all(|&b| b == b' ' || b == b'\t')
            .then_some(kind)
    }
}

/// Extract the text of a message for rendering.
///
/// Multipart messages yield the in-order concatenation of every part whose
/// own `Content-Type` starts with `prefix`. Any other message yields its
/// whole body, whatever its content type. Bytes are returned as transmitted.
pub fn extract_part(message: &Message<'_>, prefix: &str) -> Result<Vec<u8>> {
    let content_type = message
        .headers
        .find("Content-Type")
        .unwrap_or(DEFAULT_MEDIA_TYPE);
    let media = parse_media_type(content_type)?;

    if !media.is_multipart() {
        debug!(media_type = %media.essence, bytes = message.body().len(), "Using whole body");
        return Ok(message.body().to_vec());
    }

    let boundary = media
        .param("boundary")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            MailError::MimeError(format!(
                "{} message has no boundary parameter",
                media.essence
            ))
        })?;

    debug!(
        media_type = %media.essence,
        boundary = %String::from_utf8_lossy(boundary),
        prefix,
        "Extracting parts"
    );

    let mut reader = MultipartReader::with_offset(message.body(), boundary, message.body_offset());
    let mut text = Vec::new();
    let mut index = 0usize;
    while let Some(part) = reader.next_part()? {
        let part_type = part.headers.get("Content-Type");
        let matched = part_type.starts_with(prefix.as_bytes());
        trace!(
            index,
            content_type = %String::from_utf8_lossy(part_type),
            bytes = part.content().len(),
            matched,
            "Visited MIME part"
        );
        if matched {
            text.extend_from_slice(part.content());
        }
        index += 1;
    }

    debug!(parts = index, bytes = text.len(), "Extracted text");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::message::read_message;

    #[test]
    fn test_parse_media_type_simple() {
        let mt = parse_media_type("Text/Plain").unwrap();
        assert_eq!(mt.essence, "text/plain");
        assert!(mt.params.is_empty());
        assert!(!mt.is_multipart());
    }

    #[test]
    fn test_parse_media_type_params() {
        let mt = parse_media_type("multipart/mixed; Boundary=\"a b\\\"c\"; charset=utf-8").unwrap();
        assert!(mt.is_multipart());
        assert_eq!(mt.param("boundary"), Some(&b"a b\"c"[..]));
        assert_eq!(mt.param("charset"), Some(&b"utf-8"[..]));
    }

    #[test]
    fn test_parse_media_type_backslash_escapes_only_tspecials() {
        let mt = parse_media_type("text/plain; name=\"C:\\dev\\a.txt\"; q=\"a\\\"b\"").unwrap();
        assert_eq!(mt.param("name"), Some(&br"C:\dev\a.txt"[..]));
        assert_eq!(mt.param("q"), Some(&b"a\"b"[..]));
        let mt = parse_media_type(r#"text/plain; x="a\b\\c""#).unwrap();
        assert_eq!(mt.param("x"), Some(&br"a\b\c"[..]));
    }

    #[test]
    fn test_parse_media_type_rfc2231_parameters() {
        let mt = parse_media_type("multipart/mixed; boundary*=utf-8''b%20one").unwrap();
        assert_eq!(mt.param("boundary"), Some(&b"b one"[..]));

        let mt = parse_media_type("multipart/mixed; boundary*0=abc; boundary*1=\"def\"").unwrap();
        assert_eq!(mt.param("boundary"), Some(&b"abcdef"[..]));

        let mt = parse_media_type("text/plain; name*0*=us-ascii'en'a%2Db; name*1*=%2Ec; name*2=d").unwrap();
        assert_eq!(mt.param("name"), Some(&b"a-b.cd"[..]));

        let mt = parse_media_type("text/plain; name*=iso-8859-1''caf%E9").unwrap();
        assert_eq!(mt.param("name"), None);
    }

    #[test]
    fn test_parse_media_type_repeated_equal_parameter() {
        let mt = parse_media_type("text/plain; charset=utf-8; CHARSET=utf-8").unwrap();
        assert_eq!(mt.param("charset"), Some(&b"utf-8"[..]));
    }

    #[test]
    fn test_parse_media_type_bare_type() {
        assert_eq!(parse_media_type("text").unwrap().essence, "text");
    }

    #[test]
    fn test_parse_media_type_trailing_semicolon() {
        let mt = parse_media_type("text/plain; charset=us-ascii;").unwrap();
        assert_eq!(mt.param("charset"), Some(&b"us-ascii"[..]));
    }

    #[test]
    fn test_parse_media_type_errors() {
        for bad in [
            "",
            "   ",
            "/plain",
            "text/",
            "text plain",
            "text/plain junk",
            "text/plain; charset",
            "text/plain; charset=",
            "text/plain; =utf-8",
            "text/plain; charset=\"unterminated",
            "text/plain; a=1; A=2",
        ] {
            assert!(parse_media_type(bad).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn test_multipart_reader_parts() {
        let body = b"preamble\r\n--XX\r\nContent-Type: text/plain\r\n\r\nfirst\r\n--XX\r\n\r\nsecond\nline\r\n--XX--\r\nepilogue\r\n";
        let mut reader = MultipartReader::new(body, b"XX");

        let p1 = reader.next_part().unwrap().unwrap();
        assert_eq!(p1.headers.get("content-type"), b"text/plain");
        assert_eq!(p1.content(), b"first");

        let p2 = reader.next_part().unwrap().unwrap();
        assert!(p2.headers.is_empty());
        assert_eq!(p2.content(), b"second\nline");

        assert!(reader.next_part().unwrap().is_none());
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_multipart_reader_boundary_prefix_is_not_delimiter() {
        let body = b"--XX\n\nkeep\n--XXY\nstill content\n--XX--";
        let mut reader = MultipartReader::new(body, b"XX");
        let part = reader.next_part().unwrap().unwrap();
        assert_eq!(part.content(), b"keep\n--XXY\nstill content");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_multipart_reader_delimiter_trailing_whitespace() {
        let body = b"--XX \t\n\nbody\n--XX-- \n";
        let mut reader = MultipartReader::new(body, b"XX");
        assert_eq!(reader.next_part().unwrap().unwrap().content(), b"body");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_multipart_reader_empty_content() {
        let body = b"--XX\nContent-Type: text/plain\n\n--XX--\n";
        let mut reader = MultipartReader::new(body, b"XX");
        assert_eq!(reader.next_part().unwrap().unwrap().content(), b"");
    }

    #[test]
    fn test_multipart_reader_no_delimiter() {
        let mut reader = MultipartReader::new(b"nothing here\n", b"XX");
        assert!(reader.next_part().is_err());
    }

    #[test]
    fn test_multipart_reader_unterminated_part() {
        let mut reader = MultipartReader::new(b"--XX\n\nbody without end\n", b"XX");
        assert!(reader.next_part().is_err());
    }

    #[test]
    fn test_multipart_reader_bad_part_headers() {
        let mut reader = MultipartReader::new(b"--XX\nnot a header\n\nx\n--XX--\n", b"XX");
        assert!(reader.next_part().is_err());
    }

    #[test]
    fn test_extract_non_multipart_ignores_prefix() {
        let msg = read_message(b"Content-Type: text/html\n\n<b>hi</b>\n").unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"<b>hi</b>\n");
    }

    #[test]
    fn test_extract_missing_content_type_uses_body() {
        let msg = read_message(b"Subject: x\n\nplain body").unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"plain body");
    }

    #[test]
    fn test_extract_multipart_concatenates_matching_parts() {
        let raw = b"Content-Type: multipart/alternative; boundary=b1\n\n\
--b1\nContent-Type: text/plain; charset=utf-8\n\nHello \n\
--b1\nContent-Type: text/html\n\n<p>Hello</p>\n\
--b1\nContent-Type: text/plain\n\nWorld\n\
--b1--\n";
        let msg = read_message(raw).unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"Hello World");
        assert_eq!(extract_part(&msg, "text/html").unwrap(), b"<p>Hello</p>");
    }

    #[test]
    fn test_extract_prefix_is_case_sensitive() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\nContent-Type: TEXT/PLAIN\n\nx\n--b--\n";
        let msg = read_message(raw).unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"");
    }

    #[test]
    fn test_extract_does_not_decode_transfer_encoding() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\nContent-Type: text/plain\nContent-Transfer-Encoding: base64\n\nSGVsbG8=\n--b--\n";
        let msg = read_message(raw).unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"SGVsbG8=");
    }

    #[test]
    fn test_extract_nested_multipart_is_opaque() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\n\n\
--outer\nContent-Type: multipart/alternative; boundary=inner\n\n\
--inner\nContent-Type: text/plain\n\nnested\n--inner--\n\
--outer\nContent-Type: text/plain\n\ntop\n\
--outer--\n";
        let msg = read_message(raw).unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"top");
    }

    #[test]
    fn test_extract_keeps_raw_bytes() {
        let msg = read_message(b"Subject: x\n\nCaf\xe9\n").unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"Caf\xe9\n");

        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n\
--b\nContent-Type: text/plain; charset=iso-8859-15\n\n\xa4 5\n--b--\n";
        let msg = read_message(raw).unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"\xa4 5");
    }

    #[test]
    fn test_extract_rfc2231_boundary() {
        let raw = b"Content-Type: multipart/mixed; boundary*0=sp; boundary*1=lit\n\n\
--split\nContent-Type: text/plain\n\njoined\n--split--\n";
        let msg = read_message(raw).unwrap();
        assert_eq!(extract_part(&msg, "text/plain").unwrap(), b"joined");
    }

    #[test]
    fn test_extract_malformed_content_type() {
        let msg = read_message(b"Content-Type: text/\n\nbody").unwrap();
        assert!(matches!(
            extract_part(&msg, "text/plain"),
            Err(MailError::ContentType { .. })
        ));
    }

    #[test]
    fn test_extract_multipart_without_boundary() {
        let msg = read_message(b"Content-Type: multipart/mixed\n\n--x\n\nbody\n--x--\n").unwrap();
        assert!(matches!(
            extract_part(&msg, "text/plain"),
            Err(MailError::MimeError(_))
        ));
    }
}
