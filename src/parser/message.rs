//! Reader for a single RFC 5322 message (as delivered on stdin by a mail filter hook).

use std::io::Read;

use tracing::debug;

use crate::error::{MailError, Result};
use crate::parser::header::{self, Headers};

/// A parsed message: its headers plus the unconsumed raw body.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    /// Top-level header fields.
    pub headers: Headers,
    body: &'a [u8],
    body_offset: usize,
}

impl<'a> Message<'a> {
    /// First value of a header, or `""` when absent.
    pub fn header(&self, name: &str) -> &[u8] {
        self.headers.get(name)
    }

    /// Raw body bytes, exactly as transmitted.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Byte offset of the body inside the original input.
    pub fn body_offset(&self) -> usize {
        self.body_offset
    }
}

/// Read a whole stream into memory.
///
/// `source_name` only labels I/O errors (e.g. `"<stdin>"`).
pub fn read_input<R: Read>(mut reader: R, source_name: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| MailError::io(source_name, e))?;
    debug!(bytes = data.len(), source = source_name, "Read input");
    Ok(data)
}

/// Parse one message: header block, empty line, body.
pub fn read_message(data: &[u8]) -> Result<Message<'_>> {
    if data.is_empty() {
        return Err(MailError::parse(0, "empty message"));
    }

    let start = skip_envelope(data);
    let (headers, consumed) = header::parse_header_block(&data[start..], start)?;
    let body_offset = start + consumed;

    debug!(
        headers = headers.len(),
        body_bytes = data.len() - body_offset,
        "Parsed message"
    );

    Ok(Message {
        headers,
        body: &data[body_offset..],
        body_offset,
    })
}

/// Offset of the first header line, past a UTF-8 BOM and an mbox `From ` line.
fn skip_envelope(data: &[u8]) -> usize {
    let mut start = 0;
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        start = 3;
    }

    if data[start..].starts_with(b"From ") {
        if let Some(pos) = data[start..].iter().position(|&b| b == b'\n') {
            return start + pos + 1;
        }
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_message_basic() {
        let data = b"Subject: Hello\nFrom: alice@example.com\n\nBody here\n";
        let msg = read_message(data).unwrap();
        assert_eq!(msg.header("Subject"), b"Hello");
        assert_eq!(msg.header("from"), b"alice@example.com");
        assert_eq!(msg.body(), b"Body here\n");
        assert_eq!(msg.body_offset(), 40);
    }

    #[test]
    fn test_read_message_empty_input() {
        let err = read_message(b"").unwrap_err();
        assert!(err.to_string().contains("empty message"));
    }

    #[test]
    fn test_read_message_skips_mbox_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        let msg = read_message(data).unwrap();
        assert_eq!(msg.header("subject"), b"Test");
        assert_eq!(msg.body(), b"Body\n");
    }

    #[test]
    fn test_read_message_skips_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"Subject: Bom\n\nx");
        let msg = read_message(&data).unwrap();
        assert_eq!(msg.header("subject"), b"Bom");
    }

    #[test]
    fn test_read_message_without_separator() {
        assert!(read_message(b"Subject: Hello\n").is_err());
        assert!(read_message(b"just some text").is_err());
    }

    #[test]
    fn test_read_message_empty_body() {
        let msg = read_message(b"Subject: x\n\n").unwrap();
        assert!(msg.body().is_empty());
    }

    #[test]
    fn test_read_input() {
        let data = read_input(&b"Subject: a\n\nb"[..], "<test>").unwrap();
        assert_eq!(data, b"Subject: a\n\nb");
    }

    #[test]
    fn test_read_input_error_names_source() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("boom"))
            }
        }
        let err = read_input(Broken, "<stdin>").unwrap_err();
        assert!(err.to_string().contains("<stdin>"));
    }
}
