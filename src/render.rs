//! The full filter pipeline: raw message in, rendered bytes out.

use tracing::debug;

use crate::error::Result;
use crate::helpers;
use crate::model::Email;
use crate::parser::{message, mime};
use crate::template::{Template, Value};

/// Name templates are parsed under; it prefixes template error messages.
pub const TEMPLATE_NAME: &str = "email";

/// Render `source` against `email`, with the helper functions bound to it.
///
/// Message bytes reach the output unchanged; only the template's own text is UTF-8.
pub fn render(email: &Email, source: &str) -> Result<Vec<u8>> {
    let template = Template::new(TEMPLATE_NAME)
        .funcs(helpers::func_map(email))
        .parse(source)?;
    template.execute_to_bytes(&Value::record(email.clone()))
}

/// Parse `raw`, extract the parts whose Content-Type starts with `prefix`,
/// and render `source` against the result.
pub fn render_message(raw: &[u8], prefix: &str, source: &str) -> Result<Vec<u8>> {
    let msg = message::read_message(raw)?;
    let text = mime::extract_part(&msg, prefix)?;
    let email = Email::from_message(&msg, text);
    debug!(
        subject = %String::from_utf8_lossy(&email.subject),
        text_len = email.text.len(),
        "built email record"
    );
    render(&email, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailError;

    const MULTIPART: &[u8] = b"Subject: Parts\r\n\
        Date: Fri, 03 Jan 2025 10:00:00 +0000\r\n\
        Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
        \r\n\
        preamble\r\n\
        --b1\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        first\r\n\
        --b1\r\n\
        Content-Type: text/html\r\n\
        \r\n\
        <p>html</p>\r\n\
        --b1\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        second\r\n\
        --b1--\r\n";

    #[test]
    fn test_subject() {
        let out = render_message(b"Subject: Hello\n\nbody\n", "text/plain", "{{.Subject}}").unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_plain_body_ignores_prefix() {
        let raw = b"Content-Type: text/html\n\n<b>hi</b>\n";
        let out = render_message(raw, "text/plain", "{{.Text}}").unwrap();
        assert_eq!(out, b"<b>hi</b>\n");
    }

    #[test]
    fn test_multipart_concatenates_matching_parts() {
        let out = render_message(MULTIPART, "text/plain", "{{.Text}}").unwrap();
        assert_eq!(out, b"firstsecond");
        let out = render_message(MULTIPART, "text/html", "{{.Text}}").unwrap();
        assert_eq!(out, b"<p>html</p>");
    }

    #[test]
    fn test_non_utf8_message_passes_through() {
        let out = render_message(b"Subject: x\n\nCaf\xe9\n", "text/plain", "{{.Text}}").unwrap();
        assert_eq!(out, b"Caf\xe9\n");

        let raw = b"Subject: Caf\xe9\n\
Content-Type: multipart/mixed; boundary=b\n\n\
--b\nContent-Type: text/plain; charset=iso-8859-15\n\n\xa4 5\n--b--\n";
        let out = render_message(raw, "text/plain", "{{.Subject}}: {{.Text}}").unwrap();
        assert_eq!(out, b"Caf\xe9: \xa4 5");
    }

    #[test]
    fn test_helpers_available() {
        let out = render_message(
            MULTIPART,
            "text/plain",
            "{{datef \"2006-01-02\"}}_{{.Subject | underscore}}",
        )
        .unwrap();
        assert_eq!(out, b"2025-01-03_Parts");
    }

    #[test]
    fn test_bad_date_fails_execution() {
        let err = render_message(b"Date: yesterday\n\n", "text/plain", "{{datef \"2006\"}}")
            .unwrap_err();
        assert!(matches!(err, MailError::TemplateExec { .. }));
        assert!(err.to_string().contains("error calling datef"), "{err}");
    }

    #[test]
    fn test_malformed_content_type_fails() {
        let err = render_message(b"Content-Type: text/\n\nx", "text/plain", "{{.Text}}")
            .unwrap_err();
        assert!(matches!(err, MailError::ContentType { .. }));
    }

    #[test]
    fn test_empty_template() {
        assert!(render_message(b"Subject: x\n\n", "text/plain", "").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_field() {
        let err = render(&Email::default(), "{{.Cc}}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "template: email:1: executing \"email\" at <.Cc>: can't evaluate field Cc in type Email"
        );
    }

    #[test]
    fn test_deeply_nested_template_is_parse_error() {
        let source = format!("{{{{{}1{}}}}}", "(".repeat(20_000), ")".repeat(20_000));
        let err = render(&Email::default(), &source).unwrap_err();
        assert!(matches!(err, MailError::TemplateParse { .. }));
        assert_eq!(err.to_string(), "template: email:1: max expression depth exceeded");
    }
}
