//! MIME message parsing: headers, body extraction, decoded attachments, and
//! HTML-to-text conversion.

use mail_parser::{MessageParser, MimeHeaders};
use tracing::debug;

use crate::error::MessageError;
use crate::model::attachment::Attachment;
use crate::model::mail::{Message, MessageBody, MessageId};

use super::header::{find_header_end, parse_headers};

/// Parse a complete raw message (headers + body) into a [`Message`].
///
/// An optional leading mbox `From ` separator line is skipped. Fails with
/// [`MessageError::Parse`] when the bytes carry no recognisable header block.
pub fn parse_message(id: MessageId, raw: &[u8]) -> Result<Message, MessageError> {
    let bytes = skip_from_line(raw);
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(MessageError::Parse("message is empty".into()));
    }
    if !starts_with_header_field(bytes) {
        return Err(MessageError::Parse("no header fields found".into()));
    }

    let parsed = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| MessageError::Parse("MIME structure could not be parsed".into()))?;

    let header_end = find_header_end(bytes).unwrap_or(bytes.len());
    let headers = parse_headers(&bytes[..header_end]);

    let html = parsed.body_html(0).map(|s| s.into_owned());
    let text = parsed.body_text(0).map(|s| s.into_owned());
    let attachments = collect_attachments(&parsed);

    debug!(
        message = %id,
        attachments = attachments.len(),
        has_html = html.is_some(),
        "Parsed message"
    );

    Ok(Message {
        id,
        headers,
        body: MessageBody { text, html },
        attachments,
    })
}

/// Decode every attachment part of a parsed message, in MIME order.
fn collect_attachments(msg: &mail_parser::Message<'_>) -> Vec<Attachment> {
    msg.attachments()
        .enumerate()
        .map(|(idx, part)| {
            let declared = part.attachment_name().map(str::to_string);
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string())
                .to_ascii_lowercase();
            let is_disposition_attachment = part
                .content_disposition()
                .map(|d| d.ctype().eq_ignore_ascii_case("attachment"))
                .unwrap_or(false);

            Attachment {
                has_declared_name: declared.is_some(),
                filename: declared.unwrap_or_else(|| format!("attachment_{}", idx + 1)),
                content_type,
                content_id: part.content_id().map(str::to_string),
                is_disposition_attachment,
                data: part.contents().to_vec(),
            }
        })
        .collect()
}

/// Whether the first non-blank line looks like `Name: value`.
fn starts_with_header_field(data: &[u8]) -> bool {
    let first_line = data
        .split(|&b| b == b'\n')
        .find(|line| !line.iter().all(u8::is_ascii_whitespace))
        .unwrap_or_default();
    match first_line.iter().position(|&b| b == b':') {
        Some(0) | None => false,
        Some(colon) => first_line[..colon]
            .iter()
            .all(|&b| b.is_ascii_graphic() && b != b':'),
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub(crate) fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Convert an HTML body to plain text for page layout.
///
/// Line breaks come from `<br>` and block elements, scripts and styles are
/// dropped, and common entities are decoded.
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    for tag in ["br", "BR", "br/", "br /", "BR/"] {
        text = text.replace(&format!("<{tag}>"), "\n");
    }
    for tag in ["p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6"] {
        let upper = tag.to_uppercase();
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("<{tag} "), "\n<");
        text = text.replace(&format!("<{upper}>"), "\n");
        text = text.replace(&format!("</{tag}>"), "\n");
        text = text.replace(&format!("</{upper}>"), "\n");
    }

    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    for (entity, replacement) in [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
        ("&amp;", "&"),
    ] {
        stripped = stripped.replace(entity, replacement);
    }

    // Collapse runs of blank lines
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    // ASCII lowercasing keeps byte offsets aligned with the original.
    while let Some(start) = remaining.to_ascii_lowercase().find(&open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        match after.to_ascii_lowercase().find(&close) {
            Some(end) => remaining = &after[end + close.len()..],
            None => {
                remaining = "";
                break;
            }
        }
    }
    result.push_str(remaining);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> MessageId {
        MessageId::new(0, "test.eml")
    }

    const MULTIPART: &str = "From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Invoice\r\n\
Date: Mon, 15 Jan 2024 09:30:00 +0100\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Please find the invoice attached.\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"invoice.pdf\"\r\n\
Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ--\r\n";

    #[test]
    fn test_parse_multipart_with_pdf() {
        let msg = parse_message(id(), MULTIPART.as_bytes()).expect("parse");
        assert_eq!(msg.headers.subject, "Invoice");
        assert_eq!(msg.headers.from[0].address, "alice@example.com");
        assert!(msg
            .body
            .text
            .as_deref()
            .is_some_and(|t| t.contains("invoice attached")));
        assert_eq!(msg.attachments.len(), 1);
        let att = &msg.attachments[0];
        assert_eq!(att.filename, "invoice.pdf");
        assert_eq!(att.content_type, "application/pdf");
        assert!(att.is_disposition_attachment);
        assert_eq!(att.data, b"%PDF-1.4\n");
        assert!(att.is_embeddable());
    }

    #[test]
    fn test_parse_skips_mbox_separator() {
        let raw = b"From alice@example.com Mon Jan 15 09:30:00 2024\nSubject: Hi\n\nBody\n";
        let msg = parse_message(id(), raw).expect("parse");
        assert_eq!(msg.headers.subject, "Hi");
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_parse_rejects_empty_and_headerless_input() {
        assert!(matches!(
            parse_message(id(), b"  \n\n"),
            Err(MessageError::Parse(_))
        ));
        assert!(matches!(
            parse_message(id(), b"just some words without headers\n"),
            Err(MessageError::Parse(_))
        ));
    }

    #[test]
    fn test_skip_from_line_no_from() {
        let data = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(data), data);
    }

    #[test]
    fn test_html_to_text_basic() {
        let text = html_to_text("<p>Hello <b>world</b></p><p>Second paragraph</p>");
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_html_to_text_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(html_to_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_html_to_text_removes_scripts_and_styles() {
        let html = "Before<SCRIPT>alert('x')</SCRIPT><style>p{}</style>After";
        assert_eq!(html_to_text(html), "BeforeAfter");
    }
}
