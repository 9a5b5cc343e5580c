//! Plain text-layout PDF backend built on `lopdf`.
//!
//! Lays out wrapped lines of Helvetica on A4 pages. HTML bodies are flattened
//! to text first; inline images are not drawn.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::trace;

use super::{Notice, RenderBackend};
use crate::document::fragment::PdfFragment;
use crate::error::RenderError;
use crate::model::address::format_list;
use crate::model::mail::Message;
use crate::parser::mime::html_to_text;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

/// Page geometry and type size, in PDF points.
#[derive(Debug, Clone, Copy)]
pub struct PageSetup {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub font_size: f32,
}

impl Default for PageSetup {
    /// A4 with 2 cm margins and 10 pt text.
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            margin: 56.0,
            font_size: 10.0,
        }
    }
}

/// Renders messages and notices as simple text pages.
#[derive(Debug, Clone, Default)]
pub struct PdfTextBackend {
    setup: PageSetup,
}

impl PdfTextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup(setup: PageSetup) -> Self {
        Self { setup }
    }
}

impl RenderBackend for PdfTextBackend {
    fn render_body(&self, message: &Message) -> Result<PdfFragment, RenderError> {
        let mut page = PageWriter::new(self.setup);
        let h = &message.headers;

        let date = if h.date_raw.is_empty() {
            h.date.map(|d| d.to_rfc2822()).unwrap_or_default()
        } else {
            h.date_raw.clone()
        };
        for (label, value) in [
            ("Date", date),
            ("From", format_list(&h.from)),
            ("To", format_list(&h.to)),
            ("CC", format_list(&h.cc)),
            ("BCC", format_list(&h.bcc)),
            ("Subject", h.subject.clone()),
        ] {
            page.labelled(label, &value);
        }
        page.rule();

        let body = match (&message.body.html, &message.body.text) {
            (Some(html), _) => html_to_text(html),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        };
        if body.trim().is_empty() {
            page.paragraph("(No content)", false);
        } else {
            page.paragraph(&body, false);
        }

        let listed = message.listed_attachment_names();
        if !listed.is_empty() {
            page.blank();
            page.paragraph("Attachments in this email:", true);
            for name in listed {
                page.paragraph(&format!("- {name}"), false);
            }
        }

        let fragment = page.finish()?;
        trace!(message = %message.id, pages = fragment.pages(), "Rendered body");
        Ok(fragment)
    }

    fn render_notice(&self, notice: &Notice<'_>) -> Result<PdfFragment, RenderError> {
        let mut page = PageWriter::new(self.setup);
        page.skip(100.0);

        match notice {
            Notice::AttachmentTitle {
                filename,
                fingerprint,
            } => {
                page.heading(&format!("Attachment: {filename}"));
                page.paragraph(&format!("SHA-256: {fingerprint}"), false);
            }
            Notice::DuplicateReference {
                filename,
                fingerprint,
                original,
            } => {
                page.heading(&format!("Attachment: {filename}"));
                page.paragraph(
                    &format!(
                        "Same content as {}, first included with message {}.",
                        original.first_seen_filename, original.first_seen_message.label
                    ),
                    false,
                );
                page.paragraph("Its pages are not repeated here.", false);
                page.blank();
                page.labelled("First included as", &original.first_seen_filename);
                page.labelled("In message", &original.first_seen_message.label);
                page.labelled("SHA-256", &fingerprint.to_hex());
            }
            Notice::BrokenAttachment { filename, reason } => {
                page.heading("Failed to Merge Attachment");
                page.paragraph(filename, true);
                page.paragraph(
                    "This PDF may be corrupted or use unsupported features.",
                    false,
                );
                page.labelled("Reason", reason);
            }
            Notice::FailedMessage { label, reason } => {
                page.heading("Failed to Convert Message");
                page.paragraph(label, true);
                page.labelled("Reason", reason);
            }
        }

        page.finish()
    }
}

/// One positioned line of text.
struct Line {
    text: Vec<u8>,
    font: &'static str,
    size: f32,
    y: f32,
}

/// Accumulates wrapped lines and breaks pages as it goes.
struct PageWriter {
    setup: PageSetup,
    pages: Vec<Vec<Line>>,
    y: f32,
}

impl PageWriter {
    fn new(setup: PageSetup) -> Self {
        Self {
            setup,
            pages: vec![Vec::new()],
            y: setup.height - setup.margin,
        }
    }

    fn line_height(size: f32) -> f32 {
        size * 1.35
    }

    /// Characters per line at `size`, using Helvetica's average glyph width.
    fn columns(&self, size: f32) -> usize {
        let usable = self.setup.width - 2.0 * self.setup.margin;
        ((usable / (size * 0.52)) as usize).max(10)
    }

    fn push(&mut self, text: &str, font: &'static str, size: f32) {
        let step = Self::line_height(size);
        if self.y - step < self.setup.margin {
            self.pages.push(Vec::new());
            self.y = self.setup.height - self.setup.margin;
        }
        self.y -= step;
        let y = self.y;
        if let Some(current) = self.pages.last_mut() {
            current.push(Line {
                text: encode_win_ansi(text),
                font,
                size,
                y,
            });
        }
    }

    fn paragraph(&mut self, text: &str, bold: bool) {
        let size = self.setup.font_size;
        let font = if bold { BOLD } else { REGULAR };
        for raw_line in text.lines() {
            let wrapped = wrap(raw_line, self.columns(size));
            if wrapped.is_empty() {
                self.blank();
            }
            for line in wrapped {
                self.push(&line, font, size);
            }
        }
    }

    fn labelled(&mut self, label: &str, value: &str) {
        self.paragraph(&format!("{label}: {value}"), false);
    }

    fn heading(&mut self, text: &str) {
        let size = self.setup.font_size * 1.8;
        for line in wrap(text, self.columns(size)) {
            self.push(&line, BOLD, size);
        }
        self.blank();
    }

    fn blank(&mut self) {
        self.y -= Self::line_height(self.setup.font_size);
    }

    fn rule(&mut self) {
        let width = self.columns(self.setup.font_size).min(80);
        self.push(&"_".repeat(width), REGULAR, self.setup.font_size);
        self.blank();
    }

    fn skip(&mut self, points: f32) {
        self.y = (self.y - points).max(self.setup.margin);
    }

    fn finish(self) -> Result<PdfFragment, RenderError> {
        let setup = self.setup;
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(font_dict("Helvetica"));
        let bold = doc.add_object(font_dict("Helvetica-Bold"));
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! {
                REGULAR => regular,
                BOLD => bold,
            },
        });

        let mut kids = Vec::with_capacity(self.pages.len());
        for lines in &self.pages {
            let mut operations = Vec::with_capacity(lines.len() * 5);
            for line in lines {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![line.font.into(), Object::Real(line.size)],
                ));
                operations.push(Operation::new(
                    "Td",
                    vec![Object::Real(setup.margin), Object::Real(line.y)],
                ));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(line.text.clone())],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations }
                .encode()
                .map_err(|e| RenderError(format!("content stream: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    Object::Real(setup.width),
                    Object::Real(setup.height),
                ],
                "Resources" => resources,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        PdfFragment::from_document(&mut doc).map_err(|e| RenderError(format!("save: {e}")))
    }
}

fn font_dict(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Encode for a WinAnsi Type1 font. Latin-1 maps directly; anything else
/// becomes `?`. Tabs become spaces and other control characters are dropped.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(b' '),
            c if c.is_control() => None,
            c if (c as u32) < 0x100 => Some(c as u8),
            _ => Some(b'?'),
        })
        .collect()
}

/// Greedy word wrap to `columns` characters; overlong words are hard-split.
/// A line that is empty after trimming yields no output lines.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > columns {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = chars.split_off(columns);
            lines.push(chars.into_iter().collect());
            chars = rest;
        }
        let word_len = chars.len();
        if current_len > 0 && current_len + 1 + word_len > columns {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(chars);
        current_len += word_len;
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fingerprint::fingerprint;
    use crate::document::ledger::DedupRecord;
    use crate::model::mail::MessageId;
    use crate::parser::mime::parse_message;

    fn message(raw: &str) -> Message {
        parse_message(MessageId::new(0, "m.eml"), raw.as_bytes()).expect("parse")
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("café\t€"), b"caf\xe9 ?".to_vec());
    }

    #[test]
    fn test_body_renders_one_page() {
        let msg = message("From: a@x.org\nTo: b@y.org\nSubject: Hello\n\nShort body.\n");
        let fragment = PdfTextBackend::new().render_body(&msg).expect("render");
        assert_eq!(fragment.pages(), 1);
        let doc = Document::load_mem(fragment.bytes()).expect("valid pdf");
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_long_body_breaks_pages() {
        let body = "line of body text\n".repeat(400);
        let msg = message(&format!("From: a@x.org\nSubject: Long\n\n{body}"));
        let fragment = PdfTextBackend::new().render_body(&msg).expect("render");
        assert!(fragment.pages() > 1);
    }

    #[test]
    fn test_narrow_page_setup_needs_more_pages() {
        let body = "word ".repeat(2_000);
        let msg = message(&format!("From: a@x.org\nSubject: Wide\n\n{body}\n"));
        let wide = PdfTextBackend::new().render_body(&msg).expect("render");
        let narrow = PdfTextBackend::with_setup(PageSetup {
            width: 300.0,
            height: 420.0,
            ..PageSetup::default()
        })
        .render_body(&msg)
        .expect("render");
        assert!(narrow.pages() > wide.pages());
    }

    #[test]
    fn test_reference_page_names_first_message() {
        let fp = fingerprint(b"payload");
        let original = DedupRecord {
            fingerprint: fp,
            first_seen_filename: "a.pdf".into(),
            first_seen_message: MessageId::new(3, "first.eml"),
        };
        let fragment = PdfTextBackend::new()
            .render_notice(&Notice::DuplicateReference {
                filename: "b.pdf",
                fingerprint: &fp,
                original: &original,
            })
            .expect("render");
        let text = String::from_utf8_lossy(fragment.bytes());
        assert!(text.contains("first included with message first.eml"));
        assert!(!text.contains("this document"));
    }

    #[test]
    fn test_every_notice_is_one_page() {
        let backend = PdfTextBackend::new();
        let fp = fingerprint(b"payload");
        let original = DedupRecord {
            fingerprint: fp,
            first_seen_filename: "a.pdf".into(),
            first_seen_message: MessageId::new(0, "first.eml"),
        };
        let notices = [
            Notice::AttachmentTitle {
                filename: "a.pdf",
                fingerprint: &fp,
            },
            Notice::DuplicateReference {
                filename: "b.pdf",
                fingerprint: &fp,
                original: &original,
            },
            Notice::BrokenAttachment {
                filename: "c.pdf",
                reason: "malformed PDF",
            },
            Notice::FailedMessage {
                label: "bad.eml",
                reason: "parse error",
            },
        ];
        for notice in &notices {
            let fragment = backend.render_notice(notice).expect("render");
            assert_eq!(fragment.pages(), 1, "{notice:?}");
        }
    }
}
