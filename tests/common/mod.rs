//! Shared fixtures for the integration tests: generated PDFs, raw messages,
//! and an in-memory part sink.

#![allow(dead_code)]

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use mailbinder::document::attachment::AttachmentOutcome;
use mailbinder::document::ledger::DedupRecord;
use mailbinder::document::message::MessageDocument;
use mailbinder::document::split::OutputPart;
use mailbinder::pipeline::PartSink;

/// A PDF with `pages` pages. `marker` goes into the page text, so different
/// markers give different fingerprints.
pub fn sample_pdf(pages: usize, marker: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let kids: Vec<Object> = (0..pages)
        .map(|n| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 11.into()]),
                    Operation::new("Td", vec![60.into(), 760.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("{marker} / {n}"))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            Object::Reference(page_id)
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

/// A raw multipart message with a short text body and the given attachments,
/// each sent as `application/pdf` in base64.
pub fn raw_message(subject: &str, attachments: &[(&str, &[u8])]) -> String {
    let boundary = "=_mailbinder_test";
    let mut out = format!(
        "From: Alice Example <alice@example.com>\r\n\
         To: Bob <bob@example.com>\r\n\
         Subject: {subject}\r\n\
         Date: Mon, 15 Jan 2024 09:30:00 +0000\r\n\
         Message-ID: <{}@example.com>\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Body of {subject}.\r\n",
        subject.replace(' ', "-")
    );
    for (name, data) in attachments {
        let encoded = STANDARD.encode(data);
        out.push_str(&format!(
            "--{boundary}\r\n\
             Content-Type: application/pdf; name=\"{name}\"\r\n\
             Content-Disposition: attachment; filename=\"{name}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n"
        ));
        for line in encoded.as_bytes().chunks(76) {
            out.push_str(std::str::from_utf8(line).expect("base64 is ascii"));
            out.push_str("\r\n");
        }
    }
    out.push_str(&format!("--{boundary}--\r\n"));
    out
}

/// Write `content` to `dir/name`.
pub fn write_file(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("write fixture");
}

/// What the sink saw of one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenAttachment {
    pub filename: String,
    pub outcome: AttachmentOutcome,
}

/// What the sink saw of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenDocument {
    pub sequence: u64,
    pub label: String,
    pub pages: usize,
    pub placeholder: bool,
    pub attachments: Vec<SeenAttachment>,
}

/// What the sink saw of one sealed part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenPart {
    pub index: usize,
    pub labels: Vec<String>,
    pub pages: usize,
    pub ledger: Vec<DedupRecord>,
}

/// Keeps a comparable record of everything handed to it.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub documents: Vec<SeenDocument>,
    pub parts: Vec<SeenPart>,
}

impl PartSink for CollectingSink {
    fn accept_document(&mut self, document: &MessageDocument) -> mailbinder::Result<()> {
        self.documents.push(SeenDocument {
            sequence: document.id.sequence,
            label: document.id.label.clone(),
            pages: document.page_count,
            placeholder: document.is_placeholder(),
            attachments: document
                .attachments
                .iter()
                .map(|a| SeenAttachment {
                    filename: a.filename.clone(),
                    outcome: a.outcome.clone(),
                })
                .collect(),
        });
        Ok(())
    }

    fn accept(&mut self, part: OutputPart) -> mailbinder::Result<()> {
        self.parts.push(SeenPart {
            index: part.index,
            labels: part.documents.iter().map(|d| d.id.label.clone()).collect(),
            pages: part.accumulated_pages,
            ledger: part.ledger.records(),
        });
        Ok(())
    }
}

impl CollectingSink {
    pub fn outcomes_of(&self, label: &str) -> Vec<AttachmentOutcome> {
        self.documents
            .iter()
            .find(|d| d.label == label)
            .map(|d| d.attachments.iter().map(|a| a.outcome.clone()).collect())
            .unwrap_or_default()
    }
}
