//! Per-attachment assembly: embed, deduplicate, or mark broken.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EmbedError;
use crate::model::attachment::Attachment;
use crate::model::mail::MessageId;
use crate::render::{Notice, RenderBackend};

use super::fingerprint::{fingerprint, ContentFingerprint};
use super::fragment::{embed_document, PdfFragment};
use super::ledger::{DedupLedger, DedupRecord};

/// The ledger-independent half of attachment assembly, computed on a worker.
#[derive(Debug, Clone)]
pub struct PreparedAttachment {
    pub filename: String,
    pub fingerprint: ContentFingerprint,
    /// `None` when the title page could not be rendered.
    pub title_page: Option<PdfFragment>,
    /// The payload as an embeddable document, or why it is not one.
    pub content: Result<PdfFragment, EmbedError>,
}

impl PreparedAttachment {
    /// Fingerprint, validate, and render the title page of one attachment.
    pub fn prepare(attachment: &Attachment, backend: &dyn RenderBackend) -> Self {
        let fingerprint = fingerprint(&attachment.data);
        let title_page = backend
            .render_notice(&Notice::AttachmentTitle {
                filename: &attachment.filename,
                fingerprint: &fingerprint,
            })
            .map_err(|e| {
                warn!(filename = %attachment.filename, error = %e, "Title page failed to render");
            })
            .ok();
        Self {
            filename: attachment.filename.clone(),
            fingerprint,
            title_page,
            content: embed_document(&attachment.data),
        }
    }
}

/// What happened to one attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentOutcome {
    /// First occurrence in its part: title page plus the attachment's pages.
    Embedded,
    /// Same content already embedded in this part: reference page only.
    Deduplicated { original: DedupRecord },
    /// Payload could not be embedded: title page plus a notice page.
    Broken { reason: String },
}

/// One attachment after assembly.
#[derive(Debug, Clone)]
pub struct AssembledAttachment {
    pub filename: String,
    pub fingerprint: ContentFingerprint,
    pub outcome: AttachmentOutcome,
    pub fragments: Vec<PdfFragment>,
}

impl AssembledAttachment {
    pub fn byte_size(&self) -> u64 {
        self.fragments.iter().map(PdfFragment::byte_len).sum()
    }

    pub fn page_count(&self) -> usize {
        self.fragments.iter().map(PdfFragment::pages).sum()
    }
}

/// Decides embed / deduplicate / broken for prepared attachments against a
/// ledger scope. Never fails; problems become outcomes.
pub struct AttachmentAssembler<'a> {
    backend: &'a dyn RenderBackend,
}

impl<'a> AttachmentAssembler<'a> {
    pub fn new(backend: &'a dyn RenderBackend) -> Self {
        Self { backend }
    }

    /// Assemble one attachment of `message`. With `ledger = None` every valid
    /// payload is embedded and nothing is recorded.
    pub fn assemble(
        &self,
        prepared: &PreparedAttachment,
        message: &MessageId,
        ledger: Option<&DedupLedger>,
    ) -> AssembledAttachment {
        let content = match &prepared.content {
            Ok(content) => content,
            Err(err) => return self.broken(prepared, message, err),
        };

        if let Some(ledger) = ledger {
            let (record, first) =
                ledger.record_if_absent(prepared.fingerprint, &prepared.filename, message);
            if !first {
                return self.deduplicated(prepared, message, record);
            }
        }

        let mut fragments = Vec::with_capacity(2);
        fragments.extend(prepared.title_page.clone());
        fragments.push(content.clone());
        AssembledAttachment {
            filename: prepared.filename.clone(),
            fingerprint: prepared.fingerprint,
            outcome: AttachmentOutcome::Embedded,
            fragments,
        }
    }

    fn broken(
        &self,
        prepared: &PreparedAttachment,
        message: &MessageId,
        err: &EmbedError,
    ) -> AssembledAttachment {
        let reason = err.to_string();
        warn!(
            message = %message,
            filename = %prepared.filename,
            reason = %reason,
            "Attachment cannot be embedded"
        );

        let mut fragments = Vec::with_capacity(2);
        fragments.extend(prepared.title_page.clone());
        match self.backend.render_notice(&Notice::BrokenAttachment {
            filename: &prepared.filename,
            reason: &reason,
        }) {
            Ok(page) => fragments.push(page),
            Err(e) => warn!(filename = %prepared.filename, error = %e, "Notice page failed to render"),
        }

        AssembledAttachment {
            filename: prepared.filename.clone(),
            fingerprint: prepared.fingerprint,
            outcome: AttachmentOutcome::Broken { reason },
            fragments,
        }
    }

    fn deduplicated(
        &self,
        prepared: &PreparedAttachment,
        message: &MessageId,
        original: DedupRecord,
    ) -> AssembledAttachment {
        debug!(
            message = %message,
            filename = %prepared.filename,
            first_seen = %original.first_seen_message,
            "Attachment already embedded in this part"
        );

        let reference = self
            .backend
            .render_notice(&Notice::DuplicateReference {
                filename: &prepared.filename,
                fingerprint: &prepared.fingerprint,
                original: &original,
            })
            .map_err(|e| {
                warn!(filename = %prepared.filename, error = %e, "Reference page failed, using title page");
            })
            .ok()
            .or_else(|| prepared.title_page.clone());

        AssembledAttachment {
            filename: prepared.filename.clone(),
            fingerprint: prepared.fingerprint,
            outcome: AttachmentOutcome::Deduplicated { original },
            fragments: reference.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fragment::tests::sample_pdf;
    use crate::error::RenderError;
    use crate::model::mail::Message;
    use crate::render::PdfTextBackend;

    fn pdf_attachment(name: &str, data: Vec<u8>) -> Attachment {
        Attachment {
            filename: name.to_string(),
            content_type: "application/pdf".into(),
            content_id: None,
            is_disposition_attachment: true,
            has_declared_name: true,
            data,
        }
    }

    fn msg(seq: u64) -> MessageId {
        MessageId::new(seq, format!("m{seq}.eml"))
    }

    /// Renders titles but fails on reference pages.
    struct NoReferencePages(PdfTextBackend);

    impl RenderBackend for NoReferencePages {
        fn render_body(&self, message: &Message) -> Result<PdfFragment, RenderError> {
            self.0.render_body(message)
        }

        fn render_notice(&self, notice: &Notice<'_>) -> Result<PdfFragment, RenderError> {
            match notice {
                Notice::DuplicateReference { .. } => Err(RenderError("no reference".into())),
                other => self.0.render_notice(other),
            }
        }
    }

    #[test]
    fn test_first_embedded_then_deduplicated() {
        let backend = PdfTextBackend::new();
        let assembler = AttachmentAssembler::new(&backend);
        let ledger = DedupLedger::new();
        let payload = sample_pdf(2, "report");

        let a = PreparedAttachment::prepare(&pdf_attachment("a.pdf", payload.clone()), &backend);
        let b = PreparedAttachment::prepare(&pdf_attachment("b.pdf", payload), &backend);

        let first = assembler.assemble(&a, &msg(0), Some(&ledger));
        assert_eq!(first.outcome, AttachmentOutcome::Embedded);
        assert_eq!(first.page_count(), 3);

        let second = assembler.assemble(&b, &msg(1), Some(&ledger));
        match &second.outcome {
            AttachmentOutcome::Deduplicated { original } => {
                assert_eq!(original.first_seen_filename, "a.pdf");
                assert_eq!(original.first_seen_message, msg(0));
            }
            other => panic!("expected dedup, got {other:?}"),
        }
        assert_eq!(second.page_count(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_no_ledger_always_embeds() {
        let backend = PdfTextBackend::new();
        let assembler = AttachmentAssembler::new(&backend);
        let prepared =
            PreparedAttachment::prepare(&pdf_attachment("a.pdf", sample_pdf(1, "x")), &backend);
        for seq in 0..3 {
            let out = assembler.assemble(&prepared, &msg(seq), None);
            assert_eq!(out.outcome, AttachmentOutcome::Embedded);
        }
    }

    #[test]
    fn test_broken_payload_is_not_recorded() {
        let backend = PdfTextBackend::new();
        let assembler = AttachmentAssembler::new(&backend);
        let ledger = DedupLedger::new();
        let prepared =
            PreparedAttachment::prepare(&pdf_attachment("bad.pdf", b"garbage".to_vec()), &backend);

        let out = assembler.assemble(&prepared, &msg(0), Some(&ledger));
        assert!(matches!(out.outcome, AttachmentOutcome::Broken { .. }));
        assert_eq!(out.page_count(), 2);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reference_page_failure_falls_back_to_title() {
        let backend = NoReferencePages(PdfTextBackend::new());
        let assembler = AttachmentAssembler::new(&backend);
        let ledger = DedupLedger::new();
        let payload = sample_pdf(1, "x");
        let a = PreparedAttachment::prepare(&pdf_attachment("a.pdf", payload.clone()), &backend);
        let b = PreparedAttachment::prepare(&pdf_attachment("b.pdf", payload), &backend);

        assembler.assemble(&a, &msg(0), Some(&ledger));
        let second = assembler.assemble(&b, &msg(1), Some(&ledger));
        assert!(matches!(second.outcome, AttachmentOutcome::Deduplicated { .. }));
        assert_eq!(second.fragments.len(), 1);
        assert_eq!(second.fragments[0], b.title_page.clone().expect("title"));
    }
}
