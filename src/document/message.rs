//! Per-message assembly: body plus attachments in original order.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{MessageError, Result};
use crate::model::mail::{Message, MessageId};
use crate::render::{Notice, RenderBackend};

use super::attachment::{AssembledAttachment, AttachmentAssembler, PreparedAttachment};
use super::fragment::{merge_fragments, PdfFragment};
use super::ledger::DedupLedger;

/// Everything about a message that does not depend on ledger state.
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    pub id: MessageId,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub body: PdfFragment,
    /// Embeddable attachments in original MIME order.
    pub attachments: Vec<PreparedAttachment>,
}

impl PreparedMessage {
    /// Render the body and prepare every embeddable attachment.
    pub fn prepare(
        message: &Message,
        backend: &dyn RenderBackend,
    ) -> std::result::Result<Self, MessageError> {
        let body = backend.render_body(message)?;
        let attachments = message
            .embeddable_attachments()
            .map(|a| PreparedAttachment::prepare(a, backend))
            .collect();
        Ok(Self {
            id: message.id.clone(),
            subject: message.headers.subject.clone(),
            date: message.headers.date,
            body,
            attachments,
        })
    }
}

/// A message that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    pub id: MessageId,
    pub error: MessageError,
}

impl MessageFailure {
    pub fn new(id: MessageId, error: MessageError) -> Self {
        Self { id, error }
    }
}

/// The final document for one message.
#[derive(Debug, Clone)]
pub struct MessageDocument {
    pub id: MessageId,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    /// Body first, then each attachment's fragments in original order.
    pub fragments: Vec<PdfFragment>,
    pub attachments: Vec<AssembledAttachment>,
    /// Sum of fragment byte lengths.
    pub byte_size: u64,
    /// Sum of fragment page counts.
    pub page_count: usize,
    /// Set on placeholder documents for failed messages.
    pub failure: Option<String>,
}

impl MessageDocument {
    fn from_parts(
        id: MessageId,
        subject: String,
        date: Option<DateTime<Utc>>,
        fragments: Vec<PdfFragment>,
        attachments: Vec<AssembledAttachment>,
        failure: Option<String>,
    ) -> Self {
        let byte_size = fragments.iter().map(PdfFragment::byte_len).sum();
        let page_count = fragments.iter().map(PdfFragment::pages).sum();
        Self {
            id,
            subject,
            date,
            fragments,
            attachments,
            byte_size,
            page_count,
            failure,
        }
    }

    /// Merge all fragments into one standalone PDF.
    pub fn to_pdf(&self) -> Result<PdfFragment> {
        merge_fragments(&self.fragments)
    }

    pub fn is_placeholder(&self) -> bool {
        self.failure.is_some()
    }
}

/// Builds [`MessageDocument`]s from prepared messages against a ledger scope.
pub struct MessageAssembler<'a> {
    backend: &'a dyn RenderBackend,
    attachments: AttachmentAssembler<'a>,
    deduplicate: bool,
}

impl<'a> MessageAssembler<'a> {
    pub fn new(backend: &'a dyn RenderBackend, deduplicate: bool) -> Self {
        Self {
            backend,
            attachments: AttachmentAssembler::new(backend),
            deduplicate,
        }
    }

    /// Assemble one message. Attachment problems become outcomes; this never
    /// fails.
    pub fn assemble(&self, prepared: &PreparedMessage, ledger: &DedupLedger) -> MessageDocument {
        let scope = self.deduplicate.then_some(ledger);
        let mut fragments = Vec::with_capacity(1 + prepared.attachments.len() * 2);
        fragments.push(prepared.body.clone());

        let attachments: Vec<AssembledAttachment> = prepared
            .attachments
            .iter()
            .map(|a| self.attachments.assemble(a, &prepared.id, scope))
            .collect();
        for assembled in &attachments {
            fragments.extend(assembled.fragments.iter().cloned());
        }

        let doc = MessageDocument::from_parts(
            prepared.id.clone(),
            prepared.subject.clone(),
            prepared.date,
            fragments,
            attachments,
            None,
        );
        debug!(
            message = %doc.id,
            pages = doc.page_count,
            bytes = doc.byte_size,
            attachments = doc.attachments.len(),
            "Assembled message"
        );
        doc
    }

    /// A one-page placeholder for a failed message, or `None` when even the
    /// notice cannot be rendered.
    pub fn placeholder(&self, failure: &MessageFailure) -> Option<MessageDocument> {
        let reason = failure.error.to_string();
        let page = self
            .backend
            .render_notice(&Notice::FailedMessage {
                label: &failure.id.label,
                reason: &reason,
            })
            .map_err(|e| {
                warn!(message = %failure.id, error = %e, "Placeholder page failed to render");
            })
            .ok()?;
        Some(MessageDocument::from_parts(
            failure.id.clone(),
            String::new(),
            None,
            vec![page],
            Vec::new(),
            Some(reason),
        ))
    }
}
