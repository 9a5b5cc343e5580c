//! Run-wide counters and the final conversion summary.

use parking_lot::Mutex;
use serde::Serialize;

use crate::document::attachment::AttachmentOutcome;
use crate::document::message::MessageDocument;

/// An attachment that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenAttachment {
    pub filename: String,
    pub message: String,
    pub reason: String,
}

/// A message that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMessage {
    pub message: String,
    pub reason: String,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    /// Every message seen, converted or not.
    pub messages_processed: u64,
    pub messages_failed: u64,
    /// Embeddable attachments seen across converted messages.
    pub attachments_processed: u64,
    pub attachments_embedded: u64,
    pub attachments_deduplicated: u64,
    pub attachments_broken: u64,
    pub broken_attachments: Vec<BrokenAttachment>,
    pub failed_messages: Vec<FailedMessage>,
    pub parts_emitted: u64,
    pub total_pages: u64,
    pub total_bytes: u64,
}

impl ConversionSummary {
    pub fn has_problems(&self) -> bool {
        self.messages_failed > 0 || self.attachments_broken > 0
    }
}

/// Accumulates counts as documents are finalized. Safe to share.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    inner: Mutex<ConversionSummary>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a finalized document and its attachment outcomes. Placeholder
    /// documents are counted through [`ReportAggregator::record_failure`].
    pub fn record_document(&self, doc: &MessageDocument) {
        if doc.is_placeholder() {
            return;
        }
        let mut s = self.inner.lock();
        s.messages_processed += 1;
        s.total_pages += doc.page_count as u64;
        s.total_bytes += doc.byte_size;
        for attachment in &doc.attachments {
            s.attachments_processed += 1;
            match &attachment.outcome {
                AttachmentOutcome::Embedded => s.attachments_embedded += 1,
                AttachmentOutcome::Deduplicated { .. } => s.attachments_deduplicated += 1,
                AttachmentOutcome::Broken { reason } => {
                    s.attachments_broken += 1;
                    s.broken_attachments.push(BrokenAttachment {
                        filename: attachment.filename.clone(),
                        message: doc.id.label.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    /// Count a message that produced no regular document.
    pub fn record_failure(&self, message: &str, reason: &str) {
        let mut s = self.inner.lock();
        s.messages_processed += 1;
        s.messages_failed += 1;
        s.failed_messages.push(FailedMessage {
            message: message.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Count a sealed part.
    pub fn record_part(&self) {
        self.inner.lock().parts_emitted += 1;
    }

    /// Take the accumulated totals.
    pub fn finalize(self) -> ConversionSummary {
        self.inner.into_inner()
    }
}
