//! Rendering of message bodies and notice pages into PDF fragments.
//!
//! The conversion core only sees the [`RenderBackend`] trait. Backends must
//! be shareable across worker threads.

pub mod pdf;

use crate::document::fingerprint::ContentFingerprint;
use crate::document::fragment::PdfFragment;
use crate::document::ledger::DedupRecord;
use crate::error::RenderError;
use crate::model::mail::Message;

pub use pdf::PdfTextBackend;

/// A single-purpose page inserted by the assembler.
#[derive(Debug, Clone, Copy)]
pub enum Notice<'a> {
    /// Placed before the pages of an embedded attachment.
    AttachmentTitle {
        filename: &'a str,
        fingerprint: &'a ContentFingerprint,
    },
    /// Stands in for an attachment already embedded earlier in the same part.
    DuplicateReference {
        filename: &'a str,
        fingerprint: &'a ContentFingerprint,
        original: &'a DedupRecord,
    },
    /// Stands in for an attachment whose payload could not be embedded.
    BrokenAttachment { filename: &'a str, reason: &'a str },
    /// Stands in for a whole message that could not be converted.
    FailedMessage { label: &'a str, reason: &'a str },
}

/// Turns messages and notices into PDF fragments.
pub trait RenderBackend: Send + Sync {
    /// Render the header block, body, and attachment list of a message.
    fn render_body(&self, message: &Message) -> Result<PdfFragment, RenderError>;

    /// Render a one-page notice.
    fn render_notice(&self, notice: &Notice<'_>) -> Result<PdfFragment, RenderError>;
}
