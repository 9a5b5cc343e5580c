//! Parsed message types.

use std::fmt;

use chrono::{DateTime, Utc};

use super::address::EmailAddress;
use super::attachment::Attachment;

/// Identity of one message within a run.
///
/// `sequence` is the 0-based submission index and is unique per run;
/// `label` is what a human sees in reports (the `.eml` file name, or
/// `archive.mbox@<offset>` for archive messages).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct MessageId {
    pub sequence: u64,
    pub label: String,
}

impl MessageId {
    pub fn new(sequence: u64, label: impl Into<String>) -> Self {
        Self {
            sequence,
            label: label.into(),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Header fields shown in the header block of the rendered body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    /// The `Date:` header as written (RFC 2047 decoded).
    pub date_raw: String,
    /// Parsed date, if the header could be understood.
    pub date: Option<DateTime<Utc>>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    pub message_id: String,
}

/// Message body content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    /// Plain-text body (from `text/plain`).
    pub text: Option<String>,
    /// HTML body (from `text/html`), preferred over `text` when present.
    pub html: Option<String>,
}

/// A fully parsed message. Immutable once produced by the parser.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub headers: MessageHeaders,
    pub body: MessageBody,
    /// All non-body parts in their original MIME order.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Attachments that go through the embed/deduplicate path, in original order.
    pub fn embeddable_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_embeddable())
    }

    /// Names of the attachments listed at the bottom of the body page.
    pub fn listed_attachment_names(&self) -> Vec<&str> {
        self.attachments
            .iter()
            .filter(|a| a.is_user_facing())
            .map(|a| a.filename.as_str())
            .collect()
    }
}
