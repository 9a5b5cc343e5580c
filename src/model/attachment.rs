//! Decoded attachment parts.

/// One attachment of a parsed message, with its decoded payload.
///
/// Immutable once produced by the parser; owned by its [`super::Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Decoded filename. Generated (`attachment_N`) if missing from the headers.
    pub filename: String,

    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Content-ID for parts referenced from the HTML body.
    pub content_id: Option<String>,

    /// `true` if the part carries `Content-Disposition: attachment`.
    pub is_disposition_attachment: bool,

    /// Whether the filename came from the part headers.
    pub has_declared_name: bool,

    /// Decoded payload bytes.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Whether this attachment is a PDF candidate for embedding.
    ///
    /// Decided by filename extension or declared media type; the payload
    /// itself is only checked when it is embedded.
    pub fn is_embeddable(&self) -> bool {
        self.filename.to_lowercase().ends_with(".pdf")
            || self.content_type.eq_ignore_ascii_case("application/pdf")
    }

    /// Whether the attachment is shown to the reader as a file rather than
    /// used inline by the HTML body.
    pub fn is_user_facing(&self) -> bool {
        self.has_declared_name && (self.is_disposition_attachment || self.content_id.is_none())
    }
}
