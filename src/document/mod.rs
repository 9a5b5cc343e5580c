//! Document assembly: content fingerprints, the per-part dedup ledger,
//! attachment and message assembly, and part splitting.

pub mod attachment;
pub mod fingerprint;
pub mod fragment;
pub mod ledger;
pub mod message;
pub mod split;

pub use attachment::{AssembledAttachment, AttachmentAssembler, AttachmentOutcome, PreparedAttachment};
pub use fingerprint::{fingerprint, ContentFingerprint};
pub use fragment::{embed_document, merge_fragments, PdfFragment};
pub use ledger::{DedupLedger, DedupRecord};
pub use message::{MessageAssembler, MessageDocument, MessageFailure, PreparedMessage};
pub use split::{OutputPart, SplitCoordinator, SplitPolicy};
