//! Part boundaries: accumulate message documents into size- and page-bounded
//! output parts, each with its own dedup scope.

use tracing::{debug, info};

use crate::error::{BinderError, Result};

use super::fragment::{merge_fragments, PdfFragment};
use super::ledger::DedupLedger;
use super::message::{MessageAssembler, MessageDocument, PreparedMessage};

/// Validated part limits. Zero means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SplitPolicy {
    max_bytes: u64,
    max_pages: u64,
}

impl SplitPolicy {
    /// Build a policy from raw thresholds. Negative values are rejected.
    pub fn new(max_bytes: i64, max_pages: i64) -> Result<Self> {
        let max_bytes = u64::try_from(max_bytes).map_err(|_| {
            BinderError::SplitPolicy(format!("max bytes per part must be ≥ 0, got {max_bytes}"))
        })?;
        let max_pages = u64::try_from(max_pages).map_err(|_| {
            BinderError::SplitPolicy(format!("max pages per part must be ≥ 0, got {max_pages}"))
        })?;
        Ok(Self {
            max_bytes,
            max_pages,
        })
    }

    /// One part for the whole run.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn max_pages(&self) -> u64 {
        self.max_pages
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_bytes == 0 && self.max_pages == 0
    }

    /// Whether adding `bytes`/`pages` to a part already holding
    /// `acc_bytes`/`acc_pages` crosses a bounded limit.
    fn exceeded_by(&self, acc_bytes: u64, acc_pages: u64, bytes: u64, pages: u64) -> bool {
        (self.max_bytes > 0 && acc_bytes.saturating_add(bytes) > self.max_bytes)
            || (self.max_pages > 0 && acc_pages.saturating_add(pages) > self.max_pages)
    }
}

/// An ordered group of message documents destined for one merged artifact.
#[derive(Debug)]
pub struct OutputPart {
    /// 1-based position in the run.
    pub index: usize,
    pub documents: Vec<MessageDocument>,
    /// The dedup scope this part's documents were assembled against.
    pub ledger: DedupLedger,
    pub accumulated_bytes: u64,
    pub accumulated_pages: usize,
}

impl OutputPart {
    fn new(index: usize) -> Self {
        Self {
            index,
            documents: Vec::new(),
            ledger: DedupLedger::new(),
            accumulated_bytes: 0,
            accumulated_pages: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn push(&mut self, doc: MessageDocument) {
        self.accumulated_bytes += doc.byte_size;
        self.accumulated_pages += doc.page_count;
        self.documents.push(doc);
    }

    /// Concatenate every document of the part into one PDF.
    pub fn to_pdf(&self) -> Result<PdfFragment> {
        let fragments: Vec<PdfFragment> = self
            .documents
            .iter()
            .flat_map(|d| d.fragments.iter().cloned())
            .collect();
        merge_fragments(&fragments)
    }
}

/// Places documents into parts in intake order and seals parts at limits.
///
/// Intake must be in submission order; the coordinator is driven by a single
/// thread.
pub struct SplitCoordinator<'a> {
    policy: SplitPolicy,
    assembler: MessageAssembler<'a>,
    current: OutputPart,
}

impl<'a> SplitCoordinator<'a> {
    pub fn new(policy: SplitPolicy, assembler: MessageAssembler<'a>) -> Self {
        Self {
            policy,
            assembler,
            current: OutputPart::new(1),
        }
    }

    /// Assemble a prepared message against the open part's ledger and place
    /// it. Returns the part sealed to make room, if any.
    ///
    /// When the document does not fit, its records are withdrawn from the old
    /// scope and it is assembled again against the fresh one, so its outcomes
    /// describe the part it lands in.
    pub fn offer(&mut self, prepared: &PreparedMessage) -> Option<OutputPart> {
        let doc = self.assembler.assemble(prepared, &self.current.ledger);
        if !self.fits(&doc) {
            let withdrawn = self.current.ledger.withdraw(prepared.id.sequence);
            let sealed = self.seal();
            debug!(
                message = %prepared.id,
                withdrawn,
                part = self.current.index,
                "Re-assembling message in new part"
            );
            let doc = self.assembler.assemble(prepared, &self.current.ledger);
            self.current.push(doc);
            return Some(sealed);
        }
        self.current.push(doc);
        None
    }

    /// Place a document that does not depend on the ledger (for example a
    /// failed-message placeholder). Returns the part sealed to make room.
    pub fn push_document(&mut self, doc: MessageDocument) -> Option<OutputPart> {
        let sealed = (!self.fits(&doc)).then(|| self.seal());
        self.current.push(doc);
        sealed
    }

    /// The document most recently placed.
    pub fn last_placed(&self) -> Option<&MessageDocument> {
        self.current.documents.last()
    }

    /// Seal the open part. An empty open part is discarded.
    pub fn finish(self) -> Option<OutputPart> {
        if self.current.is_empty() {
            return None;
        }
        info!(
            part = self.current.index,
            documents = self.current.documents.len(),
            bytes = self.current.accumulated_bytes,
            pages = self.current.accumulated_pages,
            "Sealed final part"
        );
        Some(self.current)
    }

    /// An empty part always accepts; oversized documents get their own part.
    fn fits(&self, doc: &MessageDocument) -> bool {
        self.current.is_empty()
            || !self.policy.exceeded_by(
                self.current.accumulated_bytes,
                self.current.accumulated_pages as u64,
                doc.byte_size,
                doc.page_count as u64,
            )
    }

    fn seal(&mut self) -> OutputPart {
        let next = OutputPart::new(self.current.index + 1);
        let sealed = std::mem::replace(&mut self.current, next);
        info!(
            part = sealed.index,
            documents = sealed.documents.len(),
            bytes = sealed.accumulated_bytes,
            pages = sealed.accumulated_pages,
            "Sealed part"
        );
        sealed
    }
}
