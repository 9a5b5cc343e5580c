//! Write per-message PDFs and merged part PDFs into the output directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::document::message::MessageDocument;
use crate::document::split::OutputPart;
use crate::error::{BinderError, Result};
use crate::pipeline::PartSink;

use super::workspace::Workspace;

/// Files produced by a [`PdfPartWriter`].
#[derive(Debug, Clone, Default)]
pub struct WrittenOutputs {
    pub messages: Vec<PathBuf>,
    pub merged: Vec<PathBuf>,
}

/// A [`PartSink`] that writes PDFs.
///
/// Per-message files are named after the `.eml` file, or
/// `<sequence>_<date>_<subject>.pdf` for archive messages. Merged parts are
/// named `merged_all.pdf` when there is a single part and
/// `merged_part_NNN.pdf` otherwise; they are staged in the workspace until
/// [`PdfPartWriter::finish`] knows the final count.
pub struct PdfPartWriter {
    output_dir: PathBuf,
    workspace: Workspace,
    per_message: bool,
    merge: bool,
    used_names: HashSet<String>,
    messages: Vec<PathBuf>,
    staged_parts: Vec<PathBuf>,
}

impl PdfPartWriter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        workspace: Workspace,
        per_message: bool,
        merge: bool,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| BinderError::io(&output_dir, e))?;
        Ok(Self {
            output_dir,
            workspace,
            per_message,
            merge,
            used_names: HashSet::new(),
            messages: Vec::new(),
            staged_parts: Vec::new(),
        })
    }

    /// Publish merged parts under their final names. The workspace is removed
    /// when the writer is dropped.
    pub fn finish(self) -> Result<WrittenOutputs> {
        let total = self.staged_parts.len();
        let mut merged = Vec::with_capacity(total);
        for (n, staged) in self.staged_parts.iter().enumerate() {
            let name = if total == 1 {
                "merged_all.pdf".to_string()
            } else {
                format!("merged_part_{:03}.pdf", n + 1)
            };
            let dest = self.output_dir.join(name);
            self.workspace.publish(staged, &dest)?;
            info!(path = %dest.display(), "Wrote merged PDF");
            merged.push(dest);
        }
        Ok(WrittenOutputs {
            messages: self.messages,
            merged,
        })
    }

    fn unique_name(&mut self, doc: &MessageDocument) -> String {
        let base = message_file_stem(doc);
        let mut name = format!("{base}.pdf");
        if !self.used_names.insert(name.to_lowercase()) {
            name = format!("{base}_{}.pdf", doc.id.sequence);
            self.used_names.insert(name.to_lowercase());
        }
        name
    }
}

impl PartSink for PdfPartWriter {
    fn accept_document(&mut self, doc: &MessageDocument) -> Result<()> {
        if !self.per_message || doc.fragments.is_empty() {
            return Ok(());
        }
        let pdf = doc.to_pdf()?;
        let name = self.unique_name(doc);
        let staged = self.workspace.stage(&name, pdf.bytes())?;
        let dest = self.output_dir.join(&name);
        self.workspace.publish(&staged, &dest)?;
        debug!(message = %doc.id, path = %dest.display(), "Wrote message PDF");
        self.messages.push(dest);
        Ok(())
    }

    fn accept(&mut self, part: OutputPart) -> Result<()> {
        if !self.merge {
            return Ok(());
        }
        let pdf = part.to_pdf()?;
        let staged = self
            .workspace
            .stage(&format!("part_{:03}.pdf", part.index), pdf.bytes())?;
        debug!(
            part = part.index,
            pages = pdf.pages(),
            bytes = pdf.byte_len(),
            "Staged merged part"
        );
        self.staged_parts.push(staged);
        Ok(())
    }
}

/// File stem for a message's own PDF.
fn message_file_stem(doc: &MessageDocument) -> String {
    let label = Path::new(&doc.id.label);
    let is_eml = label
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"));
    if is_eml {
        if let Some(stem) = label.file_stem() {
            return sanitize_filename_part(&stem.to_string_lossy(), 120);
        }
    }

    let date = doc
        .date
        .map(|d| d.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| "undated".to_string());
    let subject = sanitize_filename_part(&doc.subject, 80);
    format!("{:05}_{date}_{subject}", doc.id.sequence + 1)
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len` characters.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        sanitized
    }
}
