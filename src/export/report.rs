//! Human-readable and JSON renderings of the conversion summary.

use std::path::{Path, PathBuf};

use crate::error::{BinderError, Result};
use crate::summary::ConversionSummary;

/// File name of the text report written into the output directory.
pub const REPORT_FILE_NAME: &str = "mailbinder.txt";

/// Summary lines, as printed at the end of a run.
pub fn summary_lines(summary: &ConversionSummary, merged: &[PathBuf]) -> Vec<String> {
    let mut lines = vec![
        "=== SUMMARY REPORT ===".to_string(),
        format!("Total messages processed: {}", summary.messages_processed),
        format!(
            "Total PDF attachments processed: {}",
            summary.attachments_processed
        ),
        format!(
            "Embedded: {}, deduplicated: {}, broken: {}",
            summary.attachments_embedded,
            summary.attachments_deduplicated,
            summary.attachments_broken
        ),
    ];

    if summary.broken_attachments.is_empty() {
        lines.push("No broken PDF attachments encountered.".to_string());
    } else {
        lines.push("Broken/Unreadable PDF attachments:".to_string());
        for b in &summary.broken_attachments {
            lines.push(format!("  - {} (in {}): {}", b.filename, b.message, b.reason));
        }
    }

    if !summary.failed_messages.is_empty() {
        lines.push(format!("Failed messages: {}", summary.messages_failed));
        for f in &summary.failed_messages {
            lines.push(format!("  - {}: {}", f.message, f.reason));
        }
    }

    lines.push(format!(
        "Pages: {}, size: {}",
        summary.total_pages,
        humansize::format_size(summary.total_bytes, humansize::BINARY)
    ));

    match merged {
        [] => {}
        [single] => lines.push(format!("Merged all PDFs into: {}", single.display())),
        parts => {
            lines.push(format!("Merged output split into {} parts:", parts.len()));
            for p in parts {
                lines.push(format!("  - {}", p.display()));
            }
        }
    }
    lines
}

/// Write the text report into `output_dir`. Returns its path.
pub fn write_text_report(
    output_dir: &Path,
    summary: &ConversionSummary,
    merged: &[PathBuf],
) -> Result<PathBuf> {
    let path = output_dir.join(REPORT_FILE_NAME);
    let mut content = summary_lines(summary, merged).join("\n");
    content.push('\n');
    std::fs::write(&path, content).map_err(|e| BinderError::io(&path, e))?;
    Ok(path)
}

/// Pretty-printed JSON of the summary.
pub fn summary_json(summary: &ConversionSummary) -> Result<String> {
    serde_json::to_string_pretty(summary)
        .map_err(|e| BinderError::Pipeline(format!("summary serialisation failed: {e}")))
}
