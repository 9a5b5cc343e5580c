//! Output: PDF files, the summary report, and the run workspace.

pub mod pdf;
pub mod report;
pub mod workspace;

pub use pdf::{PdfPartWriter, WrittenOutputs};
pub use workspace::Workspace;
