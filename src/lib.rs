//! `mailbinder`: convert EML files and MBOX archives into PDF documents.
//!
//! Each message becomes one document: a header block and body page,
//! followed by its PDF attachments. Identical attachments within one output
//! part are embedded once and referenced afterwards, and merged output can be
//! split into parts bounded by size or page count.
//!
//! The entry point is [`pipeline::convert_batch`].

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod render;
pub mod summary;

pub use config::ConversionOptions;
pub use error::{BinderError, Result};
pub use pipeline::{convert_batch, PartSink};
pub use summary::ConversionSummary;
