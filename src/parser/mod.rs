//! Email parsing: MBOX streaming reader, EML reader, header decoding, and MIME handling.

pub mod eml;
pub mod header;
pub mod mbox;
pub mod mime;

pub use mime::parse_message;
