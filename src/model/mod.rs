//! Core data model: parsed messages, their header fields, and attachments.

pub mod address;
pub mod attachment;
pub mod mail;

pub use attachment::Attachment;
pub use mail::{Message, MessageBody, MessageHeaders, MessageId};
