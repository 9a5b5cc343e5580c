//! Reader for individual `.eml` files (RFC 5322 messages without MBOX framing).

use std::path::Path;

use crate::error::MessageError;
use crate::model::mail::{Message, MessageId};

use super::mime;

/// Read the raw bytes of one `.eml` file.
///
/// A file that cannot be read is a failure of that message only, so the
/// error is a [`MessageError::Unreadable`] rather than a fatal one.
pub fn read_eml(path: impl AsRef<Path>, max_size: usize) -> Result<Vec<u8>, MessageError> {
    let path = path.as_ref();
    let len = std::fs::metadata(path)
        .map_err(|e| MessageError::Unreadable(format!("{}: {e}", path.display())))?
        .len();
    if len > max_size as u64 {
        return Err(MessageError::Unreadable(format!(
            "{}: {len} bytes exceeds the {max_size} byte message limit",
            path.display()
        )));
    }
    std::fs::read(path).map_err(|e| MessageError::Unreadable(format!("{}: {e}", path.display())))
}

/// Read and parse a single `.eml` file.
pub fn parse_eml(
    id: MessageId,
    path: impl AsRef<Path>,
    max_size: usize,
) -> Result<Message, MessageError> {
    let raw = read_eml(path, max_size)?;
    mime::parse_message(id, &raw)
}
