//! Per-part record of which attachment contents have already been embedded.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::error::{BinderError, Result};
use crate::model::mail::MessageId;

use super::fingerprint::ContentFingerprint;

/// Where a piece of content was first embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DedupRecord {
    pub fingerprint: ContentFingerprint,
    pub first_seen_filename: String,
    pub first_seen_message: MessageId,
}

/// Fingerprint → first occurrence, for one output part.
///
/// Never holds two records for the same fingerprint. Check-and-set is atomic,
/// so the ledger can be shared by concurrent assemblers. A new part always
/// gets a fresh, empty ledger from [`DedupLedger::new_scope`].
#[derive(Debug, Default)]
pub struct DedupLedger {
    records: Mutex<HashMap<ContentFingerprint, DedupRecord>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh scope with no records, independent of `self`.
    pub fn new_scope(&self) -> Self {
        Self::new()
    }

    /// Look up the first occurrence of a fingerprint.
    pub fn lookup(&self, fingerprint: &ContentFingerprint) -> Option<DedupRecord> {
        self.records.lock().get(fingerprint).cloned()
    }

    /// Record a first occurrence. Fails if the fingerprint is already known.
    pub fn record_first(
        &self,
        fingerprint: ContentFingerprint,
        filename: &str,
        message: &MessageId,
    ) -> Result<DedupRecord> {
        let mut records = self.records.lock();
        if let Some(existing) = records.get(&fingerprint) {
            return Err(BinderError::DuplicateRecord {
                fingerprint: fingerprint.to_hex(),
                first_seen: format!(
                    "{} in {}",
                    existing.first_seen_filename, existing.first_seen_message
                ),
            });
        }
        let record = DedupRecord {
            fingerprint,
            first_seen_filename: filename.to_string(),
            first_seen_message: message.clone(),
        };
        records.insert(fingerprint, record.clone());
        Ok(record)
    }

    /// Atomically return the existing record, or insert a new one.
    ///
    /// The flag is `true` when this call created the record. Of any number of
    /// concurrent calls with the same fingerprint, exactly one sees `true`.
    pub fn record_if_absent(
        &self,
        fingerprint: ContentFingerprint,
        filename: &str,
        message: &MessageId,
    ) -> (DedupRecord, bool) {
        let mut records = self.records.lock();
        if let Some(existing) = records.get(&fingerprint) {
            return (existing.clone(), false);
        }
        let record = DedupRecord {
            fingerprint,
            first_seen_filename: filename.to_string(),
            first_seen_message: message.clone(),
        };
        records.insert(fingerprint, record.clone());
        trace!(fingerprint = %fingerprint.short(), message = %message, "Recorded first occurrence");
        (record, true)
    }

    /// Remove every record first seen in the message with this sequence
    /// number. Returns how many were removed.
    pub fn withdraw(&self, message_sequence: u64) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| r.first_seen_message.sequence != message_sequence);
        before - records.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of all records, ordered by first-seen message then filename.
    pub fn records(&self) -> Vec<DedupRecord> {
        let mut all: Vec<DedupRecord> = self.records.lock().values().cloned().collect();
        all.sort_by(|a, b| {
            a.first_seen_message
                .sequence
                .cmp(&b.first_seen_message.sequence)
                .then_with(|| a.first_seen_filename.cmp(&b.first_seen_filename))
        });
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fingerprint::fingerprint;
    use std::sync::Arc;

    fn msg(seq: u64) -> MessageId {
        MessageId::new(seq, format!("m{seq}.eml"))
    }

    #[test]
    fn test_record_first_then_lookup() {
        let ledger = DedupLedger::new();
        let fp = fingerprint(b"report");
        assert!(ledger.lookup(&fp).is_none());

        let rec = ledger.record_first(fp, "report.pdf", &msg(0)).expect("first");
        assert_eq!(rec.first_seen_filename, "report.pdf");
        assert_eq!(ledger.lookup(&fp), Some(rec));
    }

    #[test]
    fn test_record_first_rejects_duplicate() {
        let ledger = DedupLedger::new();
        let fp = fingerprint(b"report");
        ledger.record_first(fp, "a.pdf", &msg(0)).expect("first");
        let err = ledger.record_first(fp, "b.pdf", &msg(1)).unwrap_err();
        assert!(matches!(err, BinderError::DuplicateRecord { .. }));
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.lookup(&fp).map(|r| r.first_seen_filename),
            Some("a.pdf".to_string())
        );
    }

    #[test]
    fn test_record_if_absent_keeps_first() {
        let ledger = DedupLedger::new();
        let fp = fingerprint(b"x");
        let (first, created) = ledger.record_if_absent(fp, "a.pdf", &msg(0));
        assert!(created);
        let (second, created) = ledger.record_if_absent(fp, "b.pdf", &msg(1));
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn test_new_scope_is_empty() {
        let ledger = DedupLedger::new();
        ledger.record_if_absent(fingerprint(b"x"), "a.pdf", &msg(0));
        let fresh = ledger.new_scope();
        assert!(fresh.is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_withdraw_removes_only_that_message() {
        let ledger = DedupLedger::new();
        ledger.record_if_absent(fingerprint(b"a"), "a.pdf", &msg(0));
        ledger.record_if_absent(fingerprint(b"b"), "b.pdf", &msg(1));
        ledger.record_if_absent(fingerprint(b"c"), "c.pdf", &msg(1));
        assert_eq!(ledger.withdraw(1), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].first_seen_filename, "a.pdf");
        assert_eq!(ledger.withdraw(7), 0);
    }

    #[test]
    fn test_concurrent_record_if_absent_has_one_winner() {
        let ledger = Arc::new(DedupLedger::new());
        let fp = fingerprint(b"contended");
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.record_if_absent(fp, "x.pdf", &msg(i)).1)
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|created| *created)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(ledger.len(), 1);
    }
}
