//! Batch conversion driver.
//!
//! A feeder thread reads sources and submits raw messages to the worker
//! pool. Workers parse, render, fingerprint, and validate each message
//! independently of any ledger. The calling thread receives the prepared
//! messages in submission order and runs assembly and splitting serially, so
//! dedup attribution and part boundaries do not depend on the worker count.

pub mod pool;
pub mod source;

use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{info, warn};

use crate::config::ConversionOptions;
use crate::document::message::{MessageAssembler, MessageDocument, MessageFailure, PreparedMessage};
use crate::document::split::{OutputPart, SplitCoordinator};
use crate::error::{BinderError, MessageError, Result};
use crate::model::mail::MessageId;
use crate::parser::mime::parse_message;
use crate::render::RenderBackend;
use crate::summary::{ConversionSummary, ReportAggregator};

use pool::WorkerPool;
use source::{feed, Intake, MessageSource};

/// Receives finished output.
pub trait PartSink {
    /// Called for every document, in submission order, as soon as it is
    /// placed in a part.
    fn accept_document(&mut self, _document: &MessageDocument) -> Result<()> {
        Ok(())
    }

    /// Called once per sealed, non-empty part, in part order.
    fn accept(&mut self, part: OutputPart) -> Result<()>;
}

/// The worker stage: everything about a message that does not touch the
/// ledger.
pub fn prepare(
    sequence: u64,
    intake: Intake,
    backend: &dyn RenderBackend,
) -> std::result::Result<PreparedMessage, MessageFailure> {
    let id = MessageId::new(sequence, intake.label);
    let fail = |error: MessageError| MessageFailure::new(id.clone(), error);

    let raw = intake.raw.map_err(fail)?;
    let message = parse_message(id.clone(), &raw).map_err(fail)?;
    PreparedMessage::prepare(&message, backend).map_err(fail)
}

/// Convert every message of `sources`, handing documents and sealed parts to
/// `sink`. Message and attachment failures are recorded in the summary; only
/// pipeline faults and sink errors are returned as errors.
pub fn convert_batch(
    sources: &[MessageSource],
    options: &ConversionOptions,
    backend: Arc<dyn RenderBackend>,
    sink: &mut dyn PartSink,
) -> Result<ConversionSummary> {
    info!(
        sources = sources.len(),
        workers = options.workers,
        dedup = options.deduplicate_attachments,
        max_bytes = options.split.max_bytes(),
        max_pages = options.split.max_pages(),
        "Starting conversion"
    );

    let job_backend = Arc::clone(&backend);
    let (mut submitter, ordered) =
        WorkerPool::spawn(options.workers, options.max_in_flight, move |seq, intake| {
            prepare(seq, intake, job_backend.as_ref())
        })?;

    // Labels travel beside the pool so a panicked slot can still be named.
    let (label_tx, label_rx) = unbounded::<String>();
    let feeder_sources = sources.to_vec();
    let max_message_size = options.max_message_size;
    let feeder = thread::Builder::new()
        .name("mailbinder-feeder".into())
        .spawn(move || {
            feed(&feeder_sources, max_message_size, &mut |intake| {
                let _ = label_tx.send(intake.label.clone());
                submitter.submit(intake).map(|_| ())
            })
        })
        .map_err(|e| BinderError::Pipeline(format!("failed to spawn feeder: {e}")))?;

    let report = ReportAggregator::new();
    let placeholders = MessageAssembler::new(backend.as_ref(), options.deduplicate_attachments);
    let mut coordinator = SplitCoordinator::new(
        options.split,
        MessageAssembler::new(backend.as_ref(), options.deduplicate_attachments),
    );

    let mut fatal: Option<BinderError> = None;
    for delivered in ordered {
        let label = label_rx.recv().unwrap_or_default();
        let prepared = match delivered {
            Ok(prepared) => prepared,
            Err(BinderError::WorkerPanicked { sequence }) => Err(MessageFailure::new(
                MessageId::new(sequence, label),
                MessageError::Panicked,
            )),
            Err(e) => {
                fatal = Some(e);
                break;
            }
        };

        let sealed = match prepared {
            Ok(prepared) => coordinator.offer(&prepared),
            Err(failure) => {
                warn!(message = %failure.id, error = %failure.error, "Message failed");
                report.record_failure(&failure.id.label, &failure.error.to_string());
                match placeholders.placeholder(&failure) {
                    Some(doc) => coordinator.push_document(doc),
                    None => continue,
                }
            }
        };

        if let Err(e) = emit(sealed, coordinator.last_placed(), &report, sink) {
            fatal = Some(e);
            break;
        }
    }

    let fed = feeder
        .join()
        .map_err(|_| BinderError::Pipeline("feeder thread panicked".into()))?;
    if let Some(e) = fatal {
        return Err(e);
    }
    let fed = fed?;

    if let Some(part) = coordinator.finish() {
        report.record_part();
        sink.accept(part)?;
    }

    let summary = report.finalize();
    info!(
        messages = fed,
        failed = summary.messages_failed,
        embedded = summary.attachments_embedded,
        deduplicated = summary.attachments_deduplicated,
        broken = summary.attachments_broken,
        parts = summary.parts_emitted,
        "Conversion finished"
    );
    Ok(summary)
}

/// Hand a sealed part (if any) and then the newly placed document to the sink.
fn emit(
    sealed: Option<OutputPart>,
    placed: Option<&MessageDocument>,
    report: &ReportAggregator,
    sink: &mut dyn PartSink,
) -> Result<()> {
    if let Some(part) = sealed {
        report.record_part();
        sink.accept(part)?;
    }
    if let Some(doc) = placed {
        report.record_document(doc);
        sink.accept_document(doc)?;
    }
    Ok(())
}
