//! Fixed-size worker pool with bounded in-flight work and in-order delivery.
//!
//! ```text
//! [feeder] --(seq, item)--> [worker × N] --(seq, result)--> [sequencer] --> caller
//!     ^                                                          |
//!     +------------------- slot released on delivery ------------+
//! ```

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{error, trace};

use crate::error::{BinderError, Result};

/// Entry point for spawning a pool.
pub struct WorkerPool;

impl WorkerPool {
    /// Start `workers` threads running `job` on submitted items.
    ///
    /// At most `max_in_flight` items may be submitted but not yet delivered
    /// by the returned [`Ordered`] iterator; further submissions block.
    pub fn spawn<T, R, F>(
        workers: usize,
        max_in_flight: usize,
        job: F,
    ) -> Result<(Submitter<T>, Ordered<R>)>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(u64, T) -> R + Send + Sync + 'static,
    {
        let workers = workers.max(1);
        let max_in_flight = max_in_flight.max(workers);
        let (job_tx, job_rx) = bounded::<(u64, T)>(max_in_flight);
        let (result_tx, result_rx) = unbounded::<(u64, Result<R>)>();
        let (slot_tx, slot_rx) = bounded::<()>(max_in_flight);
        let job = Arc::new(job);

        let mut handles = Vec::with_capacity(workers);
        for n in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let job = Arc::clone(&job);
            let handle = thread::Builder::new()
                .name(format!("mailbinder-worker-{n}"))
                .spawn(move || {
                    for (seq, item) in job_rx.iter() {
                        let outcome = catch_unwind(AssertUnwindSafe(|| job(seq, item)))
                            .map_err(|_| {
                                error!(sequence = seq, "Worker panicked");
                                BinderError::WorkerPanicked { sequence: seq }
                            });
                        if result_tx.send((seq, outcome)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| BinderError::Pipeline(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        Ok((
            Submitter {
                job_tx,
                slot_tx,
                next_sequence: 0,
            },
            Ordered {
                result_rx,
                slot_rx: Some(slot_rx),
                pending: BTreeMap::new(),
                next_sequence: 0,
                handles,
            },
        ))
    }
}

/// Sending half. Dropping it tells the workers no more items are coming.
pub struct Submitter<T> {
    job_tx: Sender<(u64, T)>,
    slot_tx: Sender<()>,
    next_sequence: u64,
}

impl<T> Submitter<T> {
    /// Submit an item, blocking while the pool is saturated. Returns the
    /// item's sequence number. Fails once the consumer has gone away.
    pub fn submit(&mut self, item: T) -> Result<u64> {
        self.slot_tx
            .send(())
            .map_err(|_| BinderError::Pipeline("result consumer has stopped".into()))?;
        let seq = self.next_sequence;
        self.job_tx
            .send((seq, item))
            .map_err(|_| BinderError::Pipeline("workers have stopped".into()))?;
        self.next_sequence += 1;
        trace!(sequence = seq, "Submitted");
        Ok(seq)
    }
}

/// Results in submission order, regardless of completion order.
pub struct Ordered<R> {
    result_rx: Receiver<(u64, Result<R>)>,
    slot_rx: Option<Receiver<()>>,
    pending: BTreeMap<u64, Result<R>>,
    next_sequence: u64,
    handles: Vec<JoinHandle<()>>,
}

impl<R> Ordered<R> {
    fn deliver(&mut self, result: Result<R>) -> Option<Result<R>> {
        self.next_sequence += 1;
        if let Some(slots) = &self.slot_rx {
            let _ = slots.try_recv();
        }
        Some(result)
    }
}

impl<R> Iterator for Ordered<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.pending.remove(&self.next_sequence) {
                return self.deliver(result);
            }
            match self.result_rx.recv() {
                Ok((seq, result)) => {
                    self.pending.insert(seq, result);
                }
                Err(_) if self.pending.is_empty() => return None,
                Err(_) => {
                    let missing = self.next_sequence;
                    return self.deliver(Err(BinderError::Pipeline(format!(
                        "submission #{missing} produced no result"
                    ))));
                }
            }
        }
    }
}

impl<R> Drop for Ordered<R> {
    fn drop(&mut self) {
        // Unblocks a feeder waiting for a slot, so workers can drain and exit.
        self.slot_rx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_in_submission_order() {
        let (mut submitter, ordered) = WorkerPool::spawn(4, 8, |_, n: u64| {
            // Later items finish first
            thread::sleep(Duration::from_millis(20 - n.min(20)));
            n * 10
        })
        .expect("spawn");

        let feeder = thread::spawn(move || {
            for n in 0..20 {
                submitter.submit(n).expect("submit");
            }
        });
        let results: Vec<u64> = ordered.map(|r| r.expect("ok")).collect();
        feeder.join().expect("feeder");
        assert_eq!(results, (0..20).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_is_isolated_to_its_slot() {
        let (mut submitter, ordered) = WorkerPool::spawn(2, 4, |_, n: u32| {
            if n == 2 {
                panic!("boom");
            }
            n
        })
        .expect("spawn");

        let feeder = thread::spawn(move || {
            for n in 0..5 {
                submitter.submit(n).expect("submit");
            }
        });
        let results: Vec<Result<u32>> = ordered.collect();
        feeder.join().expect("feeder");

        assert_eq!(results.len(), 5);
        assert!(matches!(
            results[2],
            Err(BinderError::WorkerPanicked { sequence: 2 })
        ));
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 4);
    }

    #[test]
    fn test_concurrency_bounded_by_workers() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (run, pk) = (Arc::clone(&running), Arc::clone(&peak));
        let (mut submitter, ordered) = WorkerPool::spawn(2, 3, move |_, n: u32| {
            let now = run.fetch_add(1, Ordering::SeqCst) + 1;
            pk.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            run.fetch_sub(1, Ordering::SeqCst);
            n
        })
        .expect("spawn");

        let feeder = thread::spawn(move || {
            for n in 0..12 {
                submitter.submit(n).expect("submit");
            }
        });
        assert_eq!(ordered.count(), 12);
        feeder.join().expect("feeder");
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_dropping_consumer_stops_feeder() {
        let (mut submitter, ordered) = WorkerPool::spawn(1, 1, |_, n: u32| n).expect("spawn");
        let feeder = thread::spawn(move || {
            let mut sent = 0;
            while submitter.submit(sent).is_ok() {
                sent += 1;
                if sent > 1000 {
                    break;
                }
            }
            sent
        });
        drop(ordered);
        let sent = feeder.join().expect("feeder");
        assert!(sent <= 2, "feeder kept going: {sent}");
    }
}
