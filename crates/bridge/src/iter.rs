//! Producer/consumer hand-off used by map enumeration.
//!
//! A producer thread walks a sequence and offers each item through a
//! zero-capacity (rendezvous) channel, so at most one item is ever in flight.
//! The consumer pulls with [`Rendezvous::next`]. Dropping or closing the
//! consumer raises the cancel flag and hangs up the channel; the producer
//! sees either on its next offer, stops walking, and releases its budget
//! reservation as its scope unwinds.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};

use crate::budget::{Reservation, ResourceBudget, MIN_PRODUCER_STACK};
use crate::error::ProtoError;

/// Monotonic id for producer threads (names and log lines).
static NEXT_PRODUCER_ID: AtomicU64 = AtomicU64::new(1);

/// How a producer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Every item was handed off.
    Exhausted,
    /// The consumer cancelled (or hung up) before the walk finished.
    Cancelled,
    /// The producer thread panicked.
    Failed,
}

/// Consumer side of a running producer.
pub struct Rendezvous<T> {
    id: u64,
    rx: Option<Receiver<T>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<ProducerExit>>,
    exit: Option<ProducerExit>,
}

impl<T: Send + 'static> Rendezvous<T> {
    /// Reserve the producer overhead from `budget` and start walking `items`.
    pub fn spawn<I>(items: I, budget: &ResourceBudget) -> Result<Self, ProtoError>
    where
        I: IntoIterator<Item = T> + Send + 'static,
    {
        let overhead = budget.producer_overhead();
        let reservation = budget.reserve(overhead)?;
        let id = NEXT_PRODUCER_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::sync_channel::<T>(0);
        let cancel = Arc::new(AtomicBool::new(false));
        let producer_cancel = cancel.clone();
        let stack = usize::try_from(overhead)
            .unwrap_or(usize::MAX)
            .max(MIN_PRODUCER_STACK);

        let handle = thread::Builder::new()
            .name(format!("protolua-range-{id}"))
            .stack_size(stack)
            .spawn(move || produce(id, items, tx, producer_cancel, reservation))
            .map_err(|e| {
                warn!("range producer {id}: spawn failed: {e}");
                ProtoError::Spawn(e.to_string())
            })?;
        debug!("range producer {id}: started ({overhead} bytes reserved)");

        Ok(Self {
            id,
            rx: Some(rx),
            cancel,
            handle: Some(handle),
            exit: None,
        })
    }
}

impl<T> Rendezvous<T> {
    /// Block until the producer offers the next item; `None` at the end.
    ///
    /// A producer that failed mid-walk also reads as the end of the sequence.
    pub fn next(&mut self) -> Option<T> {
        let item = self.rx.as_ref()?.recv().ok();
        match item {
            Some(item) => {
                trace!("range producer {}: item accepted", self.id);
                Some(item)
            }
            None => {
                self.finish();
                None
            }
        }
    }

    /// Stop the producer and wait for it to exit. Idempotent.
    pub fn close(&mut self) -> Option<ProducerExit> {
        self.cancel.store(true, Ordering::Release);
        self.finish()
    }

    /// How the producer finished, once it has.
    pub fn exit(&self) -> Option<ProducerExit> {
        self.exit
    }

    fn finish(&mut self) -> Option<ProducerExit> {
        // Hang up first so a producer blocked in `send` wakes.
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            let exit = handle.join().unwrap_or_else(|_| {
                warn!("range producer {}: panicked", self.id);
                ProducerExit::Failed
            });
            debug!("range producer {}: joined ({exit:?})", self.id);
            self.exit = Some(exit);
        }
        self.exit
    }
}

impl<T> Drop for Rendezvous<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn produce<T, I>(
    id: u64,
    items: I,
    tx: SyncSender<T>,
    cancel: Arc<AtomicBool>,
    reservation: Reservation,
) -> ProducerExit
where
    I: IntoIterator<Item = T>,
{
    // Released when this scope closes, on every exit path.
    let _reservation = reservation;
    for item in items {
        if cancel.load(Ordering::Acquire) {
            debug!("range producer {id}: cancelled");
            return ProducerExit::Cancelled;
        }
        if tx.send(item).is_err() {
            debug!("range producer {id}: consumer hung up");
            return ProducerExit::Cancelled;
        }
    }
    ProducerExit::Exhausted
}
