//! Host resource accounting for background enumeration producers.
//!
//! Each map enumeration runs a producer thread. Before the thread starts, a
//! fixed overhead (its stack, by default) is reserved from a shared
//! [`ResourceBudget`]; the returned [`Reservation`] travels into the thread
//! and gives the bytes back exactly once, when the thread's scope closes.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::ProtoError;

/// Default overhead reserved per producer, also used as its stack size.
pub const DEFAULT_PRODUCER_OVERHEAD: u64 = 256 * 1024;

/// Smallest stack a producer thread is given, whatever the configured overhead.
pub const MIN_PRODUCER_STACK: usize = 64 * 1024;

struct BudgetState {
    capacity: Option<u64>,
    producer_overhead: u64,
    reserved: AtomicU64,
    outstanding: AtomicUsize,
}

/// Shared, thread-safe byte budget.
#[derive(Clone)]
pub struct ResourceBudget {
    state: Arc<BudgetState>,
}

impl ResourceBudget {
    /// Budget with no cap; reservations are still counted.
    pub fn unlimited() -> Self {
        Self::new(None, DEFAULT_PRODUCER_OVERHEAD)
    }

    /// Budget capped at `capacity` bytes (`None` = uncapped).
    pub fn new(capacity: Option<u64>, producer_overhead: u64) -> Self {
        Self {
            state: Arc::new(BudgetState {
                capacity,
                producer_overhead,
                reserved: AtomicU64::new(0),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Overhead reserved for each enumeration producer.
    pub fn producer_overhead(&self) -> u64 {
        self.state.producer_overhead
    }

    /// Bytes currently reserved.
    pub fn reserved(&self) -> u64 {
        self.state.reserved.load(Ordering::Acquire)
    }

    /// Number of live reservations.
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Bytes still available, or `None` when uncapped.
    pub fn available(&self) -> Option<u64> {
        self.state
            .capacity
            .map(|cap| cap.saturating_sub(self.reserved()))
    }

    /// Reserve `bytes`, failing if the cap would be exceeded.
    pub fn reserve(&self, bytes: u64) -> Result<Reservation, ProtoError> {
        let state = &self.state;
        let mut current = state.reserved.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(bytes);
            if let Some(cap) = state.capacity {
                if next > cap {
                    return Err(ProtoError::BudgetExhausted {
                        requested: bytes,
                        available: cap.saturating_sub(current),
                    });
                }
            }
            match state.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        state.outstanding.fetch_add(1, Ordering::AcqRel);
        Ok(Reservation {
            state: self.state.clone(),
            bytes,
        })
    }
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for ResourceBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBudget")
            .field("capacity", &self.state.capacity)
            .field("reserved", &self.reserved())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Bytes held against a [`ResourceBudget`]; released on drop.
#[must_use = "dropping a reservation releases it immediately"]
pub struct Reservation {
    state: Arc<BudgetState>,
    bytes: u64,
}

impl Reservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.state.reserved.fetch_sub(self.bytes, Ordering::AcqRel);
        self.state.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let budget = ResourceBudget::new(Some(1000), 100);
        let a = budget.reserve(600).unwrap();
        assert_eq!(budget.reserved(), 600);
        assert_eq!(budget.available(), Some(400));
        assert_eq!(budget.outstanding(), 1);
        drop(a);
        assert_eq!(budget.reserved(), 0);
        assert_eq!(budget.outstanding(), 0);
    }

    #[test]
    fn test_reserve_over_cap_fails() {
        let budget = ResourceBudget::new(Some(1000), 100);
        let _held = budget.reserve(900).unwrap();
        let err = budget.reserve(200).err().unwrap();
        assert_eq!(
            err,
            ProtoError::BudgetExhausted {
                requested: 200,
                available: 100
            }
        );
        assert_eq!(budget.outstanding(), 1);
    }

    #[test]
    fn test_unlimited_still_counts() {
        let budget = ResourceBudget::unlimited();
        let r = budget.reserve(u64::MAX / 2).unwrap();
        assert_eq!(budget.available(), None);
        assert_eq!(budget.reserved(), u64::MAX / 2);
        assert_eq!(r.bytes(), u64::MAX / 2);
    }

    #[test]
    fn test_release_from_other_thread() {
        let budget = ResourceBudget::new(Some(10), 10);
        let r = budget.reserve(10).unwrap();
        std::thread::spawn(move || drop(r)).join().unwrap();
        assert_eq!(budget.reserved(), 0);
    }
}
