//! Reuse pool for [`Record`]s.
//!
//! Acquiring never fails: an empty pool allocates. Releasing resets the
//! record before it is parked, so a reissued record carries nothing from
//! its previous use.

use std::sync::{Mutex, PoisonError};

use crate::record::Record;

/// Default number of idle records kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct RecordPool {
    idle: Mutex<Vec<Record>>,
    capacity: usize,
}

impl RecordPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns a clean record bound to `path`.
    pub fn acquire(&self, path: impl Into<String>) -> Record {
        let parked = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match parked {
            Some(mut record) => {
                record.rebind(path);
                record
            }
            None => Record::new(path),
        }
    }

    /// Resets `record`, parks it if there is room, then settles its receipt.
    pub fn release(&self, mut record: Record) {
        let receipt = record.recycle();
        {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            if idle.len() < self.capacity {
                idle.push(record);
            }
        }
        if let Some(receipt) = receipt {
            receipt.settle();
        }
    }

    /// Number of records currently parked.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
