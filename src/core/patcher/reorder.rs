/*!
 * Reorder buffer for out-of-order span completion
 *
 * Workers insert verified spans keyed by their first block; the single
 * writer blocks on `take` until the span at its cursor arrives. A fatal
 * error or cancellation poisons the buffer and wakes the writer.
 */

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};

use crate::error::{Result, SyncError};

pub struct ReorderBuffer {
    inner: Mutex<Inner>,
    available: Condvar,
}

struct Inner {
    ready: BTreeMap<u32, Vec<u8>>,
    fault: Option<SyncError>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: BTreeMap::new(),
                fault: None,
            }),
            available: Condvar::new(),
        }
    }

    /// Insert a verified, completed span
    pub fn insert(&self, start_block: u32, bytes: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.ready.insert(start_block, bytes);
        self.available.notify_all();
    }

    /// Fail the patch; the first fault wins and wakes the writer
    pub fn poison(&self, error: SyncError) {
        let mut inner = self.inner.lock().unwrap();
        if inner.fault.is_none() {
            inner.fault = Some(error);
        }
        self.available.notify_all();
    }

    /// Block until the span starting at `start_block` is available
    pub fn take(&self, start_block: u32) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(bytes) = inner.ready.remove(&start_block) {
                return Ok(bytes);
            }
            if let Some(fault) = inner.fault.take() {
                return Err(fault);
            }
            inner = self.available.wait(inner).unwrap();
        }
    }

    /// Completed spans currently awaiting the writer
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}
