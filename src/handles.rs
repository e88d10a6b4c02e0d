//! Ready-made [`VecHandle`] implementations.
//!
//! - [`InMemoryHandle`] keeps the vector in a shared slot. Clones of a handle refer to the
//!   same slot, so a handle list can be handed to every worker thread of a
//!   [`crate::comm::LocalWorld`] and behave like a shared storage backend.
//! - [`CountingHandle`] wraps any other handle and counts how often it is read and written,
//!   which is how the tests check the engine's retrieval budget.

use crate::{error::VecOpsError, vector::VecHandle};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

/// A handle whose vector lives in memory.
///
/// `put` stores the vector and returns a copy of it as the receipt, which is what makes
/// [`crate::VecOperations::lin_combine_and_return`] return the vectors themselves.
#[derive(Debug)]
pub struct InMemoryHandle<V> {
    slot: Arc<Mutex<Option<V>>>,
}

impl<V> Clone for InMemoryHandle<V> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<V> Default for InMemoryHandle<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V> InMemoryHandle<V> {
    /// Creates a handle with no vector behind it yet.
    pub fn empty() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a handle that already holds `vec`.
    pub fn new(vec: V) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(vec))),
        }
    }

    /// Returns `true` once a vector has been stored.
    pub fn is_populated(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl<V: Clone + Send + 'static> VecHandle<V> for InMemoryHandle<V> {
    type Receipt = V;

    fn get(&self) -> Result<V, VecOpsError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| VecOpsError::retrieval("in-memory slot is poisoned"))?;
        slot.as_ref()
            .cloned()
            .ok_or_else(|| VecOpsError::retrieval("in-memory handle holds no vector"))
    }

    fn put(&self, vec: V) -> Result<V, VecOpsError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| VecOpsError::storage("in-memory slot is poisoned"))?;
        *slot = Some(vec.clone());
        Ok(vec)
    }
}

/// Wraps a handle and counts its `get` and `put` calls.
///
/// The counters are shared between clones.
#[derive(Debug)]
pub struct CountingHandle<H> {
    inner: H,
    gets: Arc<AtomicUsize>,
    puts: Arc<AtomicUsize>,
}

impl<H: Clone> Clone for CountingHandle<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gets: Arc::clone(&self.gets),
            puts: Arc::clone(&self.puts),
        }
    }
}

impl<H> CountingHandle<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            gets: Arc::new(AtomicUsize::new(0)),
            puts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of successful and failed `get` calls so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of successful and failed `put` calls so far.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<V, H: VecHandle<V>> VecHandle<V> for CountingHandle<H> {
    type Receipt = H::Receipt;

    fn get(&self) -> Result<V, VecOpsError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get()
    }

    fn put(&self, vec: V) -> Result<Self::Receipt, VecOpsError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(vec)
    }
}
