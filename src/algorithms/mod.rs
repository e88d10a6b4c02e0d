//! Low-level distributed routines.
//!
//! ** NOTE: We recommend using the high-level methods of [`crate::VecOperations`] instead.
//! These functions assume their inputs were already validated and are intended for callers
//! that manage the communicator and memory quota themselves.
//!
//! Every routine is executed by all processes of a [`Communicator`] with identical
//! arguments. Each process works on the indices the [`crate::partition`] module assigns to
//! it, moves vectors through [`ring::ring_cycle`], and takes part in every collective step
//! even when it has nothing assigned.

pub mod gram;
pub mod lin_combine;
pub mod ring;
pub mod symmetric;

use crate::{comm::Communicator, error::VecOpsError, vector::VecHandle};
use std::ops::Range;

/// The per-call view of one process: its communicator and the fixed memory quota.
pub struct ProcContext<'a, C> {
    pub comm: &'a C,
    /// Maximum number of vectors this process may hold at once. At least 2.
    pub max_vecs_per_proc: usize,
    pub verbose: bool,
}

impl<C> Clone for ProcContext<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ProcContext<'_, C> {}

impl<'a, C: Communicator> ProcContext<'a, C> {
    pub fn new(comm: &'a C, max_vecs_per_proc: usize, verbose: bool) -> Self {
        Self {
            comm,
            max_vecs_per_proc,
            verbose,
        }
    }

    /// Whether user-facing messages should be emitted by this process.
    #[inline]
    pub fn announce(&self) -> bool {
        self.verbose && self.comm.is_rank_zero()
    }

    /// Number of "resident" vectors per process when one slot is kept for the vector that
    /// travels around the ring.
    #[inline]
    pub(crate) fn resident_per_proc(&self) -> usize {
        self.max_vecs_per_proc.saturating_sub(1).max(1)
    }
}

/// Retrieves the vectors of `range`, paired with their global indices.
pub(crate) fn retrieve<V, H: VecHandle<V>>(
    handles: &[H],
    range: Range<usize>,
) -> Result<Vec<(usize, V)>, VecOpsError> {
    range.map(|i| Ok((i, handles[i].get()?))).collect()
}

/// The `index`-th sub-chunk of at most `chunk` items within `tasks`.
///
/// Returns an empty range once the sub-chunks are exhausted, so a process with fewer tasks
/// than its peers keeps iterating in lock-step with nothing to do.
pub(crate) fn sub_chunk(tasks: &Range<usize>, index: usize, chunk: usize) -> Range<usize> {
    let start = (tasks.start + index * chunk).min(tasks.end);
    let end = (start + chunk).min(tasks.end);
    start..end
}
