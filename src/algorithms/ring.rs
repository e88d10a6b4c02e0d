//! The token ring every engine streams vectors through.

use crate::{comm::Communicator, error::VecOpsError};

/// A batch of vectors tagged with their global indices.
pub type Batch<V> = Vec<(usize, V)>;

/// Circulates `batch` around the ring of all processes.
///
/// The cycle has exactly `num_procs` passes. On pass 0 `visit` sees this process's own
/// batch. On every later pass the current batch is sent to `(rank + 1) % P`, the batch of
/// `(rank - 1) % P` is received in its place, and all processes meet at a barrier before
/// `visit` runs. After the cycle every process has visited every process's original batch
/// exactly once, its own included.
///
/// Empty batches travel like any other, so processes with nothing assigned stay in
/// lock-step with the rest.
///
/// # Arguments
/// * `comm`: The communicator shared by all participating processes.
/// * `batch`: This process's batch. Ownership moves into the ring.
/// * `visit`: Called once per pass with the pass index and the batch currently held.
pub fn ring_cycle<C, V, F>(comm: &C, batch: Batch<V>, mut visit: F) -> Result<(), VecOpsError>
where
    C: Communicator,
    V: Send + 'static,
    F: FnMut(usize, &[(usize, V)]) -> Result<(), VecOpsError>,
{
    let num_procs = comm.num_procs();
    let rank = comm.rank();
    let dest = (rank + 1) % num_procs;
    let source = (rank + num_procs - 1) % num_procs;

    let mut current = batch;
    for pass in 0..num_procs {
        if pass > 0 {
            current = comm.exchange(current, dest, source)?;
            comm.barrier()?;
        }
        visit(pass, &current)?;
    }
    Ok(())
}
