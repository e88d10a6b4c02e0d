//! Symmetric (Hermitian) inner-product matrix.
//!
//! Only the upper triangle, diagonal included, is ever computed. The vectors are walked in
//! row chunks of `(quota - 1) * P`; within a chunk the work splits into three phases:
//!
//! 1. **Triangles.** Each process computes all pairs among the rows it holds, without any
//!    communication.
//! 2. **Paired exchanges.** Pairs of rows held by different processes are covered in
//!    `ceil((a - 1) / 2)` rounds, where `a` is the number of processes holding rows of the
//!    chunk. In round `s`, active process `r` sends its rows one at a time to
//!    `(r + s + 1) % a` and receives those of `(r - s - 1) % a`. Over all rounds, every
//!    unordered pair of active processes meets once in one direction, except that with an
//!    even `a` the last round pairs each process with the one opposite it in both
//!    directions; there only the lower rank computes.
//! 3. **Rectangles.** The chunk's rows against all later columns, streamed through the
//!    ring exactly as in [`super::gram`].
//!
//! Every computed value is written to the upper-triangle cell it belongs to, evaluated with
//! the lower index as the first argument. After the reduction the lower triangle is filled
//! with conjugates, so the result is exactly Hermitian.

use super::{
    ProcContext,
    gram::log_time_estimate,
    retrieve,
    ring::{Batch, ring_cycle},
};
use crate::{
    comm::Communicator,
    error::{VecOpsError, VecOpsErrorKind},
    partition,
    progress::ProgressReporter,
    vector::VecHandle,
};
use faer::{Mat, traits::ComplexField};

const COLS_PER_PROC_CHUNK: usize = 1;

/// Computes the Hermitian matrix `M[i, j] = inner_product(v_i, v_j)`.
///
/// The inner product must satisfy `inner_product(a, b) == conj(inner_product(b, a))`.
///
/// # Arguments
/// * `ctx`: This process's communicator and memory quota.
/// * `handles`: The vector collection. Must not be empty.
/// * `inner_product`: A Hermitian inner product.
/// * `progress`: Optional reporter for "completed X%" lines on the reporting process.
///
/// # Returns
/// The `N x N` matrix, identical on every process.
pub fn symmetric_inner_product_mat<V, T, C, H, F>(
    ctx: ProcContext<'_, C>,
    handles: &[H],
    inner_product: F,
    mut progress: Option<&mut ProgressReporter>,
) -> Result<Mat<T>, VecOpsError>
where
    V: Clone + Send + 'static,
    T: ComplexField + Send + 'static,
    Mat<T>: Clone,
    C: Communicator,
    H: VecHandle<V>,
    F: Fn(&V, &V) -> T,
{
    if handles.is_empty() {
        return Err(VecOpsErrorKind::EmptyInput("vector").into());
    }

    let comm = ctx.comm;
    let num_procs = comm.num_procs();
    let rank = comm.rank();
    let num_vecs = handles.len();
    let num_upper = num_vecs * (num_vecs + 1) / 2;

    if ctx.announce() {
        log_time_estimate(&handles[0], &handles[0], &inner_product, num_upper, num_procs)?;
    }

    let rows_per_chunk = ctx.resident_per_proc() * num_procs;
    let cols_per_chunk = COLS_PER_PROC_CHUNK * num_procs;
    let num_row_chunks = num_vecs.div_ceil(rows_per_chunk);
    if num_row_chunks > 1 && ctx.announce() {
        log::warn!(
            "The column vecs will be read ~{num_row_chunks} times each. Increase the number of \
             nodes or max_vecs_per_node to reduce redundant retrievals and get a big speedup."
        );
    }

    let mut upper = Mat::<T>::zeros(num_vecs, num_vecs);
    for start_row in (0..num_vecs).step_by(rows_per_chunk) {
        let end_row = (start_row + rows_per_chunk).min(num_vecs);
        let row_tasks = partition::assign_indices(start_row..end_row, num_procs);
        let my_rows = partition::contiguous_range(&row_tasks[rank])?;
        let row_vecs = retrieve(handles, my_rows)?;

        // Triangle among the rows held by this process.
        for (offset, (i, v_i)) in row_vecs.iter().enumerate() {
            for (j, v_j) in &row_vecs[offset..] {
                upper[(*i, *j)] = inner_product(v_i, v_j);
            }
        }

        exchange_between_active(ctx, &row_vecs, &row_tasks, &inner_product, &mut upper)?;

        // Rectangle to the right of the chunk.
        for start_col in (end_row..num_vecs).step_by(cols_per_chunk) {
            let end_col = (start_col + cols_per_chunk).min(num_vecs);
            let col_tasks = partition::assign_indices(start_col..end_col, num_procs);
            let col_batch = retrieve(handles, partition::contiguous_range(&col_tasks[rank])?)?;
            ring_cycle(comm, col_batch, |_, col_vecs| {
                for (i, row_vec) in &row_vecs {
                    for (j, col_vec) in col_vecs {
                        upper[(*i, *j)] = inner_product(row_vec, col_vec);
                    }
                }
                Ok(())
            })?;
        }

        if let Some(reporter) = progress.as_deref_mut() {
            if ctx.announce() {
                let completed = end_row * num_vecs - end_row * end_row.saturating_sub(1) / 2;
                let percent = 100.0 * completed as f64 / num_upper as f64;
                reporter.report(percent, "inner products");
            }
        }
    }

    let upper = comm.all_reduce_sum(upper)?;
    let ip_mat = Mat::from_fn(num_vecs, num_vecs, |i, j| {
        if i <= j {
            T::copy_impl(&upper[(i, j)])
        } else {
            T::conj_impl(&upper[(j, i)])
        }
    });

    comm.barrier()?;
    Ok(ip_mat)
}

/// Covers the pairs of rows held by different processes of the current chunk.
fn exchange_between_active<V, T, C, F>(
    ctx: ProcContext<'_, C>,
    row_vecs: &Batch<V>,
    row_tasks: &[Vec<usize>],
    inner_product: &F,
    upper: &mut Mat<T>,
) -> Result<(), VecOpsError>
where
    V: Clone + Send + 'static,
    T: ComplexField,
    C: Communicator,
    F: Fn(&V, &V) -> T,
{
    let comm = ctx.comm;
    let rank = comm.rank();
    // Balanced blocks put the busy processes first: ranks 0..num_active.
    let num_active = partition::active_workers(row_tasks);
    let is_active = rank < num_active;
    let num_rounds = num_active / 2;
    let max_num_to_send = partition::max_tasks(row_tasks).div_ceil(COLS_PER_PROC_CHUNK);

    for round in 0..num_rounds {
        let offset = round + 1;
        let dest = (rank + offset) % num_active;
        let source = (rank + num_active - offset) % num_active;
        let opposite = 2 * offset == num_active;
        let computes = is_active && (!opposite || rank < source);

        for send_index in 0..max_num_to_send {
            if is_active {
                let batch: Batch<V> = row_vecs
                    .iter()
                    .skip(send_index * COLS_PER_PROC_CHUNK)
                    .take(COLS_PER_PROC_CHUNK)
                    .cloned()
                    .collect();
                let received = comm.exchange(batch, dest, source)?;
                if computes {
                    for (i, row_vec) in row_vecs {
                        for (j, col_vec) in &received {
                            if i < j {
                                upper[(*i, *j)] = inner_product(row_vec, col_vec);
                            } else {
                                upper[(*j, *i)] = inner_product(col_vec, row_vec);
                            }
                        }
                    }
                }
            }
            comm.barrier()?;
        }
    }
    Ok(())
}
