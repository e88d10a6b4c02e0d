//! General rectangular inner-product matrix.
//!
//! Rows are assigned to processes once, up front, and each process walks its rows in
//! sub-chunks of `quota - 1` resident vectors. For each sub-chunk, the columns are streamed
//! one per process at a time through a full [`ring_cycle`], so every resident row meets
//! every column exactly once. Each process fills a zero-initialized matrix of the full
//! output size and a final [`Communicator::all_reduce_sum`] assembles the result.
//!
//! Memory per process is therefore `quota - 1` rows plus the single column currently in
//! transit. Each column is retrieved once per row sub-chunk, which is why the smaller of the
//! two collections is made the row collection.

use super::{ProcContext, retrieve, ring::ring_cycle, sub_chunk};
use crate::{
    comm::Communicator,
    error::{VecOpsError, VecOpsErrorKind},
    partition,
    progress::ProgressReporter,
    vector::VecHandle,
};
use faer::{Mat, traits::ComplexField};
use std::time::Instant;

/// Columns each process puts into the ring per cycle.
const COLS_PER_PROC_CHUNK: usize = 1;

/// Computes `M[i, j] = inner_product(row_i, col_j)`.
///
/// If there are more rows than columns, the collections are swapped internally so the
/// smaller one is held resident, and the result is transposed back. The argument order of
/// the inner product is preserved in either case.
///
/// # Arguments
/// * `ctx`: This process's communicator and memory quota.
/// * `row_handles`, `col_handles`: The two collections. Must not be empty.
/// * `inner_product`: Evaluated as `inner_product(row, col)`.
/// * `progress`: Optional reporter for "completed X%" lines on the reporting process.
///
/// # Returns
/// The `row_handles.len() x col_handles.len()` matrix, identical on every process.
pub fn inner_product_mat<V, T, C, R, Q, F>(
    ctx: ProcContext<'_, C>,
    row_handles: &[R],
    col_handles: &[Q],
    inner_product: F,
    progress: Option<&mut ProgressReporter>,
) -> Result<Mat<T>, VecOpsError>
where
    V: Clone + Send + 'static,
    T: ComplexField + Send + 'static,
    Mat<T>: Clone,
    C: Communicator,
    R: VecHandle<V>,
    Q: VecHandle<V>,
    F: Fn(&V, &V) -> T,
{
    if row_handles.is_empty() {
        return Err(VecOpsErrorKind::EmptyInput("row").into());
    }
    if col_handles.is_empty() {
        return Err(VecOpsErrorKind::EmptyInput("column").into());
    }

    if ctx.announce() {
        log_time_estimate(
            &row_handles[0],
            &col_handles[0],
            &inner_product,
            row_handles.len() * col_handles.len(),
            ctx.comm.num_procs(),
        )?;
    }

    let ip_mat = if row_handles.len() > col_handles.len() {
        let flipped = |a: &V, b: &V| inner_product(b, a);
        fill_rows_resident(ctx, col_handles, row_handles, flipped, progress)?
            .transpose()
            .to_owned()
    } else {
        fill_rows_resident(ctx, row_handles, col_handles, inner_product, progress)?
    };

    ctx.comm.barrier()?;
    Ok(ip_mat)
}

/// Times one inner product and logs a lower bound for the whole computation.
pub(crate) fn log_time_estimate<V, T, A, B, F>(
    a: &A,
    b: &B,
    inner_product: &F,
    num_products: usize,
    num_procs: usize,
) -> Result<(), VecOpsError>
where
    A: VecHandle<V>,
    B: VecHandle<V>,
    F: Fn(&V, &V) -> T,
{
    let a = a.get()?;
    let b = b.get()?;
    let start = Instant::now();
    let _ = inner_product(&a, &b);
    let seconds = start.elapsed().as_secs_f64();
    let minutes = num_products as f64 * seconds / (60.0 * num_procs as f64);
    log::info!("Computing the inner product matrix will take at least {minutes:.1} minutes");
    Ok(())
}

/// The core routine, with the row collection no larger than the column collection.
fn fill_rows_resident<V, T, C, R, Q, F>(
    ctx: ProcContext<'_, C>,
    row_handles: &[R],
    col_handles: &[Q],
    inner_product: F,
    mut progress: Option<&mut ProgressReporter>,
) -> Result<Mat<T>, VecOpsError>
where
    V: Clone + Send + 'static,
    T: ComplexField + Send + 'static,
    Mat<T>: Clone,
    C: Communicator,
    R: VecHandle<V>,
    Q: VecHandle<V>,
    F: Fn(&V, &V) -> T,
{
    let comm = ctx.comm;
    let num_procs = comm.num_procs();
    let rank = comm.rank();
    let num_rows = row_handles.len();
    let num_cols = col_handles.len();

    let rows_per_proc_chunk = ctx.resident_per_proc();

    let row_tasks = partition::assign(num_rows, num_procs);
    let col_tasks = partition::assign(num_cols, num_procs);
    let my_rows = partition::contiguous_range(&row_tasks[rank])?;
    let my_cols = partition::contiguous_range(&col_tasks[rank])?;

    // Loop counts are derived from the busiest process so that everyone iterates together.
    let num_row_get_loops = partition::max_tasks(&row_tasks).div_ceil(rows_per_proc_chunk);
    let num_col_get_loops = partition::max_tasks(&col_tasks).div_ceil(COLS_PER_PROC_CHUNK);

    if num_row_get_loops > 1 && ctx.announce() {
        log::warn!(
            "The column vecs, of which there are {num_cols}, will be read {num_row_get_loops} \
             times each. Increase the number of nodes or max_vecs_per_node to reduce redundant \
             retrievals and get a big speedup."
        );
    }

    let mut ip_mat = Mat::<T>::zeros(num_rows, num_cols);
    for row_get_index in 0..num_row_get_loops {
        let rows = sub_chunk(&my_rows, row_get_index, rows_per_proc_chunk);
        let row_vecs = retrieve(row_handles, rows)?;

        for col_get_index in 0..num_col_get_loops {
            let cols = sub_chunk(&my_cols, col_get_index, COLS_PER_PROC_CHUNK);
            let col_batch = retrieve(col_handles, cols)?;

            ring_cycle(comm, col_batch, |_, col_vecs| {
                for (i, row_vec) in &row_vecs {
                    for (j, col_vec) in col_vecs {
                        ip_mat[(*i, *j)] = inner_product(row_vec, col_vec);
                    }
                }
                Ok(())
            })?;
        }

        if let Some(reporter) = progress.as_deref_mut() {
            if ctx.announce() {
                let percent = 100.0 * (row_get_index + 1) as f64 / num_row_get_loops as f64;
                reporter.report(percent, "inner products");
            }
        }
        log::debug!(
            "rank {rank}: finished row chunk {}/{num_row_get_loops}",
            row_get_index + 1
        );
    }

    comm.all_reduce_sum(ip_mat)
}
