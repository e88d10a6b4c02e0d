//! Linear combinations of a streamed basis.
//!
//! Sum (output) vectors are assigned to processes once and built in sub-chunks of
//! `quota - 1` resident sums. For each sub-chunk the basis vectors travel around the ring,
//! one per process at a time, and every resident sum accumulates `coeff[b, s] * basis_b`
//! from each basis vector that passes by. Completed sums are stored through their handles
//! and the receipts of all processes are gathered in sum order.

use super::{ProcContext, retrieve, ring::ring_cycle, sub_chunk};
use crate::{
    comm::Communicator,
    error::{VecOpsError, VecOpsErrorKind},
    partition,
    progress::ProgressReporter,
    vector::{VecHandle, Vector},
};
use faer::{MatRef, traits::ComplexField};

const BASES_PER_PROC_CHUNK: usize = 1;

/// Checks the handle counts against the coefficient matrix.
///
/// Runs before any communication, so all processes fail together on bad shapes.
pub fn validate_shapes<T>(
    num_sums: usize,
    num_bases: usize,
    coeff_mat: MatRef<'_, T>,
) -> Result<(), VecOpsError> {
    if num_bases == 0 {
        return Err(VecOpsErrorKind::EmptyInput("basis").into());
    }
    if num_bases > coeff_mat.nrows() {
        return Err(VecOpsErrorKind::CoefficientRows {
            rows: coeff_mat.nrows(),
            bases: num_bases,
        }
        .into());
    }
    if num_sums > coeff_mat.ncols() {
        return Err(VecOpsErrorKind::CoefficientCols {
            cols: coeff_mat.ncols(),
            sums: num_sums,
        }
        .into());
    }
    Ok(())
}

/// Computes `sum_k = Σ_b coeff_mat[b, k] * basis_b` and stores it through `sum_handles[k]`.
///
/// Rows of `coeff_mat` beyond the number of bases and columns beyond the number of sums
/// are ignored.
///
/// # Arguments
/// * `ctx`: This process's communicator and memory quota.
/// * `sum_handles`: Destinations of the combinations.
/// * `basis_handles`: The basis. Must not be empty.
/// * `coeff_mat`: Coefficients, one row per basis vector and one column per sum.
/// * `progress`: Optional reporter for "completed X%" lines on the reporting process.
///
/// # Returns
/// The receipts of all `put` calls, ordered like `sum_handles`, on every process.
pub fn lin_combine<V, T, C, S, B>(
    ctx: ProcContext<'_, C>,
    sum_handles: &[S],
    basis_handles: &[B],
    coeff_mat: MatRef<'_, T>,
    mut progress: Option<&mut ProgressReporter>,
) -> Result<Vec<S::Receipt>, VecOpsError>
where
    V: Vector<T>,
    T: ComplexField,
    C: Communicator,
    S: VecHandle<V>,
    B: VecHandle<V>,
{
    let num_sums = sum_handles.len();
    let num_bases = basis_handles.len();
    validate_shapes(num_sums, num_bases, coeff_mat)?;

    if ctx.announce() {
        if num_bases < coeff_mat.nrows() {
            log::warn!(
                "Fewer bases ({num_bases}) than rows in the coefficient matrix ({}); some rows \
                 of the coefficient matrix will not be used.",
                coeff_mat.nrows()
            );
        }
        if num_sums < coeff_mat.ncols() {
            log::warn!(
                "Fewer outputs ({num_sums}) than columns in the coefficient matrix ({}); some \
                 columns of the coefficient matrix will not be used.",
                coeff_mat.ncols()
            );
        }
    }

    let comm = ctx.comm;
    let num_procs = comm.num_procs();
    let rank = comm.rank();
    let sums_per_proc_chunk = ctx.resident_per_proc();

    let basis_tasks = partition::assign(num_bases, num_procs);
    let sum_tasks = partition::assign(num_sums, num_procs);
    let my_bases = partition::contiguous_range(&basis_tasks[rank])?;
    let my_sums = partition::contiguous_range(&sum_tasks[rank])?;

    let num_basis_get_loops = partition::max_tasks(&basis_tasks).div_ceil(BASES_PER_PROC_CHUNK);
    let num_sum_put_loops = partition::max_tasks(&sum_tasks).div_ceil(sums_per_proc_chunk);

    if num_sum_put_loops > 1 && ctx.announce() {
        log::warn!(
            "The basis vecs, of which there are {num_bases}, will be retrieved \
             {num_sum_put_loops} times each. If possible, increase the number of nodes or \
             max_vecs_per_node to reduce redundant retrievals and get a big speedup."
        );
    }

    let mut receipts = Vec::with_capacity(my_sums.len());
    for sum_put_index in 0..num_sum_put_loops {
        let sums = sub_chunk(&my_sums, sum_put_index, sums_per_proc_chunk);
        // Each slot starts empty and takes the first scaled basis vector as its initial value.
        let mut sum_layers: Vec<Option<V>> = sums.clone().map(|_| None).collect();

        for basis_get_index in 0..num_basis_get_loops {
            let bases = sub_chunk(&my_bases, basis_get_index, BASES_PER_PROC_CHUNK);
            let basis_batch = retrieve(basis_handles, bases)?;

            ring_cycle(comm, basis_batch, |_, basis_vecs| {
                for (slot, sum_index) in sum_layers.iter_mut().zip(sums.clone()) {
                    for (basis_index, basis_vec) in basis_vecs {
                        let layer = basis_vec.scale(&coeff_mat[(*basis_index, sum_index)]);
                        match slot {
                            Some(sum) => sum.accumulate(&layer),
                            None => *slot = Some(layer),
                        }
                    }
                }
                Ok(())
            })?;
        }

        for (sum_index, layer) in sums.clone().zip(sum_layers) {
            let sum = layer.ok_or_else(|| {
                VecOpsError::from(VecOpsErrorKind::ProtocolInvariant(format!(
                    "sum {sum_index} received no basis vectors"
                )))
            })?;
            receipts.push(sum_handles[sum_index].put(sum)?);
        }

        if let Some(reporter) = progress.as_deref_mut() {
            if ctx.announce() {
                let percent = 100.0 * (sum_put_index + 1) as f64 / num_sum_put_loops as f64;
                reporter.report(percent, "sum vecs");
            }
        }
    }

    // Sum blocks are contiguous and in rank order, so concatenation restores sum order.
    let gathered = comm.all_gather(receipts)?;
    Ok(gathered.into_iter().flatten().collect())
}
