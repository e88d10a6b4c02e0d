//! Integration test suite to verify the correctness of the distributed vector operations.
//!
//! # Test Methodology
//!
//! Every collective operation is validated against a brute-force ground truth that is
//! computed directly, on a single thread, from the same vectors:
//!
//! 1.  **Construct a Test Problem:** A reproducible set of random dense vectors (and, for
//!     linear combinations, a random coefficient matrix) is generated from a fixed seed.
//! 2.  **Compute the Ground Truth:** Inner-product matrices are evaluated cell by cell;
//!     linear combinations are accumulated term by term.
//! 3.  **Run the Distributed Operation:** The operation is executed in an in-process world of
//!     `P` workers with a deliberately small memory budget, so that every code path (row
//!     chunks, paired exchanges, rectangular ring fills, repeated basis retrieval) is hit.
//! 4.  **Verify:** Every worker's result is compared with the ground truth, and the results of
//!     different workers are required to be identical.
//!
//! The generic checks are stamped out for `P ∈ {1, 2, 3, 5}` by a macro; the remaining tests
//! cover specific scenarios and error paths.

use anyhow::{Result, ensure};
use faer::{Mat, c64};
use rand::{Rng, SeedableRng, rngs::StdRng};
use vecops_project::{
    VecOperations, VecOpsConfig, VecOpsErrorKind,
    comm::{Communicator, LocalComm, LocalWorld},
    handles::{CountingHandle, InMemoryHandle},
    vector::{euclidean, euclidean_inner_product},
};

/// Tolerance for results that involve floating-point accumulation in a different order than
/// the ground truth.
const TOLERANCE: f64 = 1e-12;

type Ops = VecOperations<Mat<f64>, f64, LocalComm>;

/// Generates `n` reproducible random column vectors of dimension `dim`.
fn random_vecs(n: usize, dim: usize, seed: u64) -> Vec<Mat<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Mat::from_fn(dim, 1, |_, _| rng.random::<f64>() - 0.5))
        .collect()
}

fn in_memory(vecs: &[Mat<f64>]) -> Vec<InMemoryHandle<Mat<f64>>> {
    vecs.iter().cloned().map(InMemoryHandle::new).collect()
}

/// The ground-truth matrix `M[i, j] = <rows_i, cols_j>`.
fn brute_force_gram(rows: &[Mat<f64>], cols: &[Mat<f64>]) -> Mat<f64> {
    Mat::from_fn(rows.len(), cols.len(), |i, j| euclidean_inner_product(&rows[i], &cols[j]))
}

/// The ground-truth combination `Σ_b coeff[b, k] * bases_b`, accumulated entry by entry.
fn brute_force_combination(bases: &[Mat<f64>], coeff: &Mat<f64>, k: usize) -> Mat<f64> {
    Mat::from_fn(bases[0].nrows(), 1, |i, _| {
        bases
            .iter()
            .enumerate()
            .map(|(b, basis)| coeff[(b, k)] * basis[(i, 0)])
            .sum()
    })
}

/// A configuration whose per-process quota is `per_proc` on a single node of `num_procs`.
fn tight_config(per_proc: usize, num_procs: usize) -> VecOpsConfig {
    VecOpsConfig::with_max_vecs_per_node(per_proc * num_procs).quiet()
}

fn ops(comm: LocalComm, config: &VecOpsConfig) -> Ops {
    VecOperations::new(comm, Some(euclidean()), config).unwrap()
}

/// General Gram matrix against brute force, in both orientations, plus the transpose law.
fn check_general_gram(num_procs: usize) -> Result<()> {
    let rows = random_vecs(7, 6, 1);
    let cols = random_vecs(4, 6, 2);
    let (row_handles, col_handles) = (in_memory(&rows), in_memory(&cols));
    let expected = brute_force_gram(&rows, &cols);

    let results = LocalWorld::run(num_procs, 1, |comm| {
        let ops = ops(comm, &tight_config(3, num_procs));
        let m = ops.compute_inner_product_mat(&row_handles, &col_handles, None)?;
        let m_swapped = ops.compute_inner_product_mat(&col_handles, &row_handles, None)?;
        Ok::<_, anyhow::Error>((m, m_swapped))
    })?;

    for result in results {
        let (m, m_swapped) = result?;
        ensure!((m.nrows(), m.ncols()) == (7, 4), "Wrong shape");
        let err = (&m - &expected).norm_l2();
        ensure!(err < TOLERANCE, "General Gram error too high: {}", err);
        ensure!(
            m_swapped.transpose().to_owned() == m,
            "Swapping the inputs did not transpose the result"
        );
    }
    Ok(())
}

/// Symmetric Gram matrix against brute force, with several row chunks.
fn check_symmetric_gram(num_procs: usize) -> Result<()> {
    let vecs = random_vecs(11, 5, 3);
    let handles = in_memory(&vecs);
    let expected = brute_force_gram(&vecs, &vecs);

    let results = LocalWorld::run(num_procs, 1, |comm| {
        let ops = ops(comm, &tight_config(2, num_procs));
        ops.compute_symmetric_inner_product_mat(&handles, None)
    })?;

    for result in results {
        let m = result?;
        let err = (&m - &expected).norm_l2();
        ensure!(err < TOLERANCE, "Symmetric Gram error too high: {}", err);
        ensure!(m.transpose().to_owned() == m, "Result is not exactly symmetric");
    }
    Ok(())
}

/// Linear combination against term-by-term accumulation.
fn check_lin_combine(num_procs: usize) -> Result<()> {
    let num_bases = 6;
    let num_sums = 5;
    let bases = random_vecs(num_bases, 8, 4);
    let basis_handles = in_memory(&bases);
    let mut rng = StdRng::seed_from_u64(5);
    let coeff = Mat::from_fn(num_bases, num_sums, |_, _| rng.random_range(-2.0..2.0));

    let expected: Vec<Mat<f64>> = (0..num_sums)
        .map(|k| brute_force_combination(&bases, &coeff, k))
        .collect();

    let results = LocalWorld::run(num_procs, 1, |comm| {
        let sums: Vec<InMemoryHandle<Mat<f64>>> =
            (0..num_sums).map(|_| InMemoryHandle::empty()).collect();
        let ops = ops(comm, &tight_config(2, num_procs));
        ops.lin_combine(&sums, &basis_handles, coeff.as_ref(), None)
    })?;

    for result in results {
        let receipts = result?;
        ensure!(receipts.len() == num_sums, "Wrong number of receipts");
        for k in 0..num_sums {
            let err = (&receipts[k] - &expected[k]).norm_l2();
            ensure!(err < TOLERANCE, "Sum {} error too high: {}", k, err);
        }
    }
    Ok(())
}

/// Results are bit-identical across workers, across calls, and to the single-worker run.
fn check_determinism(num_procs: usize) -> Result<()> {
    let vecs = random_vecs(6, 4, 6);
    let handles = in_memory(&vecs);

    let reference = LocalWorld::run(1, 1, |comm| {
        let ops = ops(comm, &tight_config(2, 1));
        ops.compute_inner_product_mat(&handles[..3], &handles, None)
    })?
    .remove(0)?;

    let results = LocalWorld::run(num_procs, 1, |comm| {
        let ops = ops(comm, &tight_config(2, num_procs));
        let first = ops.compute_inner_product_mat(&handles[..3], &handles, None)?;
        let second = ops.compute_inner_product_mat(&handles[..3], &handles, None)?;
        Ok::<_, anyhow::Error>((first, second))
    })?;

    for result in results {
        let (first, second) = result?;
        ensure!(first == second, "Repeated calls differ");
        ensure!(first == reference, "Result depends on the number of workers");
    }
    Ok(())
}

/// A macro to generate one test per (check, worker count) pair.
macro_rules! generate_world_test {
    ($test_name:ident, $check:expr, $num_procs:expr) => {
        #[test]
        fn $test_name() -> Result<()> {
            let _ = env_logger::builder().is_test(true).try_init();
            $check($num_procs)
        }
    };
}

// --- Test Suite ---

generate_world_test!(test_general_gram_p1, check_general_gram, 1);
generate_world_test!(test_general_gram_p2, check_general_gram, 2);
generate_world_test!(test_general_gram_p3, check_general_gram, 3);
generate_world_test!(test_general_gram_p5, check_general_gram, 5);

generate_world_test!(test_symmetric_gram_p1, check_symmetric_gram, 1);
generate_world_test!(test_symmetric_gram_p2, check_symmetric_gram, 2);
generate_world_test!(test_symmetric_gram_p3, check_symmetric_gram, 3);
generate_world_test!(test_symmetric_gram_p5, check_symmetric_gram, 5);

generate_world_test!(test_lin_combine_p1, check_lin_combine, 1);
generate_world_test!(test_lin_combine_p2, check_lin_combine, 2);
generate_world_test!(test_lin_combine_p3, check_lin_combine, 3);
generate_world_test!(test_lin_combine_p5, check_lin_combine, 5);

generate_world_test!(test_determinism_p1, check_determinism, 1);
generate_world_test!(test_determinism_p2, check_determinism, 2);
generate_world_test!(test_determinism_p3, check_determinism, 3);
generate_world_test!(test_determinism_p5, check_determinism, 5);

// --- Scenarios ---

#[test]
fn test_three_vectors_two_workers() -> Result<()> {
    let vecs = vec![
        Mat::from_fn(4, 1, |i, _| (i + 1) as f64),
        Mat::from_fn(4, 1, |i, _| if i % 2 == 0 { 1.0 } else { -1.0 }),
        Mat::from_fn(4, 1, |i, _| 0.5 * i as f64 - 0.25),
    ];
    let handles = in_memory(&vecs);
    let expected = brute_force_gram(&vecs, &vecs);

    let results = LocalWorld::run(2, 1, |comm| {
        let ops = ops(comm, &VecOpsConfig::default().quiet());
        ops.compute_symmetric_inner_product_mat(&handles, None)
    })?;
    for result in results {
        let m = result?;
        ensure!((m.nrows(), m.ncols()) == (3, 3), "Wrong shape");
        for i in 0..3 {
            for j in 0..3 {
                let err = (m[(i, j)] - expected[(i, j)]).abs();
                ensure!(err < TOLERANCE, "Cell ({}, {}) off by {}", i, j, err);
            }
        }
    }
    Ok(())
}

#[test]
fn test_quota_too_low_falls_back_to_two_per_worker() -> Result<()> {
    let vecs = random_vecs(5, 3, 7);
    let handles = in_memory(&vecs);
    let expected = brute_force_gram(&vecs, &vecs);

    // One vector per node for three workers is below the minimum of two per worker.
    let config = VecOpsConfig::with_max_vecs_per_node(1);
    let results = LocalWorld::run(3, 1, |comm| {
        let rank = comm.rank();
        let ops = ops(comm, &config);
        let budget = *ops.budget();
        let warnings = ops.configuration_warnings();
        let m = ops.compute_symmetric_inner_product_mat(&handles, None)?;
        Ok::<_, anyhow::Error>((rank, budget, warnings, m))
    })?;
    for result in results {
        let (rank, budget, warnings, m) = result?;
        ensure!(budget.clamped, "Quota was not flagged as clamped");
        ensure!(budget.max_vecs_per_proc == 2, "Quota did not fall back to 2");
        if rank == 0 {
            ensure!(
                warnings.len() == 1 && warnings[0].contains("is too small for 3 procs on 1 nodes"),
                "Rank 0 did not warn about the clamped quota: {:?}",
                warnings
            );
        } else {
            ensure!(warnings.is_empty(), "Rank {} warned: {:?}", rank, warnings);
        }
        let err = (&m - &expected).norm_l2();
        ensure!(err < TOLERANCE, "Wrong result with minimal quota: {}", err);
    }

    // A quiet run clamps the same way without warning.
    let quiet = LocalWorld::run(3, 1, |comm| {
        ops(comm, &config.clone().quiet()).configuration_warnings()
    })?;
    ensure!(quiet.iter().all(Vec::is_empty), "Quiet run warned: {:?}", quiet);
    Ok(())
}

#[test]
fn test_too_few_coefficient_columns_fails_before_any_retrieval() -> Result<()> {
    let bases: Vec<_> = in_memory(&random_vecs(3, 2, 8))
        .into_iter()
        .map(CountingHandle::new)
        .collect();
    let coeff = Mat::<f64>::zeros(3, 2);

    let results = LocalWorld::run(3, 1, |comm| {
        let sums: Vec<InMemoryHandle<Mat<f64>>> =
            (0..3).map(|_| InMemoryHandle::empty()).collect();
        let ops = ops(comm, &VecOpsConfig::default().quiet());
        ops.lin_combine(&sums, &bases, coeff.as_ref(), None)
    })?;
    for result in results {
        let err = result.err().ok_or_else(|| anyhow::anyhow!("Expected a shape error"))?;
        ensure!(err.is_shape(), "Unexpected error: {}", err);
        ensure!(
            err.kind() == &VecOpsErrorKind::CoefficientCols { cols: 2, sums: 3 },
            "Unexpected error: {}",
            err
        );
    }
    ensure!(bases.iter().all(|h| h.gets() == 0), "A basis vector was retrieved");
    Ok(())
}

#[test]
fn test_missing_inner_product_is_reported_on_every_worker() -> Result<()> {
    let handles = in_memory(&random_vecs(2, 2, 9));
    let results = LocalWorld::run(2, 1, |comm| {
        let ops: Ops = VecOperations::new(comm, None, &VecOpsConfig::default().quiet()).unwrap();
        ops.compute_inner_product_mat(&handles, &handles, None)
    })?;
    for result in results {
        let err = result.err().ok_or_else(|| anyhow::anyhow!("Expected an error"))?;
        ensure!(err.is_configuration(), "Unexpected error: {}", err);
    }
    Ok(())
}

#[test]
fn test_complex_gram_is_hermitian() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(10);
    let vecs: Vec<Mat<c64>> = (0..7)
        .map(|_| {
            Mat::from_fn(3, 1, |_, _| {
                c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5)
            })
        })
        .collect();
    let handles: Vec<InMemoryHandle<Mat<c64>>> =
        vecs.iter().cloned().map(InMemoryHandle::new).collect();

    let results = LocalWorld::run(3, 1, |comm| {
        let ops = VecOperations::new(
            comm,
            Some(euclidean::<c64>()),
            &VecOpsConfig::with_max_vecs_per_node(6).quiet(),
        )?;
        let sym = ops.compute_symmetric_inner_product_mat(&handles, None)?;
        let general = ops.compute_inner_product_mat(&handles[..2], &handles, None)?;
        Ok::<_, anyhow::Error>((sym, general))
    })?;

    for result in results {
        let (sym, general) = result?;
        for i in 0..7 {
            for j in 0..7 {
                let expected = euclidean_inner_product(&vecs[i], &vecs[j]);
                ensure!((sym[(i, j)] - expected).norm() < TOLERANCE, "Cell ({}, {})", i, j);
                ensure!(sym[(i, j)] == sym[(j, i)].conj(), "Not Hermitian at ({}, {})", i, j);
                if i < 2 {
                    ensure!(general[(i, j)] == expected, "General cell ({}, {})", i, j);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_basis_retrieval_count_follows_sum_chunks() -> Result<()> {
    let bases: Vec<_> = in_memory(&random_vecs(4, 3, 11))
        .into_iter()
        .map(CountingHandle::new)
        .collect();
    let coeff = Mat::from_fn(4, 6, |i, j| (i * j) as f64);

    // Two workers with two slots each: one resident sum per worker, three sums per worker.
    let results = LocalWorld::run(2, 1, |comm| {
        ops(comm, &tight_config(2, 2)).lin_combine_and_return(&bases, coeff.as_ref(), None)
    })?;
    for result in results {
        ensure!(result?.len() == 6, "Wrong number of outputs");
    }
    ensure!(
        bases.iter().all(|h| h.gets() == 3),
        "Basis vectors should be retrieved once per sum chunk"
    );
    ensure!(bases.iter().all(|h| h.puts() == 0), "Basis vectors were overwritten");
    Ok(())
}

#[test]
fn test_compute_modes_across_workers() -> Result<()> {
    let vecs = random_vecs(4, 5, 12);
    let handles = in_memory(&vecs);
    let coeff = Mat::from_fn(4, 3, |i, j| (i + 2 * j) as f64 - 1.5);

    let results = LocalWorld::run(3, 1, |comm| {
        let ops = ops(comm, &VecOpsConfig::default().quiet());
        ops.sanity_check(&handles[0])?;
        let modes = ops.compute_modes_and_return(&[2, 0], &handles, coeff.as_ref(), 0, None)?;
        Ok::<_, anyhow::Error>(modes)
    })?;

    for result in results {
        let modes = result?;
        ensure!(modes.len() == 2, "Wrong number of modes");
        for (mode, &col) in modes.iter().zip(&[2usize, 0]) {
            let expected = brute_force_combination(&vecs, &coeff, col);
            ensure!((mode - &expected).norm_l2() < TOLERANCE, "Mode {} is wrong", col);
        }
    }
    Ok(())
}

#[test]
fn test_world_topology_is_visible_to_workers() -> Result<()> {
    let ranks = LocalWorld::run(4, 2, |comm| (comm.rank(), comm.num_procs(), comm.num_nodes()))?;
    ensure!(
        ranks == vec![(0, 4, 2), (1, 4, 2), (2, 4, 2), (3, 4, 2)],
        "Unexpected topology: {:?}",
        ranks
    );
    Ok(())
}
