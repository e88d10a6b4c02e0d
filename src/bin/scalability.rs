//! Experiment Runner for the Scalability Analysis.
//!
//! This executable measures how the three collective operations (general Gram matrix,
//! symmetric Gram matrix, linear combination) behave as the number of workers grows. It
//! builds one set of random dense vectors, computes a single-worker reference result for
//! each operation, and then re-runs every operation in an in-process world of `P` workers
//! for each requested `P`.
//!
//! Every run is checked against the reference; the largest absolute deviation is recorded
//! next to the wall-clock time and the number of `get`/`put` calls made on the handles,
//! which shows the effect of the memory quota on redundant retrievals. One CSV row is
//! written and flushed per (operation, worker count), so partial results survive a failed
//! run.

use anyhow::{Context, Result, anyhow, ensure};
use clap::{Parser, ValueEnum};
use faer::Mat;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Instant};
use vecops_project::{
    ProgressReporter, VecOperations, VecOpsConfig, VecOpsError,
    comm::LocalWorld,
    handles::{CountingHandle, InMemoryHandle},
    vector::euclidean,
};

type Handle = CountingHandle<InMemoryHandle<Mat<f64>>>;

/// The collective operation measured by a run.
#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "kebab-case")]
enum Operation {
    Gram,
    SymmetricGram,
    LinCombine,
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[clap(
    name = "scalability-runner",
    about = "Runs the scalability analysis for the distributed vector operations."
)]
struct ScalabilityArgs {
    /// Number of vectors in the collection.
    #[clap(long, default_value_t = 64)]
    num_vecs: usize,
    /// Dimension of every vector.
    #[clap(long, default_value_t = 10_000)]
    dim: usize,
    /// Comma-separated list of worker counts to sweep.
    #[clap(long, value_delimiter = ',', default_values_t = vec![1, 2, 4, 8])]
    procs: Vec<usize>,
    /// Number of nodes the workers are spread across.
    #[clap(long, default_value_t = 1)]
    nodes: usize,
    /// Maximum number of vectors resident at once on one node.
    #[clap(long)]
    max_vecs_per_node: Option<usize>,
    /// Operations to run.
    #[clap(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = vec![Operation::Gram, Operation::SymmetricGram, Operation::LinCombine]
    )]
    operations: Vec<Operation>,
    /// Seed for the random vectors and coefficients.
    #[clap(long, default_value_t = 42)]
    seed: u64,
    /// Log warnings and progress from the reporting worker.
    #[clap(long)]
    verbose: bool,
    /// Path to the output CSV file.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data in the output CSV.
#[derive(Debug, Serialize, Deserialize)]
struct ScalabilityResult {
    operation: Operation,
    num_procs: usize,
    num_nodes: usize,
    num_vecs: usize,
    dim: usize,
    max_vecs_per_proc: usize,
    time_s: f64,
    gets: usize,
    puts: usize,
    max_abs_diff: f64,
}

/// What an operation hands back on every worker.
#[derive(Debug)]
enum Output {
    Matrix(Mat<f64>),
    Vectors(Vec<Mat<f64>>),
}

/// The inputs shared by every run.
struct Problem {
    vecs: Vec<InMemoryHandle<Mat<f64>>>,
    coeff: Mat<f64>,
}

impl Problem {
    fn random(num_vecs: usize, dim: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vecs = (0..num_vecs)
            .map(|_| {
                let entries: Vec<f64> = (0..dim).map(|_| rng.random::<f64>() - 0.5).collect();
                InMemoryHandle::new(Mat::from_fn(dim, 1, |i, _| entries[i]))
            })
            .collect();
        let num_sums = num_vecs.div_ceil(2);
        let entries: Vec<f64> = (0..num_vecs * num_sums)
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();
        let coeff = Mat::from_fn(num_vecs, num_sums, |i, j| entries[i + j * num_vecs]);
        Self { vecs, coeff }
    }

    /// Fresh counting handles over the same vectors.
    fn counted(&self) -> Vec<Handle> {
        self.vecs.iter().cloned().map(CountingHandle::new).collect()
    }
}

/// Runs `operation` on `num_procs` workers and returns rank 0's output.
fn run_operation(
    operation: Operation,
    problem: &Problem,
    handles: &[Handle],
    num_procs: usize,
    num_nodes: usize,
    config: &VecOpsConfig,
) -> Result<(Output, usize)> {
    let outputs = LocalWorld::run(num_procs, num_nodes, |comm| -> Result<_, VecOpsError> {
        let ops = VecOperations::new(comm, Some(euclidean::<f64>()), config)?;
        let mut reporter = ProgressReporter::default();
        let output = match operation {
            Operation::Gram => {
                let rows = &handles[..handles.len().div_ceil(2)];
                Output::Matrix(ops.compute_inner_product_mat(rows, handles, Some(&mut reporter))?)
            }
            Operation::SymmetricGram => Output::Matrix(
                ops.compute_symmetric_inner_product_mat(handles, Some(&mut reporter))?,
            ),
            Operation::LinCombine => Output::Vectors(ops.lin_combine_and_return(
                handles,
                problem.coeff.as_ref(),
                Some(&mut reporter),
            )?),
        };
        Ok((output, ops.max_vecs_per_proc()))
    })?;

    outputs
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("The world has no workers."))?
        .with_context(|| format!("{operation:?} failed on {num_procs} workers"))
}

/// Largest absolute entry-wise difference between two outputs of the same operation.
fn max_abs_diff(a: &Output, b: &Output) -> Result<f64> {
    let mat_diff = |x: &Mat<f64>, y: &Mat<f64>| -> Result<f64> {
        ensure!(
            (x.nrows(), x.ncols()) == (y.nrows(), y.ncols()),
            "Output shapes differ: {}x{} vs {}x{}",
            x.nrows(),
            x.ncols(),
            y.nrows(),
            y.ncols()
        );
        let mut max = 0.0_f64;
        for j in 0..x.ncols() {
            for i in 0..x.nrows() {
                max = max.max((x[(i, j)] - y[(i, j)]).abs());
            }
        }
        Ok(max)
    };

    match (a, b) {
        (Output::Matrix(x), Output::Matrix(y)) => mat_diff(x, y),
        (Output::Vectors(xs), Output::Vectors(ys)) => {
            ensure!(xs.len() == ys.len(), "Different number of output vectors");
            xs.iter()
                .zip(ys)
                .try_fold(0.0_f64, |max, (x, y)| Ok(max.max(mat_diff(x, y)?)))
        }
        _ => Err(anyhow!("Outputs of different kinds cannot be compared")),
    }
}

/// Main entry point.
fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    let args = ScalabilityArgs::parse();
    ensure!(args.num_vecs > 0, "--num-vecs must be positive");
    log::info!(
        "Starting scalability experiment: {} vectors of dimension {}",
        args.num_vecs,
        args.dim
    );

    let problem = Problem::random(args.num_vecs, args.dim, args.seed);
    let config = VecOpsConfig {
        max_vecs_per_node: args.max_vecs_per_node,
        verbose: args.verbose,
    };

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create CSV writer for {:?}", &args.output))?;

    for &operation in &args.operations {
        log::info!("Computing single-worker reference for {operation:?}...");
        let (reference, _) =
            run_operation(operation, &problem, &problem.counted(), 1, 1, &config)?;

        for &num_procs in &args.procs {
            if num_procs == 0 || args.nodes > num_procs {
                log::error!(
                    "Cannot run {num_procs} workers on {} nodes. Skipping.",
                    args.nodes
                );
                continue;
            }

            let handles = problem.counted();
            let start_time = Instant::now();
            let (output, max_vecs_per_proc) =
                run_operation(operation, &problem, &handles, num_procs, args.nodes, &config)?;
            let time_s = start_time.elapsed().as_secs_f64();

            let record = ScalabilityResult {
                operation,
                num_procs,
                num_nodes: args.nodes,
                num_vecs: args.num_vecs,
                dim: args.dim,
                max_vecs_per_proc,
                time_s,
                gets: handles.iter().map(CountingHandle::gets).sum(),
                puts: handles.iter().map(CountingHandle::puts).sum(),
                max_abs_diff: max_abs_diff(&reference, &output)?,
            };
            log::info!(
                "{:?} on {} workers: time={:.3}s, gets={}, diff={:.2e}",
                record.operation,
                record.num_procs,
                record.time_s,
                record.gets,
                record.max_abs_diff
            );
            writer.serialize(&record)?;
            writer.flush()?;
        }
    }

    log::info!(
        "Scalability experiment complete. Results saved to {:?}.",
        &args.output
    );
    Ok(())
}
