//! Distributed, memory-bounded vector algebra over out-of-core vectors.
//!
//! This crate computes the three collective operations that model-reduction methods (POD,
//! DMD, BPOD and friends) spend most of their time in:
//!
//! - the **inner-product matrix** `M[i, j] = <row_i, col_j>` of two vector collections,
//! - the **symmetric (Hermitian) inner-product matrix** of one collection, evaluating only
//!   the upper triangle,
//! - **linear combinations** `sum_k = Σ_b coeff[b, k] * basis_b`, and the *modes* built on
//!   top of them.
//!
//! Vectors are opaque: the engine only scales, accumulates, and passes them to a
//! user-provided inner product (see [`vector`]). They live behind handles that load them
//! on demand, so the collections may be far larger than memory. Every process keeps at most
//! `max_vecs_per_proc` vectors resident, a quota derived once from a per-node budget (see
//! [`config`]).
//!
//! ## Execution Model
//!
//! All operations are SPMD: every process of a [`comm::Communicator`] calls the same method
//! with the same arguments. Work is split into contiguous, balanced blocks ([`partition`]),
//! vectors travel around a ring ([`algorithms::ring`]), and partial results are reduced so
//! that every process returns the identical result.
//!
//! ## Example Usage
//!
//! A single-process computation of a Gram matrix and a linear combination:
//!
//! ```rust
//! use faer::Mat;
//! use vecops_project::{
//!     VecOperations, VecOpsConfig, comm::SerialComm, handles::InMemoryHandle, vector::euclidean,
//! };
//!
//! let handles: Vec<_> = (0..3)
//!     .map(|k| InMemoryHandle::new(Mat::from_fn(4, 1, |i, _| (i + k) as f64)))
//!     .collect();
//!
//! let ops = VecOperations::new(
//!     SerialComm::new(),
//!     Some(euclidean::<f64>()),
//!     &VecOpsConfig::with_max_vecs_per_node(10).quiet(),
//! )?;
//!
//! let gram = ops.compute_symmetric_inner_product_mat(&handles, None)?;
//! assert_eq!(gram[(0, 1)], 0.0 * 1.0 + 1.0 * 2.0 + 2.0 * 3.0 + 3.0 * 4.0);
//!
//! let coeff = Mat::from_fn(3, 1, |_, _| 1.0);
//! let sums = ops.lin_combine_and_return(&handles, coeff.as_ref(), None)?;
//! assert_eq!(sums[0][(3, 0)], 3.0 + 4.0 + 5.0);
//! # Ok::<(), vecops_project::VecOpsError>(())
//! ```
//!
//! Multi-process runs use [`comm::LocalWorld`], which spawns one worker thread per rank.

pub mod algorithms;
pub mod comm;
pub mod config;
pub mod error;
pub mod handles;
pub mod partition;
pub mod progress;
pub mod vecops;
pub mod vector;

pub use config::{MemoryBudget, VecOpsConfig};
pub use error::{VecOpsError, VecOpsErrorKind};
pub use handles::{CountingHandle, InMemoryHandle};
pub use progress::ProgressReporter;
pub use vecops::VecOperations;
pub use vector::{InnerProductFn, VecHandle, Vector, euclidean};
