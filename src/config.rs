//! Construction-time configuration and the memory-budget translation.
//!
//! The caller describes memory in *vectors per node*; the engine works in *vectors per
//! process*. [`MemoryBudget::resolve`] performs that translation once, when a
//! [`crate::VecOperations`] is built, and the result stays fixed for the lifetime of the
//! instance.

use crate::error::{VecOpsError, VecOpsErrorKind};
use serde::{Deserialize, Serialize};

/// Per-node budget assumed when the caller does not provide one.
pub const DEFAULT_MAX_VECS_PER_NODE: usize = 1_000_000;

/// Smallest usable per-process quota: one slot for the vector travelling around the ring
/// and at least one for the vectors it is combined with.
pub const MIN_VECS_PER_PROC: usize = 2;

/// User-facing configuration of a [`crate::VecOperations`] instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VecOpsConfig {
    /// Maximum number of vectors that may be resident at once on one node.
    /// `None` means "effectively unbounded" (see [`DEFAULT_MAX_VECS_PER_NODE`]).
    pub max_vecs_per_node: Option<usize>,
    /// Enables warnings, the time estimate and progress reporting on rank 0.
    pub verbose: bool,
}

impl Default for VecOpsConfig {
    fn default() -> Self {
        Self {
            max_vecs_per_node: None,
            verbose: true,
        }
    }
}

impl VecOpsConfig {
    pub fn with_max_vecs_per_node(max_vecs_per_node: usize) -> Self {
        Self {
            max_vecs_per_node: Some(max_vecs_per_node),
            ..Self::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }
}

/// The per-process quota derived from a per-node budget and the process topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryBudget {
    pub max_vecs_per_node: usize,
    pub max_vecs_per_proc: usize,
    /// No per-node budget was given and [`DEFAULT_MAX_VECS_PER_NODE`] was assumed.
    pub assumed_unbounded: bool,
    /// The per-node budget was too small and the quota fell back to [`MIN_VECS_PER_PROC`].
    pub clamped: bool,
}

impl MemoryBudget {
    /// Translates a per-node budget into a per-process quota.
    ///
    /// The quota is `max_vecs_per_node * num_nodes / num_procs`, unless that would leave a
    /// process with fewer than [`MIN_VECS_PER_PROC`] slots, in which case it is clamped to
    /// the minimum.
    ///
    /// # Errors
    /// Returns a configuration error if `num_procs` or `num_nodes` is zero, or if there are
    /// more nodes than processes.
    pub fn resolve(
        max_vecs_per_node: Option<usize>,
        num_procs: usize,
        num_nodes: usize,
    ) -> Result<Self, VecOpsError> {
        if num_procs == 0 || num_nodes == 0 {
            return Err(VecOpsErrorKind::InvalidConfig(format!(
                "num_procs ({num_procs}) and num_nodes ({num_nodes}) must both be positive"
            ))
            .into());
        }
        if num_nodes > num_procs {
            return Err(VecOpsErrorKind::InvalidConfig(format!(
                "num_nodes ({num_nodes}) exceeds num_procs ({num_procs})"
            ))
            .into());
        }

        let assumed_unbounded = max_vecs_per_node.is_none();
        let max_vecs_per_node = max_vecs_per_node.unwrap_or(DEFAULT_MAX_VECS_PER_NODE);

        let total = max_vecs_per_node.saturating_mul(num_nodes);
        let clamped = total < MIN_VECS_PER_PROC * num_procs;
        let max_vecs_per_proc = if clamped {
            MIN_VECS_PER_PROC
        } else {
            total / num_procs
        };

        Ok(Self {
            max_vecs_per_node,
            max_vecs_per_proc,
            assumed_unbounded,
            clamped,
        })
    }

    /// The user-facing warnings this budget calls for, for a world of `num_procs` processes
    /// on `num_nodes` nodes. Empty when the budget was used as given.
    pub fn warnings(&self, num_procs: usize, num_nodes: usize) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.assumed_unbounded {
            warnings.push(format!(
                "max_vecs_per_node was not specified. Assuming {DEFAULT_MAX_VECS_PER_NODE} vecs \
                 can be in memory per node. Decrease max_vecs_per_node if memory runs out."
            ));
        }
        if self.clamped {
            warnings.push(format!(
                "max_vecs_per_node ({}) is too small for {num_procs} procs on {num_nodes} nodes. \
                 Assuming {MIN_VECS_PER_PROC} vecs can be in memory per proc. If possible, \
                 increase max_vecs_per_node for a speedup.",
                self.max_vecs_per_node
            ));
        }
        warnings
    }
}
