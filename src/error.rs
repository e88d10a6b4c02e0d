//! This module defines the custom error types for the library.
//!
//! Every failure the engine can surface is collected in a single enum,
//! [`VecOpsErrorKind`], wrapped by the public [`VecOpsError`] struct. The kinds map onto four
//! families:
//!
//! - **Configuration**: no inner product supplied, or an invalid topology/quota.
//! - **Shape**: coefficient matrices or handle lists whose sizes do not fit together.
//! - **I/O**: a vector handle failed to retrieve or store a vector.
//! - **Protocol**: the communication ring or the partitioner broke one of its invariants.
//!
//! Because all processes run in lock-step, these errors are raised synchronously on every
//! process that observes the same inputs. None of them is retried by the engine.
use thiserror::Error;

/// Represents all possible errors that can occur during a distributed vector operation.
#[derive(Error, Debug, Clone)]
#[error(transparent)]
pub struct VecOpsError(#[from] VecOpsErrorKind);

/// The distinct kinds of errors.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum VecOpsErrorKind {
    /// A Gram computation (or the sanity check) was requested without an inner product.
    #[error("No inner product function has been configured.")]
    MissingInnerProduct,

    /// The topology or memory configuration cannot be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The coefficient matrix has fewer rows than there are basis vectors.
    #[error("Coefficient matrix has fewer rows ({rows}) than basis handles ({bases}).")]
    CoefficientRows { rows: usize, bases: usize },

    /// The coefficient matrix has fewer columns than there are output handles.
    #[error("Coefficient matrix has fewer columns ({cols}) than sum handles ({sums}).")]
    CoefficientCols { cols: usize, sums: usize },

    /// More modes were requested than can be built or stored.
    #[error("Cannot compute {modes} modes: only {available} {what} available.")]
    TooManyModes {
        modes: usize,
        available: usize,
        what: &'static str,
    },

    /// A requested mode number does not address a column of the coefficient matrix.
    #[error("Mode number {mode_num} is invalid for index_from={index_from} and {cols} columns.")]
    ModeIndex {
        mode_num: usize,
        index_from: usize,
        cols: usize,
    },

    /// A handle list that must contain at least one entry was empty.
    #[error("The list of {0} handles is empty.")]
    EmptyInput(&'static str),

    /// A vector could not be materialized from its handle.
    #[error("Failed to retrieve vector: {0}")]
    Retrieval(String),

    /// A vector could not be persisted through its handle.
    #[error("Failed to store vector: {0}")]
    Storage(String),

    /// An internal consistency check of the partitioning or ring protocol failed.
    #[error("Protocol invariant violated: {0}")]
    ProtocolInvariant(String),

    /// A peer disconnected or the shared collective state was poisoned.
    #[error("Communication failure: {0}")]
    Communication(String),

    /// The user-supplied vector arithmetic is inconsistent with the inner product.
    #[error("Vector sanity check failed: {0}")]
    SanityCheck(String),
}

impl VecOpsError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> &VecOpsErrorKind {
        &self.0
    }

    /// Builds a retrieval error. Intended for [`crate::vector::VecHandle`] implementations.
    pub fn retrieval(reason: impl Into<String>) -> Self {
        VecOpsErrorKind::Retrieval(reason.into()).into()
    }

    /// Builds a storage error. Intended for [`crate::vector::VecHandle`] implementations.
    pub fn storage(reason: impl Into<String>) -> Self {
        VecOpsErrorKind::Storage(reason.into()).into()
    }

    /// Returns `true` for the configuration family of errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.0,
            VecOpsErrorKind::MissingInnerProduct | VecOpsErrorKind::InvalidConfig(_)
        )
    }

    /// Returns `true` for the shape family of errors.
    pub fn is_shape(&self) -> bool {
        matches!(
            self.0,
            VecOpsErrorKind::CoefficientRows { .. }
                | VecOpsErrorKind::CoefficientCols { .. }
                | VecOpsErrorKind::TooManyModes { .. }
                | VecOpsErrorKind::ModeIndex { .. }
                | VecOpsErrorKind::EmptyInput(_)
        )
    }
}

impl PartialEq for VecOpsError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
