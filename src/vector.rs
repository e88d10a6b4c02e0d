//! This module defines the contracts between the engine and the vectors it operates on.
//!
//! The engine never looks inside a vector. It only needs three capabilities:
//!
//! 1.  **Arithmetic**: a vector can be multiplied by a scalar ([`Scalable`]) and accumulated
//!     into another vector ([`Addable`]). Together with `Clone + Send` these form the
//!     [`Vector`] capability that every algorithm is generic over.
//! 2.  **Indirection**: vectors live behind a [`VecHandle`], which materializes a vector on
//!     [`VecHandle::get`] and persists one on [`VecHandle::put`]. Handles are what the caller
//!     passes in; the vectors themselves are loaded lazily, at most a quota at a time.
//! 3.  **Inner products**: an [`InnerProductFn`] maps two vectors to a scalar. It is shared
//!     across worker threads, hence the `Arc<dyn Fn + Send + Sync>` representation.
//!
//! Dense `faer` column vectors (`Mat<T>` with one column) implement the arithmetic
//! capabilities out of the box, and [`euclidean_inner_product`] provides the matching
//! inner product `Σ conj(a_i) b_i`.

use crate::error::VecOpsError;
use faer::{
    Mat,
    prelude::*,
    traits::{ComplexField, math_utils},
};
use std::sync::Arc;

/// A vector that can be multiplied by a scalar of type `T`.
pub trait Scalable<T> {
    /// Returns `alpha * self` without modifying `self`.
    fn scale(&self, alpha: &T) -> Self;
}

/// A vector that can be summed with another vector of the same type.
pub trait Addable {
    /// Performs `self += other` in place.
    fn accumulate(&mut self, other: &Self);
}

/// The capability every algorithm in this crate is generic over.
///
/// `Clone` is required because resident vectors are sent around the ring while their owner
/// keeps using them; `Send + 'static` because they cross worker boundaries.
pub trait Vector<T>: Scalable<T> + Addable + Clone + Send + 'static {}

impl<T, V> Vector<T> for V where V: Scalable<T> + Addable + Clone + Send + 'static {}

/// An opaque reference to a vector that may not be resident in memory.
///
/// Handles are immutable identifiers; the storage behind them is owned elsewhere. Every
/// worker holds its own copy of the handle list and only calls `get`/`put` on the indices
/// assigned to it.
pub trait VecHandle<V> {
    /// Whatever the storage backend hands back after a successful `put`.
    type Receipt: Clone + Send + 'static;

    /// Materializes the vector.
    ///
    /// # Errors
    /// Returns a retrieval error (see [`VecOpsError::retrieval`]) if the backing store is
    /// missing or corrupt.
    fn get(&self) -> Result<V, VecOpsError>;

    /// Persists `vec` and returns the backend's receipt.
    ///
    /// # Errors
    /// Returns a storage error (see [`VecOpsError::storage`]) if the write fails.
    fn put(&self, vec: V) -> Result<Self::Receipt, VecOpsError>;
}

impl<V, H: VecHandle<V> + ?Sized> VecHandle<V> for &H {
    type Receipt = H::Receipt;

    #[inline]
    fn get(&self) -> Result<V, VecOpsError> {
        (**self).get()
    }

    #[inline]
    fn put(&self, vec: V) -> Result<Self::Receipt, VecOpsError> {
        (**self).put(vec)
    }
}

/// A shareable inner product `(a, b) -> <a, b>`.
pub type InnerProductFn<V, T> = Arc<dyn Fn(&V, &V) -> T + Send + Sync>;

/// Implementation of [`Scalable`] for `faer`'s owned dense matrix (`Mat`).
impl<T: ComplexField> Scalable<T> for Mat<T> {
    #[inline]
    fn scale(&self, alpha: &T) -> Self {
        self * Scale(T::copy_impl(alpha))
    }
}

/// Implementation of [`Addable`] for `faer`'s owned dense matrix (`Mat`).
impl<T: ComplexField> Addable for Mat<T> {
    #[inline]
    fn accumulate(&mut self, other: &Self) {
        assert_eq!(
            (self.nrows(), self.ncols()),
            (other.nrows(), other.ncols()),
            "Dimension mismatch: cannot accumulate a {}x{} vector into a {}x{} vector.",
            other.nrows(),
            other.ncols(),
            self.nrows(),
            self.ncols(),
        );
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                self[(i, j)] = math_utils::add(&self[(i, j)], &other[(i, j)]);
            }
        }
    }
}

/// The Euclidean (Hermitian) inner product of two dense column vectors, `Σ conj(a_i) b_i`.
///
/// # Panics
/// Panics if the vectors do not have the same shape.
pub fn euclidean_inner_product<T: ComplexField>(a: &Mat<T>, b: &Mat<T>) -> T {
    assert_eq!(
        (a.nrows(), a.ncols()),
        (b.nrows(), b.ncols()),
        "Dimension mismatch: inner product of a {}x{} and a {}x{} vector.",
        a.nrows(),
        a.ncols(),
        b.nrows(),
        b.ncols(),
    );
    let mut acc = T::zero_impl();
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            let term = math_utils::mul(&T::conj_impl(&a[(i, j)]), &b[(i, j)]);
            acc = math_utils::add(&acc, &term);
        }
    }
    acc
}

/// Wraps [`euclidean_inner_product`] as a shareable [`InnerProductFn`].
pub fn euclidean<T: ComplexField + Send + Sync + 'static>() -> InnerProductFn<Mat<T>, T> {
    Arc::new(|a: &Mat<T>, b: &Mat<T>| euclidean_inner_product(a, b))
}
