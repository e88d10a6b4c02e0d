//! This module provides the high-level API: a [`VecOperations`] instance bound to one
//! process's communicator, with the memory quota fixed at construction.
//!
//! All methods are collective. Every process of the computation constructs its own instance
//! with the same configuration and calls the same methods with the same handle lists, and
//! every process receives the complete result.

use crate::{
    algorithms::{ProcContext, gram, lin_combine, symmetric},
    comm::Communicator,
    config::{MemoryBudget, VecOpsConfig},
    error::{VecOpsError, VecOpsErrorKind},
    handles::InMemoryHandle,
    progress::ProgressReporter,
    vector::{InnerProductFn, VecHandle, Vector},
};
use faer::{
    Mat, MatRef,
    traits::{
        ComplexField, RealField,
        math_utils::{abs, from_f64, mul, sub},
    },
};

/// Tolerance of the vector-arithmetic sanity check, relative to the squared norm (or
/// absolute, for norms below one).
pub const SANITY_CHECK_TOLERANCE: f64 = 1e-10;

/// Distributed inner products and linear combinations over vectors behind handles.
///
/// # Type parameters
/// * `V`: The vector type, anything implementing [`Vector<T>`].
/// * `T`: The scalar type of inner products and coefficients (`f64`, `c64`, ...).
/// * `C`: The [`Communicator`] of this process.
pub struct VecOperations<V, T, C> {
    comm: C,
    inner_product: Option<InnerProductFn<V, T>>,
    budget: MemoryBudget,
    verbose: bool,
}

impl<V, T, C> VecOperations<V, T, C>
where
    V: Vector<T>,
    T: ComplexField + Send + 'static,
    T::Real: RealField,
    Mat<T>: Clone,
    C: Communicator,
{
    /// Creates an instance for this process.
    ///
    /// The inner product may be omitted if only linear combinations are needed; the Gram
    /// methods then fail with a configuration error.
    ///
    /// # Errors
    /// Returns a configuration error if the communicator's topology is unusable.
    pub fn new(
        comm: C,
        inner_product: Option<InnerProductFn<V, T>>,
        config: &VecOpsConfig,
    ) -> Result<Self, VecOpsError> {
        let budget =
            MemoryBudget::resolve(config.max_vecs_per_node, comm.num_procs(), comm.num_nodes())?;

        log::debug!(
            "rank {}: {} vecs per proc ({} procs, {} nodes)",
            comm.rank(),
            budget.max_vecs_per_proc,
            comm.num_procs(),
            comm.num_nodes()
        );

        let ops = Self {
            comm,
            inner_product,
            budget,
            verbose: config.verbose,
        };
        for warning in ops.configuration_warnings() {
            log::warn!("{warning}");
        }
        Ok(ops)
    }

    /// The budget warnings this process emits at construction: those of
    /// [`MemoryBudget::warnings`] on the verbose reporting process, none elsewhere.
    pub fn configuration_warnings(&self) -> Vec<String> {
        if !self.ctx().announce() {
            return Vec::new();
        }
        self.budget.warnings(self.comm.num_procs(), self.comm.num_nodes())
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn max_vecs_per_proc(&self) -> usize {
        self.budget.max_vecs_per_proc
    }

    pub fn max_vecs_per_node(&self) -> usize {
        self.budget.max_vecs_per_node
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn has_inner_product(&self) -> bool {
        self.inner_product.is_some()
    }

    fn ctx(&self) -> ProcContext<'_, C> {
        ProcContext::new(&self.comm, self.budget.max_vecs_per_proc, self.verbose)
    }

    fn require_inner_product(&self) -> Result<&InnerProductFn<V, T>, VecOpsError> {
        self.inner_product
            .as_ref()
            .ok_or_else(|| VecOpsErrorKind::MissingInnerProduct.into())
    }

    /// Checks the vector arithmetic of `V` against the inner product on one vector.
    ///
    /// With `v` retrieved from `handle`, verifies that `2v`, `v + v` and `2v + v` have the
    /// squared norms `4|v|²`, `4|v|²` and `9|v|²`, and that `v` itself is unchanged by each
    /// operation. This does not prove the implementation correct, but it catches the
    /// common mistakes.
    ///
    /// # Errors
    /// * [`VecOpsErrorKind::MissingInnerProduct`] if no inner product is configured.
    /// * [`VecOpsErrorKind::SanityCheck`] naming the first failed check.
    pub fn sanity_check<H: VecHandle<V>>(&self, handle: &H) -> Result<(), VecOpsError> {
        let inner_product = self.require_inner_product()?;
        let vec = handle.get()?;
        let pristine = vec.clone();
        let norm2 = inner_product(&pristine, &pristine);
        let tolerance: T::Real = from_f64(SANITY_CHECK_TOLERANCE);

        let check = |value: T, factor: f64, failure: &str| -> Result<(), VecOpsError> {
            let expected = mul(&norm2, &from_f64::<T>(factor * factor));
            let error = abs(&sub(&value, &expected));
            let scaled = mul(&tolerance, &abs(&expected));
            if error > tolerance && error > scaled {
                return Err(VecOpsErrorKind::SanityCheck(failure.to_string()).into());
            }
            Ok(())
        };

        let two: T = from_f64(2.0);

        let doubled = vec.scale(&two);
        check(
            inner_product(&doubled, &doubled),
            2.0,
            "multiplication by a scalar is inconsistent with the inner product",
        )?;
        check(
            inner_product(&vec, &vec),
            1.0,
            "the original vector was modified by multiplication",
        )?;

        let mut added = vec.clone();
        added.accumulate(&vec);
        check(
            inner_product(&added, &added),
            2.0,
            "addition is inconsistent with the inner product",
        )?;
        check(
            inner_product(&vec, &vec),
            1.0,
            "the original vector was modified by addition",
        )?;

        let mut combined = vec.scale(&two);
        combined.accumulate(&vec);
        check(
            inner_product(&combined, &combined),
            3.0,
            "multiplication and addition are inconsistent",
        )?;
        check(
            inner_product(&vec, &vec),
            1.0,
            "the original vector was modified by combined multiplication and addition",
        )?;

        if self.ctx().announce() {
            log::info!("Passed the vector sanity check");
        }
        Ok(())
    }

    /// Computes the matrix of inner products `M[i, j] = <row_i, col_j>`.
    ///
    /// Each process holds at most `max_vecs_per_proc` vectors at once. Internally the smaller
    /// of the two collections is held resident and the larger one is streamed, which
    /// minimizes the number of retrievals; the result is always `rows x cols`.
    ///
    /// # Errors
    /// * [`VecOpsErrorKind::MissingInnerProduct`] if no inner product is configured.
    /// * [`VecOpsErrorKind::EmptyInput`] if either handle list is empty.
    /// * Any retrieval error raised by a handle.
    pub fn compute_inner_product_mat<R, Q>(
        &self,
        row_handles: &[R],
        col_handles: &[Q],
        progress: Option<&mut ProgressReporter>,
    ) -> Result<Mat<T>, VecOpsError>
    where
        R: VecHandle<V>,
        Q: VecHandle<V>,
    {
        let inner_product = self.require_inner_product()?;
        gram::inner_product_mat(
            self.ctx(),
            row_handles,
            col_handles,
            |a: &V, b: &V| inner_product(a, b),
            progress,
        )
    }

    /// Computes the Hermitian Gram matrix `M[i, j] = <v_i, v_j>` of one collection.
    ///
    /// Only the `N (N + 1) / 2` upper-triangle entries are evaluated. The inner product must
    /// be Hermitian (symmetric for real scalars).
    ///
    /// # Errors
    /// Same as [`Self::compute_inner_product_mat`].
    pub fn compute_symmetric_inner_product_mat<H: VecHandle<V>>(
        &self,
        handles: &[H],
        progress: Option<&mut ProgressReporter>,
    ) -> Result<Mat<T>, VecOpsError> {
        let inner_product = self.require_inner_product()?;
        symmetric::symmetric_inner_product_mat(
            self.ctx(),
            handles,
            |a: &V, b: &V| inner_product(a, b),
            progress,
        )
    }

    /// Linearly combines the basis and stores the results.
    ///
    /// The `k`-th sum is `Σ_b coeff_mat[b, k] * basis_b` and is `put` through
    /// `sum_handles[k]`. Extra rows or columns of `coeff_mat` are ignored with a warning.
    ///
    /// # Returns
    /// The receipts of all `put` calls, ordered like `sum_handles`, on every process.
    ///
    /// # Errors
    /// * [`VecOpsErrorKind::CoefficientRows`] / [`VecOpsErrorKind::CoefficientCols`] if
    ///   `coeff_mat` is too small, raised before any vector is retrieved.
    /// * [`VecOpsErrorKind::EmptyInput`] if `basis_handles` is empty.
    /// * Any retrieval or storage error raised by a handle.
    pub fn lin_combine<S, B>(
        &self,
        sum_handles: &[S],
        basis_handles: &[B],
        coeff_mat: MatRef<'_, T>,
        progress: Option<&mut ProgressReporter>,
    ) -> Result<Vec<S::Receipt>, VecOpsError>
    where
        S: VecHandle<V>,
        B: VecHandle<V>,
    {
        lin_combine::lin_combine(self.ctx(), sum_handles, basis_handles, coeff_mat, progress)
    }

    /// Like [`Self::lin_combine`], but builds one sum per column of `coeff_mat` and returns
    /// the vectors themselves.
    pub fn lin_combine_and_return<B: VecHandle<V>>(
        &self,
        basis_handles: &[B],
        coeff_mat: MatRef<'_, T>,
        progress: Option<&mut ProgressReporter>,
    ) -> Result<Vec<V>, VecOpsError> {
        let sum_handles: Vec<InMemoryHandle<V>> = (0..coeff_mat.ncols())
            .map(|_| InMemoryHandle::empty())
            .collect();
        self.lin_combine(&sum_handles, basis_handles, coeff_mat, progress)
    }

    /// Computes the modes numbered `mode_nums` and stores them through `mode_handles`.
    ///
    /// Mode `m` is the combination of `vec_handles` with column `m - index_from` of
    /// `coeff_mat`. Mode numbers need not be sorted; `mode_handles[k]` receives mode
    /// `mode_nums[k]`. If there are more destinations than mode numbers, the extra
    /// destinations are left untouched.
    ///
    /// # Errors
    /// * [`VecOpsErrorKind::TooManyModes`] if there are more mode numbers than vectors or
    ///   than destinations.
    /// * [`VecOpsErrorKind::ModeIndex`] if a mode number is below `index_from` or does not
    ///   address a column of `coeff_mat`.
    /// * Everything [`Self::lin_combine`] may return.
    pub fn compute_modes<S, B>(
        &self,
        mode_nums: &[usize],
        mode_handles: &[S],
        vec_handles: &[B],
        coeff_mat: MatRef<'_, T>,
        index_from: usize,
        progress: Option<&mut ProgressReporter>,
    ) -> Result<Vec<S::Receipt>, VecOpsError>
    where
        S: VecHandle<V>,
        B: VecHandle<V>,
    {
        let num_modes = mode_nums.len();
        if num_modes > vec_handles.len() {
            return Err(VecOpsErrorKind::TooManyModes {
                modes: num_modes,
                available: vec_handles.len(),
                what: "vectors",
            }
            .into());
        }
        if num_modes > mode_handles.len() {
            return Err(VecOpsErrorKind::TooManyModes {
                modes: num_modes,
                available: mode_handles.len(),
                what: "mode destinations",
            }
            .into());
        }
        if num_modes < mode_handles.len() && self.ctx().announce() {
            log::warn!(
                "Fewer mode numbers ({num_modes}) than mode destinations ({}); some mode \
                 destinations will not be used.",
                mode_handles.len()
            );
        }

        let cols = coeff_mat.ncols();
        let columns = mode_nums
            .iter()
            .map(|&mode_num| match mode_num.checked_sub(index_from) {
                Some(col) if col < cols => Ok(col),
                _ => Err(VecOpsError::from(VecOpsErrorKind::ModeIndex {
                    mode_num,
                    index_from,
                    cols,
                })),
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let reordered = Mat::from_fn(coeff_mat.nrows(), num_modes, |i, k| {
            T::copy_impl(&coeff_mat[(i, columns[k])])
        });
        let receipts = self.lin_combine(
            &mode_handles[..num_modes],
            vec_handles,
            reordered.as_ref(),
            progress,
        )?;
        self.comm.barrier()?;
        Ok(receipts)
    }

    /// Like [`Self::compute_modes`], but returns the modes themselves.
    pub fn compute_modes_and_return<B: VecHandle<V>>(
        &self,
        mode_nums: &[usize],
        vec_handles: &[B],
        coeff_mat: MatRef<'_, T>,
        index_from: usize,
        progress: Option<&mut ProgressReporter>,
    ) -> Result<Vec<V>, VecOpsError> {
        let mode_handles: Vec<InMemoryHandle<V>> =
            mode_nums.iter().map(|_| InMemoryHandle::empty()).collect();
        self.compute_modes(
            mode_nums,
            &mode_handles,
            vec_handles,
            coeff_mat,
            index_from,
            progress,
        )
    }
}
