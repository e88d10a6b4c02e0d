//! Deterministic, balanced assignment of work items to workers.
//!
//! Items are dealt out in contiguous blocks, in rank order: with `n` items and `p` workers,
//! the first `n % p` workers receive `n / p + 1` items and the rest receive `n / p`. The
//! consequences the engines rely on are:
//!
//! - every item is assigned exactly once and block sizes differ by at most one;
//! - concatenating the blocks in rank order reproduces the original order;
//! - when there are fewer items than workers, the *first* ranks are the busy ones and the
//!   trailing ranks receive empty lists (never an error).

use crate::error::{VecOpsError, VecOpsErrorKind};
use std::ops::Range;

/// Assigns the items `0..n_items` to `n_workers` workers.
///
/// # Panics
/// Panics if `n_workers` is zero.
pub fn assign(n_items: usize, n_workers: usize) -> Vec<Vec<usize>> {
    assign_indices(0..n_items, n_workers)
}

/// Assigns the items of `items` (a range of global indices) to `n_workers` workers.
///
/// # Panics
/// Panics if `n_workers` is zero.
pub fn assign_indices(items: Range<usize>, n_workers: usize) -> Vec<Vec<usize>> {
    block_ranges(items, n_workers)
        .into_iter()
        .map(|block| block.collect())
        .collect()
}

fn block_ranges(items: Range<usize>, n_workers: usize) -> Vec<Range<usize>> {
    assert!(n_workers > 0, "Cannot assign items to zero workers.");
    let n_items = items.len();
    let base = n_items / n_workers;
    let extra = n_items % n_workers;

    let mut start = items.start;
    (0..n_workers)
        .map(|worker| {
            let len = base + usize::from(worker < extra);
            let block = start..start + len;
            start += len;
            block
        })
        .collect()
}

/// Converts an assignment into the contiguous range it must describe.
///
/// # Errors
/// Returns a protocol-invariant error if the indices are not consecutive; the chunked
/// retrieval in the engines is only correct for contiguous blocks.
pub fn contiguous_range(tasks: &[usize]) -> Result<Range<usize>, VecOpsError> {
    let Some(&first) = tasks.first() else {
        return Ok(0..0);
    };
    for (offset, &index) in tasks.iter().enumerate() {
        if index != first + offset {
            return Err(VecOpsErrorKind::ProtocolInvariant(format!(
                "assigned indices are not consecutive: expected {} at position {}, found {}",
                first + offset,
                offset,
                index
            ))
            .into());
        }
    }
    Ok(first..first + tasks.len())
}

/// Number of workers that received at least one item.
pub fn active_workers(assignment: &[Vec<usize>]) -> usize {
    assignment.iter().filter(|tasks| !tasks.is_empty()).count()
}

/// Size of the largest block in an assignment.
pub fn max_tasks(assignment: &[Vec<usize>]) -> usize {
    assignment.iter().map(Vec::len).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[test]
    fn test_assign_balanced_blocks() {
        assert_eq!(
            assign(7, 3),
            vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]
        );
        assert_eq!(assign(4, 2), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_fewer_items_than_workers_leaves_trailing_workers_empty() {
        let assignment = assign(2, 5);
        assert_eq!(assignment.len(), 5);
        assert_eq!(assignment[0], vec![0]);
        assert_eq!(assignment[1], vec![1]);
        assert!(assignment[2..].iter().all(Vec::is_empty));
        assert_eq!(active_workers(&assignment), 2);
        assert_eq!(max_tasks(&assignment), 1);
    }

    #[test]
    fn test_assign_indices_preserves_offset() {
        assert_eq!(assign_indices(10..15, 2), vec![vec![10, 11, 12], vec![13, 14]]);
        assert_eq!(assign_indices(3..3, 2), vec![Vec::<usize>::new(), vec![]]);
    }

    #[test]
    fn test_partition_properties_on_random_sizes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let n_items: usize = rng.random_range(0..200);
            let n_workers: usize = rng.random_range(1..17);
            let assignment = assign(n_items, n_workers);

            assert_eq!(assignment.len(), n_workers);

            let concatenated: Vec<usize> = assignment.iter().flatten().copied().collect();
            assert_eq!(concatenated, (0..n_items).collect::<Vec<_>>());

            let sizes: Vec<usize> = assignment.iter().map(Vec::len).collect();
            let (min, max) = (*sizes.iter().min().unwrap(), *sizes.iter().max().unwrap());
            assert!(max - min <= 1, "sizes {sizes:?} are unbalanced");

            for tasks in &assignment {
                contiguous_range(tasks).unwrap();
            }
        }
    }

    #[test]
    fn test_contiguous_range_rejects_gaps() {
        assert_eq!(contiguous_range(&[4, 5, 6]).unwrap(), 4..7);
        assert_eq!(contiguous_range(&[]).unwrap(), 0..0);
        let err = contiguous_range(&[1, 2, 4]).unwrap_err();
        assert!(matches!(err.kind(), VecOpsErrorKind::ProtocolInvariant(_)));
    }

    #[test]
    #[should_panic(expected = "Cannot assign items to zero workers.")]
    fn test_zero_workers_panics() {
        assign(3, 0);
    }
}
