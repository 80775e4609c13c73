//! Splits a record's attachments into size-bounded batches.
//!
//! # Algorithm
//! First-fit accumulation, not bin packing:
//! ```text
//! while items remain:
//!     seed = first unassigned item
//!     if seed < limit: scan the rest in original order, add every item
//!                      that keeps the running total < limit
//!     else:            seed travels alone (oversized singleton)
//! ```
//!
//! # Design Decisions
//! - Deterministic and order-preserving; relays and servers downstream rely on
//!   the exact batch count and composition
//! - A single item is never split, so one batch may exceed the limit
//! - Empty input still yields one (empty) batch carrying the XML document

/// Partition attachment indices into batches whose totals stay below `limit`.
///
/// Returns a list of batches, each listing indices into `sizes` in ascending
/// order. Every index appears in exactly one batch.
pub fn divide_into_batches(sizes: &[u64], limit: u64) -> Vec<Vec<usize>> {
    if sizes.is_empty() {
        return vec![Vec::new()];
    }

    let mut remaining: Vec<usize> = (0..sizes.len()).collect();
    let mut batches = Vec::new();

    while let Some((&seed, rest)) = remaining.split_first() {
        let mut batch = vec![seed];
        let mut total = sizes[seed];

        if total < limit {
            for &index in rest {
                let candidate = total.saturating_add(sizes[index]);
                if candidate < limit {
                    batch.push(index);
                    total = candidate;
                }
            }
        }

        remaining.retain(|index| !batch.contains(index));
        batches.push(batch);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(sizes: &[u64], batches: &[Vec<usize>]) {
        let mut seen: Vec<usize> = batches.iter().flatten().copied().collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..sizes.len()).collect();
        assert_eq!(seen, expected, "every index exactly once");
    }

    #[test]
    fn test_accumulates_until_limit() {
        assert_eq!(divide_into_batches(&[10, 10, 10], 25), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_oversized_singleton() {
        assert_eq!(divide_into_batches(&[30], 25), vec![vec![0]]);
        assert_eq!(divide_into_batches(&[5, 25, 5], 25), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_empty_input_yields_xml_only_batch() {
        assert_eq!(divide_into_batches(&[], 100), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_skips_items_that_do_not_fit_and_keeps_scanning() {
        // 50 + 40 = 90 fits, 30 would overflow, 5 still fits
        let sizes = [50, 40, 30, 5, 60];
        let batches = divide_into_batches(&sizes, 100);
        assert_eq!(batches, vec![vec![0, 1, 3], vec![2, 4]]);
        assert_partition(&sizes, &batches);
    }

    #[test]
    fn test_limit_is_strict() {
        // 10 + 15 == 25 is not < 25
        assert_eq!(divide_into_batches(&[10, 15], 25), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_zero_limit_degenerates_to_singletons() {
        let batches = divide_into_batches(&[0, 1, 2], 0);
        assert_eq!(batches, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_no_batch_exceeds_limit_when_items_fit() {
        let sizes = [7, 3, 9, 1, 4, 8, 2, 6, 5];
        let limit = 12;
        let batches = divide_into_batches(&sizes, limit);
        assert_partition(&sizes, &batches);
        for batch in &batches {
            let total: u64 = batch.iter().map(|&i| sizes[i]).sum();
            assert!(total < limit, "batch {batch:?} totals {total}");
        }
    }

    #[test]
    fn test_huge_sizes_do_not_overflow() {
        let batches = divide_into_batches(&[u64::MAX - 1, u64::MAX - 1], u64::MAX);
        assert_eq!(batches, vec![vec![0], vec![1]]);
    }
}
