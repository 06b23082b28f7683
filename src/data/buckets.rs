use crate::error::{DataError, Result};
use crate::types::Bucket;

/// Partition indices into length-contiguous buckets to minimise padding.
///
/// Indices are sorted by length (stable) and sliced into runs of `len / bucket_count`;
/// runs past the `bucket_count`-th are folded into the last bucket, so at most
/// `bucket_count` buckets are returned. With fewer items than buckets each item
/// gets its own bucket.
pub fn partition(lengths: &[usize], bucket_count: usize) -> Result<Vec<Bucket>> {
    if bucket_count == 0 {
        return Err(DataError::invalid_input("bucket_count must be positive"));
    }
    if lengths.is_empty() {
        return Ok(Vec::new());
    }

    let mut order: Vec<usize> = (0..lengths.len()).collect();
    order.sort_by_key(|&i| lengths[i]);
    let sorted: Vec<(usize, usize)> = order.into_iter().map(|i| (i, lengths[i])).collect();

    let size = (lengths.len() / bucket_count).max(1);
    let mut buckets: Vec<Bucket> = sorted
        .chunks(size)
        .map(|run| Bucket {
            entries: run.to_vec(),
        })
        .collect();

    while buckets.len() > bucket_count {
        if let Some(residual) = buckets.pop() {
            if let Some(last) = buckets.last_mut() {
                last.entries.extend(residual.entries);
            }
        }
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn sizes(buckets: &[Bucket]) -> Vec<usize> {
        buckets.iter().map(Bucket::len).collect()
    }

    fn assert_partitions(buckets: &[Bucket], n: usize) {
        let mut seen = BTreeSet::new();
        for bucket in buckets {
            for index in bucket.indices() {
                assert!(seen.insert(index), "index {index} appears twice");
            }
        }
        assert_eq!(seen, (0..n).collect::<BTreeSet<_>>());
    }

    #[test]
    fn single_bucket_holds_everything_sorted() {
        let lengths = [30, 10, 20];
        let buckets = partition(&lengths, 1).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].entries, vec![(1, 10), (2, 20), (0, 30)]);
    }

    #[test]
    fn remainder_run_is_folded_into_last_bucket() {
        let lengths = [5, 4, 3, 2, 1];
        let buckets = partition(&lengths, 2).unwrap();
        assert_eq!(sizes(&buckets), vec![2, 3]);
        assert_eq!(buckets[0].entries, vec![(4, 1), (3, 2)]);
        assert_eq!(buckets[1].entries, vec![(2, 3), (1, 4), (0, 5)]);
        assert_partitions(&buckets, 5);
    }

    #[test]
    fn several_residual_runs_fold_into_last_bucket() {
        let lengths: Vec<usize> = (0..11).rev().collect();
        let buckets = partition(&lengths, 4).unwrap();
        assert_eq!(sizes(&buckets), vec![2, 2, 2, 5]);
        assert_partitions(&buckets, 11);
    }

    #[test]
    fn bucket_sizes_stay_within_one_residual_of_base() {
        for n in 1..40usize {
            for b in 1..=n {
                let lengths: Vec<usize> = (0..n).map(|i| (i * 7919) % 53).collect();
                let buckets = partition(&lengths, b).unwrap();
                assert_eq!(buckets.len(), b);
                assert_partitions(&buckets, n);
                let base = n / b;
                for bucket in &buckets[..b - 1] {
                    assert_eq!(bucket.len(), base);
                }
                assert_eq!(buckets[b - 1].len(), base + n % b);
            }
        }
    }

    #[test]
    fn buckets_are_length_contiguous() {
        let lengths = [9, 1, 8, 2, 7, 3, 6, 4];
        let buckets = partition(&lengths, 3).unwrap();
        for pair in buckets.windows(2) {
            let prev_max = pair[0].max_length();
            assert!(pair[1].entries.iter().all(|&(_, len)| len >= prev_max));
        }
    }

    #[test]
    fn fewer_items_than_buckets() {
        let buckets = partition(&[3, 1], 4).unwrap();
        assert_eq!(sizes(&buckets), vec![1, 1]);
        assert!(partition(&[], 2).unwrap().is_empty());
        assert!(partition(&[1], 0).is_err());
    }
}
