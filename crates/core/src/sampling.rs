//! Record index sampling helpers.

use rand::seq::index;
use rand::Rng;

/// Draw `amount` distinct entries of `pool` uniformly at random.
///
/// If the pool is smaller than `amount`, the whole pool is returned.
pub fn sample_without_replacement<R: Rng + ?Sized>(
    pool: &[usize],
    amount: usize,
    rng: &mut R,
) -> Vec<usize> {
    let amount = amount.min(pool.len());
    if amount == 0 {
        return Vec::new();
    }
    if amount == pool.len() {
        return pool.to_vec();
    }
    index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|i| pool[i])
        .collect()
}

/// Draw `amount` entries of `pool` uniformly at random with replacement.
pub fn sample_with_replacement<R: Rng + ?Sized>(
    pool: &[usize],
    amount: usize,
    rng: &mut R,
) -> Vec<usize> {
    if pool.is_empty() {
        return Vec::new();
    }
    (0..amount)
        .map(|_| pool[rng.gen_range(0..pool.len())])
        .collect()
}

/// Record indices grouped by encoded cell.
///
/// Records are encoded once and sorted once; the records of any cell are then
/// a contiguous range located by binary search.
#[derive(Clone, Debug)]
pub struct SortedCells {
    order: Vec<usize>,
    keys: Vec<usize>,
}

impl SortedCells {
    /// Build the index from one encoded cell per record.
    pub fn new(encoded: &[usize]) -> Self {
        let mut order: Vec<usize> = (0..encoded.len()).collect();
        order.sort_by_key(|&i| encoded[i]);
        let keys = order.iter().map(|&i| encoded[i]).collect();
        Self { order, keys }
    }

    /// Indices of the records currently in `cell`.
    pub fn records_in(&self, cell: usize) -> &[usize] {
        let start = self.keys.partition_point(|&k| k < cell);
        let end = self.keys.partition_point(|&k| k <= cell);
        &self.order[start..end]
    }

    /// Number of records in `cell`.
    pub fn count(&self, cell: usize) -> usize {
        self.records_in(cell).len()
    }

    /// Total number of indexed records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no records are indexed.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_without_replacement_is_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let pool: Vec<usize> = (100..200).collect();
        let picked = sample_without_replacement(&pool, 30, &mut rng);
        assert_eq!(picked.len(), 30);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 30);
        assert!(picked.iter().all(|p| (100..200).contains(p)));
    }

    #[test]
    fn test_exhausted_pool_serves_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let picked = sample_without_replacement(&[4, 5], 10, &mut rng);
        assert_eq!(picked, vec![4, 5]);
        assert!(sample_with_replacement(&[], 3, &mut rng).is_empty());
    }

    #[test]
    fn test_sorted_cells_ranges() {
        let encoded = vec![3, 1, 3, 0, 1, 3];
        let cells = SortedCells::new(&encoded);
        let mut in_three = cells.records_in(3).to_vec();
        in_three.sort_unstable();
        assert_eq!(in_three, vec![0, 2, 5]);
        assert_eq!(cells.count(1), 2);
        assert_eq!(cells.count(2), 0);
        assert_eq!(cells.count(9), 0);
        assert_eq!(cells.len(), 6);
    }
}
