//! Random subsets of the gold standard

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Up to `n` items in random order (Fisher–Yates)
///
/// `None`, or `n` at least the input length, returns every item shuffled.
pub fn random_sample<T: Clone, R: Rng + ?Sized>(items: &[T], n: Option<usize>, rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    if let Some(n) = n {
        shuffled.truncate(n);
    }
    shuffled
}

/// Seeded variant for reproducible runs
pub fn seeded_sample<T: Clone>(items: &[T], n: Option<usize>, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    random_sample(items, n, &mut rng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_size_and_membership() {
        let items: Vec<u32> = (0..50).collect();
        let sample = seeded_sample(&items, Some(10), 7);
        assert_eq!(sample.len(), 10);
        assert!(sample.iter().all(|i| items.contains(i)));

        let mut unique = sample.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let items: Vec<u32> = (0..100).collect();
        assert_eq!(seeded_sample(&items, Some(20), 42), seeded_sample(&items, Some(20), 42));
    }

    #[test]
    fn test_oversized_request_returns_everything() {
        let items = vec!["a", "b", "c"];
        let mut all = seeded_sample(&items, Some(10), 1);
        all.sort_unstable();
        assert_eq!(all, items);
        assert_eq!(seeded_sample(&items, None, 1).len(), 3);
    }
}
