//! Fork-join helpers used by the per-node passes.
//!
//! Each helper runs a single parallel region over an explicit list of items and returns
//! once every item has been processed. Without the `parallel` feature, or when the
//! settings disable threading, the items are processed sequentially in order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Threading settings of one parallel region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParallelSettings {
    /// Whether the work may be spread across the thread pool.
    pub use_threading: bool,
    /// The minimum number of items handled by a single task.
    pub min_len: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            use_threading: true,
            min_len: 1,
        }
    }
}

impl ParallelSettings {
    /// Settings for a region over `num_items` tree nodes.
    ///
    /// Threading is disabled if fewer than two nodes are processed.
    pub fn for_nodes(use_threading: bool, num_items: usize) -> Self {
        Self {
            use_threading: use_threading && num_items > 1,
            min_len: 1,
        }
    }

    /// Sets the minimum number of items processed by a single task.
    #[must_use]
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len.max(1);
        self
    }
}

/// Calls `f` on every item, possibly concurrently.
pub(crate) fn for_each<T: Send>(
    items: Vec<T>,
    settings: ParallelSettings,
    f: impl Fn(T) + Sync + Send,
) {
    #[cfg(feature = "parallel")]
    {
        if settings.use_threading {
            items
                .into_par_iter()
                .with_min_len(settings.min_len)
                .for_each(f);
            return;
        }
    }

    #[cfg(not(feature = "parallel"))]
    let _ = settings;

    items.into_iter().for_each(f)
}

/// Maps every item with `f`, possibly concurrently, keeping the order of the items.
pub(crate) fn map<T: Sync, R: Send>(
    items: &[T],
    settings: ParallelSettings,
    f: impl Fn(&T) -> R + Sync + Send,
) -> Vec<R> {
    #[cfg(feature = "parallel")]
    {
        if settings.use_threading {
            return items
                .par_iter()
                .with_min_len(settings.min_len)
                .map(f)
                .collect();
        }
    }

    #[cfg(not(feature = "parallel"))]
    let _ = settings;

    items.iter().map(f).collect()
}

#[cfg(test)]
mod test {
    use super::ParallelSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn min_len_is_at_least_one() {
        let settings = ParallelSettings::for_nodes(true, 10).with_min_len(0);
        assert_eq!(settings.min_len, 1);
        assert!(settings.use_threading);
        assert_eq!(settings.with_min_len(64).min_len, 64);
        assert!(!ParallelSettings::for_nodes(true, 1).use_threading);
    }

    #[test]
    fn map_keeps_the_item_order() {
        let items: Vec<usize> = (0..5000).collect();

        for min_len in [1, 7, 1024, 10_000] {
            let settings = ParallelSettings::for_nodes(true, items.len()).with_min_len(min_len);
            let doubled = super::map(&items, settings, |i| i * 2);
            assert!(doubled.iter().enumerate().all(|(i, d)| *d == i * 2));
        }
    }

    #[test]
    fn for_each_visits_every_item_once() {
        let sum = AtomicUsize::new(0);
        let settings = ParallelSettings::for_nodes(true, 100).with_min_len(8);
        super::for_each((1..=100).collect(), settings, |i: usize| {
            let _ = sum.fetch_add(i, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 5050);
    }
}
