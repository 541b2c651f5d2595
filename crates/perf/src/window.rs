//! Bounded FIFO storage for metric samples.

use std::collections::VecDeque;

/// Frame intervals kept for FPS and percentile computation.
pub const FRAME_WINDOW_CAPACITY: usize = 60;
/// Per-tick metric snapshots kept by a monitor (5 minutes at 1s ticks).
pub const HISTORY_CAPACITY: usize = 300;
/// Labeled snapshots kept by a reporter.
pub const SNAPSHOT_CAPACITY: usize = 100;

/// Fixed-capacity queue that evicts its oldest entry on overflow.
///
/// This is the storage behind every bounded series in the engine: the frame
/// interval window, the metrics history, the reporter's snapshot list, and
/// per-entity duration samples.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedWindow<T> {
    /// Create an empty window. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, returning the evicted one if the window was full.
    pub fn push(&mut self, sample: T) -> Option<T> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the next push will evict.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Oldest sample.
    pub fn oldest(&self) -> Option<&T> {
        self.samples.front()
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.samples.iter()
    }

    /// The `n` most recent samples, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    /// Drop samples from the front while `predicate` holds.
    pub fn drain_front_while(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let mut removed = 0;
        while self.samples.front().is_some_and(&mut predicate) {
            self.samples.pop_front();
            removed += 1;
        }
        removed
    }

    /// Remove every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<T: Clone> BoundedWindow<T> {
    /// Copy the contents out, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }
}

impl<T> Default for BoundedWindow<T> {
    fn default() -> Self {
        Self::new(FRAME_WINDOW_CAPACITY)
    }
}

impl<'a, T> IntoIterator for &'a BoundedWindow<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = BoundedWindow::new(3);
        for i in 0..5 {
            window.push(i);
        }

        assert_eq!(window.len(), 3);
        assert_eq!(window.to_vec(), vec![2, 3, 4]);
        assert_eq!(window.oldest(), Some(&2));
        assert_eq!(window.latest(), Some(&4));
    }

    #[test]
    fn test_window_push_reports_eviction() {
        let mut window = BoundedWindow::new(2);
        assert_eq!(window.push("a"), None);
        assert_eq!(window.push("b"), None);
        assert!(window.is_full());
        assert_eq!(window.push("c"), Some("a"));
    }

    #[test]
    fn test_window_zero_capacity() {
        let mut window = BoundedWindow::new(0);
        window.push(1);
        window.push(2);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.to_vec(), vec![2]);
    }

    #[test]
    fn test_window_recent() {
        let mut window = BoundedWindow::new(10);
        for i in 0..6 {
            window.push(i);
        }
        let recent: Vec<_> = window.recent(3).copied().collect();
        assert_eq!(recent, vec![3, 4, 5]);

        let all: Vec<_> = window.recent(50).copied().collect();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_window_drain_front_while() {
        let mut window = BoundedWindow::new(10);
        for i in [1, 2, 3, 10, 4] {
            window.push(i);
        }
        let removed = window.drain_front_while(|v| *v < 5);
        assert_eq!(removed, 3);
        assert_eq!(window.to_vec(), vec![10, 4]);
    }

    #[test]
    fn test_window_clear() {
        let mut window = BoundedWindow::new(4);
        window.push(1.0);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.latest(), None);
    }

    proptest! {
        #[test]
        fn prop_window_never_exceeds_capacity(cap in 1usize..64, pushes in 0usize..500) {
            let mut window = BoundedWindow::new(cap);
            for i in 0..pushes {
                window.push(i);
            }
            prop_assert!(window.len() <= cap);
            prop_assert_eq!(window.len(), pushes.min(cap));
            if pushes > 0 {
                prop_assert_eq!(window.latest().copied(), Some(pushes - 1));
                prop_assert_eq!(window.oldest().copied(), Some(pushes.saturating_sub(cap)));
            }
        }
    }
}
