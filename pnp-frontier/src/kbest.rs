use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordered so that the *worst* entry sits at the top: lowest
/// score first, and among equal scores the most recently inserted.
struct Entry<T> {
    score: f64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Keeps at most `capacity` items with the highest scores.
///
/// Items scoring `-inf` (or NaN) are never admitted. Once full, admitting an
/// item evicts the lowest-scoring one; ties keep the earlier insertion.
pub struct KBest<T> {
    capacity: usize,
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> KBest<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            next_seq: 0,
        }
    }

    /// Offer an item. Returns `true` if it was admitted.
    pub fn push(&mut self, score: f64, item: T) -> bool {
        if self.capacity == 0 || score.is_nan() || score == f64::NEG_INFINITY {
            return false;
        }
        if self.heap.len() >= self.capacity {
            match self.heap.peek() {
                Some(worst) if worst.score < score => {
                    self.heap.pop();
                }
                _ => return false,
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { score, seq, item });
        true
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score of the entry that would be evicted next.
    pub fn min_score(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.score)
    }

    /// Remove every entry, best first.
    pub fn drain_sorted(&mut self) -> Vec<(f64, T)> {
        let mut entries: Vec<Entry<T>> = self.heap.drain().collect();
        entries.sort();
        entries.into_iter().map(|e| (e.score, e.item)).collect()
    }

    /// Consume the container, returning entries best first.
    pub fn into_sorted_vec(mut self) -> Vec<(f64, T)> {
        self.drain_sorted()
    }
}
