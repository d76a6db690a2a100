/// Retains every admitted item in insertion order.
///
/// Items scoring `-inf` (or NaN) are never admitted.
pub struct Unbounded<T> {
    items: Vec<(f64, T)>,
}

impl<T> Unbounded<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, score: f64, item: T) -> bool {
        if score.is_nan() || score == f64::NEG_INFINITY {
            return false;
        }
        self.items.push((score, item));
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove every entry in insertion order.
    pub fn drain(&mut self) -> Vec<(f64, T)> {
        std::mem::take(&mut self.items)
    }

    /// Remove the most recently admitted entry.
    pub fn pop(&mut self) -> Option<(f64, T)> {
        self.items.pop()
    }

    /// Consume the container, returning entries best first.
    pub fn into_sorted_vec(mut self) -> Vec<(f64, T)> {
        self.items.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &T)> {
        self.items.iter().map(|(s, item)| (*s, item))
    }
}

impl<T> Default for Unbounded<T> {
    fn default() -> Self {
        Self::new()
    }
}
