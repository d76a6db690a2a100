use pnp_frontier::{KBest, Unbounded};

#[test]
fn test_kbest_keeps_highest_scores() {
    let mut beam = KBest::new(3);
    for (score, item) in [(0.1, "a"), (0.9, "b"), (0.5, "c"), (0.7, "d"), (0.2, "e")] {
        beam.push(f64::ln(score), item);
    }
    assert_eq!(beam.len(), 3);
    let items: Vec<&str> = beam.into_sorted_vec().into_iter().map(|(_, i)| i).collect();
    assert_eq!(items, vec!["b", "d", "c"]);
}

#[test]
fn test_kbest_rejects_neg_infinity() {
    let mut beam = KBest::new(2);
    assert!(!beam.push(f64::NEG_INFINITY, 1));
    assert!(!beam.push(f64::NAN, 2));
    assert!(beam.is_empty());
}

#[test]
fn test_kbest_full_rejects_worse_item() {
    let mut beam = KBest::new(2);
    assert!(beam.push(-1.0, 1));
    assert!(beam.push(-2.0, 2));
    assert!(!beam.push(-3.0, 3));
    assert_eq!(beam.min_score(), Some(-2.0));
    assert!(beam.push(-0.5, 4));
    assert_eq!(beam.min_score(), Some(-1.0));
}

#[test]
fn test_kbest_ties_keep_earlier_insertion() {
    let mut beam = KBest::new(2);
    beam.push(0.0, 'a');
    beam.push(0.0, 'b');
    assert!(!beam.push(0.0, 'c'));
    let items: Vec<char> = beam.into_sorted_vec().into_iter().map(|(_, i)| i).collect();
    assert_eq!(items, vec!['a', 'b']);
}

#[test]
fn test_kbest_zero_capacity() {
    let mut beam = KBest::new(0);
    assert!(!beam.push(0.0, ()));
    assert!(beam.is_empty());
}

#[test]
fn test_kbest_drain_empties() {
    let mut beam = KBest::new(4);
    beam.push(1.0, 1);
    beam.push(2.0, 2);
    let drained = beam.drain_sorted();
    assert_eq!(drained, vec![(2.0, 2), (1.0, 1)]);
    assert!(beam.is_empty());
    beam.push(3.0, 3);
    assert_eq!(beam.len(), 1);
}

#[test]
fn test_unbounded_keeps_everything_but_neg_infinity() {
    let mut all = Unbounded::new();
    for i in 0..100 {
        all.push(-(i as f64), i);
    }
    assert!(!all.push(f64::NEG_INFINITY, 100));
    assert_eq!(all.len(), 100);
    assert_eq!(all.pop(), Some((-99.0, 99)));
    let drained = all.drain();
    assert_eq!(drained.len(), 99);
    assert_eq!(drained[0], (0.0, 0));
    assert!(all.is_empty());
}

#[test]
fn test_unbounded_sorted() {
    let mut all = Unbounded::new();
    all.push(-3.0, 'c');
    all.push(-1.0, 'a');
    all.push(-2.0, 'b');
    let items: Vec<char> = all.into_sorted_vec().into_iter().map(|(_, i)| i).collect();
    assert_eq!(items, vec!['a', 'b', 'c']);
}
