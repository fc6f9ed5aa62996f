//! One-dimensional segment tree answering "which intervals contain x" queries
//!
//! The tree is bulk-built once and immutable afterwards, so it can be shared
//! between reader threads without locking. Each node spans a half-open range
//! `[min, max)` split at its midpoint; a value descends into a child only when it
//! fits entirely inside that child's half, otherwise it stays at the node. A point
//! query therefore walks a single root-to-leaf path and checks every value stored
//! along it.
//!
//! Intervals follow the half-open convention `[min, max)`: a value contains `x`
//! when `min <= x < max`. Zero-length and NaN intervals can never contain a point
//! and are dropped on insertion.

/// Anything with an extent on one axis
pub trait Interval {
    fn min(&self) -> f64;
    fn max(&self) -> f64;

    /// Whether `min <= x < max`
    #[inline]
    fn contains(&self, x: f64) -> bool {
        self.min() <= x && x < self.max()
    }
}

impl<T: Interval + ?Sized> Interval for &T {
    fn min(&self) -> f64 {
        (**self).min()
    }

    fn max(&self) -> f64 {
        (**self).max()
    }
}

impl<T: Interval + ?Sized> Interval for std::sync::Arc<T> {
    fn min(&self) -> f64 {
        (**self).min()
    }

    fn max(&self) -> f64 {
        (**self).max()
    }
}

impl Interval for (f64, f64) {
    fn min(&self) -> f64 {
        self.0
    }

    fn max(&self) -> f64 {
        self.1
    }
}

/// Number of values a leaf holds before it splits
pub const NODE_SPLIT_CAPACITY: usize = 8;

/// Maximum depth of the tree to bound recursion on pathological inputs
const MAX_DEPTH: u32 = 48;

/// Bulk-built, read-only interval index
#[derive(Debug, Clone)]
pub struct IntervalTree<V> {
    root: Option<Node<V>>,
    len: usize,
}

#[derive(Debug, Clone)]
struct Node<V> {
    min: f64,
    max: f64,
    /// Values that intersect this node but fit in neither child
    values: Vec<V>,
    /// Left `[min, mid)` and right `[mid, max)` halves once split
    children: Option<Box<[Node<V>; 2]>>,
}

impl<V: Interval> IntervalTree<V> {
    /// Build a tree from a finite collection of values
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn new(values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<V> = values
            .into_iter()
            .filter(|v| v.min() < v.max())
            .collect();

        if values.is_empty() {
            return Self { root: None, len: 0 };
        }

        let (min, max) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, v| {
            (acc.0.min(v.min()), acc.1.max(v.max()))
        });

        let len = values.len();
        let mut root = Node::new(min, max);
        for value in values {
            root.insert(value, 0);
        }
        root.cleanup();

        Self {
            root: Some(root),
            len,
        }
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Covered range `[min, max)`, or `None` for an empty tree
    pub fn span(&self) -> Option<(f64, f64)> {
        self.root.as_ref().map(|r| (r.min, r.max))
    }

    /// Every value whose interval contains `x`
    pub fn query_point(&self, x: f64) -> Vec<&V> {
        let mut out = Vec::new();
        self.query_point_into(x, &mut out);
        out
    }

    /// Like [`query_point`](Self::query_point), reusing a caller-owned buffer
    pub fn query_point_into<'a>(&'a self, x: f64, out: &mut Vec<&'a V>) {
        out.clear();
        self.for_each_intersecting(x, |v| out.push(v));
    }

    /// Call `f` for every value whose interval contains `x`, without allocating
    #[inline]
    pub fn for_each_intersecting<'a>(&'a self, x: f64, mut f: impl FnMut(&'a V)) {
        let mut node = match &self.root {
            Some(root) if x >= root.min && x < root.max => root,
            _ => return,
        };

        loop {
            for value in &node.values {
                if value.contains(x) {
                    f(value);
                }
            }

            match &node.children {
                Some(children) => {
                    let [left, right] = &**children;
                    node = if x < left.max { left } else { right };
                }
                None => return,
            }
        }
    }

    /// Every value overlapping the closed range `[min, max]`
    pub fn query_range(&self, min: f64, max: f64) -> Vec<&V> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.query_range(min, max, &mut out);
        }
        out
    }

    /// Iterate over all stored values in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        let mut stack: Vec<&Node<V>> = self.root.iter().collect();
        let mut current: std::slice::Iter<'_, V> = Default::default();
        std::iter::from_fn(move || {
            loop {
                if let Some(v) = current.next() {
                    return Some(v);
                }
                let node = stack.pop()?;
                if let Some(children) = &node.children {
                    stack.extend(children.iter());
                }
                current = node.values.iter();
            }
        })
    }
}

impl<V: Interval> Node<V> {
    fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            values: Vec::new(),
            children: None,
        }
    }

    #[inline]
    fn mid(&self) -> f64 {
        self.min + (self.max - self.min) / 2.0
    }

    /// Index of the child half that fully contains `value`, if any
    #[inline]
    fn fitting_child(&self, value: &V) -> Option<usize> {
        let mid = self.mid();
        if value.min() >= self.min && value.max() <= mid {
            Some(0)
        } else if value.min() >= mid && value.max() <= self.max {
            Some(1)
        } else {
            None
        }
    }

    fn insert(&mut self, value: V, depth: u32) {
        let fit = self.fitting_child(&value);
        if let Some(children) = &mut self.children {
            match fit {
                Some(i) => children[i].insert(value, depth + 1),
                None => self.values.push(value),
            }
            return;
        }

        self.values.push(value);
        if self.values.len() > NODE_SPLIT_CAPACITY && depth < MAX_DEPTH && self.mid() > self.min {
            self.split(depth);
        }
    }

    /// Turn a leaf into an internal node, pushing down every value that fits a half
    fn split(&mut self, depth: u32) {
        let mid = self.mid();
        let mut children = Box::new([Node::new(self.min, mid), Node::new(mid, self.max)]);

        let values = std::mem::take(&mut self.values);
        for value in values {
            match self.fitting_child(&value) {
                Some(i) => children[i].insert(value, depth + 1),
                None => self.values.push(value),
            }
        }
        self.children = Some(children);
    }

    /// Drop empty subtrees and release spare capacity
    fn cleanup(&mut self) -> bool {
        if let Some(children) = &mut self.children {
            let left_empty = children[0].cleanup();
            let right_empty = children[1].cleanup();
            if left_empty && right_empty {
                self.children = None;
            }
        }
        self.values.shrink_to_fit();
        self.values.is_empty() && self.children.is_none()
    }

    fn query_range<'a>(&'a self, min: f64, max: f64, out: &mut Vec<&'a V>) {
        if min >= self.max || max < self.min {
            return;
        }
        out.extend(
            self.values
                .iter()
                .filter(|v| v.min() <= max && v.max() > min),
        );
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query_range(min, max, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_intervals(rng: &mut StdRng, n: usize) -> Vec<(f64, f64)> {
        (0..n)
            .map(|_| {
                let a: f64 = rng.gen_range(-1000.0..1000.0);
                // Mostly short intervals with a few long ones
                let len: f64 = if rng.gen_bool(0.05) {
                    rng.gen_range(0.0..1000.0)
                } else {
                    rng.gen_range(0.0..5.0)
                };
                (a, a + len)
            })
            .collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree: IntervalTree<(f64, f64)> = IntervalTree::new(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.query_point(0.0).is_empty());
        assert!(tree.query_range(-1.0, 1.0).is_empty());
        assert!(tree.span().is_none());
    }

    #[test]
    fn test_degenerate_intervals_dropped() {
        let tree = IntervalTree::new(vec![(1.0, 1.0), (f64::NAN, 2.0), (3.0, 2.0), (0.0, 2.0)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.query_point(1.0), vec![&(0.0, 2.0)]);
    }

    #[test]
    fn test_half_open_containment() {
        let tree = IntervalTree::new(vec![(0.0, 1.0), (1.0, 2.0)]);
        assert_eq!(tree.query_point(1.0), vec![&(1.0, 2.0)]);
        assert_eq!(tree.query_point(0.0), vec![&(0.0, 1.0)]);
        assert!(tree.query_point(2.0).is_empty());
        assert!(tree.query_point(-0.5).is_empty());
    }

    #[test]
    fn test_query_point_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let intervals = random_intervals(&mut rng, 10_000);
        let tree = IntervalTree::new(intervals.clone());
        assert_eq!(tree.len(), intervals.iter().filter(|i| i.0 < i.1).count());

        let mut buffer = Vec::new();
        for _ in 0..500 {
            let x: f64 = rng.gen_range(-1100.0..2100.0);
            tree.query_point_into(x, &mut buffer);

            let mut found: Vec<(f64, f64)> = buffer.iter().map(|v| **v).collect();
            let mut expected: Vec<(f64, f64)> = intervals
                .iter()
                .copied()
                .filter(|&(a, b)| a <= x && x < b)
                .collect();
            found.sort_by(|a, b| a.partial_cmp(b).unwrap());
            expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(found, expected, "mismatch at x = {x}");
        }
    }

    #[test]
    fn test_query_range_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let intervals = random_intervals(&mut rng, 10_000);
        let tree = IntervalTree::new(intervals.clone());

        for _ in 0..100 {
            let lo: f64 = rng.gen_range(-1100.0..1100.0);
            let hi = lo + rng.gen_range(0.0..20.0);
            let mut found: Vec<(f64, f64)> = tree.query_range(lo, hi).into_iter().copied().collect();
            let mut expected: Vec<(f64, f64)> = intervals
                .iter()
                .copied()
                .filter(|&(a, b)| a < b && a <= hi && b > lo)
                .collect();
            found.sort_by(|a, b| a.partial_cmp(b).unwrap());
            expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(found, expected, "mismatch for [{lo}, {hi}]");
        }
    }

    #[test]
    fn test_many_identical_intervals() {
        let tree = IntervalTree::new(vec![(5.0, 6.0); 1_000]);
        assert_eq!(tree.query_point(5.5).len(), 1_000);
        assert_eq!(tree.iter().count(), 1_000);
    }

    #[test]
    fn test_iter_visits_every_value() {
        let mut rng = StdRng::seed_from_u64(1);
        let intervals = random_intervals(&mut rng, 2_000);
        let tree = IntervalTree::new(intervals);
        assert_eq!(tree.iter().count(), tree.len());
    }
}
