//! Bounding volume hierarchy for 2-D range queries
//!
//! Bulk-built top-down: each node sorts its items by bounding-box center along
//! the longer axis and splits at the median, so the tree is balanced regardless
//! of input order. Large subtrees are built in parallel with `rayon::join`.

use crate::bounds;
use geo::{Coord, Rect};

/// Maximum depth of the hierarchy to prevent unbounded recursion
const MAX_DEPTH: u32 = 32;

/// Minimum number of items required to split a node
const MIN_ITEMS_FOR_SPLIT: usize = 8;

/// Subtrees with at least this many items are built on separate rayon tasks
const PARALLEL_THRESHOLD: usize = 4_096;

/// Anything with an axis-aligned extent in the plane
pub trait Bounded {
    fn bounds(&self) -> Rect<f64>;
}

impl<T: Bounded + ?Sized> Bounded for std::sync::Arc<T> {
    fn bounds(&self) -> Rect<f64> {
        (**self).bounds()
    }
}

impl Bounded for Rect<f64> {
    fn bounds(&self) -> Rect<f64> {
        *self
    }
}

/// Immutable spatial index over bounded items
#[derive(Debug, Clone)]
pub struct Bvh<V> {
    root: Option<BvhNode<V>>,
    len: usize,
}

#[derive(Debug, Clone)]
struct BvhNode<V> {
    /// Union of the bounds of everything below this node
    bounds: Rect<f64>,
    kind: NodeKind<V>,
}

#[derive(Debug, Clone)]
enum NodeKind<V> {
    Leaf(Vec<V>),
    Branch(Box<[BvhNode<V>; 2]>),
}

impl<V: Bounded + Send> Bvh<V> {
    /// Build the hierarchy over all items
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn new(items: impl IntoIterator<Item = V>) -> Self {
        let items: Vec<V> = items.into_iter().collect();
        let len = items.len();
        let root = (!items.is_empty()).then(|| BvhNode::build(items, 0));
        Self { root, len }
    }
}

impl<V: Bounded> Bvh<V> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Union of all item bounds
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.root.as_ref().map(|r| r.bounds)
    }

    /// Call `f` for every item whose bounds intersect `area`
    pub fn for_each_in<'a>(&'a self, area: &Rect<f64>, mut f: impl FnMut(&'a V)) {
        if let Some(root) = &self.root {
            root.for_each_in(area, &mut f);
        }
    }

    /// Every item whose bounds intersect `area`
    pub fn query(&self, area: &Rect<f64>) -> Vec<&V> {
        let mut out = Vec::new();
        self.for_each_in(area, |v| out.push(v));
        out
    }

    /// Iterate over all items in tree order
    pub fn iter(&self) -> impl Iterator<Item = &V> {
        let mut stack: Vec<&BvhNode<V>> = self.root.iter().collect();
        let mut current: std::slice::Iter<'_, V> = Default::default();
        std::iter::from_fn(move || {
            loop {
                if let Some(v) = current.next() {
                    return Some(v);
                }
                match &stack.pop()?.kind {
                    NodeKind::Leaf(items) => current = items.iter(),
                    NodeKind::Branch(children) => stack.extend(children.iter()),
                }
            }
        })
    }
}

impl<V: Bounded + Send> BvhNode<V> {
    fn build(mut items: Vec<V>, depth: u32) -> Self {
        let bounds = items
            .iter()
            .map(Bounded::bounds)
            .reduce(|a, b| bounds::union(&a, &b))
            .unwrap_or_else(|| Rect::new(Coord::zero(), Coord::zero()));

        if items.len() < MIN_ITEMS_FOR_SPLIT || depth >= MAX_DEPTH {
            return Self {
                bounds,
                kind: NodeKind::Leaf(items),
            };
        }

        // Split on the longer axis at the median center
        let horizontal = bounds.width() >= bounds.height();
        let key = |v: &V| {
            let c = v.bounds().center();
            if horizontal { c.x } else { c.y }
        };
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| key(a).total_cmp(&key(b)));
        let right = items.split_off(mid);
        let left = items;

        let (left, right) = if left.len() + right.len() >= PARALLEL_THRESHOLD {
            rayon::join(
                || BvhNode::build(left, depth + 1),
                || BvhNode::build(right, depth + 1),
            )
        } else {
            (
                BvhNode::build(left, depth + 1),
                BvhNode::build(right, depth + 1),
            )
        };

        Self {
            bounds,
            kind: NodeKind::Branch(Box::new([left, right])),
        }
    }
}

impl<V: Bounded> BvhNode<V> {
    fn for_each_in<'a>(&'a self, area: &Rect<f64>, f: &mut impl FnMut(&'a V)) {
        if !bounds::intersects(&self.bounds, area) {
            return;
        }
        match &self.kind {
            NodeKind::Leaf(items) => {
                for item in items {
                    if bounds::intersects(&item.bounds(), area) {
                        f(item);
                    }
                }
            }
            NodeKind::Branch(children) => {
                for child in children.iter() {
                    child.for_each_in(area, f);
                }
            }
        }
    }
}
