//! A KD-tree over labelled points, used to find the nearest centroid.
//!
//! Nodes split on `dimensions[depth % dimensions.len()]`. Points with a
//! smaller value along the split dimension go left, everything else
//! (ties included) goes right. The tree is never rebalanced: it indexes
//! centroid sets, which are small.

use crate::distance::Distance;
use snafu::prelude::*;
use std::collections::HashSet;
use tracing::trace;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum KdTreeError {
    #[snafu(display("id {id} is already in the tree"))]
    DuplicateId { id: usize },

    #[snafu(display("id {id} is not in the tree"))]
    NotFound { id: usize },

    #[snafu(display("at least one split dimension is required"))]
    EmptyDimensions,

    #[snafu(display("got {points} points but {ids} ids"))]
    LengthMismatch { points: usize, ids: usize },

    #[snafu(display("point has {found} components, but dimension {dimension} is indexed"))]
    DimensionOutOfRange { dimension: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    point: Vec<f64>,
    id: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf(point: Vec<f64>, id: usize) -> Box<Self> {
        Box::new(Self {
            point,
            id,
            left: None,
            right: None,
        })
    }
}

/// A query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<'t> {
    pub point: &'t [f64],
    pub id: usize,
    pub distance: f64,
}

pub struct KdTree<'m, D: Distance + ?Sized> {
    root: Option<Box<Node>>,
    ids: HashSet<usize>,
    dimensions: Vec<usize>,
    metric: &'m D,
}

impl<'m, D: Distance + ?Sized> KdTree<'m, D> {
    /// Builds a tree by recursive median splits.
    ///
    /// `ids[i]` labels `points[i]`. Ids must be unique, and every point must
    /// have a component for each entry of `dimensions`.
    pub fn build<P: AsRef<[f64]>>(
        points: &[P],
        ids: &[usize],
        dimensions: Vec<usize>,
        metric: &'m D,
    ) -> Result<Self, KdTreeError> {
        ensure!(!dimensions.is_empty(), EmptyDimensionsSnafu);
        ensure!(
            points.len() == ids.len(),
            LengthMismatchSnafu {
                points: points.len(),
                ids: ids.len()
            }
        );

        let mut tree = Self {
            root: None,
            ids: HashSet::with_capacity(ids.len()),
            dimensions,
            metric,
        };

        let mut items = Vec::with_capacity(points.len());
        for (point, &id) in points.iter().zip(ids) {
            let point = point.as_ref();
            tree.check_dimensions(point)?;
            ensure!(tree.ids.insert(id), DuplicateIdSnafu { id });
            items.push((point.to_vec(), id));
        }

        tree.root = build_recursive(items, 0, &tree.dimensions);
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains_id(&self, id: usize) -> bool {
        self.ids.contains(&id)
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    fn check_dimensions(&self, point: &[f64]) -> Result<(), KdTreeError> {
        for &dimension in &self.dimensions {
            ensure!(
                dimension < point.len(),
                DimensionOutOfRangeSnafu {
                    dimension,
                    found: point.len()
                }
            );
        }
        Ok(())
    }

    /// Adds a leaf. A failed insert leaves the tree untouched.
    pub fn insert(&mut self, point: &[f64], id: usize) -> Result<(), KdTreeError> {
        ensure!(!self.ids.contains(&id), DuplicateIdSnafu { id });
        self.check_dimensions(point)?;

        trace!(id, "kd-tree insert");
        insert_recursive(&mut self.root, point.to_vec(), id, 0, &self.dimensions);
        self.ids.insert(id);
        Ok(())
    }

    /// Removes the node holding exactly `point` under `id`.
    pub fn remove(&mut self, point: &[f64], id: usize) -> Result<(), KdTreeError> {
        ensure!(self.ids.contains(&id), NotFoundSnafu { id });
        self.check_dimensions(point)?;

        let removed = remove_recursive(&mut self.root, point, id, 0, &self.dimensions);
        ensure!(removed, NotFoundSnafu { id });

        trace!(id, "kd-tree remove");
        self.ids.remove(&id);
        Ok(())
    }

    /// Moves `id` from `point` to `new_point` by removing and reinserting it.
    pub fn update(&mut self, point: &[f64], id: usize, new_point: &[f64]) -> Result<(), KdTreeError> {
        self.check_dimensions(new_point)?;
        self.remove(point, id)?;
        self.insert(new_point, id)
    }

    /// The `k` nearest points to `point`, closest first.
    ///
    /// With `max_distance`, only results strictly closer than it are kept.
    /// Subtrees across a splitting plane are skipped when the distance from
    /// `point` to its projection onto the plane exceeds the current k-th
    /// best distance. Metrics for which that projection is not a lower
    /// bound ([`Distance::projection_is_lower_bound`]) are searched
    /// exhaustively.
    pub fn nearest(&self, point: &[f64], k: usize, max_distance: Option<f64>) -> Vec<Neighbor<'_>> {
        let mut best = Vec::with_capacity(k + 1);
        if k == 0 {
            return best;
        }

        let mut projection = point.to_vec();
        self.nearest_recursive(self.root.as_deref(), point, &mut projection, 0, k, &mut best);

        if let Some(max_distance) = max_distance {
            best.retain(|n| n.distance < max_distance);
        }
        best
    }

    fn nearest_recursive<'t>(
        &'t self,
        node: Option<&'t Node>,
        point: &[f64],
        projection: &mut [f64],
        depth: usize,
        k: usize,
        best: &mut Vec<Neighbor<'t>>,
    ) {
        let Some(node) = node else {
            return;
        };

        let distance = self.metric.distance(point, &node.point);
        if best.len() < k || distance < best[best.len() - 1].distance {
            // Earlier candidates win ties
            let at = best.partition_point(|n| n.distance <= distance);
            best.insert(
                at,
                Neighbor {
                    point: &node.point,
                    id: node.id,
                    distance,
                },
            );
            best.truncate(k);
        }

        let dimension = split_dimension(&self.dimensions, depth);
        let (near, far) = if point[dimension] < node.point[dimension] {
            (node.left.as_deref(), node.right.as_deref())
        } else {
            (node.right.as_deref(), node.left.as_deref())
        };

        self.nearest_recursive(near, point, projection, depth + 1, k, best);

        if far.is_none() {
            return;
        }

        if best.len() < k || !self.metric.projection_is_lower_bound() {
            self.nearest_recursive(far, point, projection, depth + 1, k, best);
            return;
        }

        projection[dimension] = node.point[dimension];
        let plane_distance = self.metric.distance(point, projection);
        projection[dimension] = point[dimension];

        if plane_distance <= best[best.len() - 1].distance {
            self.nearest_recursive(far, point, projection, depth + 1, k, best);
        }
    }

    /// Every indexed point whose indexed dimensions all lie within
    /// `min..=max`, with its id.
    pub fn range(&self, min: &[f64], max: &[f64]) -> Result<Vec<(&[f64], usize)>, KdTreeError> {
        self.check_dimensions(min)?;
        self.check_dimensions(max)?;

        let mut found = Vec::new();
        self.range_recursive(self.root.as_deref(), min, max, 0, &mut found);
        Ok(found)
    }

    fn range_recursive<'t>(
        &'t self,
        node: Option<&'t Node>,
        min: &[f64],
        max: &[f64],
        depth: usize,
        found: &mut Vec<(&'t [f64], usize)>,
    ) {
        let Some(node) = node else {
            return;
        };

        let inside = self
            .dimensions
            .iter()
            .all(|&d| node.point[d] >= min[d] && node.point[d] <= max[d]);
        if inside {
            found.push((&node.point, node.id));
        }

        let dimension = split_dimension(&self.dimensions, depth);
        if min[dimension] < node.point[dimension] {
            self.range_recursive(node.left.as_deref(), min, max, depth + 1, found);
        }
        if max[dimension] >= node.point[dimension] {
            self.range_recursive(node.right.as_deref(), min, max, depth + 1, found);
        }
    }
}

#[inline]
fn split_dimension(dimensions: &[usize], depth: usize) -> usize {
    dimensions[depth % dimensions.len()]
}

fn build_recursive(
    mut items: Vec<(Vec<f64>, usize)>,
    depth: usize,
    dimensions: &[usize],
) -> Option<Box<Node>> {
    if items.is_empty() {
        return None;
    }

    let dimension = split_dimension(dimensions, depth);
    items.sort_by(|a, b| a.0[dimension].total_cmp(&b.0[dimension]));

    // Move the median to the first of its equals so that the left subtree
    // stays strictly smaller
    let mut median = items.len() / 2;
    let value = items[median].0[dimension];
    while median > 0 && items[median - 1].0[dimension] == value {
        median -= 1;
    }

    let right = items.split_off(median + 1);
    let (point, id) = items.pop()?;

    Some(Box::new(Node {
        point,
        id,
        left: build_recursive(items, depth + 1, dimensions),
        right: build_recursive(right, depth + 1, dimensions),
    }))
}

fn insert_recursive(
    slot: &mut Option<Box<Node>>,
    point: Vec<f64>,
    id: usize,
    depth: usize,
    dimensions: &[usize],
) {
    match slot {
        None => *slot = Some(Node::leaf(point, id)),
        Some(node) => {
            let dimension = split_dimension(dimensions, depth);
            let child = if point[dimension] < node.point[dimension] {
                &mut node.left
            } else {
                &mut node.right
            };
            insert_recursive(child, point, id, depth + 1, dimensions);
        }
    }
}

/// The node with the smallest value along `dimension` in a subtree.
fn find_min<'n>(node: &'n Node, dimension: usize, depth: usize, dimensions: &[usize]) -> &'n Node {
    if split_dimension(dimensions, depth) == dimension {
        return match node.left.as_deref() {
            Some(left) => find_min(left, dimension, depth + 1, dimensions),
            None => node,
        };
    }

    let mut best = node;
    for child in [node.left.as_deref(), node.right.as_deref()].into_iter().flatten() {
        let candidate = find_min(child, dimension, depth + 1, dimensions);
        if candidate.point[dimension] < best.point[dimension] {
            best = candidate;
        }
    }
    best
}

fn remove_recursive(
    slot: &mut Option<Box<Node>>,
    point: &[f64],
    id: usize,
    depth: usize,
    dimensions: &[usize],
) -> bool {
    let Some(node) = slot else {
        return false;
    };

    let dimension = split_dimension(dimensions, depth);

    if node.id != id || node.point != point {
        let child = if point[dimension] < node.point[dimension] {
            &mut node.left
        } else {
            &mut node.right
        };
        return remove_recursive(child, point, id, depth + 1, dimensions);
    }

    // Replace with the minimum of the right subtree along this node's split
    // dimension. Without a right subtree, take the minimum of the left one
    // and move the left subtree to the right.
    let replacement = match (node.left.as_deref(), node.right.as_deref()) {
        (_, Some(right)) => Some((find_min(right, dimension, depth + 1, dimensions), true)),
        (Some(left), None) => Some((find_min(left, dimension, depth + 1, dimensions), false)),
        (None, None) => None,
    }
    .map(|(n, from_right)| (n.point.clone(), n.id, from_right));

    match replacement {
        None => *slot = None,
        Some((replacement_point, replacement_id, true)) => {
            remove_recursive(
                &mut node.right,
                &replacement_point,
                replacement_id,
                depth + 1,
                dimensions,
            );
            node.point = replacement_point;
            node.id = replacement_id;
        }
        Some((replacement_point, replacement_id, false)) => {
            remove_recursive(
                &mut node.left,
                &replacement_point,
                replacement_id,
                depth + 1,
                dimensions,
            );
            node.point = replacement_point;
            node.id = replacement_id;
            node.right = node.left.take();
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{Ciede2000, Euclidean, SquaredEuclidean};
    use crate::rng;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rand::RngExt;

    /// Checks the split invariant for every node, returning the node count.
    fn assert_invariant(node: Option<&Node>, depth: usize, dimensions: &[usize]) -> usize {
        let Some(node) = node else {
            return 0;
        };
        let dimension = split_dimension(dimensions, depth);

        fn all_points<'n>(node: Option<&'n Node>, out: &mut Vec<&'n [f64]>) {
            if let Some(node) = node {
                out.push(&node.point);
                all_points(node.left.as_deref(), out);
                all_points(node.right.as_deref(), out);
            }
        }

        let mut left = Vec::new();
        all_points(node.left.as_deref(), &mut left);
        for p in left {
            assert!(p[dimension] < node.point[dimension], "left subtree out of order");
        }
        let mut right = Vec::new();
        all_points(node.right.as_deref(), &mut right);
        for p in right {
            assert!(p[dimension] >= node.point[dimension], "right subtree out of order");
        }

        1 + assert_invariant(node.left.as_deref(), depth + 1, dimensions)
            + assert_invariant(node.right.as_deref(), depth + 1, dimensions)
    }

    fn grid() -> Vec<Vec<f64>> {
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                points.push(vec![x as f64, y as f64]);
            }
        }
        points
    }

    fn ids(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    fn linear_nearest(points: &[Vec<f64>], query: &[f64]) -> f64 {
        points
            .iter()
            .map(|p| Euclidean.distance(query, p))
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn build_keeps_invariant() {
        let points = grid();
        let tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
        assert_eq!(tree.len(), 25);
        assert_eq!(assert_invariant(tree.root.as_deref(), 0, &[0, 1]), 25);
    }

    #[test]
    fn build_with_duplicate_values() {
        let points = vec![vec![1.0, 0.0]; 6];
        let tree = KdTree::build(&points, &ids(6), vec![0, 1], &Euclidean).unwrap();
        assert_eq!(assert_invariant(tree.root.as_deref(), 0, &[0, 1]), 6);
    }

    #[test]
    fn build_rejects_bad_input() {
        let points = grid();
        assert_eq!(
            KdTree::build(&points, &ids(3), vec![0, 1], &Euclidean).err(),
            Some(KdTreeError::LengthMismatch { points: 25, ids: 3 })
        );
        assert_eq!(
            KdTree::build(&points, &ids(25), vec![], &Euclidean).err(),
            Some(KdTreeError::EmptyDimensions)
        );
        assert_eq!(
            KdTree::build(&points, &ids(25), vec![0, 2], &Euclidean).err(),
            Some(KdTreeError::DimensionOutOfRange {
                dimension: 2,
                found: 2
            })
        );
        assert_eq!(
            KdTree::build(&points[..2], &[7, 7], vec![0], &Euclidean).err(),
            Some(KdTreeError::DuplicateId { id: 7 })
        );
    }

    #[test]
    fn nearest_is_sorted_and_bounded() {
        let points = grid();
        let tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();

        let result = tree.nearest(&[2.1, 2.0], 3, None);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].point, &[2.0, 2.0]);
        assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));

        let filtered = tree.nearest(&[2.1, 2.0], 5, Some(1.0));
        assert!(filtered.iter().all(|n| n.distance < 1.0));
        assert_eq!(filtered.len(), 3);

        assert!(tree.nearest(&[2.0, 2.0], 0, None).is_empty());
    }

    #[test]
    fn nearest_on_subset_of_dimensions() {
        let points = vec![vec![0.0, 0.0, 0.0], vec![1.0, 5.0, 9.0], vec![4.0, 4.0, 4.0]];
        let tree = KdTree::build(&points, &[10, 11, 12], vec![2], &Euclidean).unwrap();
        let result = tree.nearest(&[1.0, 5.0, 8.0], 1, None);
        assert_eq!(result[0].id, 11);
    }

    #[test]
    fn duplicate_insert_leaves_tree_unchanged() {
        let points = grid();
        let mut tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
        let before = tree.root.clone();

        let err = tree.insert(&[9.0, 9.0], 3).unwrap_err();
        assert_eq!(err, KdTreeError::DuplicateId { id: 3 });
        assert_eq!(tree.root, before);
        assert_eq!(tree.len(), 25);
    }

    #[test]
    fn insert_then_find() {
        let points = grid();
        let mut tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
        tree.insert(&[2.5, 2.5], 100).unwrap();
        assert!(tree.contains_id(100));
        assert_eq!(tree.nearest(&[2.6, 2.6], 1, None)[0].id, 100);
        assert_eq!(assert_invariant(tree.root.as_deref(), 0, &[0, 1]), 26);
    }

    #[test]
    fn remove_missing_fails() {
        let points = grid();
        let mut tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
        assert_eq!(
            tree.remove(&[0.0, 0.0], 99),
            Err(KdTreeError::NotFound { id: 99 })
        );
        // Right id, wrong point
        assert_eq!(
            tree.remove(&[0.5, 0.0], 0),
            Err(KdTreeError::NotFound { id: 0 })
        );
        assert_eq!(tree.len(), 25);
    }

    #[test]
    fn remove_every_node_in_turn() {
        let points = grid();
        let mut tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();

        // The root always has two children here, until the tree is small
        for (i, point) in points.iter().enumerate() {
            tree.remove(point, i).unwrap();
            let remaining = points.len() - i - 1;
            assert_eq!(tree.len(), remaining);
            assert_eq!(assert_invariant(tree.root.as_deref(), 0, &[0, 1]), remaining);
            for other in &points[i + 1..] {
                let nearest = tree.nearest(other, 1, None);
                assert_eq!(nearest[0].distance, 0.0);
            }
        }
        assert!(tree.is_empty());
        assert!(tree.root.is_none());
    }

    #[test]
    fn update_relocates() {
        let points = grid();
        let mut tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();

        // Moving the root far past its split plane
        let root_point = tree.root.as_ref().unwrap().point.clone();
        let root_id = tree.root.as_ref().unwrap().id;
        tree.update(&root_point, root_id, &[-10.0, 40.0]).unwrap();

        assert_eq!(tree.len(), 25);
        assert_eq!(assert_invariant(tree.root.as_deref(), 0, &[0, 1]), 25);
        assert_eq!(tree.nearest(&[-10.0, 40.0], 1, None)[0].id, root_id);

        assert_eq!(
            tree.update(&[1.0, 1.0], 1000, &[0.0, 0.0]),
            Err(KdTreeError::NotFound { id: 1000 })
        );
    }

    #[test]
    fn range_query() {
        let points = grid();
        let tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
        let mut found: Vec<Vec<f64>> = tree
            .range(&[1.0, 1.0], &[2.0, 3.0])
            .unwrap()
            .into_iter()
            .map(|(p, _)| p.to_vec())
            .collect();
        found.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(
            found,
            vec![
                vec![1.0, 1.0],
                vec![1.0, 2.0],
                vec![1.0, 3.0],
                vec![2.0, 1.0],
                vec![2.0, 2.0],
                vec![2.0, 3.0],
            ]
        );
    }

    #[test]
    fn nearest_matches_linear_scan_randomized() {
        let mut rng = rng::new();
        for trial in 0..150 {
            let n = 1 + trial % 40;
            let dim = 1 + trial % 4;
            let points: Vec<Vec<f64>> = (0..n)
                .map(|_| (0..dim).map(|_| rng.random_range(-50.0..50.0)).collect())
                .collect();
            let tree =
                KdTree::build(&points, &ids(n), (0..dim).collect(), &SquaredEuclidean).unwrap();

            let query: Vec<f64> = (0..dim).map(|_| rng.random_range(-60.0..60.0)).collect();
            let expected = linear_nearest(&points, &query);
            let found = tree.nearest(&query, 1, None);
            assert_eq!(found.len(), 1);
            assert!((found[0].distance.sqrt() - expected).abs() < 1e-9);
        }
    }

    proptest! {
        #[test]
        fn nearest_matches_linear_scan(
            points in prop::collection::vec(prop::collection::vec(-100.0f64..100.0, 3), 1..60),
            query in prop::collection::vec(-120.0f64..120.0, 3),
            k in 1usize..5,
        ) {
            let tree = KdTree::build(&points, &ids(points.len()), vec![0, 1, 2], &Euclidean).unwrap();
            let found = tree.nearest(&query, k, None);

            let mut expected: Vec<f64> = points.iter().map(|p| Euclidean.distance(&query, p)).collect();
            expected.sort_by(f64::total_cmp);
            expected.truncate(k);

            prop_assert_eq!(found.len(), expected.len());
            for (n, e) in found.iter().zip(&expected) {
                prop_assert!((n.distance - e).abs() < 1e-9);
            }
        }

        #[test]
        fn nearest_under_ciede2000_matches_linear_scan(
            points in prop::collection::vec(
                (0.0f64..100.0, -100.0f64..100.0, -100.0f64..100.0), 1..40),
            query in (0.0f64..100.0, -100.0f64..100.0, -100.0f64..100.0),
        ) {
            let points: Vec<Vec<f64>> = points.iter().map(|&(l, a, b)| vec![l, a, b]).collect();
            let query = [query.0, query.1, query.2];
            let metric = Ciede2000::default();
            let tree = KdTree::build(&points, &ids(points.len()), vec![0, 1, 2], &metric).unwrap();

            let expected = points
                .iter()
                .map(|p| metric.distance(&query, p))
                .fold(f64::INFINITY, f64::min);
            let found = tree.nearest(&query, 1, None);
            prop_assert_eq!(found[0].distance, expected);
        }

        #[test]
        fn range_matches_filter(
            points in prop::collection::vec(prop::collection::vec(-10i32..10, 2), 1..50),
            lo in prop::collection::vec(-10i32..10, 2),
            span in prop::collection::vec(0i32..10, 2),
        ) {
            let points: Vec<Vec<f64>> = points
                .iter()
                .map(|p| p.iter().map(|&v| v as f64).collect())
                .collect();
            let min: Vec<f64> = lo.iter().map(|&v| v as f64).collect();
            let max: Vec<f64> = lo.iter().zip(&span).map(|(&l, &s)| (l + s) as f64).collect();

            let tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
            let mut found: Vec<usize> = tree.range(&min, &max).unwrap().into_iter().map(|(_, id)| id).collect();
            found.sort();

            let expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| (0..2).all(|d| p[d] >= min[d] && p[d] <= max[d]))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(found, expected);
        }

        #[test]
        fn remove_keeps_invariant(
            points in prop::collection::vec(prop::collection::vec(-5i32..5, 2), 1..40),
            removals in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let points: Vec<Vec<f64>> = points
                .iter()
                .map(|p| p.iter().map(|&v| v as f64).collect())
                .collect();
            let mut tree = KdTree::build(&points, &ids(points.len()), vec![0, 1], &Euclidean).unwrap();
            let mut alive: Vec<usize> = ids(points.len());

            for index in removals {
                if alive.is_empty() {
                    break;
                }
                let id = alive.remove(index.index(alive.len()));
                tree.remove(&points[id], id).unwrap();
                prop_assert_eq!(assert_invariant(tree.root.as_deref(), 0, &[0, 1]), alive.len());
            }

            for &id in &alive {
                prop_assert!(tree.contains_id(id));
                let nearest = tree.nearest(&points[id], 1, None);
                prop_assert_eq!(nearest[0].distance, 0.0);
            }
        }
    }
}
