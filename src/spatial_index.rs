//! A 3-D nearest-neighbor index over node positions.
//!
//! Only `insert` and single-nearest `query` are needed; no deletion is
//! required within a round since the whole structure is rebuilt whenever
//! the tree is reset. An unbalanced, incrementally-built k-d tree is the
//! reference implementation, following the recursive axis-alternating
//! split used by k-d trees elsewhere in this corpus, but built over an
//! arena of indices (rather than borrowed references) so that it can be
//! grown one node at a time as the RRT grows.

use nalgebra::Vector3;

struct KdNode {
    point: Vector3<f64>,
    /// Opaque payload: the index of the corresponding node in the planner
    /// tree's own arena.
    payload: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Incrementally-built k-d tree over 3-D points, keyed by an opaque
/// `usize` payload (the planner tree's node index).
pub struct SpatialIndex {
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        SpatialIndex { nodes: Vec::new(), root: None }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert `point` with opaque `payload`.
    pub fn insert(&mut self, point: Vector3<f64>, payload: usize) {
        let idx = self.nodes.len();
        self.nodes.push(KdNode { point, payload, left: None, right: None });

        let mut cursor = match self.root {
            None => {
                self.root = Some(idx);
                return;
            }
            Some(r) => r,
        };
        let mut axis = 0usize;
        loop {
            let go_left = component(&point, axis) < component(&self.nodes[cursor].point, axis);
            let next = if go_left { self.nodes[cursor].left } else { self.nodes[cursor].right };
            match next {
                Some(n) => {
                    cursor = n;
                    axis = (axis + 1) % 3;
                }
                None => {
                    if go_left {
                        self.nodes[cursor].left = Some(idx);
                    } else {
                        self.nodes[cursor].right = Some(idx);
                    }
                    return;
                }
            }
        }
    }

    /// Nearest stored point to `query`, if the index is non-empty.
    /// Returns `(payload, euclidean distance)`.
    pub fn nearest(&self, query: Vector3<f64>) -> Option<(usize, f64)> {
        let root = self.root?;
        let mut best: Option<(usize, f64)> = None;
        self.nearest_rec(root, query, 0, &mut best);
        best
    }

    fn nearest_rec(&self, cur: usize, query: Vector3<f64>, axis: usize, best: &mut Option<(usize, f64)>) {
        let node = &self.nodes[cur];
        let d = (node.point - query).norm();
        if best.map_or(true, |(_, bd)| d < bd) {
            *best = Some((node.payload, d));
        }

        let q_axis = component(&query, axis);
        let n_axis = component(&node.point, axis);
        let (near, far) = if q_axis < n_axis { (node.left, node.right) } else { (node.right, node.left) };

        if let Some(n) = near {
            self.nearest_rec(n, query, (axis + 1) % 3, best);
        }
        let axis_dist = (q_axis - n_axis).abs();
        if far.is_some() && best.map_or(true, |(_, bd)| axis_dist < bd) {
            if let Some(f) = far {
                self.nearest_rec(f, query, (axis + 1) % 3, best);
            }
        }
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn component(v: &Vector3<f64>, axis: usize) -> f64 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}
