use std::fmt;

use crate::config::constants::{
    PROGRESS_REPORT_STEPS, QUADTREE_MAX_DEPTH, QUADTREE_MIN_HALF_SIZE, QUADTREE_NODE_CAPACITY,
    RADIUS_EPSILON,
};
use crate::data::poi::Coordinate;
use crate::utils::traits::{BuildProgress, NoProgress};

/// Nearest-point and radius-proximity queries over a fixed set of 2D points.
///
/// Results are indices into the slice the locator was built from.
pub trait PointLocator: Send + Sync {
    fn build_with_progress(points: &[Coordinate], progress: &mut dyn BuildProgress) -> Self
    where
        Self: Sized;

    fn build(points: &[Coordinate]) -> Self
    where
        Self: Sized,
    {
        Self::build_with_progress(points, &mut NoProgress)
    }

    /// Closest indexed point; ties go to the lowest index. `None` when empty.
    fn nearest(&self, point: &Coordinate) -> Option<usize>;

    /// Every index whose distance to `point` is <= `radius`, in ascending order.
    fn within_radius(&self, point: &Coordinate, radius: f64) -> Vec<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of inserts between two progress callbacks.
fn progress_step(total: usize) -> usize {
    total.div_ceil(PROGRESS_REPORT_STEPS).max(1)
}

fn report_progress(progress: &mut dyn BuildProgress, done: usize, total: usize, step: usize) {
    if done % step == 0 || done == total {
        progress.report(done, total);
    }
}

#[derive(Clone, Debug)]
pub struct Boundary {
    center: Coordinate,
    half_width: f64,
    half_height: f64,
}

impl Boundary {
    fn enclosing(points: &[Coordinate]) -> Self {
        if points.is_empty() {
            return Boundary {
                center: Coordinate::new(0.0, 0.0),
                half_width: QUADTREE_MIN_HALF_SIZE,
                half_height: QUADTREE_MIN_HALF_SIZE,
            };
        }
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Boundary {
            center: Coordinate::new(min_x + (max_x - min_x) / 2.0, min_y + (max_y - min_y) / 2.0),
            half_width: ((max_x - min_x) / 2.0).max(QUADTREE_MIN_HALF_SIZE),
            half_height: ((max_y - min_y) / 2.0).max(QUADTREE_MIN_HALF_SIZE),
        }
    }

    /// Squared distance from `point` to the closest point of this rectangle.
    fn min_distance_sq(&self, point: &Coordinate) -> f64 {
        let dx = ((point.x - self.center.x).abs() - self.half_width).max(0.0);
        let dy = ((point.y - self.center.y).abs() - self.half_height).max(0.0);
        dx * dx + dy * dy
    }
}

#[derive(Clone, Debug)]
pub struct QuadTreeNode {
    boundary: Boundary,
    children: Option<Box<[QuadTreeNode; 4]>>,
    points: Vec<usize>,
    depth: usize,
}

impl QuadTreeNode {
    pub fn new(center: Coordinate, half_width: f64, half_height: f64, depth: usize) -> Self {
        Self {
            boundary: Boundary {
                center,
                half_width,
                half_height,
            },
            children: None,
            points: Vec::new(),
            depth,
        }
    }

    fn subdivide(&mut self, coords: &[Coordinate]) {
        let x = self.boundary.center.x;
        let y = self.boundary.center.y;
        let hw = self.boundary.half_width / 2.0;
        let hh = self.boundary.half_height / 2.0;
        let depth = self.depth + 1;

        self.children = Some(Box::new([
            // Northwest
            QuadTreeNode::new(Coordinate::new(x - hw, y + hh), hw, hh, depth),
            // Northeast
            QuadTreeNode::new(Coordinate::new(x + hw, y + hh), hw, hh, depth),
            // Southwest
            QuadTreeNode::new(Coordinate::new(x - hw, y - hh), hw, hh, depth),
            // Southeast
            QuadTreeNode::new(Coordinate::new(x + hw, y - hh), hw, hh, depth),
        ]));

        for idx in std::mem::take(&mut self.points) {
            self.insert(idx, coords);
        }
    }

    fn child_slot(&self, point: &Coordinate) -> usize {
        let east = point.x >= self.boundary.center.x;
        let north = point.y >= self.boundary.center.y;
        match (north, east) {
            (true, false) => 0,
            (true, true) => 1,
            (false, false) => 2,
            (false, true) => 3,
        }
    }

    fn insert(&mut self, idx: usize, coords: &[Coordinate]) {
        let slot = self.child_slot(&coords[idx]);
        if let Some(children) = &mut self.children {
            children[slot].insert(idx, coords);
            return;
        }

        self.points.push(idx);
        if self.points.len() > QUADTREE_NODE_CAPACITY && self.depth < QUADTREE_MAX_DEPTH {
            self.subdivide(coords);
        }
    }

    pub fn intersects_circle(&self, center: &Coordinate, radius: f64) -> bool {
        let reach = radius * (1.0 + RADIUS_EPSILON) + RADIUS_EPSILON;
        self.boundary.min_distance_sq(center) <= reach * reach
    }
}

/// Bucketed point quadtree over a fixed coordinate set.
#[derive(Clone)]
pub struct QuadTree {
    root: QuadTreeNode,
    coords: Vec<Coordinate>,
}

impl fmt::Debug for QuadTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadTree")
            .field("points", &self.coords.len())
            .field("depth", &self.depth())
            .finish()
    }
}

impl QuadTree {
    /// Depth of the deepest leaf; 0 for a tree that never split.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            deepest = deepest.max(node.depth);
            if let Some(children) = &node.children {
                stack.extend(children.iter());
            }
        }
        deepest
    }

    fn search_nearest(&self, node: &QuadTreeNode, point: &Coordinate, best: &mut Option<(f64, usize)>) {
        if let Some((best_sq, _)) = *best {
            if node.boundary.min_distance_sq(point) > best_sq {
                return;
            }
        }

        match &node.children {
            None => {
                for &idx in &node.points {
                    let c = &self.coords[idx];
                    let dx = c.x - point.x;
                    let dy = c.y - point.y;
                    let d_sq = dx * dx + dy * dy;
                    let closer = match *best {
                        None => true,
                        Some((best_sq, best_idx)) => {
                            d_sq < best_sq || (d_sq == best_sq && idx < best_idx)
                        }
                    };
                    if closer {
                        *best = Some((d_sq, idx));
                    }
                }
            }
            Some(children) => {
                let mut order: Vec<(f64, &QuadTreeNode)> = children
                    .iter()
                    .map(|child| (child.boundary.min_distance_sq(point), child))
                    .collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (_, child) in order {
                    self.search_nearest(child, point, best);
                }
            }
        }
    }
}

impl PointLocator for QuadTree {
    fn build_with_progress(points: &[Coordinate], progress: &mut dyn BuildProgress) -> Self {
        let boundary = Boundary::enclosing(points);
        let mut root = QuadTreeNode::new(boundary.center, boundary.half_width, boundary.half_height, 0);
        let total = points.len();
        let step = progress_step(total);

        for idx in 0..total {
            root.insert(idx, points);
            report_progress(progress, idx + 1, total, step);
        }

        QuadTree {
            root,
            coords: points.to_vec(),
        }
    }

    fn nearest(&self, point: &Coordinate) -> Option<usize> {
        let mut best = None;
        self.search_nearest(&self.root, point, &mut best);
        best.map(|(_, idx)| idx)
    }

    fn within_radius(&self, point: &Coordinate, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        if radius.is_nan() || radius < 0.0 {
            return found;
        }

        let mut nodes_to_visit = vec![&self.root];
        while let Some(node) = nodes_to_visit.pop() {
            if !node.intersects_circle(point, radius) {
                continue;
            }
            match &node.children {
                Some(children) => nodes_to_visit.extend(children.iter()),
                None => found.extend(
                    node.points
                        .iter()
                        .copied()
                        .filter(|&idx| point.distance_to(&self.coords[idx]) <= radius),
                ),
            }
        }

        found.sort_unstable();
        found
    }

    fn len(&self) -> usize {
        self.coords.len()
    }
}

/// O(n) locator, used to cross-check the quadtree.
#[derive(Clone, Debug)]
pub struct LinearScan {
    coords: Vec<Coordinate>,
}

impl PointLocator for LinearScan {
    fn build_with_progress(points: &[Coordinate], progress: &mut dyn BuildProgress) -> Self {
        let total = points.len();
        let step = progress_step(total);
        let mut coords = Vec::with_capacity(total);
        for (i, p) in points.iter().enumerate() {
            coords.push(*p);
            report_progress(progress, i + 1, total, step);
        }
        LinearScan { coords }
    }

    fn nearest(&self, point: &Coordinate) -> Option<usize> {
        let mut best: Option<(f64, usize)> = None;
        for (idx, c) in self.coords.iter().enumerate() {
            let dx = c.x - point.x;
            let dy = c.y - point.y;
            let d_sq = dx * dx + dy * dy;
            if best.map_or(true, |(best_sq, _)| d_sq < best_sq) {
                best = Some((d_sq, idx));
            }
        }
        best.map(|(_, idx)| idx)
    }

    fn within_radius(&self, point: &Coordinate, radius: f64) -> Vec<usize> {
        self.coords
            .iter()
            .enumerate()
            .filter(|(_, c)| point.distance_to(c) <= radius)
            .map(|(idx, _)| idx)
            .collect()
    }

    fn len(&self) -> usize {
        self.coords.len()
    }
}
