//! Arena-indexed bounding volume hierarchy over mesh triangles.
//!
//! Nodes live in one `Vec` and refer to each other by index. Triangles are
//! referenced through a permutation so the source buffers stay untouched.
//! Built once per mesh, queried read-only and shared across threads.
use glam::DVec3;

use crate::bounds::Aabb;

/// Maximum triangles stored in a leaf.
pub const LEAF_SIZE: usize = 4;

/// Slack added to node boxes for the ray test so that triangles lying in a
/// box face are not culled by rounding.
const RAY_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf { start: u32, count: u32 },
    Branch { left: u32, right: u32 },
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    kind: NodeKind,
}

#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    order: Vec<u32>,
}

impl Bvh {
    /// Median split on the longest axis of each node's box.
    pub fn build(triangle_bounds: &[Aabb]) -> Self {
        let mut bvh = Self {
            nodes: Vec::with_capacity(2 * triangle_bounds.len() / LEAF_SIZE + 1),
            order: (0..triangle_bounds.len() as u32).collect(),
        };
        if !triangle_bounds.is_empty() {
            let centroids: Vec<DVec3> = triangle_bounds.iter().map(Aabb::center).collect();
            bvh.build_range(triangle_bounds, &centroids, 0, triangle_bounds.len());
        }
        bvh
    }

    fn build_range(&mut self, tri_bounds: &[Aabb], centroids: &[DVec3], start: usize, end: usize) -> u32 {
        let mut bounds = Aabb::empty();
        for &t in &self.order[start..end] {
            bounds.expand_aabb(&tri_bounds[t as usize]);
        }

        let index = self.nodes.len() as u32;
        let count = end - start;
        self.nodes.push(BvhNode {
            bounds,
            kind: NodeKind::Leaf { start: start as u32, count: count as u32 },
        });
        if count <= LEAF_SIZE {
            return index;
        }

        let axis = bounds.longest_axis();
        self.order[start..end].sort_by(|&a, &b| centroids[a as usize][axis].total_cmp(&centroids[b as usize][axis]));

        let mid = start + count / 2;
        let left = self.build_range(tri_bounds, centroids, start, mid);
        let right = self.build_range(tri_bounds, centroids, mid, end);
        self.nodes[index as usize].kind = NodeKind::Branch { left, right };
        index
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Visit candidate triangles nearest-box-first. `visit` gets a triangle
    /// index and returns the current best squared distance; subtrees whose
    /// boxes lie strictly farther than that are skipped.
    pub fn for_each_near<F>(&self, p: DVec3, mut visit: F)
    where
        F: FnMut(usize) -> f64,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut best = f64::INFINITY;
        let mut stack = vec![0u32];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n as usize];
            if node.bounds.distance_squared(p) > best {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &t in &self.order[start as usize..(start + count) as usize] {
                        best = visit(t as usize);
                    }
                }
                NodeKind::Branch { left, right } => {
                    let dl = self.nodes[left as usize].bounds.distance_squared(p);
                    let dr = self.nodes[right as usize].bounds.distance_squared(p);
                    // Nearer child is popped first.
                    if dl <= dr {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }
    }

    /// Visit every triangle whose leaf box the ray touches.
    pub fn for_each_on_ray<F>(&self, origin: DVec3, dir: DVec3, mut visit: F)
    where
        F: FnMut(usize),
    {
        if self.nodes.is_empty() {
            return;
        }
        let inv_dir = dir.recip();
        let mut stack = vec![0u32];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n as usize];
            if !node.bounds.expanded(RAY_SLACK).intersects_ray(origin, inv_dir) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &t in &self.order[start as usize..(start + count) as usize] {
                        visit(t as usize);
                    }
                }
                NodeKind::Branch { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_boxes(n: usize) -> Vec<Aabb> {
        (0..n)
            .map(|i| {
                let o = DVec3::new(i as f64 * 2.0, 0.0, 0.0);
                Aabb::new(o, o + DVec3::ONE)
            })
            .collect()
    }

    #[test]
    fn empty_input_builds_empty_tree() {
        let bvh = Bvh::build(&[]);
        assert!(bvh.is_empty());
        let mut hits = 0;
        bvh.for_each_near(DVec3::ZERO, |_| {
            hits += 1;
            0.0
        });
        assert_eq!(hits, 0);
    }

    #[test]
    fn every_triangle_lands_in_one_leaf() {
        let bvh = Bvh::build(&unit_boxes(37));
        let mut seen = vec![0u32; 37];
        bvh.for_each_on_ray(DVec3::new(-5.0, 0.5, 0.5), DVec3::X, |t| seen[t] += 1);
        assert!(seen.iter().all(|&c| c == 1), "{seen:?}");
        assert!(bvh.node_count() > 1);
    }

    #[test]
    fn near_query_prunes_far_leaves() {
        let boxes = unit_boxes(64);
        let bvh = Bvh::build(&boxes);
        let p = DVec3::new(0.5, 0.5, 0.5);
        let mut visited = 0;
        let mut best = f64::INFINITY;
        bvh.for_each_near(p, |t| {
            visited += 1;
            best = best.min(boxes[t].distance_squared(p));
            best
        });
        assert!(visited <= 2 * LEAF_SIZE, "visited {visited}");
    }
}
