//! Signed distance from a point to a reference mesh.
//!
//! The magnitude is the Euclidean distance to the closest surface point. The
//! sign comes from a single-ray parity test: negative inside, positive
//! outside. Parity misclassifies rays that graze silhouette edges or pass
//! through open meshes; it is a heuristic, not a robust point-in-mesh test.
//!
//! Queries either scan every triangle or walk a [`Bvh`] built at attach
//! time. Both return identical answers.
pub mod bvh;
pub mod triangle;

use glam::DVec3;

use crate::bounds::Aabb;
use crate::error::{FractalError, Result};
use crate::mesh::Mesh;
use bvh::Bvh;
use triangle::{closest_point_on_triangle, ray_triangle};

/// Offset of the parity ray origin along its direction.
const RAY_ORIGIN_OFFSET: f64 = 1e-7;

/// Direction of the parity ray, not aligned with any axis or diagonal.
fn ray_direction() -> DVec3 {
    DVec3::new(0.4367, 0.7071, 0.5564).normalize()
}

/// Nearest surface point found by [`MeshDistance::closest_point`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub triangle: usize,
    pub position: DVec3,
    pub distance_squared: f64,
}

impl ClosestPoint {
    /// Lower distance wins; ties go to the lower triangle index.
    #[inline]
    fn beats(&self, other: &ClosestPoint) -> bool {
        self.distance_squared < other.distance_squared
            || (self.distance_squared == other.distance_squared && self.triangle < other.triangle)
    }
}

/// Read-only distance oracle over a snapshot of a mesh's triangles.
#[derive(Debug, Clone, Default)]
pub struct MeshDistance {
    triangles: Vec<[DVec3; 3]>,
    bvh: Option<Bvh>,
}

impl MeshDistance {
    /// Oracle answering every query with a linear scan.
    pub fn new(mesh: &Mesh) -> Self {
        Self::build(mesh, false)
    }

    /// Oracle backed by a bounding volume hierarchy.
    pub fn with_bvh(mesh: &Mesh) -> Self {
        Self::build(mesh, true)
    }

    pub fn build(mesh: &Mesh, use_bvh: bool) -> Self {
        let triangles: Vec<[DVec3; 3]> = (0..mesh.triangle_count()).map(|t| mesh.triangle(t)).collect();
        let bvh = use_bvh.then(|| {
            let bounds: Vec<Aabb> = triangles.iter().map(|tri| Aabb::from_points(tri.iter())).collect();
            Bvh::build(&bounds)
        });
        Self { triangles, bvh }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn has_bvh(&self) -> bool {
        self.bvh.is_some()
    }

    #[inline]
    fn candidate(&self, t: usize, p: DVec3) -> ClosestPoint {
        let [a, b, c] = self.triangles[t];
        let position = closest_point_on_triangle(p, a, b, c);
        ClosestPoint { triangle: t, position, distance_squared: position.distance_squared(p) }
    }

    /// Closest point on the mesh surface to `p`.
    pub fn closest_point(&self, p: DVec3) -> Result<ClosestPoint> {
        if self.triangles.is_empty() {
            return Err(FractalError::EmptyMesh);
        }
        let mut best = ClosestPoint { triangle: usize::MAX, position: p, distance_squared: f64::INFINITY };
        match &self.bvh {
            Some(bvh) => bvh.for_each_near(p, |t| {
                let c = self.candidate(t, p);
                if c.beats(&best) {
                    best = c;
                }
                best.distance_squared
            }),
            None => {
                for t in 0..self.triangles.len() {
                    let c = self.candidate(t, p);
                    if c.beats(&best) {
                        best = c;
                    }
                }
            }
        }
        Ok(best)
    }

    /// Odd number of ray crossings means inside.
    pub fn is_inside(&self, p: DVec3) -> bool {
        let dir = ray_direction();
        let origin = p + dir * RAY_ORIGIN_OFFSET;
        let mut crossings = 0usize;
        let mut test = |t: usize| {
            let [a, b, c] = self.triangles[t];
            if ray_triangle(origin, dir, a, b, c).is_some() {
                crossings += 1;
            }
        };
        match &self.bvh {
            Some(bvh) => bvh.for_each_on_ray(origin, dir, test),
            None => (0..self.triangles.len()).for_each(&mut test),
        }
        crossings % 2 == 1
    }

    /// Distance to the surface, `+inf` when there is no surface.
    pub fn unsigned_distance(&self, p: DVec3) -> f64 {
        match self.closest_point(p) {
            Ok(c) => c.distance_squared.sqrt(),
            Err(_) => f64::INFINITY,
        }
    }

    /// Negative inside, positive outside, `+inf` when there is no surface.
    pub fn signed_distance(&self, p: DVec3) -> f64 {
        let d = self.unsigned_distance(p);
        if d.is_finite() && self.is_inside(p) {
            -d
        } else {
            d
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_cube() -> Mesh {
        Mesh::cuboid(DVec3::ZERO, DVec3::ONE)
    }

    #[test]
    fn empty_mesh_reports_no_surface() {
        let oracle = MeshDistance::new(&Mesh::new());
        assert!(matches!(oracle.closest_point(DVec3::ZERO), Err(FractalError::EmptyMesh)));
        assert_eq!(oracle.signed_distance(DVec3::ZERO), f64::INFINITY);
        assert!(!oracle.is_inside(DVec3::ZERO));
    }

    #[test]
    fn sphere_parity_inside_and_out() {
        let sphere = Mesh::uv_sphere(1.0, 24, 12);
        let radius = sphere.bounds.extent().max_element() * 0.5;
        for oracle in [MeshDistance::new(&sphere), MeshDistance::with_bvh(&sphere)] {
            assert!(oracle.is_inside(DVec3::ZERO));
            assert!(!oracle.is_inside(DVec3::new(2.0 * radius, 0.0, 0.0)));
            assert!(!oracle.is_inside(DVec3::new(0.0, -2.0 * radius, 0.3)));
        }
    }

    #[test]
    fn cube_signed_distance_has_glossary_sign() {
        let oracle = MeshDistance::new(&unit_cube());
        assert_abs_diff_eq!(oracle.signed_distance(DVec3::splat(0.5)), -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(oracle.signed_distance(DVec3::new(0.5, 0.5, 1.25)), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(oracle.signed_distance(DVec3::new(0.5, 0.5, 0.9)), -0.1, epsilon = 1e-12);
        // Corner region: distance to the vertex.
        assert_abs_diff_eq!(oracle.signed_distance(DVec3::splat(2.0)), 3f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn closest_point_lies_on_surface() {
        let oracle = MeshDistance::new(&unit_cube());
        let c = oracle.closest_point(DVec3::new(0.3, 2.0, 0.6)).unwrap();
        assert!(c.position.abs_diff_eq(DVec3::new(0.3, 1.0, 0.6), 1e-12));
        assert!(c.triangle < 12);
    }

    #[test]
    fn bvh_matches_linear_scan() {
        let sphere = Mesh::uv_sphere(1.0, 32, 16);
        let linear = MeshDistance::new(&sphere);
        let tree = MeshDistance::with_bvh(&sphere);
        assert!(tree.has_bvh());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let p = DVec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));
            assert_eq!(linear.closest_point(p).unwrap(), tree.closest_point(p).unwrap(), "at {p:?}");
            assert_eq!(linear.is_inside(p), tree.is_inside(p), "at {p:?}");
            assert_eq!(linear.signed_distance(p).to_bits(), tree.signed_distance(p).to_bits());
        }
    }

    #[test]
    fn sphere_distance_tracks_radius() {
        let sphere = Mesh::uv_sphere(1.0, 48, 24);
        let oracle = MeshDistance::with_bvh(&sphere);
        // Chordal error for this tessellation stays well under 0.01.
        assert_abs_diff_eq!(oracle.signed_distance(DVec3::new(0.0, 0.0, 3.0)), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(oracle.signed_distance(DVec3::new(1.7, 0.2, 0.1)), 0.7146, epsilon = 0.01);
        assert!(oracle.signed_distance(DVec3::new(0.1, 0.0, 0.2)) < -0.7);
    }
}
