//! Plain indexed-triangle mesh used as both input and output of the pipeline.
//! Coordinate math uses f64.

use std::collections::HashMap;

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::distance::bvh::Bvh;
use crate::error::{FractalError, Result};

/// Indexed triangle mesh.
///
/// Invariants: `normals` and `uvs` are either empty or one entry per vertex;
/// `indices.len()` is a multiple of 3 and every index is `< positions.len()`;
/// `bounds` matches `positions` after every (re)import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<DVec3>,
    pub normals: Vec<DVec3>,
    pub uvs: Vec<DVec2>,
    pub indices: Vec<u32>,
    /// Opaque host material handle, carried from input to output.
    pub material: Option<String>,
    /// `minVert` / `maxVert` of the host representation.
    pub bounds: Aabb,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from raw buffers, checking the indexed-triangle invariants.
    pub fn from_parts(
        positions: Vec<DVec3>,
        normals: Vec<DVec3>,
        uvs: Vec<DVec2>,
        indices: Vec<u32>,
    ) -> Result<Self> {
        let mut mesh = Self { positions, normals, uvs, indices, material: None, bounds: Aabb::empty() };
        mesh.validate()?;
        mesh.recompute_bounds();
        Ok(mesh)
    }

    /// Import polygons of arbitrary arity, fan-triangulating each one around
    /// its first vertex. Polygons with fewer than 3 vertices are dropped.
    pub fn from_polygons(positions: Vec<DVec3>, polygons: &[Vec<u32>]) -> Result<Self> {
        let mut indices = Vec::new();
        for poly in polygons {
            if poly.len() < 3 {
                continue;
            }
            for i in 1..poly.len() - 1 {
                indices.extend_from_slice(&[poly[0], poly[i], poly[i + 1]]);
            }
        }
        Self::from_parts(positions, Vec::new(), Vec::new(), indices)
    }

    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(FractalError::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let n = self.positions.len();
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(FractalError::InvalidMesh(format!("index {bad} out of range for {n} vertices")));
        }
        if !self.normals.is_empty() && self.normals.len() != n {
            return Err(FractalError::InvalidMesh(format!(
                "{} normals for {n} vertices",
                self.normals.len()
            )));
        }
        if !self.uvs.is_empty() && self.uvs.len() != n {
            return Err(FractalError::InvalidMesh(format!("{} uvs for {n} vertices", self.uvs.len())));
        }
        Ok(())
    }

    pub fn recompute_bounds(&mut self) {
        self.bounds = Aabb::from_points(self.positions.iter());
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Vertex positions of triangle `t`.
    #[inline]
    pub fn triangle(&self, t: usize) -> [DVec3; 3] {
        let i = &self.indices[t * 3..t * 3 + 3];
        [
            self.positions[i[0] as usize],
            self.positions[i[1] as usize],
            self.positions[i[2] as usize],
        ]
    }

    /// Append another mesh, offsetting its indices. Normals and uvs are kept
    /// only while both sides carry them.
    pub fn append(&mut self, other: &Mesh) {
        let base = self.positions.len() as u32;
        let keep_normals = self.normals.len() == self.positions.len() && other.normals.len() == other.positions.len();
        let keep_uvs = self.uvs.len() == self.positions.len() && other.uvs.len() == other.positions.len();

        self.positions.extend_from_slice(&other.positions);
        if keep_normals {
            self.normals.extend_from_slice(&other.normals);
        } else {
            self.normals.clear();
        }
        if keep_uvs {
            self.uvs.extend_from_slice(&other.uvs);
        } else {
            self.uvs.clear();
        }
        self.indices.extend(other.indices.iter().map(|i| i + base));
        self.bounds.expand_aabb(&other.bounds);
    }

    /// Area-weighted vertex normals accumulated from face normals.
    pub fn recompute_normals(&mut self) {
        let mut acc = vec![DVec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let face = (self.positions[b] - self.positions[a]).cross(self.positions[c] - self.positions[a]);
            acc[a] += face;
            acc[b] += face;
            acc[c] += face;
        }
        self.normals = acc.into_iter().map(|n| n.normalize_or_zero()).collect();
    }

    /// Merge vertices whose positions quantize to the same cell of size
    /// `tolerance`. Triangles that collapse are removed.
    pub fn weld_vertices(&mut self, tolerance: f64) {
        if self.positions.is_empty() || tolerance <= 0.0 {
            return;
        }
        let inv = 1.0 / tolerance;
        let mut lookup: HashMap<[i64; 3], u32> = HashMap::with_capacity(self.positions.len());
        let mut remap = Vec::with_capacity(self.positions.len());
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        let has_normals = self.normals.len() == self.positions.len();
        let has_uvs = self.uvs.len() == self.positions.len();

        for (i, p) in self.positions.iter().enumerate() {
            let key = [
                (p.x * inv).round() as i64,
                (p.y * inv).round() as i64,
                (p.z * inv).round() as i64,
            ];
            let idx = *lookup.entry(key).or_insert_with(|| {
                positions.push(*p);
                if has_normals {
                    normals.push(self.normals[i]);
                }
                if has_uvs {
                    uvs.push(self.uvs[i]);
                }
                (positions.len() - 1) as u32
            });
            remap.push(idx);
        }

        let mut indices = Vec::with_capacity(self.indices.len());
        for tri in self.indices.chunks_exact(3) {
            let t = [remap[tri[0] as usize], remap[tri[1] as usize], remap[tri[2] as usize]];
            if t[0] != t[1] && t[1] != t[2] && t[0] != t[2] {
                indices.extend_from_slice(&t);
            }
        }

        self.positions = positions;
        self.normals = normals;
        self.uvs = uvs;
        self.indices = indices;
        self.recompute_bounds();
    }

    /// Index of the vertex closest to `p`, or `None` for an empty mesh.
    pub fn nearest_vertex(&self, p: DVec3) -> Option<usize> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, v)| (i, v.distance_squared(p)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Give every vertex the uv of its nearest vertex in `source`, and take
    /// over the source material. No-op on uvs when `source` has none.
    /// Ties go to the lower source index, as in [`nearest_vertex`](Self::nearest_vertex).
    pub fn transfer_attributes(&mut self, source: &Mesh) {
        self.material = source.material.clone();
        if source.uvs.len() != source.positions.len() || source.uvs.is_empty() {
            return;
        }
        let points: Vec<Aabb> = source.positions.iter().map(|p| Aabb::new(*p, *p)).collect();
        let bvh = Bvh::build(&points);
        self.uvs = self
            .positions
            .iter()
            .map(|&p| {
                let mut best = (usize::MAX, f64::INFINITY);
                bvh.for_each_near(p, |j| {
                    let d = source.positions[j].distance_squared(p);
                    if d < best.1 || (d == best.1 && j < best.0) {
                        best = (j, d);
                    }
                    best.1
                });
                source.uvs.get(best.0).copied().unwrap_or(DVec2::ZERO)
            })
            .collect();
    }

    // ── Primitives ────────────────────────────────────────────────────────────

    /// Closed box with outward-facing triangles (8 vertices, 12 triangles).
    pub fn cuboid(min: DVec3, max: DVec3) -> Self {
        let positions = Aabb::new(min, max).corners().to_vec();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1,  0, 3, 2, // -z
            4, 5, 6,  4, 6, 7, // +z
            0, 1, 5,  0, 5, 4, // -y
            3, 6, 2,  3, 7, 6, // +y
            0, 4, 7,  0, 7, 3, // -x
            1, 2, 6,  1, 6, 5, // +x
        ];
        let mut mesh = Self { positions, indices, ..Self::default() };
        mesh.recompute_bounds();
        mesh
    }

    /// UV sphere centred at the origin. `segments` around the axis (>= 3),
    /// `rings` from pole to pole (>= 2).
    pub fn uv_sphere(radius: f64, segments: usize, rings: usize) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut positions = vec![DVec3::new(0.0, 0.0, radius)];
        for r in 1..rings {
            let theta = std::f64::consts::PI * r as f64 / rings as f64;
            for s in 0..segments {
                let phi = std::f64::consts::TAU * s as f64 / segments as f64;
                positions.push(radius * DVec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()));
            }
        }
        positions.push(DVec3::new(0.0, 0.0, -radius));

        let south = (positions.len() - 1) as u32;
        let ring_start = |r: usize| (1 + (r - 1) * segments) as u32;
        let mut indices = Vec::new();
        for s in 0..segments as u32 {
            let next = (s + 1) % segments as u32;
            indices.extend_from_slice(&[0, ring_start(1) + s, ring_start(1) + next]);
        }
        for r in 1..rings - 1 {
            let (a, b) = (ring_start(r), ring_start(r + 1));
            for s in 0..segments as u32 {
                let next = (s + 1) % segments as u32;
                indices.extend_from_slice(&[a + s, b + s, b + next]);
                indices.extend_from_slice(&[a + s, b + next, a + next]);
            }
        }
        let last = ring_start(rings - 1);
        for s in 0..segments as u32 {
            let next = (s + 1) % segments as u32;
            indices.extend_from_slice(&[last + s, south, last + next]);
        }

        let mut mesh = Self { positions, indices, ..Self::default() };
        mesh.recompute_bounds();
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_rejects_out_of_range_index() {
        let r = Mesh::from_parts(vec![DVec3::ZERO; 3], Vec::new(), Vec::new(), vec![0, 1, 3]);
        assert!(matches!(r, Err(FractalError::InvalidMesh(_))));
    }

    #[test]
    fn from_parts_rejects_partial_triangle() {
        let r = Mesh::from_parts(vec![DVec3::ZERO; 3], Vec::new(), Vec::new(), vec![0, 1]);
        assert!(r.is_err());
    }

    #[test]
    fn from_parts_rejects_normal_count_mismatch() {
        let r = Mesh::from_parts(vec![DVec3::ZERO; 3], vec![DVec3::Z; 2], Vec::new(), vec![0, 1, 2]);
        assert!(r.is_err());
    }

    #[test]
    fn quad_and_pentagon_fan_triangulate() {
        let positions = vec![DVec3::ZERO; 5];
        let mesh = Mesh::from_polygons(positions, &[vec![0, 1, 2, 3], vec![0, 1, 2, 3, 4], vec![0, 1]]).unwrap();
        assert_eq!(mesh.triangle_count(), 2 + 3);
        assert_eq!(&mesh.indices[..6], &[0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn bounds_recomputed_on_import() {
        let mesh = Mesh::cuboid(DVec3::splat(-0.5), DVec3::splat(0.5));
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.bounds.min, DVec3::splat(-0.5));
        assert_eq!(mesh.bounds.max, DVec3::splat(0.5));
    }

    #[test]
    fn cuboid_faces_point_outward() {
        let mesh = Mesh::cuboid(DVec3::splat(-1.0), DVec3::splat(1.0));
        for t in 0..mesh.triangle_count() {
            let [a, b, c] = mesh.triangle(t);
            let n = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(n.dot(centroid) > 0.0, "triangle {t} faces inward");
        }
    }

    #[test]
    fn append_offsets_indices_and_grows_bounds() {
        let mut a = Mesh::cuboid(DVec3::ZERO, DVec3::ONE);
        let b = Mesh::cuboid(DVec3::splat(2.0), DVec3::splat(3.0));
        a.append(&b);
        assert_eq!(a.vertex_count(), 16);
        assert_eq!(a.triangle_count(), 24);
        assert!(a.indices[36..].iter().all(|&i| i >= 8));
        assert_eq!(a.bounds.max, DVec3::splat(3.0));
        assert!(a.validate().is_ok());
    }

    #[test]
    fn weld_merges_shared_corners() {
        let mut mesh = Mesh::new();
        for t in 0..2 {
            let tri = Mesh::from_parts(
                vec![DVec3::ZERO, DVec3::X, if t == 0 { DVec3::Y } else { -DVec3::Y }],
                Vec::new(),
                Vec::new(),
                vec![0, 1, 2],
            )
            .unwrap();
            mesh.append(&tri);
        }
        assert_eq!(mesh.vertex_count(), 6);
        mesh.weld_vertices(1e-6);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn uv_sphere_vertices_lie_on_radius() {
        let mesh = Mesh::uv_sphere(2.0, 16, 8);
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.triangle_count(), 16 * 2 + 16 * 2 * (8 - 2));
        for p in &mesh.positions {
            assert!((p.length() - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn uvs_transfer_from_nearest_source_vertex() {
        let mut source = Mesh::cuboid(DVec3::ZERO, DVec3::ONE);
        source.uvs = (0..8).map(|i| DVec2::new(i as f64, 0.0)).collect();
        source.material = Some("lambert2SG".into());

        let mut out = Mesh::from_parts(
            vec![DVec3::splat(0.05), DVec3::new(0.9, 1.1, 1.0)],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        out.transfer_attributes(&source);
        assert_eq!(out.uvs, vec![DVec2::new(0.0, 0.0), DVec2::new(6.0, 0.0)]);
        assert_eq!(out.material.as_deref(), Some("lambert2SG"));
    }

    #[test]
    fn append_into_empty_keeps_uvs_and_normals() {
        let mut part = Mesh::cuboid(DVec3::ZERO, DVec3::ONE);
        part.uvs = part.positions.iter().map(|p| DVec2::new(p.x, p.y)).collect();
        part.recompute_normals();

        let mut mesh = Mesh::new();
        mesh.append(&part);
        assert_eq!(mesh.normals.len(), 8);
        assert_eq!(mesh.uvs.len(), 8);
        mesh.append(&part);
        assert_eq!(mesh.uvs.len(), 16);
        assert!(mesh.validate().is_ok());

        // A side without uvs drops them for the whole mesh.
        mesh.append(&Mesh::cuboid(DVec3::ZERO, DVec3::ONE));
        assert!(mesh.uvs.is_empty());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn uv_transfer_matches_linear_nearest_vertex() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut source = Mesh::uv_sphere(1.0, 24, 12);
        source.uvs = (0..source.vertex_count()).map(|i| DVec2::new(i as f64, 0.0)).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let positions: Vec<DVec3> = (0..400)
            .map(|_| DVec3::new(rng.gen_range(-1.5..1.5), rng.gen_range(-1.5..1.5), rng.gen_range(-1.5..1.5)))
            .collect();
        let mut out = Mesh::from_parts(positions, Vec::new(), Vec::new(), Vec::new()).unwrap();
        out.transfer_attributes(&source);
        for (p, uv) in out.positions.iter().zip(&out.uvs) {
            let j = source.nearest_vertex(*p).unwrap();
            assert_eq!(*uv, source.uvs[j], "at {p:?}");
        }
    }

    #[test]
    fn recomputed_normals_are_unit_and_outward() {
        let mut mesh = Mesh::uv_sphere(1.0, 12, 6);
        mesh.recompute_normals();
        for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
            assert!((n.length() - 1.0).abs() < 1e-9);
            assert!(n.dot(*p) > 0.5);
        }
    }
}
