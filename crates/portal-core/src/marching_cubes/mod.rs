//! Marching cubes over an axis-aligned region.
//!
//! Corner values are sampled once into a flat buffer, in parallel when the
//! `threading` feature is on. Cells are then classified and triangulated
//! one z-slab at a time, each slab into a private mesh, and the slabs are
//! concatenated in order so the output is identical with or without
//! threads.
//!
//! A corner is inside when its value is strictly below zero. Exact zeros
//! count as outside, so neighbouring cells always agree on a shared corner.
mod tables;

use glam::DVec3;
#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::bounds::Aabb;
use crate::error::Result;
use crate::field::ScalarField;
use crate::mesh::Mesh;
use tables::{CORNER_OFFSETS, EDGE_CONNECTIONS, EDGE_TABLE, TRI_TABLE};

/// Cells along the longest axis when no resolution is given.
pub const DEFAULT_RESOLUTION: usize = 48;
pub const MIN_RESOLUTION: usize = 2;
pub const MAX_RESOLUTION: usize = 256;

/// Edge value differences below this place the vertex at the midpoint.
const FLAT_EDGE_EPSILON: f64 = 1e-12;

// ── Grid ──────────────────────────────────────────────────────────────────────

/// Sampling lattice over a bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub bounds: Aabb,
    /// Cell counts per axis.
    pub cells: [usize; 3],
    /// Cell edge lengths per axis.
    pub spacing: DVec3,
}

impl GridSpec {
    /// `resolution` cells along the longest axis, halved for `low_res`.
    /// Other axes get as many cells as keep the voxels near-cubic, at
    /// least one. Rejects degenerate boxes before anything is allocated.
    pub fn new(bounds: Aabb, resolution: usize, low_res: bool) -> Result<Self> {
        bounds.validate()?;
        let mut r = resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION);
        if low_res {
            r = (r / 2).max(MIN_RESOLUTION);
        }
        let extent = bounds.extent();
        let voxel = extent.max_element() / r as f64;
        let cells_along = |e: f64| ((e / voxel - 1e-9).ceil() as usize).clamp(1, r);
        let cells = [cells_along(extent.x), cells_along(extent.y), cells_along(extent.z)];
        let spacing = extent / DVec3::new(cells[0] as f64, cells[1] as f64, cells[2] as f64);
        Ok(Self { bounds, cells, spacing })
    }

    /// Corner counts per axis.
    #[inline]
    pub fn corners(&self) -> [usize; 3] {
        [self.cells[0] + 1, self.cells[1] + 1, self.cells[2] + 1]
    }

    pub fn sample_count(&self) -> usize {
        let [nx, ny, nz] = self.corners();
        nx * ny * nz
    }

    pub fn cell_count(&self) -> usize {
        self.cells[0] * self.cells[1] * self.cells[2]
    }

    /// Length of one voxel diagonal.
    pub fn voxel_diagonal(&self) -> f64 {
        self.spacing.length()
    }

    #[inline]
    pub fn corner_position(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.bounds.min + DVec3::new(i as f64, j as f64, k as f64) * self.spacing
    }

    #[inline]
    fn corner_index(&self, i: usize, j: usize, k: usize) -> usize {
        let [nx, ny, _] = self.corners();
        i + nx * (j + ny * k)
    }

    #[inline]
    fn position_of_index(&self, idx: usize) -> DVec3 {
        let [nx, ny, _] = self.corners();
        self.corner_position(idx % nx, (idx / nx) % ny, idx / (nx * ny))
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Counters for one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub samples: usize,
    /// Cells with corners on both sides of the surface.
    pub active_cells: usize,
    pub triangles: usize,
}

/// Field values at every lattice corner, x fastest.
pub fn sample_grid<F: ScalarField>(field: &F, grid: &GridSpec) -> Vec<f64> {
    let n = grid.sample_count();
    #[cfg(feature = "threading")]
    let values = (0..n).into_par_iter().map(|idx| field.sample(grid.position_of_index(idx))).collect();
    #[cfg(not(feature = "threading"))]
    let values = (0..n).map(|idx| field.sample(grid.position_of_index(idx))).collect();
    values
}

/// Polygonise the zero level set of `field` over `grid`.
pub fn polygonize<F: ScalarField>(field: &F, grid: &GridSpec) -> (Mesh, ExtractStats) {
    let values = sample_grid(field, grid);
    let nz = grid.cells[2];

    #[cfg(feature = "threading")]
    let slabs: Vec<(Mesh, usize)> = (0..nz).into_par_iter().map(|k| emit_slab(grid, &values, k)).collect();
    #[cfg(not(feature = "threading"))]
    let slabs: Vec<(Mesh, usize)> = (0..nz).map(|k| emit_slab(grid, &values, k)).collect();

    let mut mesh = Mesh::new();
    let mut active_cells = 0;
    for (slab, active) in slabs {
        mesh.append(&slab);
        active_cells += active;
    }
    let stats = ExtractStats { samples: values.len(), active_cells, triangles: mesh.triangle_count() };
    (mesh, stats)
}

/// Extract over `bounds` and append the triangles to `out`.
pub fn marching_cubes<F: ScalarField>(
    out: &mut Mesh,
    field: &F,
    bounds: Aabb,
    resolution: usize,
    low_res: bool,
) -> Result<ExtractStats> {
    let grid = GridSpec::new(bounds, resolution, low_res)?;
    let (mesh, stats) = polygonize(field, &grid);
    out.append(&mesh);
    Ok(stats)
}

fn emit_slab(grid: &GridSpec, values: &[f64], k: usize) -> (Mesh, usize) {
    let mut slab = Mesh::new();
    let mut active = 0;
    for j in 0..grid.cells[1] {
        for i in 0..grid.cells[0] {
            if emit_cell(grid, values, [i, j, k], &mut slab) {
                active += 1;
            }
        }
    }
    slab.recompute_bounds();
    (slab, active)
}

/// Triangulate one cell into `out`. Returns whether the cell is active.
fn emit_cell(grid: &GridSpec, values: &[f64], [i, j, k]: [usize; 3], out: &mut Mesh) -> bool {
    let mut corner_values = [0.0f64; 8];
    let mut corner_positions = [DVec3::ZERO; 8];
    let mut case = 0usize;
    for (c, offset) in CORNER_OFFSETS.iter().enumerate() {
        let (ci, cj, ck) = (i + offset[0], j + offset[1], k + offset[2]);
        corner_values[c] = values[grid.corner_index(ci, cj, ck)];
        corner_positions[c] = grid.corner_position(ci, cj, ck);
        if corner_values[c] < 0.0 {
            case |= 1 << c;
        }
    }

    let edges = EDGE_TABLE[case];
    if edges == 0 {
        return false;
    }

    let mut edge_vertices = [DVec3::ZERO; 12];
    for (e, [a, b]) in EDGE_CONNECTIONS.iter().copied().enumerate() {
        if edges & (1 << e) != 0 {
            edge_vertices[e] =
                interpolate(corner_positions[a], corner_positions[b], corner_values[a], corner_values[b]);
        }
    }

    for tri in TRI_TABLE[case].chunks_exact(3) {
        if tri[0] < 0 {
            break;
        }
        // Table order winds toward the inside corners; swap to face outward.
        let base = out.positions.len() as u32;
        for &e in [tri[0], tri[2], tri[1]].iter() {
            out.positions.push(edge_vertices[e as usize]);
        }
        out.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }
    true
}

/// Zero crossing on the edge `p0 → p1` by linear interpolation.
#[inline]
fn interpolate(p0: DVec3, p1: DVec3, v0: f64, v1: f64) -> DVec3 {
    // An infinite end carries no position information: snap to the finite end.
    let t = if v0.is_infinite() && v1.is_finite() {
        1.0
    } else if v1.is_infinite() && v0.is_finite() {
        0.0
    } else {
        let delta = v1 - v0;
        let t = -v0 / delta;
        if delta.abs() < FLAT_EDGE_EPSILON || !t.is_finite() {
            0.5
        } else {
            t.clamp(0.0, 1.0)
        }
    };
    p0 + (p1 - p0) * t
}
