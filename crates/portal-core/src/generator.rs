//! Pipeline orchestrator: bounds, portal passes, extraction, export
//! attributes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bounds::Aabb;
use crate::error::{FractalError, Result};
use crate::field::{FieldSource, JuliaSet, JuliaSettings, Quaternion};
use crate::marching_cubes::{polygonize, GridSpec, DEFAULT_RESOLUTION, MAX_RESOLUTION, MIN_RESOLUTION};
use crate::mesh::Mesh;
use crate::noise::{ModulusParams, NoiseParams};
use crate::portal::{PortalMap, PortalParams};

// ── Parameter ranges ──────────────────────────────────────────────────────────

pub const MAX_PASS_ITERATIONS: usize = 8;
pub const MAX_JULIA_ITERATIONS: usize = 64;
pub const MAX_VERSOR_OCTAVE: u32 = 8;
pub const MAX_NOISE_WEIGHT: f64 = 10.0;
pub const MIN_ESCAPE_RADIUS: f64 = 1e-6;

/// Weld tolerance as a fraction of the input bounding-box diagonal.
const WELD_TOLERANCE_FRACTION: f64 = 1e-6;

// ── Public structs ────────────────────────────────────────────────────────────

/// Field definition selector in the parameter document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    #[default]
    SignedDistance,
    QuaternionEscape,
    /// Mix of the two, weighted by `blend_weight`.
    Blended,
}

/// User-facing parameters. Defaults follow the interactive tool's sliders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FractalParams {
    pub seed: u64,
    /// Portal placements; an empty list means a single identity portal.
    pub portals: Vec<PortalParams>,
    /// 1-8, default 2. Extraction passes per portal.
    pub max_iterations: usize,
    /// 1-64, default 10. Escape-time cap for the quaternion field.
    pub julia_iterations: usize,
    /// > 0, default 4.0. Quaternion escape threshold.
    pub escape_radius: f64,
    /// 0-10, default 0.05. Noise displacement weight.
    pub alpha: f64,
    /// 0-10, default 0.0. Noise sampling offset.
    pub beta: f64,
    /// >= 0, default 9.0. Noise frequency.
    pub versor_scale: f64,
    /// 0-8, default 1. Noise octaves.
    pub versor_octave: u32,
    /// Halve the sampling grid for previews.
    pub is_low_res: bool,
    /// 2-256, default 48. Cells along the longest axis of each pass box.
    pub resolution: usize,
    /// >= 0, default 0.1. Padding added around the input bounds.
    pub margin: f64,
    pub field_mode: FieldMode,
    /// 0-1, default 0.5. Share of signed distance in `Blended` mode.
    pub blend_weight: f64,
    /// Julia constant `(w, x, y, z)`.
    pub julia_c: [f64; 4],
    pub modulus: ModulusParams,
    /// Merge coincident output vertices.
    pub weld_vertices: bool,
    /// Accelerate distance queries with a BVH.
    pub use_bvh: bool,
}

impl Default for FractalParams {
    fn default() -> Self {
        Self {
            seed: 42,
            portals: Vec::new(),
            max_iterations: 2,
            julia_iterations: 10,
            escape_radius: 4.0,
            alpha: 0.05,
            beta: 0.0,
            versor_scale: 9.0,
            versor_octave: 1,
            is_low_res: false,
            resolution: DEFAULT_RESOLUTION,
            margin: 0.1,
            field_mode: FieldMode::SignedDistance,
            blend_weight: 0.5,
            julia_c: [0.0, 0.5, 0.0, 0.0],
            modulus: ModulusParams::default(),
            weld_vertices: false,
            use_bvh: true,
        }
    }
}

fn clamp_real(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        lo
    } else {
        v.clamp(lo, hi)
    }
}

impl FractalParams {
    /// Parse a JSON document; missing fields take their defaults and values
    /// are clamped into range.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: FractalParams = serde_json::from_str(json)?;
        Ok(params.sanitized())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Copy with every parameter clamped into its valid range. Out-of-range
    /// input is never an error.
    pub fn sanitized(&self) -> Self {
        Self {
            max_iterations: self.max_iterations.clamp(1, MAX_PASS_ITERATIONS),
            julia_iterations: self.julia_iterations.clamp(1, MAX_JULIA_ITERATIONS),
            escape_radius: clamp_real(self.escape_radius, MIN_ESCAPE_RADIUS, f64::MAX),
            alpha: clamp_real(self.alpha, 0.0, MAX_NOISE_WEIGHT),
            beta: clamp_real(self.beta, 0.0, MAX_NOISE_WEIGHT),
            versor_scale: clamp_real(self.versor_scale, 0.0, f64::MAX),
            versor_octave: self.versor_octave.min(MAX_VERSOR_OCTAVE),
            resolution: self.resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION),
            margin: clamp_real(self.margin, 0.0, f64::MAX),
            blend_weight: clamp_real(self.blend_weight, 0.0, 1.0),
            ..self.clone()
        }
    }

    pub fn field_source(&self) -> FieldSource {
        match self.field_mode {
            FieldMode::SignedDistance => FieldSource::SignedDistance,
            FieldMode::QuaternionEscape => FieldSource::QuaternionEscape,
            FieldMode::Blended => FieldSource::Blended { weight: self.blend_weight },
        }
    }

    pub fn julia_settings(&self) -> JuliaSettings {
        let [w, x, y, z] = self.julia_c;
        JuliaSettings {
            max_iterations: self.julia_iterations,
            escape_radius: self.escape_radius,
            c: Quaternion::new(w, x, y, z),
            alpha: self.alpha,
            beta: self.beta,
            source: self.field_source(),
        }
    }

    pub fn noise_params(&self) -> NoiseParams {
        NoiseParams {
            seed: (self.seed & 0xFFFF_FFFF) as u32,
            scale: self.versor_scale,
            octaves: self.versor_octave,
            modulus: self.modulus,
        }
    }

    /// Declared portals, or the identity portal when none are declared.
    pub fn portal_map(&self) -> PortalMap {
        if self.portals.is_empty() {
            PortalMap::identity()
        } else {
            PortalMap::from_params(&self.portals)
        }
    }
}

/// Why a pass produced no geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SingularTransform,
    DegenerateBounds,
}

/// One `(portal, iteration)` extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub portal: usize,
    pub iteration: usize,
    /// Input bounds advanced through the portal's iterated matrix.
    pub bounds: Aabb,
    /// Cell counts of the sampling grid; zero when skipped.
    pub cells: [usize; 3],
    pub triangles: usize,
    pub skipped: Option<SkipReason>,
}

/// Full output of the generation pipeline.
#[derive(Debug, Clone)]
pub struct FractalResult {
    pub mesh: Mesh,
    pub passes: Vec<PassReport>,
    /// Set when the run stopped early on request.
    pub cancelled: bool,
    pub generation_time_ms: u64,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// The main pipeline orchestrator.
pub struct FractalGenerator;

impl FractalGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Run every pass to completion.
    pub fn generate(&self, input: &Mesh, params: &FractalParams) -> Result<FractalResult> {
        self.generate_with_cancel(input, params, &AtomicBool::new(false))
    }

    /// Run the pipeline, checking `cancel` between passes. A cancelled run
    /// keeps the geometry accumulated so far.
    ///
    /// Pipeline order:
    ///   1. Sanitize parameters, expand the input bounds by the margin
    ///   2. Attach the input mesh and portal map to the field
    ///   3. Per portal, per iteration `k` in `1..=max_iterations`: advance
    ///      the box by the `k`-th matrix power and extract into the output
    ///   4. Optional weld, normals, material and uv transfer
    pub fn generate_with_cancel(
        &self,
        input: &Mesh,
        params: &FractalParams,
        cancel: &AtomicBool,
    ) -> Result<FractalResult> {
        let started = Instant::now();
        let params = params.sanitized();

        // ── 1. Bounds ───────────────────────────────────────────────────────
        let base = Aabb::from_points(input.positions.iter()).expanded(params.margin);
        base.validate()?;

        // ── 2. Field ────────────────────────────────────────────────────────
        let portals = params.portal_map();
        let mut julia = JuliaSet::new(params.julia_settings(), &params.noise_params());
        julia.set_input_mesh(input, params.use_bvh);
        julia.set_portal_map(portals.clone());

        info!(
            portals = portals.len(),
            passes = portals.len() * params.max_iterations,
            input_triangles = input.triangle_count(),
            mode = ?params.field_mode,
            "starting fractal generation"
        );

        // ── 3. Passes ───────────────────────────────────────────────────────
        let mut output = Mesh::new();
        let mut passes = Vec::with_capacity(portals.len() * params.max_iterations);
        let mut cancelled = false;

        'portals: for (idx, portal) in portals.iter().enumerate() {
            for k in 1..=params.max_iterations {
                if cancel.load(Ordering::Relaxed) {
                    info!(portal = idx, iteration = k, "generation cancelled");
                    cancelled = true;
                    break 'portals;
                }

                let bounds = base.transformed(&portal.iterated_matrix(k));
                let mut report =
                    PassReport { portal: idx, iteration: k, bounds, cells: [0; 3], triangles: 0, skipped: None };

                let field = match julia.pass(idx, k) {
                    Ok(field) => field,
                    Err(err @ FractalError::SingularTransform { .. }) => {
                        warn!(portal = idx, iteration = k, %err, "skipping pass");
                        report.skipped = Some(SkipReason::SingularTransform);
                        passes.push(report);
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                let grid = match GridSpec::new(bounds, params.resolution, params.is_low_res) {
                    Ok(grid) => grid,
                    Err(err @ FractalError::DegenerateBoundingBox { .. }) => {
                        warn!(portal = idx, iteration = k, %err, "skipping pass");
                        report.skipped = Some(SkipReason::DegenerateBounds);
                        passes.push(report);
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                let (mesh, stats) = polygonize(&field, &grid);
                output.append(&mesh);
                debug!(
                    portal = idx,
                    iteration = k,
                    cells = ?grid.cells,
                    active_cells = stats.active_cells,
                    triangles = stats.triangles,
                    "pass complete"
                );
                report.cells = grid.cells;
                report.triangles = stats.triangles;
                passes.push(report);
            }
        }

        // ── 4. Export attributes ────────────────────────────────────────────
        if params.weld_vertices {
            let diagonal = base.extent().length();
            output.weld_vertices(diagonal * WELD_TOLERANCE_FRACTION);
        }
        output.recompute_normals();
        output.recompute_bounds();
        output.transfer_attributes(input);

        let generation_time_ms = started.elapsed().as_millis() as u64;
        info!(
            passes = passes.len(),
            skipped = passes.iter().filter(|p| p.skipped.is_some()).count(),
            triangles = output.triangle_count(),
            vertices = output.vertex_count(),
            elapsed_ms = generation_time_ms,
            cancelled,
            "fractal generation finished"
        );

        Ok(FractalResult { mesh: output, passes, cancelled, generation_time_ms })
    }
}

impl Default for FractalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DMat4, DVec2, DVec3};

    fn unit_cube() -> Mesh {
        Mesh::cuboid(DVec3::ZERO, DVec3::ONE)
    }

    fn preview_params() -> FractalParams {
        FractalParams { alpha: 0.0, max_iterations: 1, is_low_res: true, ..FractalParams::default() }
    }

    #[test]
    fn defaults_match_slider_values() {
        let p = FractalParams::default();
        assert_eq!(p.max_iterations, 2);
        assert_eq!(p.alpha, 0.05);
        assert_eq!(p.versor_scale, 9.0);
        assert_eq!(p.versor_octave, 1);
        assert_eq!(p.escape_radius, 4.0);
        assert_eq!(p.julia_c, [0.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let p = FractalParams {
            max_iterations: 40,
            alpha: -3.0,
            beta: 25.0,
            versor_octave: 12,
            blend_weight: f64::NAN,
            resolution: 1,
            escape_radius: 0.0,
            margin: -1.0,
            ..FractalParams::default()
        }
        .sanitized();
        assert_eq!(p.max_iterations, 8);
        assert_eq!(p.alpha, 0.0);
        assert_eq!(p.beta, 10.0);
        assert_eq!(p.versor_octave, 8);
        assert_eq!(p.blend_weight, 0.0);
        assert_eq!(p.resolution, MIN_RESOLUTION);
        assert_eq!(p.escape_radius, MIN_ESCAPE_RADIUS);
        assert_eq!(p.margin, 0.0);
        assert_eq!(FractalParams { max_iterations: 0, ..p }.sanitized().max_iterations, 1);
    }

    #[test]
    fn json_fills_defaults_and_clamps() {
        let p = FractalParams::from_json(
            r#"{ "max_iterations": 12, "field_mode": "blended",
                 "portals": [{ "position": [1, 0, 0], "rotation_deg": [0, 0, 90], "scale": [0.5, 0.5, 0.5] }] }"#,
        )
        .unwrap();
        assert_eq!(p.max_iterations, 8);
        assert_eq!(p.field_mode, FieldMode::Blended);
        assert_eq!(p.field_source(), FieldSource::Blended { weight: 0.5 });
        assert_eq!(p.portals.len(), 1);
        assert_eq!(p.versor_scale, 9.0);
        assert!(matches!(FractalParams::from_json("{ not json"), Err(FractalError::Config(_))));
    }

    #[test]
    fn json_round_trip_preserves_params() {
        let p = FractalParams { seed: 7, weld_vertices: true, ..FractalParams::default() };
        assert_eq!(FractalParams::from_json(&p.to_json().unwrap()).unwrap(), p);
    }

    #[test]
    fn identity_cube_pass_covers_cube() {
        let cube = unit_cube();
        let params = preview_params();
        let result = FractalGenerator::new().generate(&cube, &params).unwrap();

        assert_eq!(result.passes.len(), 1);
        let pass = &result.passes[0];
        let expanded = cube.bounds.expanded(params.margin);
        assert!(pass.bounds.min.abs_diff_eq(expanded.min, 1e-12));
        assert!(pass.bounds.max.abs_diff_eq(expanded.max, 1e-12));
        assert!(pass.skipped.is_none());
        assert!(pass.triangles > 0);

        // Low-res grid: 24 cells across the expanded box.
        assert_eq!(pass.cells, [24; 3]);
        let voxel = expanded.extent().x / 24.0;
        let out = &result.mesh.bounds;
        // The zero set is the cube surface; the margin only pads the pass box.
        assert!(out.min.abs_diff_eq(cube.bounds.min, voxel), "{out:?}");
        assert!(out.max.abs_diff_eq(cube.bounds.max, voxel), "{out:?}");
    }

    #[test]
    fn output_normals_face_outward() {
        // Faces kept off the sampling lattice so no corner sits on the surface.
        let cube = Mesh::cuboid(DVec3::ZERO, DVec3::splat(0.93));
        let result = FractalGenerator::new().generate(&cube, &preview_params()).unwrap();
        let mesh = &result.mesh;
        let center = cube.bounds.center();
        assert!(!mesh.is_empty());

        // Unwelded output: each vertex normal is its triangle's face normal.
        let mut checked = 0;
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[tri[i] as usize]);
            if (b - a).cross(c - a).length() < 1e-6 {
                continue;
            }
            let n = mesh.normals[tri[0] as usize];
            assert!(n.dot((a + b + c) / 3.0 - center) > 0.0, "normal {n:?} faces inward");
            checked += 1;
        }
        assert!(checked * 2 >= mesh.triangle_count(), "{checked} of {}", mesh.triangle_count());
    }

    #[test]
    fn iterated_pass_bounds_use_matrix_power() {
        let cube = unit_cube();
        let portal = PortalParams { position: [1.0, 0.0, 0.0], rotation_deg: [0.0, 0.0, 90.0], scale: [0.5; 3] };
        let params = FractalParams { portals: vec![portal], max_iterations: 3, resolution: 8, ..preview_params() };
        let result = FractalGenerator::new().generate(&cube, &params).unwrap();
        assert_eq!(result.passes.len(), 3);

        let m = PortalMap::from_params(&[portal]).get(0).unwrap().matrix();
        let base = cube.bounds.expanded(params.margin);
        let m3: DMat4 = m * m * m;
        let expected = Aabb::from_points(base.corners().map(|c| m3.transform_point3(c)).iter());
        let third = &result.passes[2];
        assert_eq!(third.iteration, 3);
        assert!(third.bounds.min.abs_diff_eq(expected.min, 1e-12), "{:?}", third.bounds);
        assert!(third.bounds.max.abs_diff_eq(expected.max, 1e-12), "{:?}", third.bounds);

        // Half scale per step: the third box is 1/8 the size of the base.
        let ratio = third.bounds.extent().max_element() / base.extent().max_element();
        assert!((ratio - 0.125).abs() < 1e-12, "ratio {ratio}");
    }

    #[test]
    fn singular_portal_pass_is_skipped_and_others_kept() {
        let good = PortalParams::default();
        let flat = PortalParams { scale: [1.0, 0.0, 1.0], ..PortalParams::default() };
        let params = FractalParams { portals: vec![good, flat], ..preview_params() };
        let result = FractalGenerator::new().generate(&unit_cube(), &params).unwrap();

        assert_eq!(result.passes.len(), 2);
        assert!(result.passes[0].skipped.is_none());
        assert_eq!(result.passes[1].skipped, Some(SkipReason::SingularTransform));
        assert_eq!(result.mesh.triangle_count(), result.passes[0].triangles);
        assert!(!result.mesh.is_empty());
    }

    #[test]
    fn cancelled_run_returns_partial_result() {
        let cancel = AtomicBool::new(true);
        let result = FractalGenerator::new()
            .generate_with_cancel(&unit_cube(), &preview_params(), &cancel)
            .unwrap();
        assert!(result.cancelled);
        assert!(result.passes.is_empty());
        assert!(result.mesh.is_empty());
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = FractalGenerator::new().generate(&Mesh::new(), &preview_params()).unwrap_err();
        assert!(matches!(err, FractalError::DegenerateBoundingBox { .. }));
    }

    #[test]
    fn output_carries_material_uvs_and_normals() {
        let mut cube = unit_cube();
        cube.material = Some("lambert2SG".into());
        cube.uvs = cube.positions.iter().map(|p| DVec2::new(p.x, p.y)).collect();
        let result = FractalGenerator::new().generate(&cube, &preview_params()).unwrap();
        let mesh = &result.mesh;
        assert_eq!(mesh.material.as_deref(), Some("lambert2SG"));
        assert_eq!(mesh.uvs.len(), mesh.vertex_count());
        assert_eq!(mesh.normals.len(), mesh.vertex_count());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn welding_shrinks_vertex_count() {
        let plain = FractalGenerator::new().generate(&unit_cube(), &preview_params()).unwrap();
        let welded = FractalGenerator::new()
            .generate(&unit_cube(), &FractalParams { weld_vertices: true, ..preview_params() })
            .unwrap();
        assert!(welded.mesh.vertex_count() < plain.mesh.vertex_count());
        assert!(welded.mesh.triangle_count() <= plain.mesh.triangle_count());
    }

    #[test]
    fn bvh_and_linear_scan_extract_the_same_mesh() {
        let sphere = Mesh::uv_sphere(1.0, 16, 8);
        let base = FractalParams { alpha: 0.3, resolution: 12, max_iterations: 2, ..FractalParams::default() };
        let a = FractalGenerator::new().generate(&sphere, &FractalParams { use_bvh: true, ..base.clone() }).unwrap();
        let b = FractalGenerator::new().generate(&sphere, &FractalParams { use_bvh: false, ..base }).unwrap();
        assert_eq!(a.mesh.positions, b.mesh.positions);
        assert_eq!(a.mesh.indices, b.mesh.indices);
    }
}
