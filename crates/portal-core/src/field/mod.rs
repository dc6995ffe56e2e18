//! Scalar field sampled by the isosurface extractor.
//!
//! [`JuliaSet`] is the single entry point. A query point is perturbed by the
//! versor noise, pulled back through the selected portal's iterated inverse,
//! and handed to one of the [`FieldSource`] definitions.
pub mod quaternion;

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::distance::MeshDistance;
use crate::error::{FractalError, Result};
use crate::mesh::Mesh;
use crate::noise::{NoiseParams, VersorMap};
use crate::portal::{transform::apply_matrix, PortalMap};
pub use quaternion::{escape_value, Quaternion};

/// Anything the extractor can sample. Must be shareable across worker
/// threads.
pub trait ScalarField: Sync {
    fn sample(&self, p: DVec3) -> f64;
}

impl<F> ScalarField for F
where
    F: Fn(DVec3) -> f64 + Sync,
{
    #[inline]
    fn sample(&self, p: DVec3) -> f64 {
        self(p)
    }
}

/// Field definition, chosen once at configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Signed distance to the attached mesh.
    #[default]
    SignedDistance,
    /// Quaternion Julia escape value.
    QuaternionEscape,
    /// `weight * distance + (1 - weight) * escape`.
    Blended { weight: f64 },
}

/// Fixed evaluator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JuliaSettings {
    /// Escape-time iteration cap.
    pub max_iterations: usize,
    pub escape_radius: f64,
    pub c: Quaternion,
    /// Noise displacement weight.
    pub alpha: f64,
    /// Noise sampling offset.
    pub beta: f64,
    pub source: FieldSource,
}

impl Default for JuliaSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            escape_radius: 4.0,
            c: Quaternion::new(0.0, 0.5, 0.0, 0.0),
            alpha: 0.05,
            beta: 0.0,
            source: FieldSource::SignedDistance,
        }
    }
}

pub struct JuliaSet {
    settings: JuliaSettings,
    noise: VersorMap,
    oracle: Option<MeshDistance>,
    portals: PortalMap,
}

impl JuliaSet {
    pub fn new(settings: JuliaSettings, noise: &NoiseParams) -> Self {
        Self { settings, noise: VersorMap::new(noise), oracle: None, portals: PortalMap::new() }
    }

    pub fn settings(&self) -> &JuliaSettings {
        &self.settings
    }

    /// Attach the reference mesh. A BVH is built when `use_bvh` is set.
    pub fn set_input_mesh(&mut self, mesh: &Mesh, use_bvh: bool) {
        self.oracle = Some(MeshDistance::build(mesh, use_bvh));
    }

    pub fn set_portal_map(&mut self, portals: PortalMap) {
        self.portals = portals;
    }

    pub fn portal_map(&self) -> &PortalMap {
        &self.portals
    }

    /// `point + alpha * noise(point + beta)`.
    #[inline]
    pub fn perturb(&self, point: DVec3) -> DVec3 {
        self.noise.perturb(point, self.settings.alpha, self.settings.beta)
    }

    /// Signed distance to the attached mesh; `+inf` with no mesh.
    pub fn distance_value(&self, q: DVec3) -> f64 {
        self.oracle.as_ref().map_or(f64::INFINITY, |o| o.signed_distance(q))
    }

    pub fn escape_value(&self, q: DVec3) -> f64 {
        let s = &self.settings;
        escape_value(q, s.c, s.max_iterations, s.escape_radius)
    }

    /// Field value at a point already in the portal's local frame.
    pub fn local_value(&self, q: DVec3) -> f64 {
        match self.settings.source {
            FieldSource::SignedDistance => self.distance_value(q),
            FieldSource::QuaternionEscape => self.escape_value(q),
            FieldSource::Blended { weight } if weight >= 1.0 => self.distance_value(q),
            FieldSource::Blended { weight } if weight <= 0.0 => self.escape_value(q),
            FieldSource::Blended { weight } => {
                weight * self.distance_value(q) + (1.0 - weight) * self.escape_value(q)
            }
        }
    }

    /// Field value at `point` for pass `(portal_index, k)`.
    ///
    /// A singular iterated transform yields `+inf` (outside). An unknown
    /// portal index is an error.
    pub fn evaluate(&self, point: DVec3, portal_index: usize, k: usize) -> Result<f64> {
        match self.pass(portal_index, k) {
            Ok(pass) => Ok(pass.sample(point)),
            Err(FractalError::SingularTransform { .. }) => Ok(f64::INFINITY),
            Err(e) => Err(e),
        }
    }

    /// Field for one extraction pass, with the inverse iterated matrix
    /// computed once.
    pub fn pass(&self, portal_index: usize, k: usize) -> Result<PassField<'_>> {
        let inverse = self.portals.get(portal_index)?.inverse_iterated_matrix(k)?;
        Ok(PassField { julia: self, inverse })
    }
}

/// [`JuliaSet`] bound to one portal and iteration.
pub struct PassField<'a> {
    julia: &'a JuliaSet,
    inverse: DMat4,
}

impl ScalarField for PassField<'_> {
    #[inline]
    fn sample(&self, p: DVec3) -> f64 {
        let local = apply_matrix(&self.inverse, self.julia.perturb(p));
        self.julia.local_value(local)
    }
}
