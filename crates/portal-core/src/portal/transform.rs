//! Per-portal affine transform: `T · R · S` with Z·Y·X Euler rotation.

use glam::{DMat4, DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::error::{FractalError, Result};

/// Determinant magnitude below which a matrix is treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-12;

/// Portal placement as entered by the user: translation, Euler angles in
/// degrees, and per-axis scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortalParams {
    pub position: [f64; 3],
    pub rotation_deg: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for PortalParams {
    fn default() -> Self {
        Self { position: [0.0; 3], rotation_deg: [0.0; 3], scale: [1.0; 3] }
    }
}

/// One portal's affine matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalTransform {
    scale: DMat4,
    rotation: DMat4,
    translation: DMat4,
    matrix: DMat4,
}

impl PortalTransform {
    /// `scale` is diagonal, rotation combines per-axis angles as `Rz · Ry · Rx`,
    /// and the result is `T · R · S`.
    pub fn build(scale: DVec3, rotation_deg: DVec3, translation: DVec3) -> Self {
        let scale = DMat4::from_scale(scale);
        let rotation = DMat4::from_rotation_z(rotation_deg.z.to_radians())
            * DMat4::from_rotation_y(rotation_deg.y.to_radians())
            * DMat4::from_rotation_x(rotation_deg.x.to_radians());
        let translation = DMat4::from_translation(translation);
        Self { scale, rotation, translation, matrix: translation * rotation * scale }
    }

    pub fn identity() -> Self {
        Self::build(DVec3::ONE, DVec3::ZERO, DVec3::ZERO)
    }

    pub fn from_params(p: &PortalParams) -> Self {
        Self::build(DVec3::from_array(p.scale), DVec3::from_array(p.rotation_deg), DVec3::from_array(p.position))
    }

    #[inline]
    pub fn matrix(&self) -> DMat4 {
        self.matrix
    }

    pub fn scale_matrix(&self) -> DMat4 {
        self.scale
    }

    pub fn rotation_matrix(&self) -> DMat4 {
        self.rotation
    }

    pub fn translation_matrix(&self) -> DMat4 {
        self.translation
    }

    pub fn set_scale(&mut self, scale: DVec3) {
        self.scale = DMat4::from_scale(scale);
        self.recompose();
    }

    pub fn set_rotation(&mut self, rotation_deg: DVec3) {
        *self = Self::build(self.scale_vector(), rotation_deg, self.translation_vector());
    }

    pub fn set_translation(&mut self, translation: DVec3) {
        self.translation = DMat4::from_translation(translation);
        self.recompose();
    }

    fn scale_vector(&self) -> DVec3 {
        DVec3::new(self.scale.x_axis.x, self.scale.y_axis.y, self.scale.z_axis.z)
    }

    fn translation_vector(&self) -> DVec3 {
        self.translation.w_axis.truncate()
    }

    fn recompose(&mut self) {
        self.matrix = self.translation * self.rotation * self.scale;
    }

    /// Homogeneous multiply; the `w` component is dropped.
    #[inline]
    pub fn apply(&self, point: DVec3) -> DVec3 {
        apply_matrix(&self.matrix, point)
    }

    pub fn apply_inverse(&self, point: DVec3) -> Result<DVec3> {
        Ok(apply_matrix(&invert(&self.matrix)?, point))
    }

    /// The matrix composed with itself `k - 1` times, i.e. `M^k`. `k = 0`
    /// and `k = 1` both give `M` unchanged.
    ///
    /// Iterating through the same portal compounds the matrix, not the
    /// point: callers that need the `k`-th image of a region map its corners
    /// through this power instead of re-boxing the region after every step.
    pub fn iterated_matrix(&self, k: usize) -> DMat4 {
        let mut m = self.matrix;
        for _ in 1..k.max(1) {
            m *= self.matrix;
        }
        m
    }

    pub fn apply_iterated(&self, point: DVec3, k: usize) -> DVec3 {
        apply_matrix(&self.iterated_matrix(k), point)
    }

    /// Inverse of [`iterated_matrix`](Self::iterated_matrix).
    pub fn inverse_iterated_matrix(&self, k: usize) -> Result<DMat4> {
        invert(&self.iterated_matrix(k))
    }

    pub fn apply_inverse_iterated(&self, point: DVec3, k: usize) -> Result<DVec3> {
        Ok(apply_matrix(&self.inverse_iterated_matrix(k)?, point))
    }
}

impl Default for PortalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[inline]
pub(crate) fn apply_matrix(m: &DMat4, p: DVec3) -> DVec3 {
    (*m * DVec4::new(p.x, p.y, p.z, 1.0)).truncate()
}

pub(crate) fn invert(m: &DMat4) -> Result<DMat4> {
    let determinant = m.determinant();
    if !determinant.is_finite() || determinant.abs() < SINGULAR_EPSILON {
        return Err(FractalError::SingularTransform { determinant });
    }
    Ok(m.inverse())
}
