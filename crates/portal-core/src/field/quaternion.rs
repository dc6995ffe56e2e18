//! Quaternion arithmetic for the escape-time field.
use std::ops::{Add, Mul};

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// `w + xi + yj + zk`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// Pure quaternion with `p` as its vector part.
    pub fn from_point(p: DVec3) -> Self {
        Self::new(0.0, p.x, p.y, p.z)
    }

    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// `q²`, expanded: `(w² - |v|², 2wv)`.
    #[inline]
    pub fn square(&self) -> Self {
        let Self { w, x, y, z } = *self;
        Self::new(w * w - x * x - y * y - z * z, 2.0 * w * x, 2.0 * w * y, 2.0 * w * z)
    }

    /// One Julia step: `q² + c`.
    #[inline]
    pub fn julia_step(&self, c: Quaternion) -> Self {
        self.square() + c
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Quaternion {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.w + o.w, self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

/// Hamilton product.
impl Mul for Quaternion {
    type Output = Self;
    fn mul(self, o: Self) -> Self {
        Self::new(
            self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
            self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            self.w * o.y - self.x * o.z + self.y * o.w + self.z * o.x,
            self.w * o.z + self.x * o.y - self.y * o.x + self.z * o.w,
        )
    }
}

/// Smallest magnitude fed to the logarithm.
const MIN_NORM: f64 = 1e-12;

/// Escape-time value at `p`: iterate `z ← z² + c` from the pure quaternion
/// of `p` until `|z|² > escape_radius²` or `max_iterations` steps, then
/// return `ln(|z| / escape_radius)`. Negative for bounded orbits, positive
/// once the orbit has escaped.
pub fn escape_value(p: DVec3, c: Quaternion, max_iterations: usize, escape_radius: f64) -> f64 {
    let limit = escape_radius * escape_radius;
    let mut z = Quaternion::from_point(p);
    for _ in 0..max_iterations {
        if z.norm_squared() > limit {
            break;
        }
        z = z.julia_step(c);
    }
    (z.norm().max(MIN_NORM) / escape_radius).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn square_matches_hamilton_product() {
        let q = Quaternion::new(0.3, -1.2, 0.7, 2.0);
        let a = q.square();
        let b = q * q;
        assert_abs_diff_eq!(a.w, b.w, epsilon = 1e-12);
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-12);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-12);
        assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-12);
    }

    #[test]
    fn basis_units_square_to_minus_one() {
        let i = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        let j = Quaternion::new(0.0, 0.0, 1.0, 0.0);
        assert_eq!(i * i, Quaternion::new(-1.0, 0.0, 0.0, 0.0));
        assert_eq!(i * j, Quaternion::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn bounded_orbit_is_negative() {
        let c = Quaternion::new(0.0, 0.5, 0.0, 0.0);
        assert!(escape_value(DVec3::ZERO, c, 10, 4.0) < 0.0);
    }

    #[test]
    fn escaping_orbit_is_positive() {
        let c = Quaternion::new(0.0, 0.5, 0.0, 0.0);
        assert!(escape_value(DVec3::new(3.0, 0.0, 0.0), c, 10, 4.0) > 0.0);
        // Already outside: no steps taken.
        assert_abs_diff_eq!(escape_value(DVec3::new(8.0, 0.0, 0.0), c, 10, 4.0), 2f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn zero_orbit_stays_finite() {
        let v = escape_value(DVec3::ZERO, Quaternion::ZERO, 10, 4.0);
        assert!(v.is_finite() && v < 0.0);
    }
}
