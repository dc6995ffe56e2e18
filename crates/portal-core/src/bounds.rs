//! Axis-aligned bounding boxes for meshes and extraction regions.

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{FractalError, Result};

/// An axis-aligned box. `min > max` on every axis marks the empty box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// The inverted box that any `expand_point` call overwrites.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a DVec3>,
    {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand_point(*p);
        }
        aabb
    }

    #[inline]
    pub fn expand_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn expand_aabb(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Grow the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min - DVec3::splat(margin),
            max: self.max + DVec3::splat(margin),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn extent(&self) -> DVec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            DVec3::new(a.x, a.y, a.z),
            DVec3::new(b.x, a.y, a.z),
            DVec3::new(b.x, b.y, a.z),
            DVec3::new(a.x, b.y, a.z),
            DVec3::new(a.x, a.y, b.z),
            DVec3::new(b.x, a.y, b.z),
            DVec3::new(b.x, b.y, b.z),
            DVec3::new(a.x, b.y, b.z),
        ]
    }

    /// Bounding box of the eight corners mapped through `matrix`.
    pub fn transformed(&self, matrix: &DMat4) -> Self {
        let mapped = self.corners().map(|c| matrix.transform_point3(c));
        Self::from_points(mapped.iter())
    }

    /// Squared distance from `p` to the box; zero inside.
    #[inline]
    pub fn distance_squared(&self, p: DVec3) -> f64 {
        let d = (self.min - p).max(p - self.max).max(DVec3::ZERO);
        d.length_squared()
    }

    /// Slab test: does the ray `origin + t * dir`, `t >= 0`, touch the box?
    pub fn intersects_ray(&self, origin: DVec3, inv_dir: DVec3) -> bool {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let t_near = t0.min(t1).max_element();
        let t_far = t0.max(t1).min_element();
        t_far >= t_near.max(0.0)
    }

    pub fn longest_axis(&self) -> usize {
        let d = self.extent();
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// Reject boxes that cannot back a sampling grid: `min > max` on any
    /// axis, non-finite corners, or zero extent on every axis.
    pub fn validate(&self) -> Result<()> {
        let finite = self.min.is_finite() && self.max.is_finite();
        if !finite || self.is_empty() || self.extent().max_element() <= 0.0 {
            return Err(FractalError::DegenerateBoundingBox { min: self.min, max: self.max });
        }
        Ok(())
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn from_points_tracks_extremes() {
        let pts = [DVec3::new(1.0, -2.0, 0.0), DVec3::new(-1.0, 3.0, 0.5)];
        let b = Aabb::from_points(pts.iter());
        assert_eq!(b.min, DVec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, DVec3::new(1.0, 3.0, 0.5));
    }

    #[test]
    fn inverted_box_is_rejected() {
        let b = Aabb::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 1.0));
        assert!(matches!(b.validate(), Err(FractalError::DegenerateBoundingBox { .. })));
        assert!(Aabb::empty().validate().is_err());
    }

    #[test]
    fn flat_box_is_accepted() {
        let b = Aabb::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.0));
        assert!(b.validate().is_ok());
    }

    #[test]
    fn quarter_turn_swaps_extents() {
        let b = Aabb::new(DVec3::ZERO, DVec3::new(2.0, 1.0, 1.0));
        let m = DMat4::from_rotation_z(std::f64::consts::FRAC_PI_2);
        let t = b.transformed(&m);
        assert_abs_diff_eq!(t.extent().x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.extent().y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn distance_squared_zero_inside() {
        let b = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        assert_eq!(b.distance_squared(DVec3::ZERO), 0.0);
        assert_abs_diff_eq!(b.distance_squared(DVec3::new(3.0, 0.0, 0.0)), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn ray_slab_hits_and_misses() {
        let b = Aabb::new(DVec3::splat(-1.0), DVec3::splat(1.0));
        let dir = DVec3::new(1.0, 0.0, 0.0);
        let inv = dir.recip();
        assert!(b.intersects_ray(DVec3::new(-5.0, 0.0, 0.0), inv));
        assert!(!b.intersects_ray(DVec3::new(5.0, 0.0, 0.0), inv));
        assert!(!b.intersects_ray(DVec3::new(-5.0, 2.0, 0.0), inv));
    }
}
