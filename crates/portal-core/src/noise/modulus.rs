//! Radial magnitude field: strongest on a shell of fixed radius.
use glam::DVec3;

use super::params::ModulusParams;

#[derive(Debug, Clone, Copy)]
pub struct Modulus {
    params: ModulusParams,
}

impl Modulus {
    pub fn new(params: ModulusParams) -> Self {
        Self { params }
    }

    /// Scalar factor at `pos`: `exp(-falloff * |‖pos‖ - radius|) + floor`,
    /// wobbled by a product of three sines.
    pub fn factor(&self, pos: DVec3) -> f64 {
        let ModulusParams { radius, falloff, floor } = self.params;
        let shell = pos.length() - radius;
        let decay = (-falloff * shell.abs()).exp() + floor;
        let variation = 1.0 + 0.2 * (pos.x * 3.0).sin() * (pos.y * 3.0).sin() * (pos.z * 3.0).sin();
        decay * variation
    }

    /// `pos` scaled by [`factor`](Self::factor).
    pub fn get_field_value(&self, pos: DVec3) -> DVec3 {
        pos * self.factor(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn peaks_on_shell_along_axis() {
        // Sines vanish on the axes, so the factor is exactly the radial term.
        let m = Modulus::new(ModulusParams { radius: 2.0, falloff: 1.5, floor: 0.25 });
        assert_abs_diff_eq!(m.factor(DVec3::new(2.0, 0.0, 0.0)), 1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m.factor(DVec3::new(0.0, 3.0, 0.0)), (-1.5f64).exp() + 0.25, epsilon = 1e-12);
    }

    #[test]
    fn result_is_parallel_to_input() {
        let m = Modulus::new(ModulusParams::default());
        let p = DVec3::new(0.4, -0.9, 0.3);
        let out = m.get_field_value(p);
        assert_abs_diff_eq!(out.cross(p).length(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.length(), p.length() * m.factor(p), epsilon = 1e-12);
    }

    #[test]
    fn origin_maps_to_origin() {
        let m = Modulus::new(ModulusParams::default());
        assert_eq!(m.get_field_value(DVec3::ZERO), DVec3::ZERO);
    }
}
