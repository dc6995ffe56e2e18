//! Unit direction field from three independently seeded noise channels.
use glam::DVec3;

use super::fbm::Fbm3;

/// Returned when the raw channel vector is too short to normalise.
pub const FALLBACK_DIRECTION: DVec3 = DVec3::Z;

const MIN_LENGTH: f64 = 1e-9;

pub struct Versor {
    scale: f64,
    channels: [Fbm3; 3],
}

impl Versor {
    pub fn new(seed: u32, scale: f64, octaves: u32) -> Self {
        Self {
            scale,
            channels: [
                Fbm3::new(seed ^ 0x7E51, octaves),
                Fbm3::new(seed ^ 0x7E52, octaves),
                Fbm3::new(seed ^ 0x7E53, octaves),
            ],
        }
    }

    /// Unit vector at `pos`. Each channel is sampled in `[0, 1]`, remapped
    /// to `[-1, 1]`, and the triple normalised.
    pub fn get_field_value(&self, pos: DVec3) -> DVec3 {
        let p = pos * self.scale;
        let raw = DVec3::new(
            self.channels[0].sample_01(p) * 2.0 - 1.0,
            self.channels[1].sample_01(p) * 2.0 - 1.0,
            self.channels[2].sample_01(p) * 2.0 - 1.0,
        );
        let len = raw.length();
        if !len.is_finite() || len < MIN_LENGTH {
            return FALLBACK_DIRECTION;
        }
        raw / len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn output_is_unit_length() {
        let v = Versor::new(42, 9.0, 3);
        for i in 0..200 {
            let t = i as f64 * 0.0731 + 0.013;
            let d = v.get_field_value(DVec3::new(t, -t * 0.4, t * 1.7 + 0.2));
            assert_abs_diff_eq!(d.length(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_octaves_falls_back() {
        let v = Versor::new(42, 9.0, 0);
        assert_eq!(v.get_field_value(DVec3::new(0.3, 0.2, 0.1)), FALLBACK_DIRECTION);
    }

    #[test]
    fn lattice_points_fall_back() {
        // Gradient noise vanishes on integer lattice points.
        let v = Versor::new(9, 1.0, 1);
        assert_eq!(v.get_field_value(DVec3::new(2.0, -3.0, 5.0)), FALLBACK_DIRECTION);
    }

    #[test]
    fn channels_are_independent() {
        let v = Versor::new(42, 2.0, 2);
        let d = v.get_field_value(DVec3::new(0.37, 0.81, 0.22));
        assert!(d.x != d.y || d.y != d.z, "{d:?}");
    }
}
