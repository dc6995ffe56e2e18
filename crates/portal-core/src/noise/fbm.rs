//! Octave-summed Perlin noise over 3D space.
//!
//! Amplitude halves and frequency doubles per octave. The sum is divided by
//! the total amplitude so the result stays in the single-octave range.
use glam::DVec3;
use noise::{NoiseFn, Perlin};

pub struct Fbm3 {
    pub octaves: u32,
    pub persistence: f64,
    pub lacunarity: f64,
    noise: Perlin,
}

impl Fbm3 {
    pub fn new(seed: u32, octaves: u32) -> Self {
        Self { octaves, persistence: 0.5, lacunarity: 2.0, noise: Perlin::new(seed) }
    }

    /// Normalised octave sum in `[-1, 1]`. Zero when `octaves == 0`.
    pub fn sample(&self, p: DVec3) -> f64 {
        let mut value = 0.0f64;
        let mut total = 0.0f64;
        let mut amp = 1.0f64;
        let mut freq = 1.0f64;
        for _ in 0..self.octaves {
            value += amp * self.noise.get([p.x * freq, p.y * freq, p.z * freq]);
            total += amp;
            amp *= self.persistence;
            freq *= self.lacunarity;
        }
        if total == 0.0 {
            return 0.0;
        }
        (value / total).clamp(-1.0, 1.0)
    }

    /// [`sample`](Self::sample) remapped to `[0, 1]`.
    #[inline]
    pub fn sample_01(&self, p: DVec3) -> f64 {
        self.sample(p) * 0.5 + 0.5
    }
}
