//! Noise configuration shared by the versor and modulus fields.
use serde::{Deserialize, Serialize};

/// Radial falloff applied by [`Modulus`](super::modulus::Modulus).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulusParams {
    /// Distance from the origin at which modulation peaks.
    pub radius: f64,
    /// Exponential decay rate away from `radius`.
    pub falloff: f64,
    /// Constant added to the decay term.
    pub floor: f64,
}

impl Default for ModulusParams {
    fn default() -> Self {
        Self { radius: 1.0, falloff: 1.0, floor: 0.5 }
    }
}

/// Immutable settings for a [`VersorMap`](super::VersorMap).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub seed: u32,
    /// Spatial frequency multiplier applied before sampling.
    pub scale: f64,
    /// Octave count; zero disables the direction field.
    pub octaves: u32,
    pub modulus: ModulusParams,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self { seed: 42, scale: 9.0, octaves: 1, modulus: ModulusParams::default() }
    }
}
