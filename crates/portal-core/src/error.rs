//! Error types for the fractal kernel.

use glam::DVec3;
use thiserror::Error;

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, FractalError>;

/// Errors raised by the transform stack, the mesh container, and the
/// extraction pipeline.
#[derive(Error, Debug)]
pub enum FractalError {
    /// Inverse mapping requested through a matrix with a near-zero determinant.
    #[error("singular portal transform (determinant {determinant:e})")]
    SingularTransform { determinant: f64 },

    /// Distance query against a mesh without triangles.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// Portal index outside the portal sequence.
    #[error("portal index {index} out of range for {len} portal(s)")]
    InvalidPortalIndex { index: usize, len: usize },

    /// Extraction region with `min > max` on some axis, or no volume at all.
    #[error("degenerate bounding box: min {min:?}, max {max:?}")]
    DegenerateBoundingBox { min: DVec3, max: DVec3 },

    /// Mesh buffers that break the indexed-triangle invariants.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Malformed parameter document.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
