//! Portal-iterated fractal extraction.
//!
//! A reference mesh is turned into a volumetric field (signed distance, a
//! quaternion Julia escape value, or a blend), perturbed by seeded noise,
//! pulled back through a sequence of affine portals, and polygonized with
//! marching cubes once per portal iteration.

pub mod bounds;
pub mod distance;
pub mod error;
pub mod field;
pub mod generator;
pub mod marching_cubes;
pub mod mesh;
pub mod noise;
pub mod portal;

pub use bounds::Aabb;
pub use distance::MeshDistance;
pub use error::{FractalError, Result};
pub use field::{FieldSource, JuliaSet, JuliaSettings, ScalarField};
pub use generator::{FieldMode, FractalGenerator, FractalParams, FractalResult, PassReport, SkipReason};
pub use marching_cubes::{marching_cubes, GridSpec};
pub use mesh::Mesh;
pub use noise::{NoiseParams, VersorMap};
pub use portal::{PortalMap, PortalParams, PortalTransform};
