//! protangle-geometry
//!
//! Differential geometry for protein backbones.
//!
//! - [`vector`]: single-point helpers over `[f32; 3]` (dihedrals, Rodrigues rotations,
//!   quaternions, relative orientation of two oriented points).
//! - [`frames`]: the same math batched over candle `Tensor`s, plus local frames
//!   along a C-alpha trace and backbone torsions.
//! - [`psea`]: P-SEA secondary structure assignment from C-alpha windows.
//! - [`nerf`]: rebuild N/CA/C coordinates from backbone torsions.
//!
//! ```rust
//! use protangle_geometry::vector::{rotation_matrix, matrix_to_quaternion};
//!
//! let rot = rotation_matrix([0.0, 0.0, 1.0], std::f32::consts::FRAC_PI_2);
//! let [w, _, _, z] = matrix_to_quaternion(&rot);
//! assert!((w - z).abs() < 1e-5);
//! ```
pub mod error;
pub mod frames;
pub mod nerf;
pub mod ops;
pub mod psea;
pub mod vector;

pub use error::GeometryError;
pub use frames::{
    backbone_dihedrals, neighbourhood_relative_orientation, orientation, relative_orientation,
    RelativeOrientationTensors,
};
pub use nerf::{build_backbone, BackboneGeometry};
pub use psea::SecondaryStructure;
pub use vector::{Mat3, RelativeOrientation, Vec3};
