//! Geometry primitives shared by every component that reasons about source
//! and listener placement: positions, orientations, and the direction
//! queries derived from them.

mod quaternion;
mod transform;
mod vector;

pub use quaternion::Quaternion;
pub use transform::Transform;
pub use vector::Vector3;
