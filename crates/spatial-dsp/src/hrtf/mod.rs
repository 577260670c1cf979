//! HRTF measurement storage, interpolation, and the query service a
//! processor's `Setup` builds once and queries every block thereafter.

mod hrir;
mod interpolate;
mod service;
mod table;

pub use hrir::Hrir;
pub use interpolate::InterpolatedHrir;
pub use service::{HrirSource, HrtfService, HrtfServiceBuilder, PartitionedHrirPair};
pub use table::HrtfTable;
