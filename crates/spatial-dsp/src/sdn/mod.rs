//! Scattering-delay-network early-reflection model: a handful of room
//! boundaries, each hosting a scattering node coupled to every other
//! node, fed by the source and read by the listener, the combined
//! contribution mixed into a single reflected signal a listener model
//! mixes alongside its direct HRTF path.

mod processor;
mod wall;

pub use processor::SdnEnvironmentProcessor;
pub use wall::Wall;
