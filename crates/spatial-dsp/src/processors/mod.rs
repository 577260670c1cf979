//! Per-source signal-processing chains a listener model wires up for each
//! active source.

mod hrtf_convolver;
mod nearfield;

pub use hrtf_convolver::HrtfConvolverProcessor;
pub use nearfield::NearFieldProcessor;
