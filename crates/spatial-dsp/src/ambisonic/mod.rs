//! Ambisonic encode/IR-convolve path: spherical-harmonic encoding of a
//! mono source into a B-format-style channel set, and convolution of that
//! channel set against a precomputed per-channel binaural decoding filter.

mod convolver;
mod encoder;
mod ir_service;
mod sh;

pub use convolver::AmbisonicConvolverProcessor;
pub use encoder::BilateralAmbisonicEncoderProcessor;
pub use ir_service::{AmbisonicIrService, AmbisonicIrServiceBuilder};
pub use sh::{channel_count, normalized_sh_coefficients, sh_coefficients, AmbisonicOrder, Normalization};
