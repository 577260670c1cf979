//! # spatial-dsp
//!
//! Real-time binaural rendering engine. Takes moving sound sources placed
//! around a listener and renders them to a headphone-ready stereo (or
//! Ambisonic-domain) signal: HRTF/near-field convolution per source, an
//! Ambisonic encode/convolve path for diffuse and higher-order content, and
//! a scattering-delay-network room model for early reflections.
//!
//! Components follow a `Builder`/`Service` split: a `*Builder` accumulates
//! setup-time configuration and is fallible (`Result<T, SpatialError>`); its
//! `finish()` produces an immutable `*Service` used from the audio callback,
//! which never allocates and never returns `Result` (diagnostics go through
//! an [`error::ErrorSink`] instead).

pub mod ambisonic;
pub mod biquad;
pub mod command;
pub mod context;
pub mod error;
pub mod fft;
pub mod hrtf;
pub mod listener;
pub mod math;
pub mod ports;
pub mod processors;
pub mod sdn;
pub mod source;
pub mod sos;
pub mod upc;
pub mod waveguide;

pub use context::{AxisConvention, Ear, GlobalParameters};
pub use error::{ErrorSink, LogErrorSink, NullErrorSink, Result, SpatialError};
pub use math::{Quaternion, Transform, Vector3};
