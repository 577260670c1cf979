//! Listener models: the top-level objects an application holds one of per
//! rendered ear pair, each owning a set of sources and mixing them down to
//! a stereo output block per callback.
//!
//! Every model follows the same two-state split the design notes call
//! for: a `*Builder` that is mutated only between `BeginSetup` and
//! `EndSetup` (modelled here as the builder's `finish()` consuming it), and
//! an immutable-shape `*Model` used from the audio callback. Mutating a
//! running model (adding/removing/moving a source) takes a plain
//! `std::sync::Mutex`, not a spin lock or `parking_lot`, matching the
//! concurrency design's judgement that source-list contention is rare
//! enough that an uncontended `std::sync::Mutex`'s cost is negligible.

mod ambisonic_listener;
mod environment;
mod hrtf_listener;

pub use ambisonic_listener::{AmbisonicListenerModel, AmbisonicListenerModelBuilder};
pub use environment::ListenerEnvironment;
pub use hrtf_listener::{HrtfListenerModel, HrtfListenerModelBuilder};
