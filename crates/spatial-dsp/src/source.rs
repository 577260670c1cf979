//! The per-source record a listener model keeps, and the processing mode a
//! source can be rendered in.

use crate::context::GlobalParameters;
use crate::error::{ErrorSink, Result};
use crate::math::Transform;
use crate::processors::{HrtfConvolverProcessor, NearFieldProcessor};

/// Opaque handle a caller uses to refer to a source across `AddSource`,
/// `Move`, and `RemoveSource` commands.
pub type SourceId = u64;

/// How a single source is rendered into the listener's output.
pub enum SourceRenderMode {
    /// Convolved with a per-direction HRTF, optionally with near-field
    /// compensation layered on top.
    Hrtf { convolver: HrtfConvolverProcessor, near_field: Option<NearFieldProcessor> },
    /// Encoded into the listener's Ambisonic bus instead of convolved
    /// directly; used for diffuse or higher-order content.
    Ambisonic,
}

/// Everything a listener model tracks for one active source between
/// blocks: its render mode and the transform last reported for it.
pub struct SourceProcessorRecord {
    pub transform: Transform,
    pub mode: SourceRenderMode,
    /// Disables HRTF/near-field processing for this source and routes it
    /// straight through at unity gain; the original system's listener
    /// models carry the same per-source bypass so a non-spatialised stem
    /// (narration, a UI cue) can share a listener model with spatialised
    /// content.
    pub bypass: bool,
}

impl SourceProcessorRecord {
    pub fn new(transform: Transform, mode: SourceRenderMode) -> Self {
        Self { transform, mode, bypass: false }
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Renders one block of this source's input into `left`/`right`,
    /// relative to `listener`. `input` and both output slices must be
    /// `params.block_size` samples.
    pub fn process(
        &mut self,
        params: &GlobalParameters,
        listener: &Transform,
        input: &[f64],
        left: &mut [f64],
        right: &mut [f64],
        errors: &dyn ErrorSink,
    ) -> Result<()> {
        if self.bypass {
            left.copy_from_slice(input);
            right.copy_from_slice(input);
            return Ok(());
        }
        match &mut self.mode {
            SourceRenderMode::Hrtf { convolver, near_field } => {
                convolver.process(params, listener, &self.transform, input, left, right, errors)?;
                if let Some(nf) = near_field {
                    nf.process_in_place(listener, &self.transform, left, right)?;
                }
                Ok(())
            }
            SourceRenderMode::Ambisonic => {
                // Ambisonic-routed sources are summed into the listener's
                // bus upstream of per-source stereo rendering; nothing to
                // do in the per-source pass.
                left.copy_from_slice(input);
                right.copy_from_slice(input);
                Ok(())
            }
        }
    }
}
