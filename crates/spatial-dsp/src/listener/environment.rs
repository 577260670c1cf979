//! Optional room contribution a listener model mixes in alongside its
//! direct per-source paths.

use crate::context::GlobalParameters;
use crate::error::Result;
use crate::math::Vector3;
use crate::sdn::{SdnEnvironmentProcessor, Wall};

/// Wraps [`SdnEnvironmentProcessor`] with the mono-scratch buffer a
/// listener model needs to mix its output into a stereo bus. Kept separate
/// from the SDN module itself so the module boundary matches the system
/// overview's component table (environment processor vs. listener model).
pub struct ListenerEnvironment {
    processor: SdnEnvironmentProcessor,
    scratch: Vec<f64>,
}

impl ListenerEnvironment {
    pub fn new(params: &GlobalParameters, walls: Vec<Wall>) -> Self {
        Self { processor: SdnEnvironmentProcessor::new(params, walls), scratch: vec![0.0; params.block_size] }
    }

    pub fn is_anechoic(&self) -> bool {
        self.processor.is_anechoic()
    }

    pub fn reset(&mut self) {
        self.processor.reset();
    }

    /// Renders one source's reflected contribution and mixes it equally
    /// into both ears (the reflected signal here is a single diffuse
    /// mono path, not independently spatialised per wall).
    pub fn mix_into(
        &mut self,
        source_pos: Vector3,
        listener_pos: Vector3,
        input: &[f64],
        left: &mut [f64],
        right: &mut [f64],
    ) -> Result<()> {
        if self.processor.is_anechoic() {
            return Ok(());
        }
        self.processor.process(source_pos, listener_pos, input, &mut self.scratch)?;
        for ((l, r), &s) in left.iter_mut().zip(right.iter_mut()).zip(&self.scratch) {
            *l += s;
            *r += s;
        }
        Ok(())
    }
}
