//! Direct-path binaural listener model: every source convolved with its
//! own listener-relative HRTF, optionally near-field compensated, and
//! optionally contributing early reflections through a room environment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::context::GlobalParameters;
use crate::error::{ErrorSink, NullErrorSink, Result, SpatialError};
use crate::hrtf::HrtfService;
use crate::listener::environment::ListenerEnvironment;
use crate::math::Transform;
use crate::processors::{HrtfConvolverProcessor, NearFieldProcessor};
use crate::sdn::Wall;
use crate::sos::NearFieldService;
use crate::source::{SourceId, SourceProcessorRecord, SourceRenderMode};

/// Accumulates setup-time configuration. Mutating this after `finish()` is
/// not possible by construction: `finish()` consumes the builder.
pub struct HrtfListenerModelBuilder {
    params: GlobalParameters,
    hrtf: Option<Arc<HrtfService>>,
    near_field: Option<Arc<NearFieldService>>,
    walls: Vec<Wall>,
    num_partitions: usize,
}

impl HrtfListenerModelBuilder {
    pub fn new(params: GlobalParameters) -> Self {
        Self { params, hrtf: None, near_field: None, walls: Vec::new(), num_partitions: 8 }
    }

    pub fn with_hrtf(mut self, hrtf: Arc<HrtfService>) -> Self {
        self.hrtf = Some(hrtf);
        self
    }

    pub fn with_near_field(mut self, near_field: Arc<NearFieldService>) -> Self {
        self.near_field = Some(near_field);
        self
    }

    pub fn with_wall(mut self, wall: Wall) -> Self {
        self.walls.push(wall);
        self
    }

    pub fn with_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions.max(1);
        self
    }

    pub fn finish(self) -> Result<HrtfListenerModel> {
        let hrtf = self.hrtf.ok_or(SpatialError::NotSet)?;
        Ok(HrtfListenerModel {
            params: self.params,
            hrtf,
            near_field: self.near_field,
            environment: Mutex::new(ListenerEnvironment::new(&self.params, self.walls)),
            num_partitions: self.num_partitions,
            listener_transform: Mutex::new(Transform::default()),
            sources: Mutex::new(HashMap::new()),
            errors: Box::new(NullErrorSink),
        })
    }
}

/// The audio-callback-facing listener model. `Setup` is finished; the only
/// mutation left is the source table and the listener's own transform,
/// both guarded by an uncontended `Mutex` a control thread takes between
/// blocks, never from within the callback itself while it holds the lock
/// across a full `process`.
pub struct HrtfListenerModel {
    params: GlobalParameters,
    hrtf: Arc<HrtfService>,
    near_field: Option<Arc<NearFieldService>>,
    environment: Mutex<ListenerEnvironment>,
    num_partitions: usize,
    listener_transform: Mutex<Transform>,
    sources: Mutex<HashMap<SourceId, SourceProcessorRecord>>,
    errors: Box<dyn ErrorSink + Send + Sync>,
}

impl HrtfListenerModel {
    pub fn builder(params: GlobalParameters) -> HrtfListenerModelBuilder {
        HrtfListenerModelBuilder::new(params)
    }

    pub fn set_listener_transform(&self, transform: Transform) {
        *self.listener_transform.lock().unwrap() = transform;
    }

    pub fn add_source(&self, id: SourceId, transform: Transform) {
        let convolver = HrtfConvolverProcessor::new(&self.params, Arc::clone(&self.hrtf), self.num_partitions);
        let near_field = self
            .near_field
            .as_ref()
            .map(|svc| NearFieldProcessor::new(Arc::clone(svc)));
        let record =
            SourceProcessorRecord::new(transform, SourceRenderMode::Hrtf { convolver, near_field });
        self.sources.lock().unwrap().insert(id, record);
    }

    pub fn remove_source(&self, id: SourceId) {
        self.sources.lock().unwrap().remove(&id);
    }

    pub fn move_source(&self, id: SourceId, transform: Transform) {
        if let Some(record) = self.sources.lock().unwrap().get_mut(&id) {
            record.set_transform(transform);
        }
    }

    pub fn set_bypass(&self, id: SourceId, bypass: bool) {
        if let Some(record) = self.sources.lock().unwrap().get_mut(&id) {
            record.bypass = bypass;
        }
    }

    /// Renders every active source's contribution for `id`'s current input
    /// and mixes it into `left_out`/`right_out` (which the caller is
    /// responsible for zeroing before the first source of a block).
    pub fn process_source(
        &self,
        id: SourceId,
        input: &[f64],
        left_out: &mut [f64],
        right_out: &mut [f64],
    ) -> Result<()> {
        let listener = *self.listener_transform.lock().unwrap();
        let mut sources = self.sources.lock().unwrap();
        let record = sources.get_mut(&id).ok_or(SpatialError::NotInitialized)?;

        record.process(&self.params, &listener, input, left_out, right_out, self.errors.as_ref())?;

        let mut env = self.environment.lock().unwrap();
        if !env.is_anechoic() {
            env.mix_into(record.transform.position, listener.position, input, left_out, right_out)?;
        }
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.params.block_size
    }
}
