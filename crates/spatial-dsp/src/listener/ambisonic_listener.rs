//! Ambisonic-bus listener model: sources are encoded into a shared
//! Ambisonic channel set and decoded to stereo by one convolution pass,
//! rather than each source carrying its own HRTF convolver. Cheaper per
//! source at the cost of precision lost to the encode/decode round trip,
//! the tradeoff the system overview calls out for diffuse or
//! higher-order content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ambisonic::{
    AmbisonicConvolverProcessor, AmbisonicIrService, AmbisonicOrder, BilateralAmbisonicEncoderProcessor,
    Normalization,
};
use crate::context::GlobalParameters;
use crate::error::{Result, SpatialError};
use crate::math::Transform;
use crate::source::SourceId;

struct EncodedSource {
    transform: Transform,
    encoder: BilateralAmbisonicEncoderProcessor,
}

pub struct AmbisonicListenerModelBuilder {
    params: GlobalParameters,
    order: AmbisonicOrder,
    ir: Option<Arc<AmbisonicIrService>>,
    num_partitions: usize,
}

impl AmbisonicListenerModelBuilder {
    pub fn new(params: GlobalParameters, order: AmbisonicOrder) -> Self {
        Self { params, order, ir: None, num_partitions: 8 }
    }

    pub fn with_ir_service(mut self, ir: Arc<AmbisonicIrService>) -> Self {
        self.ir = Some(ir);
        self
    }

    pub fn with_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions.max(1);
        self
    }

    pub fn finish(self) -> Result<AmbisonicListenerModel> {
        let ir = self.ir.ok_or(SpatialError::NotSet)?;
        if ir.channel_count() != crate::ambisonic::channel_count(self.order) {
            return Err(SpatialError::BadSize {
                expected: crate::ambisonic::channel_count(self.order),
                actual: ir.channel_count(),
            });
        }
        Ok(AmbisonicListenerModel {
            params: self.params,
            order: self.order,
            convolver: Mutex::new(AmbisonicConvolverProcessor::new(Arc::clone(&ir), self.num_partitions)),
            listener_transform: Mutex::new(Transform::default()),
            sources: Mutex::new(HashMap::new()),
        })
    }
}

pub struct AmbisonicListenerModel {
    params: GlobalParameters,
    order: AmbisonicOrder,
    convolver: Mutex<AmbisonicConvolverProcessor>,
    listener_transform: Mutex<Transform>,
    sources: Mutex<HashMap<SourceId, EncodedSource>>,
}

impl AmbisonicListenerModel {
    pub fn builder(params: GlobalParameters, order: AmbisonicOrder) -> AmbisonicListenerModelBuilder {
        AmbisonicListenerModelBuilder::new(params, order)
    }

    pub fn set_listener_transform(&self, transform: Transform) {
        *self.listener_transform.lock().unwrap() = transform;
    }

    pub fn add_source(&self, id: SourceId, transform: Transform) {
        let encoder = BilateralAmbisonicEncoderProcessor::new(self.order, Normalization::Sn3d);
        self.sources.lock().unwrap().insert(id, EncodedSource { transform, encoder });
    }

    pub fn remove_source(&self, id: SourceId) {
        self.sources.lock().unwrap().remove(&id);
    }

    pub fn move_source(&self, id: SourceId, transform: Transform) {
        if let Some(source) = self.sources.lock().unwrap().get_mut(&id) {
            source.transform = transform;
        }
    }

    /// Encodes every active source's current input and convolves the
    /// summed Ambisonic bus down to stereo in one pass.
    ///
    /// `inputs` maps each active source id to its block of input samples;
    /// a source with no entry is treated as silent for this block.
    pub fn process(
        &self,
        inputs: &HashMap<SourceId, Vec<f64>>,
        left_out: &mut [f64],
        right_out: &mut [f64],
    ) -> Result<()> {
        let block_size = self.params.block_size;
        let listener = *self.listener_transform.lock().unwrap();
        let mut sources = self.sources.lock().unwrap();
        let channel_count = crate::ambisonic::channel_count(self.order);
        let mut left_bus = vec![vec![0.0; block_size]; channel_count];
        let mut right_bus = vec![vec![0.0; block_size]; channel_count];

        for (id, source) in sources.iter_mut() {
            let silence = vec![0.0; block_size];
            let input = inputs.get(id).unwrap_or(&silence);
            let mut per_source_left = vec![vec![0.0; block_size]; channel_count];
            let mut per_source_right = vec![vec![0.0; block_size]; channel_count];
            source.encoder.process(
                &self.params,
                &listener,
                &source.transform,
                input,
                &mut per_source_left,
                &mut per_source_right,
            )?;
            for (bus_ch, src_ch) in left_bus.iter_mut().zip(per_source_left.iter()) {
                for (b, s) in bus_ch.iter_mut().zip(src_ch) {
                    *b += s;
                }
            }
            for (bus_ch, src_ch) in right_bus.iter_mut().zip(per_source_right.iter()) {
                for (b, s) in bus_ch.iter_mut().zip(src_ch) {
                    *b += s;
                }
            }
        }

        self.convolver.lock().unwrap().process(&left_bus, &right_bus, left_out, right_out)
    }
}
