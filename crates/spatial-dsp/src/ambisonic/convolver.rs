//! Convolves an encoded Ambisonic channel set against
//! [`super::AmbisonicIrService`]'s per-channel decoding filters and sums
//! the results to stereo, the Ambisonic-domain counterpart of
//! [`crate::processors::HrtfConvolverProcessor`].

use std::sync::Arc;

use crate::ambisonic::ir_service::AmbisonicIrService;
use crate::error::{Result, SpatialError};
use crate::upc::UpcConvolver;

/// Per-source (or per-bus) Ambisonic-domain convolver: one [`UpcConvolver`]
/// per channel per ear.
pub struct AmbisonicConvolverProcessor {
    ir: Arc<AmbisonicIrService>,
    left: Vec<UpcConvolver>,
    right: Vec<UpcConvolver>,
    scratch: Vec<f64>,
}

impl AmbisonicConvolverProcessor {
    pub fn new(ir: Arc<AmbisonicIrService>, num_partitions: usize) -> Self {
        let block_size = ir.block_size();
        let n = ir.channel_count();
        Self {
            left: (0..n).map(|_| UpcConvolver::new(block_size, num_partitions)).collect(),
            right: (0..n).map(|_| UpcConvolver::new(block_size, num_partitions)).collect(),
            scratch: vec![0.0; block_size],
            ir,
        }
    }

    pub fn reset(&mut self) {
        self.left.iter_mut().for_each(UpcConvolver::reset);
        self.right.iter_mut().for_each(UpcConvolver::reset);
    }

    /// Convolves and sums every channel of the left-ear encoded bus against
    /// the service's left-ear decoding filters into `left_out`, and the
    /// right-ear bus against the right-ear filters into `right_out`. The two
    /// buses carry the bilateral encoder's per-ear, parallax-corrected
    /// signals, so this never mixes a left-ear-encoded channel into the
    /// right output or vice versa.
    pub fn process(
        &mut self,
        left_channels: &[Vec<f64>],
        right_channels: &[Vec<f64>],
        left_out: &mut [f64],
        right_out: &mut [f64],
    ) -> Result<()> {
        if left_channels.len() != self.ir.channel_count() {
            return Err(SpatialError::BadSize {
                expected: self.ir.channel_count(),
                actual: left_channels.len(),
            });
        }
        if right_channels.len() != self.ir.channel_count() {
            return Err(SpatialError::BadSize {
                expected: self.ir.channel_count(),
                actual: right_channels.len(),
            });
        }
        left_out.iter_mut().for_each(|s| *s = 0.0);
        right_out.iter_mut().for_each(|s| *s = 0.0);

        for (ch, signal) in left_channels.iter().enumerate() {
            self.left[ch].process(signal, self.ir.left(ch), &mut self.scratch)?;
            for (out, &s) in left_out.iter_mut().zip(&self.scratch) {
                *out += s;
            }
        }
        for (ch, signal) in right_channels.iter().enumerate() {
            self.right[ch].process(signal, self.ir.right(ch), &mut self.scratch)?;
            for (out, &s) in right_out.iter_mut().zip(&self.scratch) {
                *out += s;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambisonic::sh::{channel_count, AmbisonicOrder, Normalization};
    use crate::hrtf::{Hrir, HrtfService};

    fn ir(block_size: usize) -> Arc<AmbisonicIrService> {
        let hrtf = HrtfService::builder()
            .add_measurement(0.0, 0.0, Hrir::new(vec![1.0, 0.0, 0.0, 0.0], 0.0), Hrir::new(vec![0.5, 0.0, 0.0, 0.0], 0.0))
            .add_measurement(
                std::f64::consts::PI,
                0.0,
                Hrir::new(vec![0.5, 0.0, 0.0, 0.0], 0.0),
                Hrir::new(vec![1.0, 0.0, 0.0, 0.0], 0.0),
            )
            .finish(block_size)
            .unwrap();
        Arc::new(
            AmbisonicIrService::builder(block_size, AmbisonicOrder::First, Normalization::Sn3d)
                .finish(&hrtf)
                .unwrap(),
        )
    }

    #[test]
    fn matching_channel_count_processes_without_error() {
        let block_size = 4;
        let n = channel_count(AmbisonicOrder::First);
        let mut conv = AmbisonicConvolverProcessor::new(ir(block_size), 1);
        let left_channels = vec![vec![1.0, 2.0, 3.0, 4.0]; n];
        let right_channels = vec![vec![1.0, 2.0, 3.0, 4.0]; n];
        let mut left = vec![0.0; block_size];
        let mut right = vec![0.0; block_size];
        conv.process(&left_channels, &right_channels, &mut left, &mut right).unwrap();
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let block_size = 4;
        let mut conv = AmbisonicConvolverProcessor::new(ir(block_size), 1);
        let left_channels = vec![vec![0.0; block_size]; 2];
        let right_channels = vec![vec![0.0; block_size]; 2];
        let mut left = vec![0.0; block_size];
        let mut right = vec![0.0; block_size];
        assert!(conv.process(&left_channels, &right_channels, &mut left, &mut right).is_err());
    }
}
