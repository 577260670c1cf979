//! Per-channel binaural decoding filters for an Ambisonic bus, built from a
//! measured [`HrtfService`] rather than accepted as pre-baked taps.
//!
//! Mirrors the way `AddImpulseResponsesFromHRIR` builds an Ambisonic BIR: a
//! fixed virtual-speaker rig is placed around the listener, the HRTF is
//! queried at every speaker direction, and each speaker's HRIR is encoded
//! (scaled by that speaker's spherical-harmonic gain for each channel) and
//! accumulated into that channel's decoding filter. Decoding an Ambisonic
//! bus through these filters is then exactly equivalent to decoding it to
//! the virtual speakers and convolving each speaker feed with its own HRIR,
//! without ever materializing the speaker-domain signal.

use crate::ambisonic::sh::{channel_count, normalized_sh_coefficients, AmbisonicOrder, Normalization};
use crate::error::Result;
use crate::fft::FftCore;
use crate::hrtf::HrtfService;
use crate::upc::PartitionedIr;

/// Points distributed on the sphere via the golden-angle spiral (a cheap
/// stand-in for a true spherical t-design): successive points advance by
/// the golden angle in azimuth while elevation sweeps pole to pole, giving
/// a visually and numerically even covering for any requested count.
fn virtual_speaker_directions(count: usize) -> Vec<(f64, f64)> {
    let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let elevation = y.clamp(-1.0, 1.0).asin();
            let azimuth = golden_angle * i as f64;
            (azimuth, elevation)
        })
        .collect()
}

/// Number of virtual speakers used to sample the sphere for a given order.
/// Oversampled relative to `channel_count(order)` so the golden-angle
/// covering approximates the orthonormal projection integral reasonably
/// well without solving for an exact decode matrix.
fn default_speaker_count(order: AmbisonicOrder) -> usize {
    channel_count(order) * 4
}

pub struct AmbisonicIrServiceBuilder {
    block_size: usize,
    order: AmbisonicOrder,
    normalization: Normalization,
    speaker_count: usize,
}

impl AmbisonicIrServiceBuilder {
    pub fn new(block_size: usize, order: AmbisonicOrder, normalization: Normalization) -> Self {
        Self { block_size, speaker_count: default_speaker_count(order), order, normalization }
    }

    /// Overrides the number of virtual speakers used to sample the sphere.
    /// More speakers trade setup-time cost for a closer approximation to
    /// the true encode/decode integral.
    pub fn with_speaker_count(mut self, speaker_count: usize) -> Self {
        self.speaker_count = speaker_count.max(channel_count(self.order));
        self
    }

    /// Bakes one binaural decoding filter per Ambisonic channel by querying
    /// `hrtf` at every virtual speaker direction and accumulating each
    /// speaker's HRIR weighted by its spherical-harmonic gain for that
    /// channel.
    pub fn finish(self, hrtf: &HrtfService) -> Result<AmbisonicIrService> {
        let n = channel_count(self.order);
        let taps_len = hrtf.taps_len();
        let mut left_taps = vec![vec![0.0; taps_len]; n];
        let mut right_taps = vec![vec![0.0; taps_len]; n];

        for (azimuth, elevation) in virtual_speaker_directions(self.speaker_count) {
            let interpolated = hrtf.query(azimuth, elevation);
            let gains = normalized_sh_coefficients(self.order, self.normalization, azimuth, elevation);
            for channel in 0..n {
                let gain = gains[channel];
                for (acc, tap) in left_taps[channel].iter_mut().zip(interpolated.left.taps.iter()) {
                    *acc += gain * tap;
                }
                for (acc, tap) in right_taps[channel].iter_mut().zip(interpolated.right.taps.iter()) {
                    *acc += gain * tap;
                }
            }
        }

        let mut fft = FftCore::new(2 * self.block_size);
        let left = left_taps.iter().map(|t| PartitionedIr::from_taps(t, self.block_size, &mut fft)).collect();
        let right = right_taps.iter().map(|t| PartitionedIr::from_taps(t, self.block_size, &mut fft)).collect();
        Ok(AmbisonicIrService { block_size: self.block_size, left, right })
    }
}

/// Immutable, query-only set of per-channel binaural decoding filters.
pub struct AmbisonicIrService {
    block_size: usize,
    left: Vec<PartitionedIr>,
    right: Vec<PartitionedIr>,
}

impl AmbisonicIrService {
    pub fn builder(block_size: usize, order: AmbisonicOrder, normalization: Normalization) -> AmbisonicIrServiceBuilder {
        AmbisonicIrServiceBuilder::new(block_size, order, normalization)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn channel_count(&self) -> usize {
        self.left.len()
    }

    pub fn left(&self, channel: usize) -> &PartitionedIr {
        &self.left[channel]
    }

    pub fn right(&self, channel: usize) -> &PartitionedIr {
        &self.right[channel]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hrtf::Hrir;

    fn hrtf() -> HrtfService {
        HrtfService::builder()
            .add_measurement(0.0, 0.0, Hrir::new(vec![1.0, 0.0, 0.0, 0.0], 0.0), Hrir::new(vec![0.5, 0.0, 0.0, 0.0], 0.0))
            .add_measurement(
                std::f64::consts::PI,
                0.0,
                Hrir::new(vec![0.5, 0.0, 0.0, 0.0], 0.0),
                Hrir::new(vec![1.0, 0.0, 0.0, 0.0], 0.0),
            )
            .finish(4)
            .unwrap()
    }

    #[test]
    fn builds_one_partitioned_ir_per_ambisonic_channel() {
        let service =
            AmbisonicIrService::builder(4, AmbisonicOrder::First, Normalization::Sn3d).finish(&hrtf()).unwrap();
        assert_eq!(service.channel_count(), channel_count(AmbisonicOrder::First));
        assert_eq!(service.left(0).num_partitions(), 1);
    }

    #[test]
    fn w_channel_decoding_filter_is_nonzero() {
        let service =
            AmbisonicIrService::builder(4, AmbisonicOrder::First, Normalization::Sn3d).finish(&hrtf()).unwrap();
        // The omnidirectional channel's SH gain is 1.0 everywhere, so its
        // decoding filter is the speaker-weighted sum of every queried
        // HRIR and cannot be all zero for a nonzero HRTF.
        let any_nonzero = (0..service.left(0).num_partitions()).any(|p| {
            service.left(0).partitions[p].iter().any(|c| c.norm() > 1e-9)
        });
        assert!(any_nonzero);
    }

    #[test]
    fn higher_speaker_count_still_builds() {
        let service = AmbisonicIrService::builder(4, AmbisonicOrder::First, Normalization::Sn3d)
            .with_speaker_count(64)
            .finish(&hrtf())
            .unwrap();
        assert_eq!(service.channel_count(), channel_count(AmbisonicOrder::First));
    }
}
