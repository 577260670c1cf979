//! Variable-length delay line used to simulate propagation delay (and its
//! derivative, Doppler shift) as a source moves relative to the listener.
//!
//! Grounded on the original system's `Waveguide`: a ring buffer read with
//! linear interpolation at a fractional delay derived from distance and the
//! speed of sound, plus an inverse-distance gain so a source approaching
//! the listener gets louder without a separate gain stage. The original
//! elastically resizes its buffer and tracks per-segment source-position
//! metadata to support independent push/pop call timing; this engine always
//! drives both ends from the same per-sample distance array, so a fixed-
//! capacity ring with an explicit cold-start and a causal clamp on how fast
//! the delay may shrink reproduces the same audible behaviour without the
//! bookkeeping that independent push/pop timing would need.

use spatial_core::StackVec;

use crate::context::GlobalParameters;
use crate::error::{Result, SpatialError};

/// Ring-buffer capacity, large enough for any distance this engine is
/// expected to model (about 100m at 48kHz).
const MAX_DELAY_SAMPLES: usize = 1 << 15;

/// One source's propagation-delay line.
pub struct Waveguide {
    ring: StackVec<f64, MAX_DELAY_SAMPLES>,
    write_pos: usize,
    samples_per_metre: f64,
    /// Distance below which the inverse-distance gain is clamped, so a
    /// source at (or inside) the listener's head doesn't divide by
    /// something near zero.
    min_distance: f64,
    current_delay_samples: f64,
    /// When false, `process` passes `input` straight through (still gained
    /// by distance) instead of reading back a delayed sample — used by
    /// callers for whom the delay is already carried elsewhere (e.g. in a
    /// measured impulse response) and only the gain read-out is wanted.
    propagation_delay_enabled: bool,
    /// Set once the first sample has primed `current_delay_samples`, so
    /// the line jumps straight to the correct delay on the very first call
    /// instead of ramping up from zero and producing a chirp.
    primed: bool,
}

impl Waveguide {
    pub fn new(params: &GlobalParameters, min_distance: f64) -> Self {
        let mut ring = StackVec::new();
        for _ in 0..MAX_DELAY_SAMPLES {
            let _ = ring.push(0.0);
        }
        Self {
            ring,
            write_pos: 0,
            samples_per_metre: params.samples_per_metre(),
            min_distance: min_distance.max(1e-3),
            current_delay_samples: 0.0,
            propagation_delay_enabled: true,
            primed: false,
        }
    }

    pub fn reset(&mut self) {
        for s in self.ring.as_mut_slice() {
            *s = 0.0;
        }
        self.write_pos = 0;
        self.current_delay_samples = 0.0;
        self.primed = false;
    }

    /// Disables the read-back delay, turning `process` into a pure gain
    /// stage. Distance-derived ITD is still meaningful to apply elsewhere
    /// (a measured HRIR already encodes it); this just stops the line from
    /// applying it a second time.
    pub fn set_propagation_delay_enabled(&mut self, enabled: bool) {
        self.propagation_delay_enabled = enabled;
    }

    /// Inverse-distance attenuation, 1.0 at `min_distance`, falling off
    /// beyond it.
    #[inline]
    pub fn distance_gain(&self, distance: f64) -> f64 {
        self.min_distance / distance.max(self.min_distance)
    }

    fn delay_for_distance(&self, distance: f64) -> f64 {
        (distance * self.samples_per_metre).min((MAX_DELAY_SAMPLES - 2) as f64)
    }

    /// Writes `input` and reads back `input.len()` samples delayed by the
    /// propagation time implied by `distance`, scaled by the inverse-
    /// distance gain. `distance` is allowed to change sample-to-sample
    /// within the block (the caller linearly ramps it across the block
    /// from the previous call's distance to this one's), which is what
    /// produces Doppler shift as a source moves. A source closing distance
    /// faster than sound itself would need the line to read ahead of what
    /// it has written, which isn't physical, so the delay is never allowed
    /// to shrink by more than one sample per output sample; a listener or
    /// source moving apart just lets the delay grow as far as `distance`
    /// demands.
    pub fn process(&mut self, input: &[f64], distances: &[f64], output: &mut [f64]) -> Result<()> {
        if input.len() != distances.len() || input.len() != output.len() {
            return Err(SpatialError::BadSize { expected: input.len(), actual: output.len() });
        }
        let capacity = self.ring.len();
        for ((&x, &distance), y) in input.iter().zip(distances).zip(output.iter_mut()) {
            self.ring[self.write_pos] = x;

            if !self.propagation_delay_enabled {
                *y = x * self.distance_gain(distance);
                self.write_pos = (self.write_pos + 1) % capacity;
                continue;
            }

            let target_delay = self.delay_for_distance(distance);
            if !self.primed {
                self.current_delay_samples = target_delay;
                self.primed = true;
            } else {
                let shrink = self.current_delay_samples - target_delay;
                self.current_delay_samples =
                    if shrink > 1.0 { self.current_delay_samples - 1.0 } else { target_delay };
            }

            let read_pos = (self.write_pos as f64) - self.current_delay_samples;
            let read_pos = ((read_pos % capacity as f64) + capacity as f64) % capacity as f64;
            let i0 = read_pos.floor() as usize % capacity;
            let i1 = (i0 + 1) % capacity;
            let frac = read_pos.fract();
            let sample = self.ring[i0] * (1.0 - frac) + self.ring[i1] * frac;

            *y = sample * self.distance_gain(distance);
            self.write_pos = (self.write_pos + 1) % capacity;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GlobalParameters {
        GlobalParameters::new(48_000.0, 64)
    }

    #[test]
    fn constant_distance_delays_an_impulse_by_the_expected_sample_count() {
        let mut wg = Waveguide::new(&params(), 0.1);
        let samples_per_metre = params().samples_per_metre();
        let distance = 1.0;
        let delay = (distance * samples_per_metre).round() as usize;

        let block_len = delay + 8;
        let mut input = vec![0.0; block_len];
        input[0] = 1.0;
        let distances = vec![distance; block_len];
        let mut output = vec![0.0; block_len];
        wg.process(&input, &distances, &mut output).unwrap();

        let (peak_idx, _) =
            output.iter().enumerate().max_by(|a, b| a.1.abs().total_cmp(&b.1.abs())).unwrap();
        assert!(
            (peak_idx as isize - delay as isize).abs() <= 1,
            "peak at {peak_idx}, expected near {delay}"
        );
    }

    #[test]
    fn closer_distance_yields_more_gain() {
        let wg = Waveguide::new(&params(), 0.5);
        assert!(wg.distance_gain(0.5) > wg.distance_gain(2.0));
        assert_eq!(wg.distance_gain(0.1), 1.0);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut wg = Waveguide::new(&params(), 0.1);
        let input = vec![0.0; 4];
        let distances = vec![1.0; 3];
        let mut output = vec![0.0; 4];
        assert!(wg.process(&input, &distances, &mut output).is_err());
    }

    #[test]
    fn disabled_propagation_delay_is_a_pure_gain_stage() {
        let mut wg = Waveguide::new(&params(), 0.5);
        wg.set_propagation_delay_enabled(false);
        let input = vec![1.0, 2.0, 3.0];
        let distances = vec![2.0; 3];
        let mut output = vec![0.0; 3];
        wg.process(&input, &distances, &mut output).unwrap();
        let gain = wg.distance_gain(2.0);
        for (x, y) in input.iter().zip(&output) {
            assert!((y - x * gain).abs() < 1e-9);
        }
    }

    #[test]
    fn first_call_primes_directly_to_the_target_delay() {
        let mut wg = Waveguide::new(&params(), 0.1);
        let samples_per_metre = params().samples_per_metre();
        let distance = 5.0;
        let delay = (distance * samples_per_metre).round() as usize;
        let block_len = delay + 8;
        let mut input = vec![0.0; block_len];
        input[0] = 1.0;
        let distances = vec![distance; block_len];
        let mut output = vec![0.0; block_len];
        wg.process(&input, &distances, &mut output).unwrap();
        let (peak_idx, _) =
            output.iter().enumerate().max_by(|a, b| a.1.abs().total_cmp(&b.1.abs())).unwrap();
        assert!(
            (peak_idx as isize - delay as isize).abs() <= 1,
            "peak at {peak_idx}, expected near {delay} (no ramp-up from a cold zero delay)"
        );
    }

    #[test]
    fn delay_never_shrinks_faster_than_one_sample_per_sample() {
        let mut wg = Waveguide::new(&params(), 0.1);
        let far = vec![50.0; 4];
        let mut scratch = vec![0.0; 4];
        wg.process(&vec![0.0; 4], &far, &mut scratch).unwrap();

        let near = vec![0.0; 4];
        wg.process(&vec![0.0; 4], &near, &mut scratch).unwrap();
        assert!(wg.current_delay_samples >= 1.0);
    }
}
