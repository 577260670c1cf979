//! Forward/inverse complex DFT wrapper used by the uniform-partitioned
//! convolver and the Ambisonic-domain convolver.
//!
//! FFT-domain partitioned convolution is built on the `rustfft`/
//! `num-complex` pairing (see `DESIGN.md` for the rationale).

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{Result, SpatialError};

/// Any inverse-transform magnitude below this is rounded to exactly zero,
/// so floating-point FFT round-off doesn't leave a permanent noise floor
/// under a signal that should be exact silence.
const ROUND_TO_ZERO_THRESHOLD: f64 = 1e-7;

/// A cached forward/inverse FFT pair for a fixed transform length.
///
/// `size` is always a power of two in this engine (the uniform-partitioned
/// convolver picks the next power of two at or above `2 * block_size`), so
/// `rustfft`'s planner hands back its fastest radix-2 path.
pub struct FftCore {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
}

impl FftCore {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self { size, forward, inverse, scratch: vec![Complex64::default(); scratch_len] }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Transforms `buffer` in place, time domain to frequency domain.
    pub fn forward(&mut self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.forward.process_with_scratch(buffer, &mut self.scratch);
    }

    /// Transforms `buffer` in place, frequency domain back to time domain,
    /// normalizes by `1/size` (`rustfft` leaves the inverse unscaled), and
    /// rounds any component below [`ROUND_TO_ZERO_THRESHOLD`] to zero.
    pub fn inverse(&mut self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.inverse.process_with_scratch(buffer, &mut self.scratch);
        let norm = 1.0 / self.size as f64;
        for sample in buffer.iter_mut() {
            *sample *= norm;
            if sample.re.abs() < ROUND_TO_ZERO_THRESHOLD {
                sample.re = 0.0;
            }
            if sample.im.abs() < ROUND_TO_ZERO_THRESHOLD {
                sample.im = 0.0;
            }
        }
    }
}

/// Smallest power of two that is `>= n`.
pub fn next_pow2(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    1usize << (usize::BITS - (n - 1).leading_zeros())
}

/// Accumulates `acc += a * b` for every bin, the inner loop of partitioned
/// frequency-domain convolution. Unequal-length inputs are a recoverable
/// error: `acc` is left untouched rather than panicking or truncating.
#[inline]
pub fn complex_mac(acc: &mut [Complex64], a: &[Complex64], b: &[Complex64]) -> Result<()> {
    if acc.len() != a.len() || acc.len() != b.len() {
        return Err(SpatialError::BadSize { expected: acc.len(), actual: a.len().max(b.len()) });
    }
    for ((out, &x), &y) in acc.iter_mut().zip(a).zip(b) {
        *out += x * y;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_examples() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(512), 512);
        assert_eq!(next_pow2(513), 1024);
    }

    #[test]
    fn forward_then_inverse_round_trips() {
        let mut core = FftCore::new(8);
        let original: Vec<Complex64> =
            (0..8).map(|i| Complex64::new(i as f64, 0.0)).collect();
        let mut buffer = original.clone();
        core.forward(&mut buffer);
        core.inverse(&mut buffer);
        for (a, b) in buffer.iter().zip(original.iter()) {
            assert!((a.re - b.re).abs() < 1e-9, "{a:?} vs {b:?}");
            assert!((a.im - b.im).abs() < 1e-9);
        }
    }

    #[test]
    fn mismatched_lengths_are_a_recoverable_no_op() {
        let mut acc = vec![Complex64::new(1.0, 0.0); 4];
        let a = vec![Complex64::default(); 4];
        let b = vec![Complex64::default(); 3];
        assert!(complex_mac(&mut acc, &a, &b).is_err());
        // acc is untouched, not partially written or panicked.
        assert_eq!(acc, vec![Complex64::new(1.0, 0.0); 4]);
    }

    #[test]
    fn inverse_rounds_tiny_magnitudes_to_zero() {
        let mut core = FftCore::new(8);
        let mut buffer = vec![Complex64::default(); 8];
        buffer[0] = Complex64::new(8e-8, 3e-8);
        core.inverse(&mut buffer);
        for sample in &buffer {
            assert_eq!(sample.re, 0.0);
            assert_eq!(sample.im, 0.0);
        }
    }

    #[test]
    fn dirac_impulse_has_flat_magnitude_spectrum() {
        let mut core = FftCore::new(8);
        let mut buffer = vec![Complex64::new(0.0, 0.0); 8];
        buffer[0] = Complex64::new(1.0, 0.0);
        core.forward(&mut buffer);
        for bin in &buffer {
            assert!((bin.norm() - 1.0).abs() < 1e-9);
        }
    }
}
