//! Uniform-partitioned convolution (overlap-save, frequency domain).
//!
//! Ported in spirit from `UPCAnechoic`: the impulse response is split into
//! `num_partitions` subfilters of `block_size` taps each, every subfilter
//! pre-transformed once. Each call doubles the current input block with the
//! previous one before transforming (the overlap-save trick that makes the
//! second half of the inverse transform the valid, alias-free output), then
//! walks a ring of past input transforms against the partitioned IR.
//!
//! [`UpcConvolver::process`] serves a fixed impulse response; when the IR
//! itself changes every block (a source in motion being re-interpolated
//! every callback), [`UpcConvolver::process_with_ir_memory`] keeps a ring of
//! the IR snapshots actually in force when each historical input block
//! arrived, so a partition's contribution always uses the IR that was
//! current at the time, not a more recent one applied retroactively.

use num_complex::Complex64;

use crate::error::{Result, SpatialError};
use crate::fft::{complex_mac, FftCore};

/// An impulse response pre-split into `num_partitions` subfilters of
/// `block_size` taps, each already transformed to the frequency domain at
/// `2 * block_size` resolution (zero-padded before transforming, per
/// overlap-save).
#[derive(Debug, Clone)]
pub struct PartitionedIr {
    pub partitions: Vec<Vec<Complex64>>,
}

impl PartitionedIr {
    /// Splits `taps` into `ceil(taps.len() / block_size)` partitions and
    /// transforms each.
    pub fn from_taps(taps: &[f64], block_size: usize, fft: &mut FftCore) -> Self {
        let fft_size = 2 * block_size;
        let num_partitions = taps.len().div_ceil(block_size).max(1);
        let mut partitions = Vec::with_capacity(num_partitions);
        for p in 0..num_partitions {
            let start = p * block_size;
            let end = (start + block_size).min(taps.len());
            let mut buffer = vec![Complex64::default(); fft_size];
            for (i, &s) in taps[start..end].iter().enumerate() {
                buffer[i] = Complex64::new(s, 0.0);
            }
            fft.forward(&mut buffer);
            partitions.push(buffer);
        }
        Self { partitions }
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }
}

/// Partitioned convolver state for one continuous signal path (one ear, one
/// Ambisonic channel, one SDN wall tap).
pub struct UpcConvolver {
    block_size: usize,
    num_partitions: usize,
    fft: FftCore,
    prev_input: Vec<f64>,
    input_history: Vec<Vec<Complex64>>,
    /// `storageIR[K][K]`: ring of the last `K` complete partitioned-IR
    /// snapshots, one full `K`-partition IR per ring slot. Slot `s` holds
    /// the IR that was in force for the input block written to
    /// `input_history[s]`, so contribution `k` of that block is read back
    /// from `ir_history[s][k]`, never from a more recently interpolated IR.
    ir_history: Vec<Vec<Vec<Complex64>>>,
    write_index: usize,
    accum: Vec<Complex64>,
    doubled: Vec<Complex64>,
}

impl UpcConvolver {
    pub fn new(block_size: usize, num_partitions: usize) -> Self {
        let fft_size = 2 * block_size;
        let num_partitions = num_partitions.max(1);
        Self {
            block_size,
            num_partitions,
            fft: FftCore::new(fft_size),
            prev_input: vec![0.0; block_size],
            input_history: vec![vec![Complex64::default(); fft_size]; num_partitions],
            ir_history: vec![vec![vec![Complex64::default(); fft_size]; num_partitions]; num_partitions],
            write_index: 0,
            accum: vec![Complex64::default(); fft_size],
            doubled: vec![Complex64::default(); fft_size],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Clears all history so the next call starts as if freshly
    /// constructed, used when a source is repositioned discontinuously
    /// (a `Move` rather than a `Glide`) and stale tail energy would be
    /// audible as a click otherwise.
    pub fn reset(&mut self) {
        self.prev_input.iter_mut().for_each(|s| *s = 0.0);
        for slot in &mut self.input_history {
            slot.iter_mut().for_each(|c| *c = Complex64::default());
        }
        for snapshot in &mut self.ir_history {
            for partition in snapshot {
                partition.iter_mut().for_each(|c| *c = Complex64::default());
            }
        }
        self.write_index = 0;
    }

    fn fft_current_input(&mut self, input: &[f64]) {
        let half = self.block_size;
        for i in 0..half {
            self.doubled[i] = Complex64::new(self.prev_input[i], 0.0);
            self.doubled[half + i] = Complex64::new(input[i], 0.0);
        }
        self.fft.forward(&mut self.doubled);
        self.input_history[self.write_index].copy_from_slice(&self.doubled);
        self.prev_input.copy_from_slice(input);
    }

    fn extract_output(&mut self, output: &mut [f64]) {
        self.fft.inverse(&mut self.accum);
        let half = self.block_size;
        for i in 0..half {
            output[i] = self.accum[half + i].re;
        }
    }

    /// Convolves `input` (length `block_size`) against a fixed partitioned
    /// impulse response, writing `block_size` output samples.
    pub fn process(&mut self, input: &[f64], ir: &PartitionedIr, output: &mut [f64]) -> Result<()> {
        self.check_lengths(input, output, ir.num_partitions())?;
        self.fft_current_input(input);

        self.accum.iter_mut().for_each(|c| *c = Complex64::default());
        for k in 0..self.num_partitions {
            let slot = (self.write_index + self.num_partitions - k) % self.num_partitions;
            complex_mac(&mut self.accum, &self.input_history[slot], &ir.partitions[k])?;
        }

        self.extract_output(output);
        self.write_index = (self.write_index + 1) % self.num_partitions;
        Ok(())
    }

    /// Same as [`Self::process`], but `ir` is this block's freshly
    /// re-interpolated impulse response rather than a fixed one: the whole
    /// `K`-partition snapshot is recorded at the current ring slot, so
    /// contribution `k` of a block written `k` ticks ago is read back from
    /// subfilter `k` of *that* block's snapshot, never from a more recent
    /// IR applied retroactively.
    pub fn process_with_ir_memory(
        &mut self,
        input: &[f64],
        ir: &PartitionedIr,
        output: &mut [f64],
    ) -> Result<()> {
        self.check_lengths(input, output, ir.num_partitions())?;
        self.fft_current_input(input);

        let snapshot = &mut self.ir_history[self.write_index];
        for (k, partition) in snapshot.iter_mut().enumerate() {
            if k < ir.num_partitions() {
                partition.copy_from_slice(&ir.partitions[k]);
            } else {
                partition.iter_mut().for_each(|c| *c = Complex64::default());
            }
        }

        self.accum.iter_mut().for_each(|c| *c = Complex64::default());
        for k in 0..self.num_partitions {
            let slot = (self.write_index + self.num_partitions - k) % self.num_partitions;
            complex_mac(&mut self.accum, &self.input_history[slot], &self.ir_history[slot][k])?;
        }

        self.extract_output(output);
        self.write_index = (self.write_index + 1) % self.num_partitions;
        Ok(())
    }

    fn check_lengths(&self, input: &[f64], output: &[f64], ir_partitions: usize) -> Result<()> {
        if input.len() != self.block_size {
            return Err(SpatialError::BadSize { expected: self.block_size, actual: input.len() });
        }
        if output.len() != self.block_size {
            return Err(SpatialError::BadSize { expected: self.block_size, actual: output.len() });
        }
        if ir_partitions > self.num_partitions {
            return Err(SpatialError::BadSize {
                expected: self.num_partitions,
                actual: ir_partitions,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_impulse_ir(block_size: usize, num_partitions: usize, fft: &mut FftCore) -> PartitionedIr {
        let mut taps = vec![0.0; num_partitions * block_size];
        taps[0] = 1.0;
        PartitionedIr::from_taps(&taps, block_size, fft)
    }

    #[test]
    fn identity_ir_passes_input_through_unchanged() {
        let block_size = 4;
        let num_partitions = 2;
        let mut scratch_fft = FftCore::new(2 * block_size);
        let ir = unit_impulse_ir(block_size, num_partitions, &mut scratch_fft);

        let mut conv = UpcConvolver::new(block_size, num_partitions);
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let mut output = vec![0.0; block_size];
        conv.process(&input, &ir, &mut output).unwrap();

        for (o, i) in output.iter().zip(input.iter()) {
            assert!((o - i).abs() < 1e-9, "{o} vs {i}");
        }
    }

    #[test]
    fn delay_of_one_partition_shows_up_one_block_later() {
        let block_size = 4;
        let num_partitions = 2;
        let mut scratch_fft = FftCore::new(2 * block_size);
        // A unit impulse at the start of the second partition delays the
        // signal by exactly one block.
        let mut taps = vec![0.0; num_partitions * block_size];
        taps[block_size] = 1.0;
        let ir = PartitionedIr::from_taps(&taps, block_size, &mut scratch_fft);

        let mut conv = UpcConvolver::new(block_size, num_partitions);
        let block_a = vec![1.0, 2.0, 3.0, 4.0];
        let block_b = vec![0.0; 4];
        let mut out_a = vec![0.0; block_size];
        let mut out_b = vec![0.0; block_size];
        conv.process(&block_a, &ir, &mut out_a).unwrap();
        conv.process(&block_b, &ir, &mut out_b).unwrap();

        for o in &out_a {
            assert!(o.abs() < 1e-9);
        }
        for (o, i) in out_b.iter().zip(block_a.iter()) {
            assert!((o - i).abs() < 1e-9, "{o} vs {i}");
        }
    }

    #[test]
    fn ir_memory_delay_of_one_partition_shows_up_one_block_later() {
        // Same shape as `delay_of_one_partition_shows_up_one_block_later`,
        // but through `process_with_ir_memory` with a constant IR across
        // calls. A regression for the bug where only subfilter 0 of each
        // historical snapshot was ever stored: with subfilter 0 all zero
        // and subfilter 1 holding the impulse, that bug would produce
        // silence on every block instead of a one-block-delayed echo.
        let block_size = 4;
        let num_partitions = 2;
        let mut scratch_fft = FftCore::new(2 * block_size);
        let mut taps = vec![0.0; num_partitions * block_size];
        taps[block_size] = 1.0;
        let ir = PartitionedIr::from_taps(&taps, block_size, &mut scratch_fft);

        let mut conv = UpcConvolver::new(block_size, num_partitions);
        let block_a = vec![1.0, 2.0, 3.0, 4.0];
        let block_b = vec![0.0; 4];
        let block_c = vec![0.0; 4];
        let mut out_a = vec![0.0; block_size];
        let mut out_b = vec![0.0; block_size];
        let mut out_c = vec![0.0; block_size];
        conv.process_with_ir_memory(&block_a, &ir, &mut out_a).unwrap();
        conv.process_with_ir_memory(&block_b, &ir, &mut out_b).unwrap();
        conv.process_with_ir_memory(&block_c, &ir, &mut out_c).unwrap();

        for o in &out_a {
            assert!(o.abs() < 1e-9);
        }
        for (o, i) in out_b.iter().zip(block_a.iter()) {
            assert!((o - i).abs() < 1e-9, "{o} vs {i}");
        }
        for o in &out_c {
            assert!(o.abs() < 1e-9);
        }
    }

    #[test]
    fn wrong_block_size_is_rejected() {
        let block_size = 4;
        let mut scratch_fft = FftCore::new(2 * block_size);
        let ir = unit_impulse_ir(block_size, 1, &mut scratch_fft);
        let mut conv = UpcConvolver::new(block_size, 1);
        let bad_input = vec![0.0; 3];
        let mut output = vec![0.0; block_size];
        assert_eq!(
            conv.process(&bad_input, &ir, &mut output),
            Err(SpatialError::BadSize { expected: 4, actual: 3 })
        );
    }
}
