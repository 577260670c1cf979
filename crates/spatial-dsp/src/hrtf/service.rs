//! Setup-time HRTF service: loads measurements through a [`HrirSource`],
//! validates them, preprocesses and resamples them into a regular grid, and
//! hands back an immutable query object.
//!
//! `finish` additionally pre-partitions every grid cell's HRIR into the
//! frequency domain once, at setup time, mirroring `FillResampledTable`'s
//! own behaviour of partitioning each resampled cell as it's written rather
//! than leaving that to be redone on every runtime query. [`HrtfService::query_partitioned`]
//! then blends cached partitions directly and never runs an FFT itself.

use num_complex::Complex64;

use crate::error::Result;
use crate::fft::FftCore;
use crate::hrtf::hrir::Hrir;
use crate::hrtf::interpolate::{interpolate_partitioned, InterpolatedHrir};
use crate::hrtf::table::{HrtfTable, HrtfTableBuilder};
use crate::upc::PartitionedIr;

/// The boundary a concrete measurement loader (a SOFA file reader, a
/// synthetic test fixture, a baked-in preset) implements. Nothing in this
/// crate parses SOFA itself; that is explicitly out of scope, matching the
/// system's own decision to keep file I/O and measurement reading behind a
/// loader interface rather than in the rendering path.
pub trait HrirSource {
    /// Every measured direction, in whatever order the source holds them.
    /// `(azimuth_rad, elevation_rad, left, right)`.
    fn measurements(&self) -> Result<Vec<(f64, f64, Hrir, Hrir)>>;
}

/// Accumulates measurements (directly or via a [`HrirSource`]) before
/// `finish` builds the queryable table.
#[derive(Default)]
pub struct HrtfServiceBuilder {
    table: HrtfTableBuilder,
}

impl HrtfServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_measurement(mut self, azimuth: f64, elevation: f64, left: Hrir, right: Hrir) -> Self {
        self.table = self.table.add_measurement(azimuth, elevation, left, right);
        self
    }

    pub fn with_resampling_step_degrees(mut self, step: f64) -> Self {
        self.table = self.table.with_resampling_step_degrees(step);
        self
    }

    pub fn with_gap_threshold_degrees(mut self, degrees: f64) -> Self {
        self.table = self.table.with_gap_threshold_degrees(degrees);
        self
    }

    pub fn from_source(source: &dyn HrirSource) -> Result<Self> {
        let mut builder = Self::new();
        for (az, el, left, right) in source.measurements()? {
            builder = builder.add_measurement(az, el, left, right);
        }
        Ok(builder)
    }

    /// Builds the table and eagerly partitions every grid cell's HRIR at
    /// `block_size`, so runtime queries never transform a filter.
    pub fn finish(self, block_size: usize) -> Result<HrtfService> {
        let table = self.table.finish()?;
        let fft_size = 2 * block_size;
        let mut fft = FftCore::new(fft_size);

        let rows = table.row_count();
        let cols = table.col_count();
        let mut partitioned = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut row_cells = Vec::with_capacity(cols);
            for col in 0..cols {
                let (left, right) = table.cell(row, col);
                let left_ir = PartitionedIr::from_taps(&left.taps, block_size, &mut fft);
                let right_ir = PartitionedIr::from_taps(&right.taps, block_size, &mut fft);
                row_cells.push((left_ir, right_ir, left.itd_samples, right.itd_samples));
            }
            partitioned.push(row_cells);
        }

        Ok(HrtfService { table, block_size, partitioned })
    }
}

/// A partitioned HRIR pair ready to feed a convolver directly, plus the
/// interaural delay the blended measurement carries.
pub struct PartitionedHrirPair {
    pub left: PartitionedIr,
    pub right: PartitionedIr,
    pub left_itd_samples: f64,
    pub right_itd_samples: f64,
}

/// Immutable, query-only HRTF measurement service used from the audio
/// callback.
pub struct HrtfService {
    table: HrtfTable,
    block_size: usize,
    /// `partitioned[row][col] = (left, right, left_itd, right_itd)`, same
    /// indexing as the table's grid.
    partitioned: Vec<Vec<(PartitionedIr, PartitionedIr, f64, f64)>>,
}

impl HrtfService {
    pub fn builder() -> HrtfServiceBuilder {
        HrtfServiceBuilder::new()
    }

    pub fn taps_len(&self) -> usize {
        self.table.taps_len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Time-domain interpolation of both ears' HRIRs for a listener-relative
    /// direction. Useful for anything that needs the raw taps (tests,
    /// offline analysis); the audio callback should prefer
    /// [`Self::query_partitioned`].
    pub fn query(&self, azimuth: f64, elevation: f64) -> InterpolatedHrir {
        interpolate_partitioned(&self.table, azimuth, elevation)
    }

    /// Frequency-domain interpolation: locates the same barycentric
    /// triangle [`HrtfTable::interpolate`] would use, then blends the three
    /// corners' cached partitioned filters bin by bin. No FFT runs here;
    /// every partition was already transformed in [`HrtfServiceBuilder::finish`].
    pub fn query_partitioned(&self, azimuth: f64, elevation: f64) -> PartitionedHrirPair {
        let triangle = self.table.locate_triangle(azimuth, elevation);
        let [(r0, c0), (r1, c1), (r2, c2)] = triangle.cells;
        let [w0, w1, w2] = triangle.weights;
        let (l0, rt0, li0, ri0) = &self.partitioned[r0][c0];
        let (l1, rt1, li1, ri1) = &self.partitioned[r1][c1];
        let (l2, rt2, li2, ri2) = &self.partitioned[r2][c2];

        PartitionedHrirPair {
            left: blend_partitions(l0, w0, l1, w1, l2, w2),
            right: blend_partitions(rt0, w0, rt1, w1, rt2, w2),
            left_itd_samples: w0 * li0 + w1 * li1 + w2 * li2,
            right_itd_samples: w0 * ri0 + w1 * ri1 + w2 * ri2,
        }
    }
}

/// Weighted sum of three partitioned IRs, bin by bin, partition by
/// partition. Every cell in a service's grid shares `taps_len`, so all
/// three inputs always have the same partition count and FFT size.
fn blend_partitions(a: &PartitionedIr, wa: f64, b: &PartitionedIr, wb: f64, c: &PartitionedIr, wc: f64) -> PartitionedIr {
    let partitions = a
        .partitions
        .iter()
        .zip(&b.partitions)
        .zip(&c.partitions)
        .map(|((pa, pb), pc)| {
            pa.iter()
                .zip(pb)
                .zip(pc)
                .map(|((&xa, &xb), &xc)| xa * wa + xb * wb + xc * wc)
                .collect::<Vec<Complex64>>()
        })
        .collect();
    PartitionedIr { partitions }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TwoPointSource;

    impl HrirSource for TwoPointSource {
        fn measurements(&self) -> Result<Vec<(f64, f64, Hrir, Hrir)>> {
            Ok(vec![
                (0.0, 0.0, Hrir::new(vec![1.0, 0.0], 0.0), Hrir::new(vec![0.2, 0.0], -1.0)),
                (
                    std::f64::consts::PI,
                    0.0,
                    Hrir::new(vec![0.2, 0.0], -1.0),
                    Hrir::new(vec![1.0, 0.0], 0.0),
                ),
            ])
        }
    }

    #[test]
    fn builds_from_a_hrir_source() {
        let service = HrtfServiceBuilder::from_source(&TwoPointSource).unwrap().finish(4).unwrap();
        assert_eq!(service.taps_len(), 2);
        let result = service.query(0.0, 0.0);
        assert_eq!(result.left.taps[0], 1.0);
    }

    #[test]
    fn partitioned_query_matches_partition_count_of_time_domain_taps() {
        let service = HrtfServiceBuilder::from_source(&TwoPointSource).unwrap().finish(4).unwrap();
        let pair = service.query_partitioned(0.0, 0.0);
        assert_eq!(pair.left.num_partitions(), 1);
        assert_eq!(pair.right.num_partitions(), 1);
    }
}
