//! Near-field compensation service.
//!
//! A source closer than the measurement distance the HRTF table was
//! captured at needs extra low-shelf boost and an interaural-level
//! correction that a plain HRTF lookup doesn't carry; this service supplies
//! a short biquad cascade per ear, keyed on the measured `(distance,
//! interaural azimuth)` pairs rather than distance alone, since the
//! near-field correction itself varies across the interaural axis, not
//! just with range.

use std::collections::HashMap;

use crate::biquad::{BiquadCascade, Sos};
use crate::context::Ear;
use crate::error::{Result, SpatialError};

/// One measured `(distance, interaural azimuth)` key's compensation filter,
/// one cascade per ear (or just `left`, for a single-receiver table — see
/// [`NearFieldServiceBuilder::single_receiver`]).
#[derive(Debug, Clone)]
pub struct NearFieldMeasurement {
    pub distance: f64,
    /// Interaural azimuth in degrees, domain `[-90, 90]`.
    pub azimuth_deg: f64,
    pub left: Vec<Sos>,
    pub right: Vec<Sos>,
}

/// Builder for [`NearFieldService`]; accumulates measurements before
/// `finish` infers the per-axis quantisation step and checks the table is
/// non-empty and internally consistent.
#[derive(Default)]
pub struct NearFieldServiceBuilder {
    measurements: Vec<NearFieldMeasurement>,
    single_receiver: bool,
}

impl NearFieldServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_measurement(mut self, measurement: NearFieldMeasurement) -> Self {
        self.measurements.push(measurement);
        self
    }

    /// Marks this table as built from a single-receiver measurement: only
    /// `left` cascades need be populated, and a `RIGHT` query is answered by
    /// mirroring to `LEFT` at the negated azimuth.
    pub fn single_receiver(mut self) -> Self {
        self.single_receiver = true;
        self
    }

    pub fn finish(self) -> Result<NearFieldService> {
        if self.measurements.is_empty() {
            return Err(SpatialError::NotSet);
        }
        for m in &self.measurements {
            if !(-90.0..=90.0).contains(&m.azimuth_deg) {
                return Err(SpatialError::InvalidParam {
                    name: "azimuth_deg",
                    detail: format!("{} outside [-90, 90]", m.azimuth_deg),
                });
            }
        }
        let section_count = self.measurements[0].left.len();
        for m in &self.measurements {
            let right_ok = self.single_receiver || m.right.len() == section_count;
            if m.left.len() != section_count || !right_ok {
                return Err(SpatialError::BadSize { expected: section_count, actual: m.left.len() });
            }
        }

        let distance_step = min_positive_step(self.measurements.iter().map(|m| m.distance));
        let azimuth_step = min_positive_step(self.measurements.iter().map(|m| m.azimuth_deg));

        let mut by_key = HashMap::new();
        for (idx, m) in self.measurements.iter().enumerate() {
            let key = quantise(m.distance, distance_step, m.azimuth_deg, azimuth_step);
            by_key.insert(key, idx);
        }

        Ok(NearFieldService {
            measurements: self.measurements,
            section_count,
            distance_step,
            azimuth_step,
            by_key,
            single_receiver: self.single_receiver,
        })
    }
}

/// Smallest positive difference between distinct sorted values, or `1.0` if
/// every value is identical (a single-row axis; any query snaps to it).
fn min_positive_step(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    let mut step = f64::INFINITY;
    for pair in sorted.windows(2) {
        step = step.min(pair[1] - pair[0]);
    }
    if step.is_finite() {
        step
    } else {
        1.0
    }
}

/// Grid index pair for `(distance, azimuth)`, rounding each axis to the
/// nearest multiple of its inferred step.
fn quantise(distance: f64, distance_step: f64, azimuth_deg: f64, azimuth_step: f64) -> (i64, i64) {
    ((distance / distance_step).round() as i64, (azimuth_deg / azimuth_step).round() as i64)
}

/// Immutable, query-only near-field compensation table.
pub struct NearFieldService {
    measurements: Vec<NearFieldMeasurement>,
    section_count: usize,
    distance_step: f64,
    azimuth_step: f64,
    by_key: HashMap<(i64, i64), usize>,
    single_receiver: bool,
}

impl NearFieldService {
    pub fn builder() -> NearFieldServiceBuilder {
        NearFieldServiceBuilder::new()
    }

    pub fn nearest_distance(&self) -> f64 {
        self.measurements.iter().map(|m| m.distance).fold(f64::INFINITY, f64::min)
    }

    pub fn farthest_distance(&self) -> f64 {
        self.measurements.iter().map(|m| m.distance).fold(0.0, f64::max)
    }

    /// Looks up the cascade for `(ear, distance, azimuth_deg)`. `azimuth_deg`
    /// must lie in `[-90, 90]` or this returns
    /// [`SpatialError::InvalidParam`]; `distance` is clamped into the
    /// table's measured range first, since the service only has anything to
    /// contribute inside it. The query is snapped to the nearest quantised
    /// `(distance, azimuth)` key the table was built with. On a
    /// single-receiver table a `RIGHT` query is mirrored to `LEFT` at
    /// `-azimuth_deg`, per the `lookup(RIGHT, d, a) == lookup(LEFT, d, -a)`
    /// symmetry such tables are built to satisfy.
    pub fn coefficients_at(&self, ear: Ear, distance: f64, azimuth_deg: f64) -> Result<Vec<Sos>> {
        if !(-90.0..=90.0).contains(&azimuth_deg) {
            return Err(SpatialError::InvalidParam {
                name: "azimuth_deg",
                detail: format!("{azimuth_deg} outside [-90, 90]"),
            });
        }

        let (ear, azimuth_deg) = if self.single_receiver && matches!(ear, Ear::Right) {
            (Ear::Left, -azimuth_deg)
        } else {
            (ear, azimuth_deg)
        };

        let clamped_distance = distance.clamp(self.nearest_distance(), self.farthest_distance());
        let key = quantise(clamped_distance, self.distance_step, azimuth_deg, self.azimuth_step);
        let idx = self
            .by_key
            .get(&key)
            .copied()
            .unwrap_or_else(|| self.nearest_measurement(clamped_distance, azimuth_deg));

        let m = &self.measurements[idx];
        Ok(match ear {
            Ear::Left => m.left.clone(),
            Ear::Right => m.right.clone(),
        })
    }

    /// Fallback for a quantised key the table has no exact entry for (an
    /// irregular grid coarser than the inferred step in some region):
    /// nearest stored measurement by weighted axis distance.
    fn nearest_measurement(&self, distance: f64, azimuth_deg: f64) -> usize {
        self.measurements
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = ((a.distance - distance) / self.distance_step).powi(2)
                    + ((a.azimuth_deg - azimuth_deg) / self.azimuth_step).powi(2);
                let db = ((b.distance - distance) / self.distance_step).powi(2)
                    + ((b.azimuth_deg - azimuth_deg) / self.azimuth_step).powi(2);
                da.total_cmp(&db)
            })
            .map(|(idx, _)| idx)
            .expect("at least one measurement")
    }

    /// Convenience: builds a fresh cascade for a given distance/azimuth/ear,
    /// suitable for a processor's initial `Setup`.
    pub fn cascade_at(&self, ear: Ear, distance: f64, azimuth_deg: f64) -> Result<BiquadCascade> {
        Ok(BiquadCascade::new(self.coefficients_at(ear, distance, azimuth_deg)?))
    }

    pub fn section_count(&self) -> usize {
        self.section_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(gain: f64) -> Vec<Sos> {
        vec![Sos { b0: gain, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }]
    }

    fn two_ear_table() -> NearFieldService {
        NearFieldService::builder()
            .add_measurement(NearFieldMeasurement {
                distance: 0.2,
                azimuth_deg: 0.0,
                left: flat(2.0),
                right: flat(2.5),
            })
            .add_measurement(NearFieldMeasurement {
                distance: 1.0,
                azimuth_deg: 0.0,
                left: flat(1.0),
                right: flat(1.0),
            })
            .add_measurement(NearFieldMeasurement {
                distance: 0.2,
                azimuth_deg: 90.0,
                left: flat(3.0),
                right: flat(3.5),
            })
            .finish()
            .unwrap()
    }

    fn single_receiver_table() -> NearFieldService {
        NearFieldService::builder()
            .single_receiver()
            .add_measurement(NearFieldMeasurement {
                distance: 0.2,
                azimuth_deg: 45.0,
                left: flat(2.0),
                right: Vec::new(),
            })
            .add_measurement(NearFieldMeasurement {
                distance: 0.2,
                azimuth_deg: -45.0,
                left: flat(4.0),
                right: Vec::new(),
            })
            .finish()
            .unwrap()
    }

    #[test]
    fn empty_builder_is_rejected() {
        assert_eq!(NearFieldService::builder().finish().err(), Some(SpatialError::NotSet));
    }

    #[test]
    fn out_of_domain_azimuth_at_finish_is_rejected() {
        let result = NearFieldService::builder()
            .add_measurement(NearFieldMeasurement {
                distance: 0.2,
                azimuth_deg: 120.0,
                left: flat(1.0),
                right: flat(1.0),
            })
            .finish();
        assert!(result.is_err());
    }

    #[test]
    fn exact_key_returns_measured_coefficients() {
        let svc = two_ear_table();
        let coeffs = svc.coefficients_at(Ear::Left, 0.2, 0.0).unwrap();
        assert_eq!(coeffs[0].b0, 2.0);
        let coeffs = svc.coefficients_at(Ear::Right, 0.2, 90.0).unwrap();
        assert_eq!(coeffs[0].b0, 3.5);
    }

    #[test]
    fn distance_beyond_table_clamps_to_farthest() {
        let svc = two_ear_table();
        let coeffs = svc.coefficients_at(Ear::Left, 5.0, 0.0).unwrap();
        assert_eq!(coeffs[0].b0, 1.0);
    }

    #[test]
    fn out_of_range_azimuth_query_is_an_error() {
        let svc = two_ear_table();
        assert!(svc.coefficients_at(Ear::Left, 0.2, 95.0).is_err());
    }

    #[test]
    fn single_receiver_right_query_mirrors_to_left_negated_azimuth() {
        let svc = single_receiver_table();
        let right_at_45 = svc.coefficients_at(Ear::Right, 0.2, 45.0).unwrap();
        let left_at_neg45 = svc.coefficients_at(Ear::Left, 0.2, -45.0).unwrap();
        assert_eq!(right_at_45[0].b0, left_at_neg45[0].b0);
        assert_eq!(right_at_45[0].b0, 4.0);
    }
}
