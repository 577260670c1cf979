//! Per-source near-field compensation: applies a distance-dependent
//! biquad cascade in place, on top of an already-rendered HRTF output.

use std::sync::Arc;

use crate::biquad::BiquadCascade;
use crate::context::Ear;
use crate::error::{ErrorSink, Result};
use crate::math::Transform;
use crate::sos::NearFieldService;

pub struct NearFieldProcessor {
    service: Arc<NearFieldService>,
    left: BiquadCascade,
    right: BiquadCascade,
    last_distance: f64,
    last_azimuth: f64,
}

impl NearFieldProcessor {
    pub fn new(service: Arc<NearFieldService>) -> Self {
        let nearest = service.nearest_distance();
        let left = service.cascade_at(Ear::Left, nearest, 0.0).expect("0.0 is in [-90, 90]");
        let right = service.cascade_at(Ear::Right, nearest, 0.0).expect("0.0 is in [-90, 90]");
        Self { service, left, right, last_distance: nearest, last_azimuth: 0.0 }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    /// Applies the compensation filter in place, re-deriving coefficients
    /// only when distance or interaural azimuth has moved enough to matter
    /// (the SOS service's table is coarse; recomputing every sample's worth
    /// of motion would be wasted work for no audible gain).
    pub fn process_in_place(
        &mut self,
        listener: &Transform,
        source: &Transform,
        left: &mut [f64],
        right: &mut [f64],
    ) -> Result<()> {
        let (distance, azimuth_deg) = match listener.relative_direction_to(source) {
            Ok(dir) => (dir.distance, dir.interaural_azimuth_degrees()),
            Err(_) => (self.last_distance, self.last_azimuth),
        };

        if (distance - self.last_distance).abs() > 1e-4 || (azimuth_deg - self.last_azimuth).abs() > 1e-3 {
            self.left.set_coeffs(&self.service.coefficients_at(Ear::Left, distance, azimuth_deg)?);
            self.right.set_coeffs(&self.service.coefficients_at(Ear::Right, distance, azimuth_deg)?);
            self.last_distance = distance;
            self.last_azimuth = azimuth_deg;
        }

        for sample in left.iter_mut() {
            *sample = self.left.process_sample(*sample);
        }
        for sample in right.iter_mut() {
            *sample = self.right.process_sample(*sample);
        }
        Ok(())
    }
}

/// Reports an out-of-range distance through an [`ErrorSink`] without
/// interrupting processing; the near-field service already clamps, so this
/// exists for callers (the listener model) that want to surface it as a
/// diagnostic rather than silently accept the clamp.
pub fn report_if_out_of_range(service: &NearFieldService, distance: f64, errors: &dyn ErrorSink) {
    if distance < service.nearest_distance() || distance > service.farthest_distance() {
        errors.report(&crate::error::SpatialError::OutOfRange(format!(
            "distance {distance:.3}m outside near-field table [{:.3}, {:.3}]",
            service.nearest_distance(),
            service.farthest_distance()
        )));
    }
}
