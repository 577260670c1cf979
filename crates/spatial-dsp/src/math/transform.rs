use crate::error::{Result, SpatialError};

use super::quaternion::Quaternion;
use super::vector::Vector3;

/// Position and orientation of a source or a listener.
///
/// The design notes call out that the original system scattered its
/// direction-to-source/direction-to-listener math across half a dozen call
/// sites with duplicated quaternion-inverse code; `relative_direction_to` is
/// the single place that logic now lives.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vector3,
    pub orientation: Quaternion,
}

/// A direction expressed in the *subject*'s local frame: azimuth/elevation
/// in radians plus distance in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeDirection {
    pub azimuth: f64,
    pub elevation: f64,
    pub distance: f64,
}

impl RelativeDirection {
    /// Interaural lateral angle in degrees, `[-90, 90]`, positive toward the
    /// right ear: the angle between this direction and the median (front/
    /// up) plane, measured along the great circle through the interaural
    /// axis. Used by the near-field compensation service, which keys its
    /// table on this axis rather than the full-sphere azimuth.
    pub fn interaural_azimuth_degrees(&self) -> f64 {
        let lateral = (-self.azimuth.sin() * self.elevation.cos()).clamp(-1.0, 1.0);
        lateral.asin().to_degrees()
    }
}

impl Transform {
    pub fn new(position: Vector3, orientation: Quaternion) -> Self {
        Self { position, orientation }
    }

    pub fn at(position: Vector3) -> Self {
        Self { position, orientation: Quaternion::IDENTITY }
    }

    /// Direction from `self` to `other`, expressed in `self`'s local frame.
    ///
    /// Used both as "source relative to listener" (HRTF/Ambisonic lookups)
    /// and as "listener relative to source" (the waveguide's per-source
    /// distance query) depending on which transform is the receiver.
    ///
    /// Returns [`SpatialError::DivByZero`] when the two positions coincide,
    /// matching the error kind named for undefined direction queries.
    pub fn relative_direction_to(&self, other: &Transform) -> Result<RelativeDirection> {
        let world_offset = other.position - self.position;
        let distance = world_offset.norm();
        if distance < 1e-9 {
            return Err(SpatialError::DivByZero);
        }
        let local = self.orientation.conjugate().rotate(world_offset);
        let (azimuth, elevation) = local.to_azimuth_elevation();
        Ok(RelativeDirection { azimuth, elevation, distance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn coincident_positions_are_an_error() {
        let listener = Transform::at(Vector3::new(1.0, 1.0, 1.0));
        let source = Transform::at(Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(listener.relative_direction_to(&source), Err(SpatialError::DivByZero));
    }

    #[test]
    fn source_directly_ahead_has_zero_azimuth_and_elevation() {
        let listener = Transform::at(Vector3::ZERO);
        let source = Transform::at(Vector3::new(2.0, 0.0, 0.0));
        let rel = listener.relative_direction_to(&source).unwrap();
        assert_relative_eq!(rel.azimuth, 0.0, epsilon = 1e-12);
        assert_relative_eq!(rel.elevation, 0.0, epsilon = 1e-12);
        assert_relative_eq!(rel.distance, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn listener_rotation_shifts_relative_azimuth() {
        use std::f64::consts::FRAC_PI_2;
        let listener = Transform::new(
            Vector3::ZERO,
            Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), FRAC_PI_2),
        );
        let source = Transform::at(Vector3::new(1.0, 0.0, 0.0));
        let rel = listener.relative_direction_to(&source).unwrap();
        // Listener turned left (toward +y) by a quarter turn, so a source
        // that was straight ahead now reads as off to the listener's right.
        assert_relative_eq!(rel.azimuth, -FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn interaural_azimuth_is_plus_ninety_toward_the_right_ear() {
        use std::f64::consts::FRAC_PI_2;
        let listener = Transform::new(
            Vector3::ZERO,
            Quaternion::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), FRAC_PI_2),
        );
        let source = Transform::at(Vector3::new(1.0, 0.0, 0.0));
        let rel = listener.relative_direction_to(&source).unwrap();
        assert_relative_eq!(rel.interaural_azimuth_degrees(), 90.0, epsilon = 1e-6);
    }

    #[test]
    fn interaural_azimuth_is_zero_straight_ahead() {
        let listener = Transform::at(Vector3::ZERO);
        let source = Transform::at(Vector3::new(2.0, 0.0, 0.0));
        let rel = listener.relative_direction_to(&source).unwrap();
        assert_relative_eq!(rel.interaural_azimuth_degrees(), 0.0, epsilon = 1e-9);
    }
}
