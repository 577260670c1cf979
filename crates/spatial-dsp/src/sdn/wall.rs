//! A planar room boundary: the unit this model's reflections are computed
//! from via the image-source method rather than a literal scattering-node
//! simulation.

use crate::biquad::Sos;
use crate::math::Vector3;

/// An infinite plane, defined by a point on it and an outward unit normal.
#[derive(Debug, Clone)]
pub struct Wall {
    pub point: Vector3,
    pub normal: Vector3,
    /// Per-band absorption, expressed the same way the near-field service
    /// expresses its compensation filter: a short SOS cascade applied to
    /// the reflected signal.
    pub absorption: Vec<Sos>,
}

impl Wall {
    pub fn new(point: Vector3, normal: Vector3, absorption: Vec<Sos>) -> Self {
        Self { point, normal: normal.normalized(), absorption }
    }

    /// Signed distance from `position` to the wall plane; negative means
    /// `position` is behind the wall (on the side the normal points away
    /// from).
    pub fn signed_distance(&self, position: Vector3) -> f64 {
        (position - self.point).dot(self.normal)
    }

    /// Mirrors `position` across this plane, the image-source construction
    /// an SDN early-reflection path is built from: the reflected path
    /// source-to-wall-to-listener has the same total length as the direct
    /// path from this image position to the listener.
    pub fn image_source(&self, position: Vector3) -> Vector3 {
        let d = self.signed_distance(position);
        position - self.normal * (2.0 * d)
    }

    /// The specular reflection point this wall contributes for a given
    /// source/listener pair: where the straight line from the source's
    /// image to the listener crosses the wall plane. This is the position
    /// a scattering node sits at for this source/listener configuration,
    /// used to derive the node's two delay-line lengths (source-to-node,
    /// node-to-listener) and its distance to every other wall's node.
    pub fn reflection_point(&self, source: Vector3, listener: Vector3) -> Vector3 {
        let image = self.image_source(source);
        let d_image = self.signed_distance(image);
        let d_listener = self.signed_distance(listener);
        let denom = d_listener - d_image;
        let t = if denom.abs() > 1e-9 { (-d_image / denom).clamp(0.0, 1.0) } else { 0.5 };
        image + (listener - image) * t
    }
}
