//! A scattering-delay network of early-reflection paths: one node per
//! configured wall, fed by the source and read by the listener, coupled to
//! every other node so energy that scatters off one wall keeps circulating
//! through the others instead of leaving the network after a single bounce.
//!
//! Grounded on the original system's SDN room model: a source→node delay
//! line and a node→listener delay line per wall, a fully-connected mesh of
//! node→node delay lines carrying the isotropic scattering junction's
//! output between every pair of walls, and a per-node wall-absorption
//! filter applied to the junction's combined incoming pressure before it
//! scatters back out. The original fixes the topology at six axis-aligned
//! walls; this generalises it to whichever wall list the caller configures,
//! which is the shape this crate's `Wall` (an arbitrary plane, not a face
//! of a fixed box) already requires.

use crate::biquad::BiquadCascade;
use crate::context::GlobalParameters;
use crate::error::{Result, SpatialError};
use crate::math::Vector3;
use crate::sdn::wall::Wall;

/// Delay-line capacity per connection: generous for room-scale acoustic
/// paths (tens of metres) without the full travel range a source's direct
/// propagation-delay line (`crate::waveguide::Waveguide`) needs to cover.
const NODE_DELAY_CAPACITY: usize = 1 << 13;

/// A single directed, fractionally-delayed connection between two points in
/// the network (source→node, node→node, or node→listener). Distinct from
/// `crate::waveguide::Waveguide`, which processes whole blocks and drives a
/// source's propagation delay; this is the network's internal per-sample
/// plumbing, so a scattering junction can read every connection's current
/// arrival before any of this sample's new pushes become visible.
struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
    pending: f64,
    delay_samples: f64,
}

impl DelayLine {
    fn new() -> Self {
        Self { buffer: vec![0.0; NODE_DELAY_CAPACITY], write_pos: 0, pending: 0.0, delay_samples: 0.0 }
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.pending = 0.0;
    }

    fn set_delay_samples(&mut self, delay: f64) {
        self.delay_samples = delay.clamp(0.0, (self.buffer.len() - 2) as f64);
    }

    /// Stages `x` to be committed on the next `step`; does not affect
    /// `read` until then, so every connection's arrival for this sample can
    /// be read before any of this sample's departures are pushed.
    fn push(&mut self, x: f64) {
        self.pending = x;
    }

    fn read(&self) -> f64 {
        let capacity = self.buffer.len() as f64;
        let read_pos = (self.write_pos as f64) - self.delay_samples;
        let read_pos = ((read_pos % capacity) + capacity) % capacity;
        let i0 = read_pos.floor() as usize % self.buffer.len();
        let i1 = (i0 + 1) % self.buffer.len();
        let frac = read_pos.fract();
        self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac
    }

    fn step(&mut self) {
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        self.buffer[self.write_pos] = self.pending;
    }
}

/// Per-source, per-room early-reflection processor. Anechoic (no walls
/// configured) degrades to a processor that always outputs silence, which
/// is the limiting case the design notes call out: a source in an
/// anechoic environment should sound identical with or without this
/// processor in the chain.
pub struct SdnEnvironmentProcessor {
    walls: Vec<Wall>,
    absorption: Vec<BiquadCascade>,
    source_to_node: Vec<DelayLine>,
    node_to_listener: Vec<DelayLine>,
    /// `node_to_node[i][j]` (`i != j`) carries node `j`'s scattered output
    /// as it arrives at node `i`.
    node_to_node: Vec<Vec<DelayLine>>,
    samples_per_metre: f64,
    // Scratch reused across `process` calls so the per-sample scattering
    // loop never allocates.
    node_positions: Vec<Vector3>,
    incoming_from_source: Vec<f64>,
    incoming_from_peers: Vec<f64>,
    filtered_total: Vec<f64>,
}

impl SdnEnvironmentProcessor {
    pub fn new(params: &GlobalParameters, walls: Vec<Wall>) -> Self {
        let n = walls.len();
        let absorption = walls.iter().map(|w| BiquadCascade::new(w.absorption.clone())).collect();
        Self {
            absorption,
            source_to_node: (0..n).map(|_| DelayLine::new()).collect(),
            node_to_listener: (0..n).map(|_| DelayLine::new()).collect(),
            node_to_node: (0..n).map(|_| (0..n).map(|_| DelayLine::new()).collect()).collect(),
            samples_per_metre: params.samples_per_metre(),
            node_positions: vec![Vector3::ZERO; n],
            incoming_from_source: vec![0.0; n],
            incoming_from_peers: vec![0.0; n * n],
            walls,
        }
    }

    pub fn is_anechoic(&self) -> bool {
        self.walls.is_empty()
    }

    pub fn reset(&mut self) {
        self.absorption.iter_mut().for_each(BiquadCascade::reset);
        self.source_to_node.iter_mut().for_each(DelayLine::reset);
        self.node_to_listener.iter_mut().for_each(DelayLine::reset);
        for row in &mut self.node_to_node {
            row.iter_mut().for_each(DelayLine::reset);
        }
    }

    /// Renders the summed early-reflection signal for one source into
    /// `output` (mono; a caller re-spatialises this per wall, or treats it
    /// as a diffuse contribution mixed straight into the Ambisonic bus).
    pub fn process(&mut self, source_pos: Vector3, listener_pos: Vector3, input: &[f64], output: &mut [f64]) -> Result<()> {
        if input.len() != output.len() {
            return Err(SpatialError::BadSize { expected: input.len(), actual: output.len() });
        }
        output.iter_mut().for_each(|s| *s = 0.0);
        let n = self.walls.len();
        if n == 0 {
            return Ok(());
        }

        for (wall, node) in self.walls.iter().zip(self.node_positions.iter_mut()) {
            *node = wall.reflection_point(source_pos, listener_pos);
        }
        for i in 0..n {
            let d_source_node = (source_pos - self.node_positions[i]).norm();
            self.source_to_node[i].set_delay_samples(d_source_node * self.samples_per_metre);
            let d_node_listener = (self.node_positions[i] - listener_pos).norm();
            self.node_to_listener[i].set_delay_samples(d_node_listener * self.samples_per_metre);
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = (self.node_positions[i] - self.node_positions[j]).norm();
                self.node_to_node[i][j].set_delay_samples(d * self.samples_per_metre);
            }
        }

        // Connections per node in the scattering junction: every other
        // wall's node, same as the original's `numConnectionsPerNode`.
        let connections = (n - 1).max(1) as f64;

        for (&x, y) in input.iter().zip(output.iter_mut()) {
            for i in 0..n {
                self.source_to_node[i].push(x);
            }
            for i in 0..n {
                self.incoming_from_source[i] = self.source_to_node[i].read();
            }
            for i in 0..n {
                for j in 0..n {
                    self.incoming_from_peers[i * n + j] =
                        if i == j { 0.0 } else { self.node_to_node[i][j].read() };
                }
            }

            for i in 0..n {
                let peer_sum: f64 = (0..n).map(|j| self.incoming_from_peers[i * n + j]).sum();
                // The source couples into every branch entering the
                // junction, per the isotropic scattering formulation this
                // network implements.
                let total = peer_sum + connections * self.incoming_from_source[i];
                self.filtered_total[i] = self.absorption[i].process_sample(total);
            }

            *y = (0..n).map(|i| self.node_to_listener[i].read()).sum();

            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let in_branch = self.incoming_from_peers[i * n + j] + self.incoming_from_source[i];
                    let out_branch = (2.0 / connections) * self.filtered_total[i] - in_branch;
                    self.node_to_node[j][i].push(out_branch);
                }
                self.node_to_listener[i].push(self.filtered_total[i] / n as f64);
            }

            for i in 0..n {
                self.source_to_node[i].step();
                self.node_to_listener[i].step();
                for j in 0..n {
                    if i != j {
                        self.node_to_node[i][j].step();
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biquad::Sos;

    #[test]
    fn anechoic_environment_produces_silence() {
        let params = GlobalParameters::new(48_000.0, 4);
        let mut proc = SdnEnvironmentProcessor::new(&params, vec![]);
        assert!(proc.is_anechoic());
        let input = vec![1.0; 4];
        let mut output = vec![1.0; 4];
        proc.process(Vector3::new(1.0, 0.0, 0.0), Vector3::ZERO, &input, &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn single_wall_produces_a_delayed_reflection() {
        let params = GlobalParameters::new(48_000.0, 64);
        let wall = Wall::new(
            Vector3::new(3.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            vec![Sos { b0: 0.5, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }],
        );
        let mut proc = SdnEnvironmentProcessor::new(&params, vec![wall]);
        let mut input = vec![0.0; 64];
        input[0] = 1.0;
        let mut output = vec![0.0; 64];
        proc.process(Vector3::new(1.0, 0.0, 0.0), Vector3::ZERO, &input, &mut output).unwrap();
        assert!(output.iter().any(|&s| s.abs() > 1e-6));
    }

    #[test]
    fn two_walls_scatter_energy_into_each_other() {
        // With a real coupling term, an impulse should still be audible in
        // the output well past the point the direct single-bounce path to
        // either wall alone would have decayed to nothing, because energy
        // keeps circulating through the node-to-node connection.
        let params = GlobalParameters::new(48_000.0, 2048);
        let identity = vec![Sos { b0: 0.99, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }];
        let walls = vec![
            Wall::new(Vector3::new(3.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0), identity.clone()),
            Wall::new(Vector3::new(-3.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0), identity),
        ];
        let mut proc = SdnEnvironmentProcessor::new(&params, walls);
        let mut input = vec![0.0; 2048];
        input[0] = 1.0;
        let mut output = vec![0.0; 2048];
        proc.process(Vector3::new(1.0, 0.0, 0.0), Vector3::ZERO, &input, &mut output).unwrap();
        let tail_energy: f64 = output[1024..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0, "expected reflected energy still circulating late in the block");
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let params = GlobalParameters::new(48_000.0, 4);
        let wall = Wall::new(Vector3::new(3.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0), vec![Sos::IDENTITY]);
        let mut proc = SdnEnvironmentProcessor::new(&params, vec![wall]);
        let input = vec![0.0; 4];
        let mut output = vec![0.0; 3];
        assert!(proc.process(Vector3::ZERO, Vector3::ZERO, &input, &mut output).is_err());
    }
}
