//! Event generator.
//!
//! Produces truth vertices around the beam spot, charged tracks emitted from
//! them as helices in a uniform longitudinal field, and the smeared perigee
//! parameters a track fit would report w.r.t. the origin.

use nalgebra::{Vector3, Vector4};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use vertex_core::helix::{perigee_parameters, Trajectory};
use vertex_core::types::{BoundSquareMatrix, BoundVector, Vector4f};
use vertex_core::{BoundTrackParameters, ParticleHypothesis, ProtoVertex, TrackId};

/// Generator configuration. Units: mm, ns, GeV, T.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of vertices per event
    pub n_vertices: usize,
    /// Poisson mean of the charged multiplicity per vertex
    pub mean_multiplicity: f64,
    /// Lower bound on the multiplicity per vertex
    pub min_tracks: usize,
    /// Beam-spot width (x, y, z, t)
    pub beam_spot_sigma: [f64; 4],
    /// Extra transverse displacement of every vertex (mm, uniform in radius)
    pub max_displacement: f64,
    /// Transverse momentum range (GeV)
    pub pt_range: (f64, f64),
    /// Pseudorapidity acceptance |η| < eta_max
    pub eta_max: f64,
    /// Resolution of [d0, z0, phi, theta, -, t]; q/p uses `qop_rel_sigma`
    pub d0_sigma: f64,
    pub z0_sigma: f64,
    pub phi_sigma: f64,
    pub theta_sigma: f64,
    pub qop_rel_sigma: f64,
    pub time_sigma: f64,
    /// Longitudinal field (T)
    pub bz: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            n_vertices: 1,
            mean_multiplicity: 20.0,
            min_tracks: 2,
            beam_spot_sigma: [0.01, 0.01, 50.0, 0.2],
            max_displacement: 0.0,
            pt_range: (0.5, 10.0),
            eta_max: 2.5,
            d0_sigma: 0.02,
            z0_sigma: 0.05,
            phi_sigma: 1e-3,
            theta_sigma: 1e-3,
            qop_rel_sigma: 0.01,
            time_sigma: 0.1,
            bz: 2.0,
        }
    }
}

/// A generated vertex and the tracks it emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthVertex {
    pub position: Vector4f,
    /// Indices into [`SimEvent::tracks`]
    pub track_indices: ProtoVertex,
}

/// Unsmeared parameters of one generated track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthTrack {
    pub id: TrackId,
    /// Index into [`SimEvent::vertices`]
    pub vertex: usize,
    pub parameters: BoundVector,
}

/// One generated event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub vertices: Vec<TruthVertex>,
    pub truth_tracks: Vec<TruthTrack>,
    /// Smeared parameters with covariance, in truth-track order
    pub tracks: Vec<BoundTrackParameters>,
}

impl SimEvent {
    /// Truth association as proto-vertices.
    pub fn proto_vertices(&self) -> Vec<ProtoVertex> {
        self.vertices.iter().map(|v| v.track_indices.clone()).collect()
    }
}

/// Poisson sample (Knuth).
fn poisson(rng: &mut impl Rng, lambda: f64) -> usize {
    if lambda <= 0.0 {
        return 0;
    }
    let threshold = (-lambda).exp();
    let mut k = 0;
    let mut p: f64 = rng.gen();
    while p > threshold {
        p *= rng.gen::<f64>();
        k += 1;
    }
    k
}

/// Deterministic event generator.
pub struct EventGenerator {
    pub config: GeneratorConfig,
    particle: ParticleHypothesis,
    rng: ChaCha8Rng,
    next_track_id: u64,
}

impl EventGenerator {
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            config,
            particle: ParticleHypothesis::pion(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_track_id: 0,
        }
    }

    /// Per-track covariance used for smearing and reported with the track.
    fn covariance(&self, qop: f64) -> BoundSquareMatrix {
        let c = &self.config;
        let sigma_qop = c.qop_rel_sigma * qop.abs();
        let sigmas = BoundVector::new(
            c.d0_sigma,
            c.z0_sigma,
            c.phi_sigma,
            c.theta_sigma,
            sigma_qop,
            c.time_sigma,
        );
        BoundSquareMatrix::from_diagonal(&sigmas.component_mul(&sigmas))
    }

    fn vertex_position(&mut self) -> Vector4f {
        let s = self.config.beam_spot_sigma;
        let rng = &mut self.rng;
        let mut position = Vector4::from_fn(|i, _| {
            let n: f64 = StandardNormal.sample(rng);
            s[i] * n
        });
        if self.config.max_displacement > 0.0 {
            let r = self.config.max_displacement * self.rng.gen::<f64>();
            let angle = self.rng.gen_range(-PI..PI);
            position[0] += r * angle.cos();
            position[1] += r * angle.sin();
        }
        position
    }

    fn momentum(&mut self) -> Vector3<f64> {
        let (pt_min, pt_max) = self.config.pt_range;
        let phi = self.rng.gen_range(-PI..PI);
        let eta = self.rng.gen_range(-self.config.eta_max..=self.config.eta_max);
        let theta = 2.0 * (-eta).exp().atan();
        let pt = self.rng.gen_range(pt_min..=pt_max);
        let charge = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
        Vector3::new(phi, theta, charge * theta.sin() / pt)
    }

    /// Generate the next event.
    pub fn generate(&mut self) -> SimEvent {
        let mut event = SimEvent::default();
        let origin = Vector3::zeros();

        for vertex_index in 0..self.config.n_vertices {
            let position = self.vertex_position();
            let n_tracks =
                poisson(&mut self.rng, self.config.mean_multiplicity).max(self.config.min_tracks);
            let mut track_indices = Vec::with_capacity(n_tracks);

            for _ in 0..n_tracks {
                let momentum = self.momentum();
                let trajectory = Trajectory::new(self.config.bz, momentum[1], momentum[2]);
                // Tracks curling around the origin have no perigee
                let Some(truth) =
                    perigee_parameters(trajectory, &position, &momentum, &self.particle, &origin)
                else {
                    continue;
                };

                let covariance = self.covariance(momentum[2]);
                let rng = &mut self.rng;
                let smeared = BoundVector::from_fn(|i, _| {
                    let n: f64 = StandardNormal.sample(rng);
                    truth[i] + covariance[(i, i)].sqrt() * n
                });

                track_indices.push(event.tracks.len());
                event.truth_tracks.push(TruthTrack {
                    id: TrackId(self.next_track_id),
                    vertex: vertex_index,
                    parameters: truth,
                });
                let track = BoundTrackParameters::at_origin(smeared, Some(covariance))
                    .with_particle(self.particle);
                event.tracks.push(track);
                self.next_track_id += 1;
            }

            event.vertices.push(TruthVertex {
                position,
                track_indices,
            });
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn same_seed_same_event() {
        let mut a = EventGenerator::new(GeneratorConfig::default(), 7);
        let mut b = EventGenerator::new(GeneratorConfig::default(), 7);
        assert_eq!(a.generate(), b.generate());
    }

    #[test]
    fn tracks_are_assigned_to_vertices() {
        let config = GeneratorConfig { n_vertices: 4, ..Default::default() };
        let event = EventGenerator::new(config, 1).generate();
        assert_eq!(event.vertices.len(), 4);
        assert_eq!(event.tracks.len(), event.truth_tracks.len());
        let total: usize = event.vertices.iter().map(|v| v.track_indices.len()).sum();
        assert_eq!(total, event.tracks.len());
        for (vi, v) in event.vertices.iter().enumerate() {
            for &ti in &v.track_indices {
                assert_eq!(event.truth_tracks[ti].vertex, vi);
            }
        }
    }

    #[test]
    fn truth_tracks_point_back_to_vertex() {
        // on-axis vertex: d0 vanishes and z0 is the vertex z
        let config = GeneratorConfig {
            beam_spot_sigma: [0.0, 0.0, 30.0, 0.0],
            ..Default::default()
        };
        let event = EventGenerator::new(config, 3).generate();
        let z = event.vertices[0].position[2];
        for t in &event.truth_tracks {
            assert_abs_diff_eq!(t.parameters[0], 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(t.parameters[1], z, epsilon = 1e-9);
        }
    }

    #[test]
    fn smearing_follows_reported_resolution() {
        let config = GeneratorConfig { mean_multiplicity: 500.0, ..Default::default() };
        let event = EventGenerator::new(config.clone(), 11).generate();
        let n = event.tracks.len() as f64;
        let sum_sq: f64 = event
            .tracks
            .iter()
            .zip(&event.truth_tracks)
            .map(|(m, t)| (m.parameters[1] - t.parameters[1]).powi(2))
            .sum();
        assert_abs_diff_eq!((sum_sq / n).sqrt(), config.z0_sigma, epsilon = 0.1 * config.z0_sigma);
    }

    #[test]
    fn poisson_mean_is_close() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let n = 5000;
        let total: usize = (0..n).map(|_| poisson(&mut rng, 4.0)).sum();
        assert_abs_diff_eq!(total as f64 / n as f64, 4.0, epsilon = 0.15);
    }
}
