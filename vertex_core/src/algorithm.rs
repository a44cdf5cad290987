//! Batch driver: fits one vertex per proto-vertex of an event.
//!
//! # Processing steps per event
//! 1. Skip unconstrained candidates with fewer than two tracks
//! 2. Collect the candidate's tracks, dropping out-of-range indices
//! 3. Unconstrained only: optionally seed z from the track density of the candidate
//! 4. Fit with the Billoir fitter (candidates in parallel)
//! 5. Collect vertices; failures are logged and counted, never fatal

use crate::density::GaussianTrackDensityConfig;
use crate::error::VertexingError;
use crate::finder::TrackDensityVertexFinder;
use crate::fitter::{BilloirFitterConfig, BilloirState, FullBilloirVertexFitter};
use crate::linearizer::Linearizer;
use crate::types::{BoundTrackParameters, IdentityExtractor, SquareMatrix4, Vector4f};
use crate::vertex::{Constraint, Vertex, VertexingOptions};
use nalgebra::Vector4;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration of the batch vertex fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexFitterConfig {
    /// Fit every candidate with the beam-spot constraint below
    pub do_constrained_fit: bool,
    pub constraint_position: Vector4f,
    pub constraint_covariance: SquareMatrix4,
    /// Start each fit from the density maximum of its tracks
    pub use_density_seed: bool,
    pub fitter: BilloirFitterConfig,
    pub density: GaussianTrackDensityConfig,
}

impl Default for VertexFitterConfig {
    fn default() -> Self {
        Self {
            do_constrained_fit: false,
            constraint_position: Vector4f::zeros(),
            // 3 µm transverse, 10 mm longitudinal, 1 ns
            constraint_covariance: SquareMatrix4::from_diagonal(&Vector4::new(
                9e-6, 9e-6, 100.0, 1.0,
            )),
            use_density_seed: false,
            fitter: BilloirFitterConfig::default(),
            density: GaussianTrackDensityConfig::default(),
        }
    }
}

impl VertexFitterConfig {
    fn constraint(&self) -> Option<Constraint> {
        self.do_constrained_fit
            .then(|| Constraint::new(self.constraint_position, self.constraint_covariance))
    }
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// Indices into the event's track list that belong to one vertex candidate.
pub type ProtoVertex = Vec<usize>;

/// A candidate whose fit failed.
#[derive(Clone, Debug, PartialEq)]
pub struct FitFailure {
    /// Index of the proto-vertex
    pub proto_vertex: usize,
    pub error: VertexingError,
}

/// Outputs of one event.
#[derive(Clone, Debug, Default)]
pub struct VertexFitterOutput {
    /// Fitted vertices in proto-vertex order. Track indices refer to the
    /// event's track list.
    pub vertices: Vec<Vertex>,
    /// Candidates skipped for having too few tracks
    pub skipped: usize,
    pub failed: Vec<FitFailure>,
    /// Wall-clock time of processing
    pub total_time_us: u64,
}

enum Outcome {
    Fitted(Vertex),
    Skipped,
    Failed(VertexingError),
}

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Fits all proto-vertices of an event with one shared linearizer.
pub struct VertexFitterAlgorithm<L> {
    pub config: VertexFitterConfig,
    linearizer: L,
    fitter: FullBilloirVertexFitter<IdentityExtractor>,
    finder: TrackDensityVertexFinder<IdentityExtractor>,
}

impl<L> VertexFitterAlgorithm<L>
where
    L: Linearizer + Sync,
{
    pub fn new(config: VertexFitterConfig, linearizer: L) -> Self {
        let fitter = FullBilloirVertexFitter::new(config.fitter.clone(), IdentityExtractor);
        let finder = TrackDensityVertexFinder::new(config.density.clone(), IdentityExtractor);
        Self { config, linearizer, fitter, finder }
    }

    /// Process one event.
    pub fn execute(
        &self,
        tracks: &[BoundTrackParameters],
        proto_vertices: &[ProtoVertex],
    ) -> VertexFitterOutput {
        let start = Instant::now();
        debug!(
            n_tracks = tracks.len(),
            n_proto_vertices = proto_vertices.len(),
            "vertex fit batch"
        );

        let outcomes: Vec<Outcome> = proto_vertices
            .par_iter()
            .enumerate()
            .map(|(pv_index, proto)| self.fit_candidate(tracks, pv_index, proto))
            .collect();

        let mut output = VertexFitterOutput::default();
        for (proto_vertex, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Outcome::Fitted(vertex) => output.vertices.push(vertex),
                Outcome::Skipped => output.skipped += 1,
                Outcome::Failed(error) => output.failed.push(FitFailure { proto_vertex, error }),
            }
        }
        output.total_time_us = start.elapsed().as_micros() as u64;

        debug!(
            fitted = output.vertices.len(),
            skipped = output.skipped,
            failed = output.failed.len(),
            time_us = output.total_time_us,
            "vertex fit batch done"
        );
        output
    }

    fn fit_candidate(
        &self,
        tracks: &[BoundTrackParameters],
        pv_index: usize,
        proto: &ProtoVertex,
    ) -> Outcome {
        if !self.config.do_constrained_fit && proto.len() < 2 {
            info!(
                proto_vertex = pv_index,
                "skip unconstrained vertex fit with less than two tracks"
            );
            return Outcome::Skipped;
        }

        let mut selected = Vec::with_capacity(proto.len());
        let mut inputs = Vec::with_capacity(proto.len());
        for &track_index in proto {
            match tracks.get(track_index) {
                Some(params) => {
                    selected.push(track_index);
                    inputs.push(params.clone());
                }
                None => error!(
                    proto_vertex = pv_index,
                    track_index,
                    "track parameters do not exist"
                ),
            }
        }

        match self.fit_tracks(&inputs) {
            Ok(mut vertex) => {
                for trk in &mut vertex.tracks {
                    trk.index = selected[trk.index];
                }
                debug!(
                    proto_vertex = pv_index,
                    n_tracks = vertex.tracks.len(),
                    position = ?vertex.position,
                    "fitted vertex"
                );
                Outcome::Fitted(vertex)
            }
            Err(e) => {
                // candidate-local track index back to the event's
                let e = match e {
                    VertexingError::NoCovariance { index } => VertexingError::NoCovariance {
                        index: selected.get(index).copied().unwrap_or(index),
                    },
                    other => other,
                };
                error!(
                    proto_vertex = pv_index,
                    constrained = self.config.do_constrained_fit,
                    "error in vertex fitter: {e}"
                );
                Outcome::Failed(e)
            }
        }
    }

    /// Fit options of one candidate. The density seed is only computed for
    /// unconstrained fits, which start from it.
    fn fit_options(
        &self,
        inputs: &[BoundTrackParameters],
    ) -> Result<VertexingOptions, VertexingError> {
        if let Some(constraint) = self.config.constraint() {
            return Ok(VertexingOptions::with_constraint(constraint));
        }
        let mut options = VertexingOptions::default();
        if self.config.use_density_seed {
            if let Some(seed) = self.finder.find(inputs, &options)?.first() {
                options.seed = seed.position;
            }
        }
        Ok(options)
    }

    fn fit_tracks(&self, inputs: &[BoundTrackParameters]) -> Result<Vertex, VertexingError> {
        let options = self.fit_options(inputs)?;
        let mut state = BilloirState::new(self.linearizer.make_state());
        self.fitter.fit(inputs, &self.linearizer, &options, &mut state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helix::{perigee_parameters, Trajectory};
    use crate::linearizer::HelicalTrackLinearizer;
    use crate::types::{BoundSquareMatrix, ParticleHypothesis};
    use approx::assert_abs_diff_eq;
    use bfield::ConstantBField;
    use nalgebra::{Vector3, Vector6};
    use std::sync::Arc;

    fn track_from(vertex: &Vector4f, phi: f64, theta: f64, qop: f64) -> BoundTrackParameters {
        let particle = ParticleHypothesis::pion();
        let momentum = Vector3::new(phi, theta, qop);
        let trajectory = Trajectory::new(2.0, theta, qop);
        let reference = Vector3::zeros();
        let params =
            perigee_parameters(trajectory, vertex, &momentum, &particle, &reference).unwrap();
        let cov =
            BoundSquareMatrix::from_diagonal(&Vector6::new(0.01, 0.01, 1e-4, 1e-4, 1e-4, 1.0));
        BoundTrackParameters::at_origin(params, Some(cov))
    }

    fn event() -> (Vec<BoundTrackParameters>, Vector4f, Vector4f) {
        let a = Vector4::new(0.0, 0.0, -20.0, 0.0);
        let b = Vector4::new(0.0, 0.0, 35.0, 0.0);
        let tracks = vec![
            track_from(&a, 0.2, 1.1, 0.8),
            track_from(&b, 1.0, 1.5, -0.6),
            track_from(&a, 2.4, 1.9, -0.5),
            track_from(&b, -2.0, 2.0, 0.9),
            track_from(&a, -1.1, 1.4, 0.4),
        ];
        (tracks, a, b)
    }

    fn algorithm(
        config: VertexFitterConfig,
    ) -> VertexFitterAlgorithm<HelicalTrackLinearizer<ConstantBField>> {
        let field = Arc::new(ConstantBField::along_z(2.0));
        VertexFitterAlgorithm::new(config, HelicalTrackLinearizer::new(field))
    }

    #[test]
    fn fits_each_proto_vertex_in_order() {
        let (tracks, a, b) = event();
        let config = VertexFitterConfig {
            use_density_seed: true,
            ..Default::default()
        };
        let out = algorithm(config).execute(&tracks, &[vec![0, 2, 4], vec![1, 3]]);
        assert_eq!(out.vertices.len(), 2);
        assert!(out.failed.is_empty());
        assert_abs_diff_eq!(out.vertices[0].position, a, epsilon = 1e-5);
        assert_abs_diff_eq!(out.vertices[1].position, b, epsilon = 1e-5);
        let indices: Vec<usize> = out.vertices[1].tracks.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn small_unconstrained_candidates_are_skipped() {
        let (tracks, _, _) = event();
        let protos = [vec![0], vec![], vec![1, 3]];
        let out = algorithm(VertexFitterConfig::default()).execute(&tracks, &protos);
        assert_eq!(out.skipped, 2);
        assert_eq!(out.vertices.len(), 1);
    }

    #[test]
    fn constrained_fit_accepts_single_track() {
        let (tracks, _, _) = event();
        let config = VertexFitterConfig {
            do_constrained_fit: true,
            ..Default::default()
        };
        let out = algorithm(config).execute(&tracks, &[vec![0]]);
        assert_eq!(out.skipped, 0);
        assert_eq!(out.vertices.len(), 1);
        assert_eq!(out.vertices[0].ndf, 2.0);
    }

    #[test]
    fn bad_indices_are_dropped() {
        let (tracks, a, _) = event();
        let out =
            algorithm(VertexFitterConfig::default()).execute(&tracks, &[vec![0, 99, 2, 4]]);
        assert_eq!(out.vertices.len(), 1);
        assert_eq!(out.vertices[0].tracks.len(), 3);
        assert_abs_diff_eq!(out.vertices[0].position, a, epsilon = 1e-5);
    }

    #[test]
    fn failures_do_not_abort_the_batch() {
        let (mut tracks, _, _) = event();
        tracks[0].covariance = None;
        let out =
            algorithm(VertexFitterConfig::default()).execute(&tracks, &[vec![0, 2], vec![1, 3]]);
        assert_eq!(out.vertices.len(), 1);
        assert_eq!(
            out.failed,
            vec![FitFailure {
                proto_vertex: 0,
                error: VertexingError::NoCovariance { index: 0 },
            }]
        );
    }

    #[test]
    fn missing_covariance_reports_event_track_index() {
        let (mut tracks, _, _) = event();
        tracks[2].covariance = None;
        // track 2 is the first entry of this candidate
        let out = algorithm(VertexFitterConfig::default()).execute(&tracks, &[vec![2, 0, 4]]);
        assert!(out.vertices.is_empty());
        assert_eq!(out.failed[0].error, VertexingError::NoCovariance { index: 2 });
    }

    #[test]
    fn constrained_fit_ignores_density_seed() {
        let (tracks, a, _) = event();
        let config = VertexFitterConfig {
            do_constrained_fit: true,
            use_density_seed: true,
            ..Default::default()
        };
        let constraint_position = config.constraint_position;
        let inputs = vec![tracks[0].clone(), tracks[2].clone(), tracks[4].clone()];
        let options = algorithm(config).fit_options(&inputs).unwrap();
        assert_eq!(options.seed, constraint_position);
        assert_eq!(options.start_position(), constraint_position);

        // unconstrained, the same tracks move the seed to their z
        let config = VertexFitterConfig {
            use_density_seed: true,
            ..Default::default()
        };
        let options = algorithm(config).fit_options(&inputs).unwrap();
        assert!(options.constraint.is_none());
        assert_abs_diff_eq!(options.seed[2], a[2], epsilon = 0.1);
    }
}
