//! Seed finder: one vertex candidate at the maximum of the track density.

use crate::density::{GaussianTrackDensity, GaussianTrackDensityConfig, TrackDensityState};
use crate::error::VertexingError;
use crate::types::{ParameterExtractor, SquareMatrix4, Vector4f};
use crate::vertex::{Vertex, VertexingOptions};
use tracing::debug;

/// Places a single seed on the beam line at the density maximum.
///
/// The transverse position and time come from the constraint (or the seed of
/// the options); only z is estimated.
#[derive(Clone, Debug, Default)]
pub struct TrackDensityVertexFinder<E> {
    density: GaussianTrackDensity,
    extractor: E,
}

impl<E> TrackDensityVertexFinder<E> {
    pub fn new(config: GaussianTrackDensityConfig, extractor: E) -> Self {
        Self {
            density: GaussianTrackDensity::new(config),
            extractor,
        }
    }

    /// Returns exactly one seed vertex.
    pub fn find<T>(
        &self,
        tracks: &[T],
        options: &VertexingOptions,
    ) -> Result<Vec<Vertex>, VertexingError>
    where
        E: ParameterExtractor<T>,
    {
        let mut state = TrackDensityState::default();
        self.density.add_tracks(&mut state, tracks, &self.extractor)?;
        let (z, width) = if state.entries.is_empty() {
            (0.0, 0.0)
        } else {
            self.density.maximum_with_width(&state)
        };

        let base = options.start_position();
        let position = base + Vector4f::new(0.0, 0.0, z, 0.0);

        let covariance = match &options.constraint {
            Some(constraint) => {
                let mut cov = constraint.covariance;
                if width.is_finite() && width != 0.0 {
                    cov[(2, 2)] = width * width;
                }
                cov
            }
            None => SquareMatrix4::zeros(),
        };

        debug!(
            n_tracks = tracks.len(),
            n_entries = state.entries.len(),
            z,
            width,
            "density seed"
        );
        Ok(vec![Vertex::new(position, covariance)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundSquareMatrix, BoundTrackParameters, BoundVector, IdentityExtractor};
    use crate::vertex::Constraint;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector4;

    fn finder() -> TrackDensityVertexFinder<IdentityExtractor> {
        TrackDensityVertexFinder::new(GaussianTrackDensityConfig::default(), IdentityExtractor)
    }

    fn beam_spot(position: Vector4f) -> Constraint {
        Constraint::from_sigmas(position, Vector4::new(0.01, 0.01, 50.0, 1.0))
    }

    fn track(z0: f64) -> BoundTrackParameters {
        let cov =
            BoundSquareMatrix::from_diagonal(&BoundVector::new(0.01, 0.01, 1e-4, 1e-4, 1e-4, 1.0));
        BoundTrackParameters::at_origin(BoundVector::new(0.0, z0, 0.0, 1.2, 0.5, 0.0), Some(cov))
    }

    #[test]
    fn seed_sits_on_constraint_line() {
        let tracks = vec![track(-3.0), track(-3.05), track(-2.95)];
        let constraint = beam_spot(Vector4::new(0.1, -0.2, 0.0, 0.3));
        let seeds = finder().find(&tracks, &VertexingOptions::with_constraint(constraint)).unwrap();
        assert_eq!(seeds.len(), 1);
        let seed = &seeds[0];
        assert_abs_diff_eq!(seed.position[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(seed.position[1], -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(seed.position[2], -3.0, epsilon = 0.05);
        assert_abs_diff_eq!(seed.position[3], 0.3, epsilon = 1e-12);
        // z variance replaced by the density width, others kept
        assert!(seed.covariance[(2, 2)] < 1.0);
        assert_abs_diff_eq!(seed.covariance[(0, 0)], 1e-4, epsilon = 1e-15);
    }

    #[test]
    fn no_usable_track_gives_seed_at_start() {
        let mut far = track(1.0);
        far.parameters[0] = 5.0;
        let constraint = beam_spot(Vector4::zeros());
        let options = VertexingOptions::with_constraint(constraint.clone());
        let seeds = finder().find(&[far], &options).unwrap();
        assert_eq!(seeds[0].position, Vector4::zeros());
        assert_eq!(seeds[0].covariance, constraint.covariance);
    }

    #[test]
    fn missing_covariance_is_an_error() {
        let mut bad = track(0.0);
        bad.covariance = None;
        let err = finder().find(&[track(0.0), bad], &VertexingOptions::default()).unwrap_err();
        assert_eq!(err, VertexingError::NoCovariance { index: 1 });
    }
}
