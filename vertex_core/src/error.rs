//! Error kinds surfaced by the vertexing algorithms.

use crate::linearizer::LinearizationError;
use thiserror::Error;

/// Failure of a seeding or fitting call. Nothing is retried internally.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum VertexingError {
    /// A track without covariance was given where one is required.
    #[error("track {index} has no covariance matrix")]
    NoCovariance { index: usize },
    /// The reduced normal-equation system (or a per-track block) is not invertible.
    #[error("singular normal-equation matrix in iteration {iteration}")]
    SingularMatrix { iteration: usize },
    /// The fit produced a non-finite chi-square.
    #[error("non-finite chi2 ({chi2}) in iteration {iteration}")]
    NumericFailure { iteration: usize, chi2: f64 },
    /// The fit was called without any track.
    #[error("vertex fit needs at least one track")]
    NotEnoughTracks,
    /// Propagated verbatim from the linearizer.
    #[error(transparent)]
    Linearization(#[from] LinearizationError),
}
