//! Vertex results, prior constraints and per-call fit options.

use crate::types::{MomentumVector, SquareMatrix3, SquareMatrix4, Vector4f};
use nalgebra::{Matrix4x3, SMatrix, Vector4};
use serde::{Deserialize, Serialize};

/// Prior knowledge of the vertex position (e.g. the beam spot).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub position: Vector4f,
    pub covariance: SquareMatrix4,
}

impl Constraint {
    pub fn new(position: Vector4f, covariance: SquareMatrix4) -> Self {
        Self { position, covariance }
    }

    /// Constraint with independent per-coordinate resolutions.
    pub fn from_sigmas(position: Vector4f, sigmas: Vector4f) -> Self {
        Self::new(position, SquareMatrix4::from_diagonal(&sigmas.component_mul(&sigmas)))
    }
}

/// Options of one fit or seeding call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexingOptions {
    /// Starting point when no constraint is given
    pub seed: Vector4f,
    /// Prior used as an additional pseudo-measurement
    pub constraint: Option<Constraint>,
}

impl VertexingOptions {
    pub fn with_seed(seed: Vector4f) -> Self {
        Self { seed, constraint: None }
    }

    pub fn with_constraint(constraint: Constraint) -> Self {
        Self { seed: constraint.position, constraint: Some(constraint) }
    }

    /// First expansion point of the fit.
    pub fn start_position(&self) -> Vector4f {
        self.constraint.as_ref().map_or(self.seed, |c| c.position)
    }
}

/// One track refitted at the vertex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackAtVertex {
    /// Index of the track in the fitter's input
    pub index: usize,
    /// [phi, theta, q/p] at the vertex
    pub fitted_momentum: MomentumVector,
    pub momentum_covariance: SquareMatrix3,
    /// cov(V, P), 4×3
    pub vertex_momentum_covariance: Matrix4x3<f64>,
    /// Weighted squared residual of this track in the last iteration
    pub chi2: f64,
    /// Expansion point of the last linearization
    pub linearization_point: Vector4f,
}

impl TrackAtVertex {
    /// Joint 7×7 covariance of (x, y, z, t, φ, θ, q/p) given the vertex covariance.
    pub fn full_covariance(&self, vertex_covariance: &SquareMatrix4) -> SMatrix<f64, 7, 7> {
        let mut full = SMatrix::<f64, 7, 7>::zeros();
        full.fixed_view_mut::<4, 4>(0, 0).copy_from(vertex_covariance);
        full.fixed_view_mut::<4, 3>(0, 4).copy_from(&self.vertex_momentum_covariance);
        full.fixed_view_mut::<3, 4>(4, 0).copy_from(&self.vertex_momentum_covariance.transpose());
        full.fixed_view_mut::<3, 3>(4, 4).copy_from(&self.momentum_covariance);
        full
    }
}

/// Fitted 4D vertex.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// [x, y, z, t]
    pub position: Vector4f,
    pub covariance: SquareMatrix4,
    pub tracks: Vec<TrackAtVertex>,
    pub chi2: f64,
    pub ndf: f64,
}

impl Vertex {
    /// Vertex without tracks, e.g. a seed.
    pub fn new(position: Vector4f, covariance: SquareMatrix4) -> Self {
        Self { position, covariance, ..Default::default() }
    }

    /// 1σ uncertainties of (x, y, z, t)
    pub fn sigmas(&self) -> Vector4f {
        Vector4::from_fn(|i, _| self.covariance[(i, i)].max(0.0).sqrt())
    }

    pub fn chi2_per_ndf(&self) -> Option<f64> {
        (self.ndf > 0.0).then(|| self.chi2 / self.ndf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    #[test]
    fn start_position_prefers_constraint() {
        let seed = Vector4::new(0.0, 0.0, 5.0, 0.0);
        assert_eq!(VertexingOptions::with_seed(seed).start_position(), seed);
        let c = Constraint::from_sigmas(
            Vector4::new(0.1, 0.2, 0.0, 0.0),
            Vector4::new(0.01, 0.01, 50.0, 1.0),
        );
        let opts = VertexingOptions { seed, constraint: Some(c.clone()) };
        assert_eq!(opts.start_position(), Vector4::new(0.1, 0.2, 0.0, 0.0));

        // the sigmas round-trip through the covariance
        let v = Vertex::new(c.position, c.covariance);
        assert_abs_diff_eq!(v.sigmas(), Vector4::new(0.01, 0.01, 50.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn full_covariance_is_symmetric() {
        let trk = TrackAtVertex {
            index: 0,
            fitted_momentum: Vector3::new(0.1, 1.0, 0.5),
            momentum_covariance: SquareMatrix3::identity() * 2.0,
            vertex_momentum_covariance: Matrix4x3::from_fn(|r, c| (r + c) as f64 * 0.1),
            chi2: 0.0,
            linearization_point: Vector4::zeros(),
        };
        let full = trk.full_covariance(&SquareMatrix4::identity());
        assert_abs_diff_eq!(full, full.transpose(), epsilon = 1e-15);
        assert_abs_diff_eq!(full[(5, 1)], 0.2, epsilon = 1e-15);
    }
}
