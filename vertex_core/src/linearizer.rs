//! Track linearization around a vertex candidate.
//!
//! # Contract
//! For a track and an expansion point V₀ the linearizer returns
//!
//!   q(V, p) ≈ c + D·V + E·p
//!
//! where q are the track's perigee parameters w.r.t. V₀, D = ∂q/∂V (6×4),
//! E = ∂q/∂p (6×3) and c the constant term, together with the measured
//! parameters transported to that perigee and their weight matrix.

use crate::helix::{perigee_jacobians, perigee_parameters, Trajectory};
use crate::linalg::{spd_inverse, symmetrize};
use crate::types::{
    BoundSquareMatrix, BoundTrackParameters, BoundVector, MomentumJacobian, MomentumVector,
    PositionJacobian, Vector4f, E_BOUND_LOC0, E_BOUND_LOC1, E_BOUND_PHI, E_BOUND_QOVERP,
    E_BOUND_THETA, E_BOUND_TIME,
};
use bfield::{FieldError, MagneticFieldProvider};
use nalgebra::{SMatrix, Vector3};
use std::sync::Arc;
use thiserror::Error;

/// Failure to linearize one track.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LinearizationError {
    #[error("track parameters carry no covariance")]
    NoCovariance,
    #[error("transported track covariance is not positive-definite")]
    SingularCovariance,
    /// The reference line passes through the helix axis.
    #[error("perigee undefined: reference point on the helix axis")]
    DegenerateHelix,
    #[error("field lookup failed: {0}")]
    Field(#[from] FieldError),
}

/// Local linear model of a track around an expansion point.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearizedTrack {
    /// Measured parameters transported to the perigee of the expansion point
    pub parameters_at_pca: BoundVector,
    pub covariance_at_pca: BoundSquareMatrix,
    /// Inverse of `covariance_at_pca`
    pub weight_at_pca: BoundSquareMatrix,
    /// D = ∂q/∂V
    pub position_jacobian: PositionJacobian,
    /// E = ∂q/∂p
    pub momentum_jacobian: MomentumJacobian,
    /// Global 4D position of the point of closest approach
    pub position_at_pca: Vector4f,
    /// [phi, theta, q/p] at the point of closest approach
    pub momentum_at_pca: MomentumVector,
    /// c = q − D·V − E·p
    pub constant_term: BoundVector,
    pub linearization_point: Vector4f,
}

/// Builds a [`LinearizedTrack`] for a given track and expansion point.
pub trait Linearizer {
    /// Call-scoped resources (e.g. a field cache), owned by the caller.
    type State;

    fn make_state(&self) -> Self::State;

    fn linearize(
        &self,
        params: &BoundTrackParameters,
        linearization_point: &Vector4f,
        state: &mut Self::State,
    ) -> Result<LinearizedTrack, LinearizationError>;
}

// ---------------------------------------------------------------------------
// Helical linearizer
// ---------------------------------------------------------------------------

/// Linearizer state: the field cache of one fit.
#[derive(Debug)]
pub struct HelicalLinearizerState<C> {
    pub field_cache: C,
}

/// Analytic linearizer for helices in the longitudinal field component.
///
/// The field is looked up at the track's own reference position to transport
/// it, and at the point of closest approach for the Jacobians.
#[derive(Clone, Debug)]
pub struct HelicalTrackLinearizer<F> {
    field: Arc<F>,
}

impl<F: MagneticFieldProvider> HelicalTrackLinearizer<F> {
    pub fn new(field: Arc<F>) -> Self {
        Self { field }
    }

    fn bz(&self, position: &Vector4f, cache: &mut F::Cache) -> Result<f64, FieldError> {
        Ok(self.field.field(&position.xyz(), cache)?.z)
    }
}

/// ∂(global point, momentum)/∂(bound parameters) at the track's own surface.
fn bound_to_point_jacobian(
    params: &BoundTrackParameters,
) -> (SMatrix<f64, 4, 6>, SMatrix<f64, 3, 6>) {
    let (sin_phi, cos_phi) = params.phi().sin_cos();
    let d0 = params.d0();

    let mut to_pos = SMatrix::<f64, 4, 6>::zeros();
    to_pos[(0, E_BOUND_LOC0)] = -sin_phi;
    to_pos[(1, E_BOUND_LOC0)] = cos_phi;
    to_pos[(2, E_BOUND_LOC1)] = 1.0;
    to_pos[(0, E_BOUND_PHI)] = -d0 * cos_phi;
    to_pos[(1, E_BOUND_PHI)] = -d0 * sin_phi;
    to_pos[(3, E_BOUND_TIME)] = 1.0;

    let mut to_mom = SMatrix::<f64, 3, 6>::zeros();
    to_mom[(0, E_BOUND_PHI)] = 1.0;
    to_mom[(1, E_BOUND_THETA)] = 1.0;
    to_mom[(2, E_BOUND_QOVERP)] = 1.0;
    (to_pos, to_mom)
}

impl<F: MagneticFieldProvider> Linearizer for HelicalTrackLinearizer<F> {
    type State = HelicalLinearizerState<F::Cache>;

    fn make_state(&self) -> Self::State {
        HelicalLinearizerState { field_cache: self.field.make_cache() }
    }

    fn linearize(
        &self,
        params: &BoundTrackParameters,
        linearization_point: &Vector4f,
        state: &mut Self::State,
    ) -> Result<LinearizedTrack, LinearizationError> {
        let cov = params.covariance.ok_or(LinearizationError::NoCovariance)?;
        let reference: Vector3<f64> = linearization_point.xyz();
        let particle = params.particle;

        // Transport the measurement to the perigee of the linearization point
        let start = params.position();
        let momentum = params.momentum();
        let bz = self.bz(&start, &mut state.field_cache)?;
        let trajectory = Trajectory::new(bz, momentum[1], momentum[2]);
        let parameters_at_pca =
            perigee_parameters(trajectory, &start, &momentum, &particle, &reference)
                .ok_or(LinearizationError::DegenerateHelix)?;
        let (d_start, e_start) =
            perigee_jacobians(trajectory, &start, &momentum, &particle, &reference)
                .ok_or(LinearizationError::DegenerateHelix)?;
        let (to_pos, to_mom) = bound_to_point_jacobian(params);
        let transport = d_start * to_pos + e_start * to_mom;
        let covariance_at_pca = symmetrize(&(transport * cov * transport.transpose()));
        let weight_at_pca =
            spd_inverse(&covariance_at_pca).ok_or(LinearizationError::SingularCovariance)?;

        // Linear model around the point of closest approach
        let pca = BoundTrackParameters {
            reference_point: reference,
            parameters: parameters_at_pca,
            covariance: None,
            particle,
        };
        let position_at_pca = pca.position();
        let momentum_at_pca = pca.momentum();
        let bz_pca = self.bz(&position_at_pca, &mut state.field_cache)?;
        let trajectory_pca = Trajectory::new(bz_pca, momentum_at_pca[1], momentum_at_pca[2]);
        let (position_jacobian, momentum_jacobian) = perigee_jacobians(
            trajectory_pca,
            &position_at_pca,
            &momentum_at_pca,
            &particle,
            &reference,
        )
        .ok_or(LinearizationError::DegenerateHelix)?;
        let constant_term = parameters_at_pca
            - position_jacobian * position_at_pca
            - momentum_jacobian * momentum_at_pca;

        Ok(LinearizedTrack {
            parameters_at_pca,
            covariance_at_pca,
            weight_at_pca,
            position_jacobian,
            momentum_jacobian,
            position_at_pca,
            momentum_at_pca,
            constant_term,
            linearization_point: *linearization_point,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helix::wrap_phi;
    use approx::assert_abs_diff_eq;
    use bfield::{AxialFieldMap, ConstantBField};
    use nalgebra::Vector4;

    fn params_at_origin() -> BoundTrackParameters {
        let cov =
            BoundSquareMatrix::from_diagonal(&BoundVector::new(0.01, 0.02, 1e-4, 1e-4, 1e-5, 0.5));
        BoundTrackParameters::at_origin(BoundVector::new(0.05, 1.0, 0.4, 1.2, 0.6, 0.2), Some(cov))
    }

    #[test]
    fn identity_transport_at_own_reference() {
        let linearizer = HelicalTrackLinearizer::new(Arc::new(ConstantBField::along_z(2.0)));
        let mut state = linearizer.make_state();
        let params = params_at_origin();
        let lin = linearizer.linearize(&params, &Vector4::zeros(), &mut state).unwrap();
        assert_abs_diff_eq!(lin.parameters_at_pca, params.parameters, epsilon = 1e-9);
        assert_abs_diff_eq!(lin.covariance_at_pca, params.covariance.unwrap(), epsilon = 1e-9);
        assert_abs_diff_eq!(
            lin.weight_at_pca * lin.covariance_at_pca,
            BoundSquareMatrix::identity(),
            epsilon = 1e-8
        );
    }

    #[test]
    fn linear_model_reproduces_parameters_at_expansion_point() {
        let linearizer = HelicalTrackLinearizer::new(Arc::new(ConstantBField::along_z(2.0)));
        let mut state = linearizer.make_state();
        let point = Vector4::new(0.3, -0.2, 0.8, 0.0);
        let lin = linearizer.linearize(&params_at_origin(), &point, &mut state).unwrap();
        let predicted = lin.constant_term
            + lin.position_jacobian * lin.position_at_pca
            + lin.momentum_jacobian * lin.momentum_at_pca;
        let mut diff = predicted - lin.parameters_at_pca;
        diff[E_BOUND_PHI] = wrap_phi(diff[E_BOUND_PHI]);
        assert_abs_diff_eq!(diff, BoundVector::zeros(), epsilon = 1e-9);
        assert_eq!(lin.linearization_point, point);
    }

    #[test]
    fn transported_perigee_is_consistent_with_new_reference() {
        let linearizer = HelicalTrackLinearizer::new(Arc::new(ConstantBField::along_z(2.0)));
        let mut state = linearizer.make_state();
        let params = params_at_origin();
        let point = Vector4::new(1.0, 1.0, 0.0, 0.0);
        let lin = linearizer.linearize(&params, &point, &mut state).unwrap();
        // Transporting back to the origin gives the input again
        let back = BoundTrackParameters {
            reference_point: point.xyz(),
            parameters: lin.parameters_at_pca,
            covariance: Some(lin.covariance_at_pca),
            particle: params.particle,
        };
        let lin_back = linearizer.linearize(&back, &Vector4::zeros(), &mut state).unwrap();
        assert_abs_diff_eq!(lin_back.parameters_at_pca, params.parameters, epsilon = 1e-8);
        assert_abs_diff_eq!(lin_back.covariance_at_pca, params.covariance.unwrap(), epsilon = 1e-8);
    }

    #[test]
    fn missing_covariance_is_reported() {
        let linearizer = HelicalTrackLinearizer::new(Arc::new(ConstantBField::zero()));
        let mut state = linearizer.make_state();
        let mut params = params_at_origin();
        params.covariance = None;
        let err = linearizer.linearize(&params, &Vector4::zeros(), &mut state).unwrap_err();
        assert_eq!(err, LinearizationError::NoCovariance);
    }

    #[test]
    fn field_errors_propagate() {
        let map = AxialFieldMap::from_fn(-10.0, 10.0, 5, |_| 2.0).unwrap();
        let linearizer = HelicalTrackLinearizer::new(Arc::new(map));
        let mut state = linearizer.make_state();
        let mut params = params_at_origin();
        params.parameters[E_BOUND_LOC1] = 50.0;
        let err = linearizer.linearize(&params, &Vector4::zeros(), &mut state).unwrap_err();
        assert!(matches!(err, LinearizationError::Field(FieldError::OutOfBounds { .. })));
    }
}
