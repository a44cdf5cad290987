//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix3, Matrix4, Matrix6, SMatrix, Vector3, Vector4, Vector6};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout, the normal equations are badly conditioned in f32.
// ---------------------------------------------------------------------------

/// Bound track parameters [d0, z0, phi, theta, q/p, t]
pub type BoundVector = Vector6<f64>;

/// 6×6 covariance of [`BoundVector`]
pub type BoundSquareMatrix = Matrix6<f64>;

/// 4D space-time position [x, y, z, t]
pub type Vector4f = Vector4<f64>;

/// 4×4 vertex covariance
pub type SquareMatrix4 = Matrix4<f64>;

/// Momentum at the vertex [phi, theta, q/p]
pub type MomentumVector = Vector3<f64>;

/// 3×3 momentum covariance
pub type SquareMatrix3 = Matrix3<f64>;

/// ∂(bound parameters)/∂(vertex position), 6×4
pub type PositionJacobian = SMatrix<f64, 6, 4>;

/// ∂(bound parameters)/∂(momentum), 6×3
pub type MomentumJacobian = SMatrix<f64, 6, 3>;

// ---------------------------------------------------------------------------
// Parameter indices
// ---------------------------------------------------------------------------

pub const E_BOUND_LOC0: usize = 0;
pub const E_BOUND_LOC1: usize = 1;
pub const E_BOUND_PHI: usize = 2;
pub const E_BOUND_THETA: usize = 3;
pub const E_BOUND_QOVERP: usize = 4;
pub const E_BOUND_TIME: usize = 5;

/// Index of the time coordinate in a 4D position
pub const E_TIME: usize = 3;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Particle hypothesis
// ---------------------------------------------------------------------------

/// Mass and charge magnitude assumed for a track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleHypothesis {
    /// Rest mass in GeV
    pub mass: f64,
    /// Absolute charge in units of e (0 for neutral)
    pub abs_charge: f64,
}

impl ParticleHypothesis {
    pub const fn pion() -> Self {
        Self { mass: 0.139_570_39, abs_charge: 1.0 }
    }

    /// Charge used to turn q/p into 1/p. Neutral tracks carry 1/p directly.
    pub fn charge_for_momentum(&self) -> f64 {
        if self.abs_charge > 0.0 { self.abs_charge } else { 1.0 }
    }

    /// Velocity β = p/E for a given q/p.
    pub fn beta(&self, qop: f64) -> f64 {
        let m_over_p = self.mass * qop / self.charge_for_momentum();
        1.0 / (1.0 + m_over_p * m_over_p).sqrt()
    }

    /// ∂(1/β)/∂(q/p)
    pub fn inverse_beta_derivative(&self, qop: f64) -> f64 {
        let q = self.charge_for_momentum();
        self.mass * self.mass * qop / (q * q) * self.beta(qop)
    }
}

impl Default for ParticleHypothesis {
    fn default() -> Self {
        Self::pion()
    }
}

// ---------------------------------------------------------------------------
// BoundTrackParameters
// ---------------------------------------------------------------------------

/// Perigee parameters of a track w.r.t. a line parallel to z through
/// `reference_point`.
///
/// The point of closest approach sits at
/// `reference_point + (-d0·sinφ, d0·cosφ, z0)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundTrackParameters {
    /// Reference point of the perigee surface (mm)
    pub reference_point: Vector3<f64>,
    /// [d0, z0, phi, theta, q/p, t]
    pub parameters: BoundVector,
    /// Parameter covariance, if the track has been fitted with one
    pub covariance: Option<BoundSquareMatrix>,
    pub particle: ParticleHypothesis,
}

impl BoundTrackParameters {
    pub fn new(
        reference_point: Vector3<f64>,
        parameters: BoundVector,
        covariance: Option<BoundSquareMatrix>,
    ) -> Self {
        Self {
            reference_point,
            parameters,
            covariance,
            particle: ParticleHypothesis::default(),
        }
    }

    /// Parameters on the perigee surface through the global origin.
    pub fn at_origin(parameters: BoundVector, covariance: Option<BoundSquareMatrix>) -> Self {
        Self::new(Vector3::zeros(), parameters, covariance)
    }

    pub fn with_particle(mut self, particle: ParticleHypothesis) -> Self {
        self.particle = particle;
        self
    }

    pub fn d0(&self) -> f64 {
        self.parameters[E_BOUND_LOC0]
    }

    pub fn z0(&self) -> f64 {
        self.parameters[E_BOUND_LOC1]
    }

    pub fn phi(&self) -> f64 {
        self.parameters[E_BOUND_PHI]
    }

    pub fn theta(&self) -> f64 {
        self.parameters[E_BOUND_THETA]
    }

    pub fn qop(&self) -> f64 {
        self.parameters[E_BOUND_QOVERP]
    }

    pub fn time(&self) -> f64 {
        self.parameters[E_BOUND_TIME]
    }

    /// Global 4D position of the point of closest approach.
    pub fn position(&self) -> Vector4f {
        let (sin_phi, cos_phi) = self.phi().sin_cos();
        Vector4::new(
            self.reference_point.x - self.d0() * sin_phi,
            self.reference_point.y + self.d0() * cos_phi,
            self.reference_point.z + self.z0(),
            self.time(),
        )
    }

    /// [phi, theta, q/p]
    pub fn momentum(&self) -> MomentumVector {
        Vector3::new(self.phi(), self.theta(), self.qop())
    }
}

// ---------------------------------------------------------------------------
// Parameter extraction
// ---------------------------------------------------------------------------

/// Turns a caller-side track representation into bound parameters.
///
/// Implementations must be deterministic: the fitter calls `extract` once per
/// track and iteration.
pub trait ParameterExtractor<T: ?Sized> {
    fn extract(&self, track: &T) -> BoundTrackParameters;
}

impl<T: ?Sized, F> ParameterExtractor<T> for F
where
    F: Fn(&T) -> BoundTrackParameters,
{
    fn extract(&self, track: &T) -> BoundTrackParameters {
        self(track)
    }
}

/// Extractor for tracks that already are [`BoundTrackParameters`].
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityExtractor;

impl ParameterExtractor<BoundTrackParameters> for IdentityExtractor {
    fn extract(&self, track: &BoundTrackParameters) -> BoundTrackParameters {
        track.clone()
    }
}
