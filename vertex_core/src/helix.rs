//! Perigee parametrisation of a charged track in a uniform solenoid field.
//!
//! # Model
//! A track leaves the space-time point V = (x, y, z, t) with momentum
//! p = (φ, θ, q/p). In a field B along z it moves on a helix with signed
//! transverse radius
//!
//!   ρ = sinθ / (κ · B · q/p)
//!
//! and its direction turns as dφ/ds = −1/ρ (s = transverse arc length).
//! The helix centre is C = (x + ρ sinφ, y − ρ cosφ).
//!
//! `F(V, p; O)` are the perigee parameters of that helix w.r.t. the line
//! parallel to z through O. With (X, Y) = C − O, S = |(X, Y)|, h = sign(ρ):
//!
//!   φ_P = atan2(hX, −hY)
//!   d0  = ρ − hS
//!   z0  = z − O_z + ρ(φ − φ_P) cotθ
//!   t_P = t + ρ(φ − φ_P) / (sinθ · β · c)
//!
//! θ and q/p are conserved. Without field (or for |q/p| → 0) the straight-line
//! limit is used instead.

use crate::types::{
    BoundVector, MomentumJacobian, MomentumVector, ParticleHypothesis, PositionJacobian, Vector4f,
    E_BOUND_LOC0, E_BOUND_LOC1, E_BOUND_PHI, E_BOUND_QOVERP, E_BOUND_THETA, E_BOUND_TIME,
};
use crate::units::{KAPPA, SPEED_OF_LIGHT};
use nalgebra::Vector3;
use std::f64::consts::{PI, TAU};

/// Below this curvature (1/mm) a track is propagated as a straight line.
pub const STRAIGHT_LINE_CURVATURE: f64 = 1e-12;

/// Wrap an angle into [−π, π).
pub fn wrap_phi(phi: f64) -> f64 {
    (phi + PI).rem_euclid(TAU) - PI
}

/// Bring (φ, θ) back into φ ∈ [−π, π), θ ∈ [0, π].
pub fn normalize_phi_theta(phi: f64, theta: f64) -> (f64, f64) {
    let mut phi = phi;
    let mut theta = theta.rem_euclid(TAU);
    if theta > PI {
        theta = TAU - theta;
        phi += PI;
    }
    (wrap_phi(phi), theta)
}

/// Which trajectory model applies for a given field and momentum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Trajectory {
    /// Signed helix radius ρ in mm
    Helix { rho: f64 },
    StraightLine,
}

impl Trajectory {
    pub fn new(bz: f64, theta: f64, qop: f64) -> Self {
        let curvature = KAPPA * bz * qop / theta.sin();
        if curvature.abs() < STRAIGHT_LINE_CURVATURE || !curvature.is_finite() {
            Trajectory::StraightLine
        } else {
            Trajectory::Helix { rho: 1.0 / curvature }
        }
    }
}

/// Geometry shared by the helix parameters and their derivatives.
struct HelixGeometry {
    rho: f64,
    h: f64,
    x: f64,
    y: f64,
    s: f64,
    phi_p: f64,
    /// φ − φ_P, wrapped
    dphi: f64,
}

impl HelixGeometry {
    fn new(rho: f64, position: &Vector4f, phi: f64, reference: &Vector3<f64>) -> Option<Self> {
        let (sin_phi, cos_phi) = phi.sin_cos();
        let x = position.x - reference.x + rho * sin_phi;
        let y = position.y - reference.y - rho * cos_phi;
        let s = x.hypot(y);
        if s <= 0.0 || !s.is_finite() {
            return None;
        }
        let h = rho.signum();
        let phi_p = (h * x).atan2(-h * y);
        Some(Self { rho, h, x, y, s, phi_p, dphi: wrap_phi(phi - phi_p) })
    }
}

/// Perigee parameters `F(V, p; O)`.
///
/// Returns `None` if the reference line passes through the helix axis, where
/// the perigee is undefined.
pub fn perigee_parameters(
    trajectory: Trajectory,
    position: &Vector4f,
    momentum: &MomentumVector,
    particle: &ParticleHypothesis,
    reference: &Vector3<f64>,
) -> Option<BoundVector> {
    let (phi, theta, qop) = (momentum[0], momentum[1], momentum[2]);
    let speed = particle.beta(qop) * SPEED_OF_LIGHT;
    let cot_theta = 1.0 / theta.tan();

    let (d0, z0, phi_p, path) = match trajectory {
        Trajectory::Helix { rho } => {
            let g = HelixGeometry::new(rho, position, phi, reference)?;
            let arc = rho * g.dphi;
            (rho - g.h * g.s, position.z - reference.z + arc * cot_theta, g.phi_p, arc)
        }
        Trajectory::StraightLine => {
            let (sin_phi, cos_phi) = phi.sin_cos();
            let dx = position.x - reference.x;
            let dy = position.y - reference.y;
            let arc = -(dx * cos_phi + dy * sin_phi);
            let d0 = -dx * sin_phi + dy * cos_phi;
            (d0, position.z - reference.z + arc * cot_theta, wrap_phi(phi), arc)
        }
    };

    Some(BoundVector::new(
        d0,
        z0,
        phi_p,
        theta,
        qop,
        position[3] + path / (theta.sin() * speed),
    ))
}

/// Jacobians of `F(V, p; O)` w.r.t. the position V (6×4) and the momentum p (6×3).
pub fn perigee_jacobians(
    trajectory: Trajectory,
    position: &Vector4f,
    momentum: &MomentumVector,
    particle: &ParticleHypothesis,
    reference: &Vector3<f64>,
) -> Option<(PositionJacobian, MomentumJacobian)> {
    match trajectory {
        Trajectory::Helix { rho } => helix_jacobians(rho, position, momentum, particle, reference),
        Trajectory::StraightLine => {
            Some(straight_line_jacobians(position, momentum, particle, reference))
        }
    }
}

fn helix_jacobians(
    rho: f64,
    position: &Vector4f,
    momentum: &MomentumVector,
    particle: &ParticleHypothesis,
    reference: &Vector3<f64>,
) -> Option<(PositionJacobian, MomentumJacobian)> {
    let (phi, theta, qop) = (momentum[0], momentum[1], momentum[2]);
    let g = HelixGeometry::new(rho, position, phi, reference)?;
    let (sin_phi, cos_phi) = phi.sin_cos();
    let sin_theta = theta.sin();
    let cot_theta = 1.0 / theta.tan();
    let beta = particle.beta(qop);
    // dt/d(transverse arc)
    let time_per_arc = 1.0 / (sin_theta * beta * SPEED_OF_LIGHT);

    let s2 = g.s * g.s;
    let r = g.x * cos_phi + g.y * sin_phi;
    let q = g.x * sin_phi - g.y * cos_phi;
    let arc = rho * g.dphi;

    let mut pos_jac = PositionJacobian::zeros();
    pos_jac[(E_BOUND_LOC0, 0)] = -g.h * g.x / g.s;
    pos_jac[(E_BOUND_LOC0, 1)] = -g.h * g.y / g.s;
    pos_jac[(E_BOUND_LOC1, 0)] = rho * cot_theta * g.y / s2;
    pos_jac[(E_BOUND_LOC1, 1)] = -rho * cot_theta * g.x / s2;
    pos_jac[(E_BOUND_LOC1, 2)] = 1.0;
    pos_jac[(E_BOUND_PHI, 0)] = -g.y / s2;
    pos_jac[(E_BOUND_PHI, 1)] = g.x / s2;
    pos_jac[(E_BOUND_TIME, 0)] = time_per_arc * rho * g.y / s2;
    pos_jac[(E_BOUND_TIME, 1)] = -time_per_arc * rho * g.x / s2;
    pos_jac[(E_BOUND_TIME, 3)] = 1.0;

    // ρ depends on θ and q/p: ∂ρ/∂θ = ρ cotθ, ∂ρ/∂(q/p) = −ρ/(q/p)
    let drho_dtheta = rho * cot_theta;
    let drho_dqop = -rho / qop;
    let dd0_drho = 1.0 - g.h * q / g.s;
    let dphip_drho = -r / s2;
    // ∂(ρ(φ − φ_P))/∂ρ
    let darc_drho = g.dphi + rho * r / s2;
    let dphip_dphi = rho * q / s2;

    let mut mom_jac = MomentumJacobian::zeros();
    mom_jac[(E_BOUND_LOC0, 0)] = -g.h * rho * r / g.s;
    mom_jac[(E_BOUND_LOC0, 1)] = dd0_drho * drho_dtheta;
    mom_jac[(E_BOUND_LOC0, 2)] = dd0_drho * drho_dqop;

    mom_jac[(E_BOUND_LOC1, 0)] = rho * cot_theta * (1.0 - dphip_dphi);
    mom_jac[(E_BOUND_LOC1, 1)] = rho * rho * cot_theta * cot_theta * r / s2 - rho * g.dphi;
    mom_jac[(E_BOUND_LOC1, 2)] = cot_theta * darc_drho * drho_dqop;

    mom_jac[(E_BOUND_PHI, 0)] = dphip_dphi;
    mom_jac[(E_BOUND_PHI, 1)] = dphip_drho * drho_dtheta;
    mom_jac[(E_BOUND_PHI, 2)] = dphip_drho * drho_dqop;

    mom_jac[(E_BOUND_THETA, 1)] = 1.0;
    mom_jac[(E_BOUND_QOVERP, 2)] = 1.0;

    mom_jac[(E_BOUND_TIME, 0)] = time_per_arc * rho * (1.0 - dphip_dphi);
    mom_jac[(E_BOUND_TIME, 1)] = time_per_arc * rho * rho * cot_theta * r / s2;
    mom_jac[(E_BOUND_TIME, 2)] = time_per_arc * darc_drho * drho_dqop
        + arc / (sin_theta * SPEED_OF_LIGHT) * particle.inverse_beta_derivative(qop);

    Some((pos_jac, mom_jac))
}

fn straight_line_jacobians(
    position: &Vector4f,
    momentum: &MomentumVector,
    particle: &ParticleHypothesis,
    reference: &Vector3<f64>,
) -> (PositionJacobian, MomentumJacobian) {
    let (phi, theta, qop) = (momentum[0], momentum[1], momentum[2]);
    let (sin_phi, cos_phi) = phi.sin_cos();
    let sin_theta = theta.sin();
    let cot_theta = 1.0 / theta.tan();
    let time_per_arc = 1.0 / (sin_theta * particle.beta(qop) * SPEED_OF_LIGHT);

    let dx = position.x - reference.x;
    let dy = position.y - reference.y;
    let arc = -(dx * cos_phi + dy * sin_phi);
    let d0 = -dx * sin_phi + dy * cos_phi;

    let mut pos_jac = PositionJacobian::zeros();
    pos_jac[(E_BOUND_LOC0, 0)] = -sin_phi;
    pos_jac[(E_BOUND_LOC0, 1)] = cos_phi;
    pos_jac[(E_BOUND_LOC1, 0)] = -cos_phi * cot_theta;
    pos_jac[(E_BOUND_LOC1, 1)] = -sin_phi * cot_theta;
    pos_jac[(E_BOUND_LOC1, 2)] = 1.0;
    pos_jac[(E_BOUND_TIME, 0)] = -cos_phi * time_per_arc;
    pos_jac[(E_BOUND_TIME, 1)] = -sin_phi * time_per_arc;
    pos_jac[(E_BOUND_TIME, 3)] = 1.0;

    let mut mom_jac = MomentumJacobian::zeros();
    mom_jac[(E_BOUND_LOC0, 0)] = arc;
    mom_jac[(E_BOUND_LOC1, 0)] = -d0 * cot_theta;
    mom_jac[(E_BOUND_LOC1, 1)] = -arc / (sin_theta * sin_theta);
    mom_jac[(E_BOUND_PHI, 0)] = 1.0;
    mom_jac[(E_BOUND_THETA, 1)] = 1.0;
    mom_jac[(E_BOUND_QOVERP, 2)] = 1.0;
    mom_jac[(E_BOUND_TIME, 0)] = -d0 * time_per_arc;
    mom_jac[(E_BOUND_TIME, 1)] = -arc * time_per_arc * cot_theta;
    mom_jac[(E_BOUND_TIME, 2)] =
        arc / (sin_theta * SPEED_OF_LIGHT) * particle.inverse_beta_derivative(qop);

    (pos_jac, mom_jac)
}
