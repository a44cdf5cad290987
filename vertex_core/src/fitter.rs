//! Billoir vertex fitter: iterative linearised least squares for one 4D vertex
//! and the momenta of all tracks at that vertex.
//!
//! # Normal equations
//! With track residuals δq_i, weights W_i and Jacobians D_i (position) and
//! E_i (momentum), each track contributes
//!
//!   A_i = D_iᵀW_iD_i   B_i = E_iᵀW_iD_i   C_i = E_iᵀW_iE_i
//!   T_i = D_iᵀW_iδq_i  U_i = E_iᵀW_iδq_i
//!
//! A track's momentum only couples to the vertex, never to another track, so
//! the momenta are eliminated with the Schur complement:
//!
//!   (ΣA_i − ΣB_iᵀC_i⁻¹B_i) ΔV = ΣT_i − ΣB_iᵀC_i⁻¹U_i
//!   ΔP_i = C_i⁻¹ (U_i − B_i ΔV)
//!
//! A prior constraint adds its weight to the left-hand side and
//! W_c·(c − V₀) to the right-hand side.
//!
//! ## Covariances
//! cov(V) = (reduced matrix)⁻¹
//! cov(V, P_i) = −cov(V)·B_iᵀ·C_i⁻¹
//! cov(P_i) = C_i⁻¹ + C_i⁻¹·B_i·cov(V)·B_iᵀ·C_i⁻¹

use crate::error::VertexingError;
use crate::helix::{normalize_phi_theta, wrap_phi};
use crate::linalg::{spd_inverse, symmetrize};
use crate::linearizer::{LinearizedTrack, Linearizer};
use crate::types::{
    BoundVector, MomentumVector, ParameterExtractor, SquareMatrix3, SquareMatrix4, Vector4f,
    E_BOUND_LOC0, E_BOUND_LOC1, E_BOUND_PHI, E_BOUND_QOVERP, E_BOUND_THETA, E_BOUND_TIME, E_TIME,
};
use crate::vertex::{TrackAtVertex, Vertex, VertexingOptions};
use nalgebra::{Matrix3x4, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Config / state
// ---------------------------------------------------------------------------

/// Configuration for the Billoir fitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilloirFitterConfig {
    /// Number of linearise-and-solve iterations.
    pub max_iterations: usize,
    /// Stop early once |ΔV| (spatial, mm) drops below this. `None` always runs
    /// `max_iterations`.
    pub convergence_tolerance: Option<f64>,
}

impl Default for BilloirFitterConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            convergence_tolerance: None,
        }
    }
}

/// Caller-owned resources of one fit call.
#[derive(Debug)]
pub struct BilloirState<S> {
    pub linearizer_state: S,
}

impl<S> BilloirState<S> {
    pub fn new(linearizer_state: S) -> Self {
        Self { linearizer_state }
    }
}

// ---------------------------------------------------------------------------
// Per-iteration aggregation
// ---------------------------------------------------------------------------

/// Normal-equation blocks of one track in one iteration.
#[derive(Clone, Debug)]
struct BilloirTrack {
    linearized: LinearizedTrack,
    delta_q: BoundVector,
    /// B = EᵀWD
    b: Matrix3x4<f64>,
    /// U = EᵀWδq
    u: Vector3<f64>,
    c_inv: SquareMatrix3,
}

/// Reduced normal equations summed over all tracks.
#[derive(Clone, Debug, Default)]
struct BilloirVertex {
    /// ΣDᵀWD
    a: SquareMatrix4,
    /// ΣDᵀWδq
    t: Vector4f,
    /// ΣBᵀC⁻¹B
    b_cinv_bt: SquareMatrix4,
    /// ΣBᵀC⁻¹U
    b_cinv_u: Vector4f,
}

impl BilloirVertex {
    fn add(&mut self, track: &BilloirTrack) {
        let d = &track.linearized.position_jacobian;
        let wd = track.linearized.weight_at_pca * d;
        self.a += d.transpose() * wd;
        self.t += wd.transpose() * track.delta_q;
        let bt_cinv = track.b.transpose() * track.c_inv;
        self.b_cinv_bt += bt_cinv * track.b;
        self.b_cinv_u += bt_cinv * track.u;
    }
}

/// Estimate carried from one iteration to the next.
#[derive(Clone, Debug)]
struct FitState {
    position: Vector4f,
    momenta: Vec<MomentumVector>,
    covariance: SquareMatrix4,
    chi2: f64,
    iterations: usize,
    tracks: Vec<BilloirTrack>,
    track_chi2: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Fitter
// ---------------------------------------------------------------------------

/// Full Billoir vertex fitter.
///
/// `E` turns the caller's track type into bound parameters.
#[derive(Clone, Debug, Default)]
pub struct FullBilloirVertexFitter<E> {
    pub config: BilloirFitterConfig,
    extractor: E,
}

impl<E> FullBilloirVertexFitter<E> {
    pub fn new(config: BilloirFitterConfig, extractor: E) -> Self {
        Self { config, extractor }
    }

    /// Fit one vertex to `tracks`.
    ///
    /// The estimate starts at the constraint position (or the seed) and is
    /// refined for `max_iterations`. On error nothing but the linearizer state
    /// has been touched.
    pub fn fit<T, L>(
        &self,
        tracks: &[T],
        linearizer: &L,
        options: &VertexingOptions,
        state: &mut BilloirState<L::State>,
    ) -> Result<Vertex, VertexingError>
    where
        E: ParameterExtractor<T>,
        L: Linearizer,
    {
        if tracks.is_empty() {
            return Err(VertexingError::NotEnoughTracks);
        }
        let params: Vec<_> = tracks.iter().map(|t| self.extractor.extract(t)).collect();
        if let Some(index) = params.iter().position(|p| p.covariance.is_none()) {
            return Err(VertexingError::NoCovariance { index });
        }

        let constraint = options.constraint.as_ref();
        let constraint_weight = match constraint {
            Some(c) => Some(
                spd_inverse(&c.covariance).ok_or(VertexingError::SingularMatrix { iteration: 0 })?,
            ),
            None => None,
        };

        let mut fit = FitState {
            position: options.start_position(),
            momenta: Vec::with_capacity(params.len()),
            covariance: SquareMatrix4::zeros(),
            chi2: 0.0,
            iterations: 0,
            tracks: Vec::with_capacity(params.len()),
            track_chi2: vec![0.0; params.len()],
        };

        for iteration in 0..self.config.max_iterations.max(1) {
            let mut billoir_vertex = BilloirVertex::default();
            fit.tracks.clear();

            for (i, p) in params.iter().enumerate() {
                let linearized =
                    linearizer.linearize(p, &fit.position, &mut state.linearizer_state)?;
                if iteration == 0 {
                    let momentum = linearized.parameters_at_pca.fixed_rows::<3>(E_BOUND_PHI);
                    fit.momenta.push(momentum.into_owned());
                }
                let track = billoir_track(linearized, &fit.momenta[i], fit.position[E_TIME])
                    .ok_or(VertexingError::SingularMatrix { iteration })?;
                billoir_vertex.add(&track);
                fit.tracks.push(track);
            }

            let mut v_factor = billoir_vertex.a - billoir_vertex.b_cinv_bt;
            let mut v_const = billoir_vertex.t - billoir_vertex.b_cinv_u;
            if let (Some(c), Some(w)) = (constraint, constraint_weight.as_ref()) {
                v_factor += w;
                v_const += w * (c.position - fit.position);
            }

            let cov_v = spd_inverse(&v_factor).ok_or(VertexingError::SingularMatrix { iteration })?;
            let delta_v = cov_v * v_const;

            let mut chi2 = 0.0;
            for (i, track) in fit.tracks.iter().enumerate() {
                let delta_p = track.c_inv * (track.u - track.b * delta_v);
                let updated = fit.momenta[i] + delta_p;
                let (phi, theta) = normalize_phi_theta(updated[0], updated[1]);
                fit.momenta[i] = Vector3::new(phi, theta, updated[2]);

                let residual = track.delta_q
                    - track.linearized.position_jacobian * delta_v
                    - track.linearized.momentum_jacobian * delta_p;
                let track_chi2 = residual.dot(&(track.linearized.weight_at_pca * residual));
                fit.track_chi2[i] = track_chi2;
                chi2 += track_chi2;
            }

            fit.position += delta_v;
            if let (Some(c), Some(w)) = (constraint, constraint_weight.as_ref()) {
                let delta = fit.position - c.position;
                chi2 += delta.dot(&(w * delta));
            }

            if !chi2.is_finite() {
                return Err(VertexingError::NumericFailure { iteration, chi2 });
            }
            fit.chi2 = chi2;
            fit.covariance = cov_v;
            fit.iterations = iteration + 1;

            let step = delta_v.xyz().norm();
            trace!(iteration, step, chi2, position = ?fit.position, "billoir iteration");
            if self.config.convergence_tolerance.is_some_and(|tol| step < tol) {
                break;
            }
        }

        let vertex = finalize(&fit, params.len(), constraint.is_some());
        debug!(
            n_tracks = params.len(),
            iterations = fit.iterations,
            chi2 = vertex.chi2,
            ndf = vertex.ndf,
            "fitted vertex at ({:.4}, {:.4}, {:.4}, {:.4})",
            vertex.position[0],
            vertex.position[1],
            vertex.position[2],
            vertex.position[3],
        );
        Ok(vertex)
    }
}

/// Residual and normal-equation blocks of one linearised track.
///
/// The prediction F(V₀, p₀) has zero impact parameters because the track
/// starts at the expansion point.
fn billoir_track(
    linearized: LinearizedTrack,
    momentum: &MomentumVector,
    time: f64,
) -> Option<BilloirTrack> {
    let q = &linearized.parameters_at_pca;
    let delta_q = BoundVector::new(
        q[E_BOUND_LOC0],
        q[E_BOUND_LOC1],
        wrap_phi(q[E_BOUND_PHI] - momentum[0]),
        q[E_BOUND_THETA] - momentum[1],
        q[E_BOUND_QOVERP] - momentum[2],
        q[E_BOUND_TIME] - time,
    );

    let et_w = linearized.momentum_jacobian.transpose() * linearized.weight_at_pca;
    let c = et_w * linearized.momentum_jacobian;
    let b = et_w * linearized.position_jacobian;
    let u = et_w * delta_q;
    let c_inv = spd_inverse(&c)?;

    Some(BilloirTrack { linearized, delta_q, b, u, c_inv })
}

fn finalize(fit: &FitState, n_tracks: usize, constrained: bool) -> Vertex {
    let cov_v = &fit.covariance;
    let tracks = fit
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let cinv_b = track.c_inv * track.b;
            let vertex_momentum_covariance = -(cov_v * cinv_b.transpose());
            let momentum_covariance =
                symmetrize(&(track.c_inv + cinv_b * cov_v * cinv_b.transpose()));
            TrackAtVertex {
                index,
                fitted_momentum: fit.momenta[index],
                momentum_covariance,
                vertex_momentum_covariance,
                chi2: fit.track_chi2[index],
                linearization_point: track.linearized.linearization_point,
            }
        })
        .collect();

    let ndf = 2.0 * n_tracks as f64 + if constrained { 4.0 } else { 0.0 } - 4.0;

    Vertex {
        position: fit.position,
        covariance: *cov_v,
        tracks,
        chi2: fit.chi2,
        ndf,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
