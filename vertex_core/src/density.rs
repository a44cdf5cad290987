//! Gaussian track density along the beam axis, used to seed the vertex fit.
//!
//! # Model
//! Each track contributes the bivariate Gaussian of its (d0, z0) measurement,
//! evaluated on the beam line (d0 = 0) and written as a function of z:
//!
//!   ln ρ_i(z) = c_i + l_i·z + q_i·z²
//!
//! with, for the 2×2 covariance block Σ = [[σ_dd, σ_dz], [σ_dz, σ_zz]]:
//!
//!   c = −(d0²σ_zz + z0²σ_dd + 2·d0·z0·σ_dz) / (2·det Σ) − ln(2π·√det Σ)
//!   l = (d0·σ_dz + z0·σ_dd) / det Σ
//!   q = −σ_dd / (2·det Σ)
//!
//! A track only contributes inside the z-range where the quadratic stays above
//! the longitudinal significance cut.

use crate::error::VertexingError;
use crate::types::{ParameterExtractor, E_BOUND_LOC0, E_BOUND_LOC1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration of the track density.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianTrackDensityConfig {
    /// Cut on d0²/σ_dd (squared transverse significance)
    pub d0_significance_cut: f64,
    /// Squared longitudinal significance bounding each track's z-range
    pub z0_significance_cut: f64,
    /// Use the Gaussian-shaped step instead of a plain Newton step
    pub is_gaussian_shaped: bool,
    /// Refine-and-record cycles per trial track
    pub refinement_steps: usize,
}

impl GaussianTrackDensityConfig {
    /// Build from cuts given in units of σ (they are squared here).
    pub fn from_max_significance(d0_max_significance: f64, z0_max_significance: f64) -> Self {
        Self {
            d0_significance_cut: d0_max_significance * d0_max_significance,
            z0_significance_cut: z0_max_significance * z0_max_significance,
            ..Self::default()
        }
    }
}

impl Default for GaussianTrackDensityConfig {
    fn default() -> Self {
        Self {
            d0_significance_cut: 3.5 * 3.5,
            z0_significance_cut: 12.0 * 12.0,
            is_gaussian_shaped: true,
            refinement_steps: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Cached density coefficients of one track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackDensityEntry {
    pub z: f64,
    pub constant_term: f64,
    pub linear_term: f64,
    pub quadratic_term: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl TrackDensityEntry {
    fn contains(&self, z: f64) -> bool {
        self.lower_bound < z && z < self.upper_bound
    }
}

/// Entries accumulated by [`GaussianTrackDensity::add_tracks`]. Private to one
/// seeding call.
#[derive(Clone, Debug, Default)]
pub struct TrackDensityState {
    pub entries: Vec<TrackDensityEntry>,
}

/// Density value and its first two derivatives at a point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DensityAndDerivatives {
    pub density: f64,
    pub first_derivative: f64,
    pub second_derivative: f64,
}

impl DensityAndDerivatives {
    fn is_maximum_candidate(&self) -> bool {
        self.second_derivative < 0.0 && self.density > 0.0
    }
}

/// Incumbent maximum while scanning the trial points.
#[derive(Clone, Copy, Debug, Default)]
struct Maximum {
    position: f64,
    density: f64,
    second_derivative: f64,
}

impl Maximum {
    fn update(&mut self, z: f64, d: &DensityAndDerivatives) {
        if d.density > self.density {
            *self = Maximum {
                position: z,
                density: d.density,
                second_derivative: d.second_derivative,
            };
        }
    }
}

// ---------------------------------------------------------------------------
// GaussianTrackDensity
// ---------------------------------------------------------------------------

/// One-dimensional track density seeder.
#[derive(Clone, Debug, Default)]
pub struct GaussianTrackDensity {
    pub config: GaussianTrackDensityConfig,
}

impl GaussianTrackDensity {
    pub fn new(config: GaussianTrackDensityConfig) -> Self {
        Self { config }
    }

    /// Convert every usable track into a [`TrackDensityEntry`].
    ///
    /// Fails with `NoCovariance` (storing nothing) if any track lacks a
    /// covariance. Tracks failing the positivity or significance checks are
    /// skipped silently.
    pub fn add_tracks<T, E>(
        &self,
        state: &mut TrackDensityState,
        tracks: &[T],
        extractor: &E,
    ) -> Result<(), VertexingError>
    where
        E: ParameterExtractor<T>,
    {
        let mut entries = Vec::with_capacity(tracks.len());
        for (index, track) in tracks.iter().enumerate() {
            let params = extractor.extract(track);
            let cov = params.covariance.ok_or(VertexingError::NoCovariance { index })?;
            let d0 = params.parameters[E_BOUND_LOC0];
            let z0 = params.parameters[E_BOUND_LOC1];
            if let Some(entry) = self.entry(
                d0,
                z0,
                cov[(E_BOUND_LOC0, E_BOUND_LOC0)],
                cov[(E_BOUND_LOC1, E_BOUND_LOC1)],
                cov[(E_BOUND_LOC0, E_BOUND_LOC1)],
            ) {
                entries.push(entry);
            }
        }
        state.entries.extend(entries);
        Ok(())
    }

    fn entry(
        &self,
        d0: f64,
        z0: f64,
        cov_dd: f64,
        cov_zz: f64,
        cov_dz: f64,
    ) -> Option<TrackDensityEntry> {
        let det = cov_dd * cov_zz - cov_dz * cov_dz;
        if cov_dd <= 0.0
            || cov_zz <= 0.0
            || det <= 0.0
            || d0 * d0 / cov_dd > self.config.d0_significance_cut
        {
            return None;
        }

        let mut constant_term =
            -(d0 * d0 * cov_zz + z0 * z0 * cov_dd + 2.0 * d0 * z0 * cov_dz) / (2.0 * det);
        let linear_term = (d0 * cov_dz + z0 * cov_dd) / det;
        let quadratic_term = -cov_dd / (2.0 * det);

        let discriminant = linear_term * linear_term
            - 4.0 * quadratic_term * (constant_term + 2.0 * self.config.z0_significance_cut);
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let upper_bound = (-linear_term - root) / (2.0 * quadratic_term);
        let lower_bound = (-linear_term + root) / (2.0 * quadratic_term);

        constant_term -= (2.0 * PI * det.sqrt()).ln();

        Some(TrackDensityEntry {
            z: z0,
            constant_term,
            linear_term,
            quadratic_term,
            lower_bound,
            upper_bound,
        })
    }

    /// Summed density and derivatives at `z`.
    pub fn density_and_derivatives(
        &self,
        state: &TrackDensityState,
        z: f64,
    ) -> DensityAndDerivatives {
        let mut out = DensityAndDerivatives::default();
        for entry in state.entries.iter().filter(|e| e.contains(z)) {
            let exponent =
                entry.constant_term + z * (entry.linear_term + z * entry.quadratic_term);
            let delta = exponent.exp();
            let q_prime = entry.linear_term + 2.0 * entry.quadratic_term * z;
            let delta_prime = delta * q_prime;
            out.density += delta;
            out.first_derivative += delta_prime;
            out.second_derivative += 2.0 * entry.quadratic_term * delta + q_prime * delta_prime;
        }
        out
    }

    fn step_size(&self, d: &DensityAndDerivatives) -> f64 {
        if self.config.is_gaussian_shaped {
            d.density * d.first_derivative
                / (d.first_derivative * d.first_derivative - d.density * d.second_derivative)
        } else {
            -d.first_derivative / d.second_derivative
        }
    }

    /// Position and width of the highest density maximum among the stored
    /// entries, or `(0, 0)` if there is none.
    pub fn maximum_with_width(&self, state: &TrackDensityState) -> (f64, f64) {
        let mut max = Maximum::default();
        for entry in &state.entries {
            let mut z = entry.z;
            let mut d = self.density_and_derivatives(state, z);
            if !d.is_maximum_candidate() {
                continue;
            }
            max.update(z, &d);
            for _ in 0..self.config.refinement_steps {
                z += self.step_size(&d);
                if !z.is_finite() {
                    break;
                }
                d = self.density_and_derivatives(state, z);
                if !d.is_maximum_candidate() {
                    break;
                }
                max.update(z, &d);
            }
        }

        if max.second_derivative == 0.0 {
            return (0.0, 0.0);
        }
        let width = (-max.density / max.second_derivative).sqrt();
        (max.position, if width.is_finite() { width } else { 0.0 })
    }

    /// Add `tracks` to a fresh state and return the maximum with its width.
    /// Any failure of [`Self::add_tracks`] yields `(0, 0)`.
    pub fn global_maximum_with_width<T, E>(&self, tracks: &[T], extractor: &E) -> (f64, f64)
    where
        E: ParameterExtractor<T>,
    {
        let mut state = TrackDensityState::default();
        if self.add_tracks(&mut state, tracks, extractor).is_err() || state.entries.is_empty() {
            return (0.0, 0.0);
        }
        self.maximum_with_width(&state)
    }

    /// Position component of [`Self::global_maximum_with_width`].
    pub fn global_maximum<T, E>(&self, tracks: &[T], extractor: &E) -> f64
    where
        E: ParameterExtractor<T>,
    {
        self.global_maximum_with_width(tracks, extractor).0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
