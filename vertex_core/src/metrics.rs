//! Vertexing metrics: residual RMSE, pull RMS, mean χ²/ndf, failure counts.

use crate::types::Vector4f;
use crate::vertex::Vertex;
use serde::{Deserialize, Serialize};

/// Accumulated metric statistics over many fitted vertices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexMetrics {
    /// Number of events evaluated
    pub n_events: u64,
    /// Number of (fitted, truth) pairs evaluated
    pub n_matched: u64,
    /// Sum of squared residuals per coordinate (x, y, z, t)
    pub sum_sq_residual: [f64; 4],
    /// Sum of squared pulls per coordinate
    pub sum_sq_pull: [f64; 4],
    /// Pairs contributing to the pull sums (non-zero variance)
    pub n_pulls: [u64; 4],
    pub sum_chi2_per_ndf: f64,
    pub n_chi2: u64,
    /// Candidates that were skipped
    pub skipped: u64,
    /// Candidates whose fit failed
    pub failed: u64,
}

fn rms(sum_sq: f64, n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (sum_sq / n as f64).sqrt()
}

impl VertexMetrics {
    /// Root-mean-square residual of one coordinate (mm or ns).
    pub fn rmse(&self, axis: usize) -> f64 {
        rms(self.sum_sq_residual[axis], self.n_matched)
    }

    /// 3D position RMSE (mm).
    pub fn rmse_position(&self) -> f64 {
        rms(self.sum_sq_residual[..3].iter().sum(), self.n_matched)
    }

    /// RMS of the pulls of one coordinate. Close to one for a consistent fit.
    pub fn pull_rms(&self, axis: usize) -> f64 {
        rms(self.sum_sq_pull[axis], self.n_pulls[axis])
    }

    pub fn mean_chi2_per_ndf(&self) -> f64 {
        if self.n_chi2 == 0 {
            return 0.0;
        }
        self.sum_chi2_per_ndf / self.n_chi2 as f64
    }

    /// Accumulate one fitted vertex against its true position.
    pub fn accumulate(&mut self, fitted: &Vertex, truth: &Vector4f) {
        let residual = fitted.position - truth;
        let sigmas = fitted.sigmas();
        for axis in 0..4 {
            self.sum_sq_residual[axis] += residual[axis] * residual[axis];
            if sigmas[axis] > 0.0 {
                let pull = residual[axis] / sigmas[axis];
                self.sum_sq_pull[axis] += pull * pull;
                self.n_pulls[axis] += 1;
            }
        }
        self.n_matched += 1;
        if let Some(chi2_ndf) = fitted.chi2_per_ndf() {
            self.sum_chi2_per_ndf += chi2_ndf;
            self.n_chi2 += 1;
        }
    }

    /// Accumulate one event's skip and failure counts.
    pub fn record_event(&mut self, skipped: usize, failed: usize) {
        self.n_events += 1;
        self.skipped += skipped as u64;
        self.failed += failed as u64;
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &VertexMetrics) {
        self.n_events += other.n_events;
        self.n_matched += other.n_matched;
        for axis in 0..4 {
            self.sum_sq_residual[axis] += other.sum_sq_residual[axis];
            self.sum_sq_pull[axis] += other.sum_sq_pull[axis];
            self.n_pulls[axis] += other.n_pulls[axis];
        }
        self.sum_chi2_per_ndf += other.sum_chi2_per_ndf;
        self.n_chi2 += other.n_chi2;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}
