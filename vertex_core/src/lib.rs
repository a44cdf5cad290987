//! `vertex_core` - Vertex seeding and fitting for charged-particle tracks.
//!
//! # Module layout
//! - [`types`]      - Track parameters, matrix aliases, parameter extraction
//! - [`units`]      - Physical constants in mm / ns / GeV / T
//! - [`helix`]      - Perigee parameters of a helix and their Jacobians
//! - [`linearizer`] - Linear track model around an expansion point
//! - [`density`]    - Gaussian track density along the beam axis
//! - [`finder`]     - Density-maximum seed finder
//! - [`fitter`]     - Full Billoir 4D vertex fitter
//! - [`vertex`]     - Vertex results, constraints, fit options
//! - [`algorithm`]  - Batch driver over proto-vertices
//! - [`metrics`]    - Residual RMSE, pulls, χ²/ndf

pub mod algorithm;
pub mod density;
pub mod error;
pub mod finder;
pub mod fitter;
pub mod helix;
pub mod linalg;
pub mod linearizer;
pub mod metrics;
pub mod types;
pub mod units;
pub mod vertex;

pub use algorithm::{
    FitFailure, ProtoVertex, VertexFitterAlgorithm, VertexFitterConfig, VertexFitterOutput,
};
pub use density::{
    GaussianTrackDensity, GaussianTrackDensityConfig, TrackDensityEntry, TrackDensityState,
};
pub use error::VertexingError;
pub use finder::TrackDensityVertexFinder;
pub use fitter::{BilloirFitterConfig, BilloirState, FullBilloirVertexFitter};
pub use linearizer::{HelicalTrackLinearizer, LinearizationError, LinearizedTrack, Linearizer};
pub use metrics::VertexMetrics;
pub use types::{
    BoundTrackParameters, IdentityExtractor, ParameterExtractor, ParticleHypothesis, TrackId,
};
pub use vertex::{Constraint, TrackAtVertex, Vertex, VertexingOptions};
