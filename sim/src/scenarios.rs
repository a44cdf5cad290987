//! Scenario definitions.
//!
//! Each scenario pairs a generator configuration with the fitter
//! configuration it is meant to exercise. All scenarios are deterministic
//! given the same seed.

use crate::generator::GeneratorConfig;
use nalgebra::Vector4;
use serde::{Deserialize, Serialize};
use vertex_core::types::SquareMatrix4;
use vertex_core::{GaussianTrackDensityConfig, VertexFitterConfig};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// One vertex per event, 2 T field, unconstrained fit from a density seed
    SingleVertex,
    /// 40 vertices along the beam line, truth proto-vertices
    PileUp,
    /// Vertices displaced by up to 5 mm transversely
    Displaced,
    /// No field: straight tracks, constrained fit
    NoField,
}

/// A fully configured scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub generator: GeneratorConfig,
    pub fitter: VertexFitterConfig,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::SingleVertex => Self::single_vertex(seed),
            ScenarioKind::PileUp => Self::pile_up(seed),
            ScenarioKind::Displaced => Self::displaced(seed),
            ScenarioKind::NoField => Self::no_field(seed),
        }
    }

    fn single_vertex(seed: u64) -> Self {
        Self {
            name: "single_vertex".into(),
            seed,
            generator: GeneratorConfig::default(),
            fitter: VertexFitterConfig {
                use_density_seed: true,
                ..Default::default()
            },
        }
    }

    fn pile_up(seed: u64) -> Self {
        Self {
            name: "pile_up".into(),
            seed,
            generator: GeneratorConfig {
                n_vertices: 40,
                mean_multiplicity: 8.0,
                ..Default::default()
            },
            fitter: VertexFitterConfig {
                use_density_seed: true,
                ..Default::default()
            },
        }
    }

    fn displaced(seed: u64) -> Self {
        Self {
            name: "displaced".into(),
            seed,
            generator: GeneratorConfig {
                max_displacement: 5.0,
                mean_multiplicity: 10.0,
                ..Default::default()
            },
            // displaced tracks would all fail the default transverse cut
            fitter: VertexFitterConfig {
                use_density_seed: true,
                density: GaussianTrackDensityConfig::from_max_significance(500.0, 12.0),
                ..Default::default()
            },
        }
    }

    fn no_field(seed: u64) -> Self {
        Self {
            name: "no_field".into(),
            seed,
            generator: GeneratorConfig {
                bz: 0.0,
                ..Default::default()
            },
            fitter: VertexFitterConfig {
                do_constrained_fit: true,
                constraint_covariance: SquareMatrix4::from_diagonal(&Vector4::new(
                    1e-4, 1e-4, 2500.0, 0.04,
                )),
                ..Default::default()
            },
        }
    }
}
