//! Unit conventions: mm, ns, GeV, e, Tesla.

/// Speed of light in mm/ns
pub const SPEED_OF_LIGHT: f64 = 299.792_458;

/// Curvature of a unit-charge track per Tesla and per GeV of transverse
/// momentum, in 1/mm: `1/R = KAPPA · q · B / pT`.
pub const KAPPA: f64 = 0.299_792_458e-3;
