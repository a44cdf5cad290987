//! Field provider trait and lookup errors.

use nalgebra::Vector3;
use thiserror::Error;

/// Failure of a single field lookup.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum FieldError {
    /// The requested position lies outside the region covered by the field map.
    #[error("position z = {z} mm is outside the field map [{min}, {max}] mm")]
    OutOfBounds { z: f64, min: f64, max: f64 },
    /// The map holds no usable samples.
    #[error("field map needs at least two samples, got {0}")]
    TooFewSamples(usize),
}

/// A source of magnetic field values (Tesla) at global positions (mm).
pub trait MagneticFieldProvider: Send + Sync {
    /// Per-caller lookup cache. Created once per fit and dropped afterwards.
    type Cache: Send;

    /// Create a fresh cache for one caller.
    fn make_cache(&self) -> Self::Cache;

    /// Field vector at `position`.
    fn field(&self, position: &Vector3<f64>, cache: &mut Self::Cache)
        -> Result<Vector3<f64>, FieldError>;
}
