//! Uniform magnetic field.

use crate::provider::{FieldError, MagneticFieldProvider};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Field that is identical everywhere. Its cache is empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantBField {
    /// Field vector in Tesla
    pub value: Vector3<f64>,
}

impl ConstantBField {
    pub fn new(value: Vector3<f64>) -> Self {
        Self { value }
    }

    /// Solenoid-like field pointing along the beam axis.
    pub fn along_z(bz: f64) -> Self {
        Self::new(Vector3::new(0.0, 0.0, bz))
    }

    /// No field at all: every track is a straight line.
    pub fn zero() -> Self {
        Self::new(Vector3::zeros())
    }
}

impl Default for ConstantBField {
    fn default() -> Self {
        Self::along_z(2.0)
    }
}

impl MagneticFieldProvider for ConstantBField {
    type Cache = ();

    fn make_cache(&self) -> Self::Cache {}

    fn field(&self, _position: &Vector3<f64>, _cache: &mut ()) -> Result<Vector3<f64>, FieldError> {
        Ok(self.value)
    }
}
