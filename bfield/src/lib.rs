//! `bfield` - Magnetic field providers consumed by the track linearizer.
//!
//! Every provider hands out a [`MagneticFieldProvider::Cache`] that the caller
//! owns for the duration of one vertex fit. Lookups never share mutable state
//! between callers, so independent fits can run on different threads.

pub mod axial_map;
pub mod constant;
pub mod provider;

pub use axial_map::{AxialFieldMap, AxialMapCache};
pub use constant::ConstantBField;
pub use provider::{FieldError, MagneticFieldProvider};
