//! Axial field map: Bz sampled on a uniform grid along the beam axis.
//!
//! The transverse components are taken to be zero. Between samples the value
//! is interpolated linearly. The lookup cache remembers the last bin so that
//! the many nearby queries of one vertex fit skip the bin search.

use crate::provider::{FieldError, MagneticFieldProvider};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Bz(z) table on `[z_min, z_max]` with `bz.len()` equidistant samples.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AxialFieldMap {
    z_min: f64,
    z_max: f64,
    bz: Vec<f64>,
}

/// Last bin used by a lookup, with its bounds.
#[derive(Clone, Debug, Default)]
pub struct AxialMapCache {
    bin: Option<usize>,
    lo: f64,
    hi: f64,
    /// Number of lookups answered from the cached bin
    pub hits: u64,
}

impl AxialFieldMap {
    pub fn new(z_min: f64, z_max: f64, bz: Vec<f64>) -> Result<Self, FieldError> {
        if bz.len() < 2 {
            return Err(FieldError::TooFewSamples(bz.len()));
        }
        Ok(Self { z_min, z_max, bz })
    }

    /// Sample a closure at `n` equidistant points.
    pub fn from_fn(
        z_min: f64,
        z_max: f64,
        n: usize,
        f: impl Fn(f64) -> f64,
    ) -> Result<Self, FieldError> {
        let step = (z_max - z_min) / (n.max(2) - 1) as f64;
        Self::new(z_min, z_max, (0..n).map(|i| f(z_min + i as f64 * step)).collect())
    }

    fn bin_width(&self) -> f64 {
        (self.z_max - self.z_min) / (self.bz.len() - 1) as f64
    }

    fn bin_of(&self, z: f64) -> usize {
        let i = ((z - self.z_min) / self.bin_width()).floor() as usize;
        i.min(self.bz.len() - 2)
    }

    fn interpolate(&self, bin: usize, z: f64) -> f64 {
        let z0 = self.z_min + bin as f64 * self.bin_width();
        let frac = (z - z0) / self.bin_width();
        self.bz[bin] * (1.0 - frac) + self.bz[bin + 1] * frac
    }
}

impl MagneticFieldProvider for AxialFieldMap {
    type Cache = AxialMapCache;

    fn make_cache(&self) -> Self::Cache {
        AxialMapCache::default()
    }

    fn field(
        &self,
        position: &Vector3<f64>,
        cache: &mut AxialMapCache,
    ) -> Result<Vector3<f64>, FieldError> {
        let z = position.z;
        if !(self.z_min..=self.z_max).contains(&z) {
            return Err(FieldError::OutOfBounds {
                z,
                min: self.z_min,
                max: self.z_max,
            });
        }
        let bin = match cache.bin {
            Some(b) if z >= cache.lo && z <= cache.hi => {
                cache.hits += 1;
                b
            }
            _ => {
                let b = self.bin_of(z);
                cache.bin = Some(b);
                cache.lo = self.z_min + b as f64 * self.bin_width();
                cache.hi = cache.lo + self.bin_width();
                b
            }
        };
        Ok(Vector3::new(0.0, 0.0, self.interpolate(bin, z)))
    }
}
