//! Small dense-matrix helpers on top of nalgebra.
//!
//! Every matrix inverted in the vertex fit is symmetric positive-definite by
//! construction, so inversion goes through a Cholesky decomposition.

use nalgebra::{allocator::Allocator, DefaultAllocator, DimName, OMatrix};

/// Inverse of a symmetric positive-definite matrix.
///
/// Returns `None` if the Cholesky decomposition fails or the result is not
/// finite. The result is symmetrised to remove round-off asymmetry.
pub fn spd_inverse<D>(m: &OMatrix<f64, D, D>) -> Option<OMatrix<f64, D, D>>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D, D>,
{
    let inv = m.clone().cholesky()?.inverse();
    if inv.iter().all(|v| v.is_finite()) {
        Some(symmetrize(&inv))
    } else {
        None
    }
}

/// (M + Mᵀ) / 2
pub fn symmetrize<D>(m: &OMatrix<f64, D, D>) -> OMatrix<f64, D, D>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D, D>,
{
    (m + m.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Matrix3, Matrix4};

    #[test]
    fn inverts_spd() {
        let m = Matrix3::new(4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0);
        let inv = spd_inverse(&m).unwrap();
        assert_abs_diff_eq!(m * inv, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn rejects_zero_and_indefinite() {
        assert!(spd_inverse(&Matrix4::<f64>::zeros()).is_none());
        let m = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, -1.0, 1.0));
        assert!(spd_inverse(&m).is_none());
    }
}
