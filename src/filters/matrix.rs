//! Matrix inversion for the Kalman measurement update.

use crate::error::EstimatorError;
use crate::types::DynMat;
use nalgebra::SMatrix;

/// Relative pivot tolerance; scaled by the largest entry of the input.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// At every column the row with the largest absolute value in the pivot
/// column is swapped into place before normalising. A pivot below the scaled
/// tolerance means the matrix is singular (or numerically close to it) and is
/// reported instead of dividing through.
pub fn gauss_jordan_inverse(matrix: &DynMat) -> Result<DynMat, EstimatorError> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(EstimatorError::NotSquare { rows, cols });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(EstimatorError::NonFiniteInput("matrix"));
    }

    let n = rows;
    let scale = matrix.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = PIVOT_TOLERANCE * scale;

    // [A | I]
    let mut aug = DynMat::zeros(n, 2 * n);
    aug.view_mut((0, 0), (n, n)).copy_from(matrix);
    for i in 0..n {
        aug[(i, n + i)] = 1.0;
    }

    for col in 0..n {
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if aug[(row, col)].abs() > aug[(pivot_row, col)].abs() {
                pivot_row = row;
            }
        }
        if aug[(pivot_row, col)].abs() < tolerance {
            return Err(EstimatorError::Singular { column: col });
        }
        if pivot_row != col {
            aug.swap_rows(col, pivot_row);
        }

        let divisor = aug[(col, col)];
        for j in col..2 * n {
            aug[(col, j)] /= divisor;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in col..2 * n {
                aug[(row, j)] -= factor * aug[(col, j)];
            }
        }
    }

    Ok(aug.columns(n, n).into_owned())
}

/// Statically sized convenience wrapper around [`gauss_jordan_inverse`].
pub fn invert_static<const N: usize>(
    matrix: &SMatrix<f64, N, N>,
) -> Result<SMatrix<f64, N, N>, EstimatorError> {
    let dynamic = DynMat::from_column_slice(N, N, matrix.as_slice());
    let inverse = gauss_jordan_inverse(&dynamic)?;
    Ok(SMatrix::<f64, N, N>::from_column_slice(inverse.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix4;

    #[test]
    fn test_inverse_4x4_gives_identity() {
        let a = DynMat::from_row_slice(
            4,
            4,
            &[
                4.0, 7.0, 2.0, 3.0, //
                0.0, 5.0, 0.0, 1.0, //
                2.0, 1.0, 6.0, 0.0, //
                1.0, 0.0, 3.0, 8.0,
            ],
        );
        let inv = gauss_jordan_inverse(&a).unwrap();
        let product = &a * &inv;
        let identity = DynMat::identity(4, 4);
        for (got, want) in product.iter().zip(identity.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-10);
        }

        let back = &inv * &a;
        for (got, want) in back.iter().zip(identity.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_zero_leading_pivot_needs_row_swap() {
        // Naive elimination divides by zero on the first step
        let a = DynMat::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let inv = gauss_jordan_inverse(&a).unwrap();
        assert_abs_diff_eq!(inv[(0, 1)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[(1, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[(0, 0)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = DynMat::from_row_slice(
            3,
            3,
            &[
                1.0, 2.0, 3.0, //
                2.0, 4.0, 6.0, //
                0.0, 1.0, 1.0,
            ],
        );
        assert!(matches!(
            gauss_jordan_inverse(&a),
            Err(EstimatorError::Singular { .. })
        ));
    }

    #[test]
    fn test_non_square_and_non_finite() {
        let rect = DynMat::zeros(2, 3);
        assert_eq!(
            gauss_jordan_inverse(&rect),
            Err(EstimatorError::NotSquare { rows: 2, cols: 3 })
        );

        let nan = DynMat::from_element(1, 1, f64::NAN);
        assert!(matches!(
            gauss_jordan_inverse(&nan),
            Err(EstimatorError::NonFiniteInput(_))
        ));
    }

    #[test]
    fn test_scalar_inverse_is_reciprocal() {
        let s = DynMat::from_element(1, 1, 4.0);
        let inv = gauss_jordan_inverse(&s).unwrap();
        assert_abs_diff_eq!(inv[(0, 0)], 0.25, epsilon = 1e-15);

        let zero = DynMat::from_element(1, 1, 0.0);
        assert_eq!(
            gauss_jordan_inverse(&zero),
            Err(EstimatorError::Singular { column: 0 })
        );
    }

    #[test]
    fn test_static_wrapper_matches_nalgebra() {
        let a = Matrix4::new(
            2.0, 0.0, 1.0, 0.0, //
            0.0, 3.0, 0.0, 1.0, //
            1.0, 0.0, 4.0, 0.0, //
            0.0, 1.0, 0.0, 5.0,
        );
        let ours = invert_static(&a).unwrap();
        let reference = a.try_inverse().unwrap();
        for (got, want) in ours.iter().zip(reference.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
    }
}
