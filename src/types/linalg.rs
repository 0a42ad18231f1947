//! Dense linear algebra primitives for the Kalman recursion
//!
//! Thin, shape-checked wrappers around `nalgebra` dynamic matrices. Every
//! operation reports incompatible shapes as `KalmanError::Shape` instead of
//! panicking, and inversion reports `KalmanError::SingularMatrix`.

use nalgebra::{DMatrix, DVector};

use crate::error::{KalmanError, KalmanResult};

// ===== Type aliases =====
pub type Vector = DVector<f64>;
pub type Matrix = DMatrix<f64>;

/// `A · B`
pub fn multiply(a: &Matrix, b: &Matrix) -> KalmanResult<Matrix> {
    if a.ncols() != b.nrows() {
        return Err(KalmanError::Shape {
            operation: "multiply",
            left: a.shape(),
            right: b.shape(),
        });
    }
    Ok(a * b)
}

/// `A · v`
pub fn multiply_vector(a: &Matrix, v: &Vector) -> KalmanResult<Vector> {
    if a.ncols() != v.len() {
        return Err(KalmanError::Shape {
            operation: "multiply",
            left: a.shape(),
            right: (v.len(), 1),
        });
    }
    Ok(a * v)
}

pub fn transpose(a: &Matrix) -> Matrix {
    a.transpose()
}

pub fn add(a: &Matrix, b: &Matrix) -> KalmanResult<Matrix> {
    if a.shape() != b.shape() {
        return Err(KalmanError::Shape {
            operation: "add",
            left: a.shape(),
            right: b.shape(),
        });
    }
    Ok(a + b)
}

pub fn subtract(a: &Matrix, b: &Matrix) -> KalmanResult<Matrix> {
    if a.shape() != b.shape() {
        return Err(KalmanError::Shape {
            operation: "subtract",
            left: a.shape(),
            right: b.shape(),
        });
    }
    Ok(a - b)
}

pub fn subtract_vector(a: &Vector, b: &Vector) -> KalmanResult<Vector> {
    if a.len() != b.len() {
        return Err(KalmanError::Shape {
            operation: "subtract",
            left: (a.len(), 1),
            right: (b.len(), 1),
        });
    }
    Ok(a - b)
}

/// Inverse of a square matrix
///
/// An inverse containing non-finite entries is treated as singular so a
/// degenerate matrix never leaks NaN/inf into a State.
pub fn invert(a: &Matrix) -> KalmanResult<Matrix> {
    if !a.is_square() {
        return Err(KalmanError::Shape {
            operation: "invert",
            left: a.shape(),
            right: a.shape(),
        });
    }
    match a.clone().try_inverse() {
        Some(inverse) if inverse.iter().all(|v| v.is_finite()) => Ok(inverse),
        _ => Err(KalmanError::SingularMatrix { size: a.nrows() }),
    }
}

/// Square diagonal matrix from its diagonal entries
pub fn diag(values: &[f64]) -> Matrix {
    Matrix::from_diagonal(&Vector::from_column_slice(values))
}

/// Block-diagonal matrix repeating `block` `count` times
pub fn block_diagonal(block: &Matrix, count: usize) -> Matrix {
    let (rows, cols) = block.shape();
    let mut out = Matrix::zeros(rows * count, cols * count);
    for i in 0..count {
        out.view_mut((i * rows, i * cols), (rows, cols)).copy_from(block);
    }
    out
}

/// Build a matrix from row-major nested rows
///
/// Returns `None` for ragged input.
pub fn from_rows(rows: &[Vec<f64>]) -> Option<Matrix> {
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != ncols) {
        return None;
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Some(Matrix::from_row_slice(rows.len(), ncols, &flat))
}

/// Row-major nested rows of a matrix
pub fn to_rows(m: &Matrix) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

pub fn contains_non_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> bool {
    values.into_iter().any(|v| !v.is_finite())
}

/// Square sub-block `m[indexes][indexes]`
pub fn select_block(m: &Matrix, indexes: &[usize]) -> Matrix {
    Matrix::from_fn(indexes.len(), indexes.len(), |i, j| m[(indexes[i], indexes[j])])
}
