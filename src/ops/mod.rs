//! Forward and backward kernels for every edge.
//!
//! `cpu_ops` holds the forward functions and `cpu_backward` their gradients.
//! Both are plain functions over [`Array`]; the [`Edge`](crate::Edge) enum
//! validates arity and dispatches into them.

pub mod cpu_backward;
pub mod cpu_ops;

use crate::array::Array;
use crate::error::Error;

pub(crate) fn require_same_shape(op: &str, a: &Array, b: &Array) -> Result<(), Error> {
    if a.shape() != b.shape() {
        return Err(Error::IncompatibleShapes {
            op: op.to_string(),
            shape_a: a.shape().to_vec(),
            shape_b: b.shape().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn require_column(op: &str, x: &Array) -> Result<(), Error> {
    if !x.is_column() {
        return Err(Error::ShapeError(format!(
            "{} expects a column vector, got shape {:?}",
            op,
            x.shape()
        )));
    }
    Ok(())
}

pub(crate) fn require_scalar(op: &str, x: &Array) -> Result<(), Error> {
    if x.shape() != [1, 1] {
        return Err(Error::ShapeError(format!(
            "{} expects a [1, 1] scalar, got shape {:?}",
            op,
            x.shape()
        )));
    }
    Ok(())
}

pub(crate) fn require_index(index: usize, size: usize) -> Result<(), Error> {
    if index >= size {
        return Err(Error::IndexOutOfBounds { index, size });
    }
    Ok(())
}

/// Denominator sets must be non-empty, in range and free of duplicates.
pub(crate) fn validate_denominator(denom: &[usize], rows: usize) -> Result<(), Error> {
    if denom.is_empty() {
        return Err(Error::InvalidOperation(
            "RestrictedLogSoftmax requires a non-empty denominator set".to_string(),
        ));
    }
    let mut seen = vec![false; rows];
    for &i in denom {
        require_index(i, rows)?;
        if seen[i] {
            return Err(Error::InvalidOperation(format!(
                "RestrictedLogSoftmax denominator contains index {} twice",
                i
            )));
        }
        seen[i] = true;
    }
    Ok(())
}

/// A multilinear pair `(A, x)` is an implicit diagonal product when both
/// operands are identically shaped column vectors.
pub(crate) fn is_diagonal_pair(a: &Array, x: &Array) -> bool {
    a.is_column() && a.shape() == x.shape()
}
