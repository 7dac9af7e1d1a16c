use crate::error::Error;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use ndarray::{Array1, Array2, ArrayD, ArrayView2, Axis, Ix2, IxDyn, ShapeError};

/// Dense `f32` tensor backing every edge.
///
/// Edges operate on rank-2 arrays: a matrix is `[rows, cols]`, a column
/// vector is `[n, 1]` and a scalar is `[1, 1]`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Array {
    pub(crate) data: ArrayD<f32>,
}

impl Array {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn from_matrix(data: Array2<f32>) -> Self {
        Self {
            data: data.into_dyn(),
        }
    }

    pub fn into_ndarray(self) -> ArrayD<f32> {
        self.data
    }

    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self, Error> {
        let actual_len = data.len();
        let map_err = |_e: ShapeError| Error::ShapeMismatch {
            expected: shape.to_vec(),
            actual: vec![actual_len],
        };
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(map_err)?;
        Ok(Self { data: array })
    }

    /// Builds an `[n, 1]` column vector.
    pub fn column(data: Vec<f32>) -> Self {
        Self {
            data: Array1::from(data).insert_axis(Axis(1)).into_dyn(),
        }
    }

    /// Builds a `[1, 1]` scalar.
    pub fn scalar(value: f32) -> Self {
        Self {
            data: Array2::from_elem((1, 1), value).into_dyn(),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
        }
    }

    pub fn constant(shape: &[usize], value: f32) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn get_data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn get_data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    /// Elements in row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub fn rows(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    pub fn cols(&self) -> usize {
        self.shape().get(1).copied().unwrap_or(1)
    }

    pub fn is_column(&self) -> bool {
        self.data.ndim() == 2 && self.cols() == 1
    }

    /// Value of a `[1, 1]` array.
    pub fn scalar_value(&self) -> Result<f32, Error> {
        if self.size() != 1 {
            return Err(Error::ShapeMismatch {
                expected: vec![1, 1],
                actual: self.shape().to_vec(),
            });
        }
        self.data
            .iter()
            .next()
            .copied()
            .ok_or_else(|| Error::ShapeError("empty scalar".to_string()))
    }

    pub fn matrix_view(&self) -> Result<ArrayView2<'_, f32>, Error> {
        self.data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::ShapeError(format!("expected a 2D array, got {:?}: {}", self.shape(), e)))
    }

    pub fn transpose(&self) -> Result<Array, Error> {
        Ok(Array::from_matrix(
            self.matrix_view()?.t().as_standard_layout().into_owned(),
        ))
    }

    pub fn mapv<F>(&self, f: F) -> Array
    where
        F: Fn(f32) -> f32,
    {
        Array::new(self.data.mapv(f))
    }

    /// Reshapes the array without changing its data.
    /// The new shape must have the same total number of elements.
    pub fn reshape(&mut self, shape: &[usize]) -> Result<(), Error> {
        let old_size = self.data.len();
        let new_size = shape.iter().product::<usize>();
        if old_size != new_size {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                actual: self.data.shape().to_vec(),
            });
        }
        let new_data = ArrayD::from_shape_vec(IxDyn(shape), self.to_vec())
            .map_err(|e| Error::ShapeError(e.to_string()))?;
        self.data = new_data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_and_scalar_shapes() {
        let c = Array::column(vec![1.0, 2.0, 3.0]);
        assert_eq!(c.shape(), &[3, 1]);
        assert!(c.is_column());
        let s = Array::scalar(4.5);
        assert_eq!(s.shape(), &[1, 1]);
        assert_eq!(s.scalar_value().unwrap(), 4.5);
    }

    #[test]
    fn test_reshape_is_row_major() {
        let mut a = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        a.reshape(&[3, 2]).unwrap();
        assert_eq!(a.shape(), &[3, 2]);
        assert_eq!(a.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(a.reshape(&[4, 2]).is_err());
    }

    #[test]
    fn test_transpose_copies_into_new_layout() {
        let a = Array::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let t = a.transpose().unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_scalar_value_rejects_vectors() {
        let c = Array::column(vec![1.0, 2.0]);
        assert!(matches!(
            c.scalar_value(),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_matrix_view_requires_rank_two() {
        let a = Array::from_vec(vec![1.0, 2.0], &[2]).unwrap();
        assert!(a.matrix_view().is_err());
    }
}
