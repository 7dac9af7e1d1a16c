//! Random-filled construction used by the stochastic edges.

use crate::array::Array;
use crate::error::Error;
use rand::Rng;
use rand_distr::{Bernoulli, Normal};

fn element_count(shape: &[usize]) -> Result<usize, Error> {
    shape
        .iter()
        .try_fold(1usize, |acc, &x| acc.checked_mul(x))
        .ok_or_else(|| {
            Error::InvalidOperation("Shape dimensions multiply to overflow usize".to_string())
        })
}

/// Samples i.i.d. `N(mean, std_dev^2)` values into an array of `shape`.
pub fn random_normal(shape: &[usize], mean: f32, std_dev: f32) -> Result<Array, Error> {
    let size = element_count(shape)?;
    if size == 0 {
        return Ok(Array::zeros(shape));
    }

    let dist = Normal::new(mean, std_dev).map_err(|_| Error::InitializationError)?;

    let mut rng = rand::rng();
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        data.push(rng.sample(dist));
    }

    Array::from_vec(data, shape)
}

/// Samples an i.i.d. `{0, 1}` mask where each element is 1 with probability `p`.
pub fn bernoulli(shape: &[usize], p: f32) -> Result<Array, Error> {
    let size = element_count(shape)?;
    if size == 0 {
        return Ok(Array::zeros(shape));
    }

    let dist = Bernoulli::new(p as f64).map_err(|_| Error::InitializationError)?;

    let mut rng = rand::rng();
    let mut data = Vec::with_capacity(size);
    for _ in 0..size {
        let sample: bool = rng.sample(dist);
        data.push(if sample { 1.0f32 } else { 0.0f32 });
    }

    Array::from_vec(data, shape)
}
