// src/ops/cpu_backward.rs
//! Backward computations. Each function returns the gradient contribution for
//! one input given that input, the edge output and the downstream gradient.

use crate::array::Array;
use crate::error::Error;
use crate::kernels;
use crate::ops::cpu_ops;
use crate::ops::{is_diagonal_pair, require_index, require_same_shape, require_scalar};
use ndarray::{s, Array2, Axis};

// --- Elementwise ---

pub fn identity_backward(grad_output: &Array) -> Array {
    grad_output.clone()
}

pub fn negate_backward(grad_output: &Array) -> Array {
    grad_output.mapv(|g| -g)
}

/// `dE/dx = 2 x dE/df`
pub fn square_backward(x: &Array, grad_output: &Array) -> Result<Array, Error> {
    kernels::zip_map("square_backward", grad_output, x, |g, v| 2.0 * g * v)
}

/// `dE/dx = fx dE/df`
pub fn exp_backward(fx: &Array, grad_output: &Array) -> Result<Array, Error> {
    kernels::zip_map("exp_backward", grad_output, fx, |g, f| g * f)
}

/// `dE/dx = dE/df / x`
pub fn log_backward(x: &Array, grad_output: &Array) -> Result<Array, Error> {
    kernels::zip_map("log_backward", grad_output, x, |g, v| g / v)
}

// --- Reductions and structure ---

/// Replicates the column-vector gradient across every original column.
pub fn sum_columns_backward(x: &Array, grad_output: &Array) -> Result<Array, Error> {
    let dim = x.matrix_view()?.dim();
    let g = grad_output.matrix_view()?;
    let broadcast = g.broadcast(dim).ok_or_else(|| Error::IncompatibleShapes {
        op: "SumColumns backward".to_string(),
        shape_a: grad_output.shape().to_vec(),
        shape_b: x.shape().to_vec(),
    })?;
    Ok(Array::from_matrix(broadcast.to_owned()))
}

/// Each addend receives the downstream gradient unchanged.
pub fn sum_backward(grad_output: &Array) -> Array {
    grad_output.clone()
}

/// Scatters each output column's gradient into the `n` columns it summed.
pub fn kmh_ngram_backward(x: &Array, grad_output: &Array, n: usize) -> Result<Array, Error> {
    let (rows, cols) = x.matrix_view()?.dim();
    let g = grad_output.matrix_view()?;
    if n == 0 || g.nrows() != rows || g.ncols() + n - 1 != cols {
        return Err(Error::IncompatibleShapes {
            op: "KMHNGram backward".to_string(),
            shape_a: grad_output.shape().to_vec(),
            shape_b: x.shape().to_vec(),
        });
    }
    let mut dx = Array2::<f32>::zeros((rows, cols));
    for j in 0..g.ncols() {
        for k in 0..n {
            let mut c = dx.column_mut(j + k);
            c += &g.column(j);
        }
    }
    Ok(Array::from_matrix(dx))
}

/// Slices input `i`'s rows back out of the stacked gradient.
pub fn concatenate_backward(
    x: &Array,
    grad_output: &Array,
    offsets: &[usize],
    i: usize,
) -> Result<Array, Error> {
    require_index(i, offsets.len())?;
    let begin = offsets[i];
    let rows = x.rows();
    let g = grad_output.matrix_view()?;
    if begin + rows > g.nrows() {
        return Err(Error::IndexOutOfBounds {
            index: begin + rows,
            size: g.nrows(),
        });
    }
    Ok(Array::from_matrix(
        g.slice(s![begin..begin + rows, ..]).to_owned(),
    ))
}

/// Column `i` of the downstream gradient.
pub fn concatenate_columns_backward(grad_output: &Array, i: usize) -> Result<Array, Error> {
    let g = grad_output.matrix_view()?;
    require_index(i, g.ncols())?;
    Ok(Array::from_matrix(
        g.column(i).to_owned().insert_axis(Axis(1)),
    ))
}

/// Reinterprets the gradient under the input's shape.
pub fn reshape_backward(x: &Array, grad_output: &Array) -> Result<Array, Error> {
    cpu_ops::reshape(grad_output, x.shape())
}

/// Routes each window's gradient to its recorded winning row.
pub fn max_pooling_1d_backward(
    x: &Array,
    grad_output: &Array,
    winners: &[usize],
) -> Result<Array, Error> {
    let g = grad_output.to_vec();
    if g.len() != winners.len() {
        return Err(Error::ShapeMismatch {
            expected: vec![winners.len(), 1],
            actual: grad_output.shape().to_vec(),
        });
    }
    let mut dx = vec![0.0f32; x.rows()];
    for (&row, &gw) in winners.iter().zip(g.iter()) {
        require_index(row, dx.len())?;
        dx[row] = gw;
    }
    Ok(Array::column(dx))
}

// --- Indexing and the probability simplex ---

pub fn pick_element_backward(x: &Array, grad_output: &Array, index: usize) -> Result<Array, Error> {
    require_scalar("PickElement backward", grad_output)?;
    require_index(index, x.rows())?;
    let mut dx = vec![0.0f32; x.rows()];
    dx[index] = grad_output.scalar_value()?;
    Ok(Array::column(dx))
}

pub fn pick_range_backward(
    x: &Array,
    grad_output: &Array,
    start: usize,
    end: usize,
) -> Result<Array, Error> {
    if start >= end || end > x.rows() || grad_output.shape() != [end - start, 1] {
        return Err(Error::IncompatibleShapes {
            op: "PickRange backward".to_string(),
            shape_a: grad_output.shape().to_vec(),
            shape_b: x.shape().to_vec(),
        });
    }
    let mut dx = Array2::<f32>::zeros((x.rows(), 1));
    dx.slice_mut(s![start..end, ..])
        .assign(&grad_output.matrix_view()?);
    Ok(Array::from_matrix(dx))
}

pub fn softmax_backward(fx: &Array, grad_output: &Array) -> Result<Array, Error> {
    kernels::softmax_backward(grad_output, fx)
}

/// Recovers the probabilities as `exp(fx)` from the cached log output.
pub fn log_softmax_backward(fx: &Array, grad_output: &Array) -> Result<Array, Error> {
    kernels::log_softmax_backward(grad_output, fx)
}

/// `dE/dx_i = dE/df_i - exp(fx_i) * sum_{j in denom} dE/df_j` inside the
/// denominator set, zero elsewhere.
pub fn restricted_log_softmax_backward(
    fx: &Array,
    grad_output: &Array,
    denom: &[usize],
) -> Result<Array, Error> {
    require_same_shape("RestrictedLogSoftmax backward", fx, grad_output)?;
    let rows = fx.rows();
    let f = fx.to_vec();
    let g = grad_output.to_vec();
    for &i in denom {
        require_index(i, rows)?;
    }
    let z: f32 = denom.iter().map(|&i| g[i]).sum();
    let mut dx = vec![0.0f32; rows];
    for &i in denom {
        dx[i] = g[i] - f[i].exp() * z;
    }
    Ok(Array::column(dx))
}

/// `(softmax(x) - onehot(target)) * dE/df`, from the cached probabilities.
pub fn pick_neg_log_softmax_backward(
    probs: &Array,
    grad_output: &Array,
    target: usize,
) -> Result<Array, Error> {
    require_scalar("PickNegLogSoftmax backward", grad_output)?;
    require_index(target, probs.rows())?;
    let scale = grad_output.scalar_value()?;
    let mut dx = probs.to_vec();
    dx[target] -= 1.0;
    Ok(Array::column(dx.into_iter().map(|v| v * scale).collect()))
}

// --- Pairwise and composite algebra ---

/// `dA = dC B^T`, `dB = A^T dC`
pub fn matrix_multiply_backward(
    a: &Array,
    b: &Array,
    grad_output: &Array,
    i: usize,
) -> Result<Array, Error> {
    match i {
        0 => cpu_ops::matrix_multiply(grad_output, &b.transpose()?),
        1 => cpu_ops::matrix_multiply(&a.transpose()?, grad_output),
        _ => Err(Error::IndexOutOfBounds { index: i, size: 2 }),
    }
}

/// Each operand's gradient is the downstream gradient times the other operand.
pub fn cwise_multiply_backward(
    a: &Array,
    b: &Array,
    grad_output: &Array,
    i: usize,
) -> Result<Array, Error> {
    match i {
        0 => cpu_ops::cwise_multiply(grad_output, b),
        1 => cpu_ops::cwise_multiply(grad_output, a),
        _ => Err(Error::IndexOutOfBounds { index: i, size: 2 }),
    }
}

pub fn multilinear_backward(xs: &[&Array], grad_output: &Array, i: usize) -> Result<Array, Error> {
    require_index(i, xs.len())?;
    if i == 0 {
        return Ok(grad_output.clone());
    }
    if i % 2 == 1 {
        // matrix operand A_i, paired with xs[i + 1]
        let (a, x) = (xs[i], xs[i + 1]);
        if is_diagonal_pair(a, x) {
            cpu_ops::cwise_multiply(grad_output, x)
        } else {
            cpu_ops::matrix_multiply(grad_output, &x.transpose()?)
        }
    } else {
        // vector operand, paired with xs[i - 1]
        let (a, x) = (xs[i - 1], xs[i]);
        if is_diagonal_pair(a, x) {
            cpu_ops::cwise_multiply(a, grad_output)
        } else {
            cpu_ops::matrix_multiply(&a.transpose()?, grad_output)
        }
    }
}

/// `+-2 dE/df (x0 - x1)`
pub fn squared_euclidean_distance_backward(
    a: &Array,
    b: &Array,
    grad_output: &Array,
    i: usize,
) -> Result<Array, Error> {
    require_scalar("SquaredEuclideanDistance backward", grad_output)?;
    let mut scale = grad_output.scalar_value()? * 2.0;
    match i {
        0 => {}
        1 => scale = -scale,
        _ => return Err(Error::IndexOutOfBounds { index: i, size: 2 }),
    }
    kernels::zip_map("SquaredEuclideanDistance backward", a, b, |x, y| {
        scale * (x - y)
    })
}

/// `dE/df * (-t / p + (1 - t) / (1 - p))`, dropping zero-coefficient terms.
pub fn binary_log_loss_backward(
    x: &Array,
    grad_output: &Array,
    target: f32,
) -> Result<Array, Error> {
    require_scalar("BinaryLogLoss backward", grad_output)?;
    let p = x.scalar_value()?;
    let mut scale = 0.0;
    if target > 0.0 {
        scale -= target / p;
    }
    if 1.0 - target > 0.0 {
        scale += (1.0 - target) / (1.0 - p);
    }
    Ok(Array::scalar(grad_output.scalar_value()? * scale))
}

/// Active rows get `+dE/df`; the correct row gets `-dE/df` per active row.
/// A zero loss short-circuits to an all-zero gradient.
pub fn hinge_backward(
    x: &Array,
    fx: &Array,
    grad_output: &Array,
    active: &[bool],
    correct: usize,
) -> Result<Array, Error> {
    require_scalar("Hinge backward", grad_output)?;
    let rows = x.rows();
    require_index(correct, rows)?;
    if active.len() != rows {
        return Err(Error::ShapeMismatch {
            expected: vec![rows, 1],
            actual: vec![active.len(), 1],
        });
    }
    let mut dx = vec![0.0f32; rows];
    if fx.scalar_value()? == 0.0 {
        return Ok(Array::column(dx));
    }
    let diff = grad_output.scalar_value()?;
    let mut tv = 0usize;
    for (i, &on) in active.iter().enumerate() {
        if i != correct && on {
            dx[i] = diff;
            tv += 1;
        }
    }
    dx[correct] = -diff * tv as f32;
    Ok(Array::column(dx))
}

// --- Stochastic ---

/// Additive noise has unit derivative with respect to the signal.
pub fn gaussian_noise_backward(grad_output: &Array) -> Array {
    grad_output.clone()
}

/// Applies the cached keep-mask to the downstream gradient.
pub fn dropout_backward(mask: &Array, grad_output: &Array) -> Result<Array, Error> {
    cpu_ops::cwise_multiply(grad_output, mask)
}
