//! Forward computations, one function per edge.
//!
//! These are public entry points in their own right: each validates its own
//! shapes and configuration instead of relying on [`Edge::dim_forward`](crate::Edge::dim_forward),
//! so calling them directly is as safe as going through [`Edge::forward`](crate::Edge::forward).

use crate::array::Array;
use crate::error::Error;
use crate::init;
use crate::kernels;
use crate::ops::{
    is_diagonal_pair, require_column, require_index, require_same_shape, require_scalar,
    validate_denominator,
};
use ndarray::{s, Array2, Axis, Zip};

// --- Elementwise ---

pub fn identity(x: &Array) -> Array {
    x.clone()
}

pub fn negate(x: &Array) -> Array {
    x.mapv(|v| -v)
}

/// `c - x`
pub fn constant_minus_x(x: &Array, c: f32) -> Array {
    x.mapv(|v| c - v)
}

pub fn square(x: &Array) -> Array {
    x.mapv(|v| v * v)
}

// --- Reductions and structure ---

/// Row sums of a matrix, as a column vector.
pub fn sum_columns(x: &Array) -> Result<Array, Error> {
    let m = x.matrix_view()?;
    Ok(Array::from_matrix(m.sum_axis(Axis(1)).insert_axis(Axis(1))))
}

/// Elementwise sum of one or more identically shaped arrays.
pub fn sum(xs: &[&Array]) -> Result<Array, Error> {
    let (first, rest) = xs
        .split_first()
        .ok_or_else(|| Error::InvalidOperation("Sum requires at least one input".to_string()))?;
    let mut acc = (*first).clone();
    for x in rest {
        require_same_shape("Sum", first, x)?;
        let data = acc.get_data_mut();
        *data += x.get_data();
    }
    Ok(acc)
}

/// Sums every run of `n` consecutive columns, producing `cols - n + 1` columns.
pub fn kmh_ngram(x: &Array, n: usize) -> Result<Array, Error> {
    let m = x.matrix_view()?;
    let (rows, cols) = m.dim();
    if n == 0 || n > cols {
        return Err(Error::InvalidOperation(format!(
            "KMHNGram window of width {} does not fit {} columns",
            n, cols
        )));
    }
    let new_cols = cols - n + 1;
    let mut res = Array2::<f32>::zeros((rows, new_cols));
    for j in 0..new_cols {
        let mut c_j = res.column_mut(j);
        for k in 0..n {
            c_j += &m.column(j + k);
        }
    }
    Ok(Array::from_matrix(res))
}

/// Stacks column vectors vertically. Also returns the first output row of each input.
pub fn concatenate(xs: &[&Array]) -> Result<(Array, Vec<usize>), Error> {
    if xs.is_empty() {
        return Err(Error::InvalidOperation(
            "Concatenate requires at least one input".to_string(),
        ));
    }
    let mut offsets = Vec::with_capacity(xs.len());
    let mut rows = 0;
    for x in xs {
        require_column("Concatenate", x)?;
        offsets.push(rows);
        rows += x.rows();
    }
    let mut data = Vec::with_capacity(rows);
    for x in xs {
        data.extend(x.get_data().iter().copied());
    }
    Ok((Array::column(data), offsets))
}

/// Places equal-length column vectors side by side.
pub fn concatenate_columns(xs: &[&Array]) -> Result<Array, Error> {
    let first = xs.first().ok_or_else(|| {
        Error::InvalidOperation("ConcatenateColumns requires at least one input".to_string())
    })?;
    let rows = first.rows();
    let mut out = Array2::<f32>::zeros((rows, xs.len()));
    for (j, x) in xs.iter().enumerate() {
        require_column("ConcatenateColumns", x)?;
        require_same_shape("ConcatenateColumns", first, x)?;
        out.column_mut(j).assign(&x.matrix_view()?.column(0));
    }
    Ok(Array::from_matrix(out))
}

pub fn reshape(x: &Array, to: &[usize]) -> Result<Array, Error> {
    let mut fx = x.clone();
    fx.reshape(to)?;
    Ok(fx)
}

/// Max over consecutive windows of `width` rows; the last window may be shorter.
/// Also returns the winning row of each window.
pub fn max_pooling_1d(x: &Array, width: usize) -> Result<(Array, Vec<usize>), Error> {
    require_column("MaxPooling1D", x)?;
    if width == 0 {
        return Err(Error::InvalidOperation(
            "MaxPooling1D window width must be positive".to_string(),
        ));
    }
    let values = x.to_vec();
    let windows = values.len().div_ceil(width);
    let mut ind = Vec::with_capacity(windows);
    let mut out = Vec::with_capacity(windows);
    for (w, window) in values.chunks(width).enumerate() {
        let mut best = window[0];
        let mut best_r = 0;
        for (r, &v) in window.iter().enumerate().skip(1) {
            if v > best {
                best = v;
                best_r = r;
            }
        }
        ind.push(w * width + best_r);
        out.push(best);
    }
    Ok((Array::column(out), ind))
}

// --- Indexing and the probability simplex ---

pub fn pick_element(x: &Array, index: usize) -> Result<Array, Error> {
    require_column("PickElement", x)?;
    require_index(index, x.rows())?;
    Ok(Array::scalar(x.matrix_view()?[(index, 0)]))
}

/// Rows `[start, end)` of a column vector.
pub fn pick_range(x: &Array, start: usize, end: usize) -> Result<Array, Error> {
    require_column("PickRange", x)?;
    if start >= end || end > x.rows() {
        return Err(Error::InvalidOperation(format!(
            "PickRange [{}, {}) is not a non-empty range within {} rows",
            start,
            end,
            x.rows()
        )));
    }
    let m = x.matrix_view()?;
    Ok(Array::from_matrix(m.slice(s![start..end, ..]).to_owned()))
}

pub fn softmax(x: &Array) -> Result<Array, Error> {
    kernels::softmax_forward(x)
}

pub fn log_softmax(x: &Array) -> Result<Array, Error> {
    kernels::log_softmax_forward(x)
}

/// Log-softmax normalized over `denom` only; other rows are `-inf`.
/// A one-element denominator yields exactly 0 at that row.
pub fn restricted_log_softmax(x: &Array, denom: &[usize]) -> Result<Array, Error> {
    require_column("RestrictedLogSoftmax", x)?;
    let rows = x.rows();
    validate_denominator(denom, rows)?;
    let values = x.to_vec();
    let selected: Vec<f32> = denom.iter().map(|&i| values[i]).collect();
    let logz = kernels::log_sum_exp(&selected);
    let mut fx = vec![f32::NEG_INFINITY; rows];
    for &i in denom {
        fx[i] = values[i] - logz;
    }
    if let [only] = denom {
        fx[*only] = 0.0;
    }
    Ok(Array::column(fx))
}

/// Negative log-probability of `target` under softmax(x).
/// Also returns the softmax probabilities for the backward pass.
pub fn pick_neg_log_softmax(x: &Array, target: usize) -> Result<(Array, Array), Error> {
    require_column("PickNegLogSoftmax", x)?;
    require_index(target, x.rows())?;
    let probs = kernels::softmax_forward(x)?;
    let values = x.to_vec();
    let loss = kernels::log_sum_exp(&values) - values[target];
    Ok((Array::scalar(loss), probs))
}

// --- Pairwise and composite algebra ---

/// Matrix multiplication of two 2D arrays
pub fn matrix_multiply(a: &Array, b: &Array) -> Result<Array, Error> {
    let a_2d = a.matrix_view()?;
    let b_2d = b.matrix_view()?;

    // Check shape compatibility for matmul: (m, k) x (k, n)
    if a_2d.ncols() != b_2d.nrows() {
        return Err(Error::IncompatibleShapes {
            op: "MatrixMultiply".to_string(),
            shape_a: a.shape().to_vec(),
            shape_b: b.shape().to_vec(),
        });
    }

    Ok(Array::from_matrix(a_2d.dot(&b_2d)))
}

pub fn cwise_multiply(a: &Array, b: &Array) -> Result<Array, Error> {
    kernels::zip_map("CwiseMultiply", a, b, |x, y| x * y)
}

/// `b + sum_i A_i x_i` over `(b, A_1, x_1, A_2, x_2, ...)`.
pub fn multilinear(xs: &[&Array]) -> Result<Array, Error> {
    if xs.len() % 2 == 0 {
        return Err(Error::InvalidArity {
            op: "Multilinear".to_string(),
            expected: "an odd number of".to_string(),
            actual: xs.len(),
        });
    }
    let mut fx = xs[0].clone();
    for pair in xs[1..].chunks(2) {
        let (a, x) = (pair[0], pair[1]);
        let term = if is_diagonal_pair(a, x) {
            cwise_multiply(a, x)?
        } else {
            matrix_multiply(a, x)?
        };
        require_same_shape("Multilinear", &fx, &term)?;
        let data = fx.get_data_mut();
        *data += term.get_data();
    }
    Ok(fx)
}

pub fn squared_euclidean_distance(a: &Array, b: &Array) -> Result<Array, Error> {
    require_same_shape("SquaredEuclideanDistance", a, b)?;
    let d = Zip::from(a.get_data())
        .and(b.get_data())
        .fold(0.0f32, |acc, &x, &y| acc + (x - y) * (x - y));
    Ok(Array::scalar(d))
}

fn require_probability(what: &str, v: f32) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&v) {
        return Err(Error::InvalidOperation(format!(
            "BinaryLogLoss {} {} is outside [0, 1]",
            what, v
        )));
    }
    Ok(())
}

/// `-[t log p + (1 - t) log(1 - p)]`, skipping terms whose coefficient is zero.
pub fn binary_log_loss(x: &Array, target: f32) -> Result<Array, Error> {
    require_scalar("BinaryLogLoss", x)?;
    let p = x.scalar_value()?;
    require_probability("prediction", p)?;
    require_probability("target", target)?;
    let mut res = 0.0;
    if target > 0.0 {
        res -= target * p.ln();
    }
    if 1.0 - target > 0.0 {
        res -= (1.0 - target) * (-p).ln_1p();
    }
    Ok(Array::scalar(res))
}

/// `sum_{i != correct} max(0, margin - x[correct] + x[i])`.
/// Also returns which rows contributed a strictly positive term.
pub fn hinge(x: &Array, correct: usize, margin: f32) -> Result<(Array, Vec<bool>), Error> {
    require_column("Hinge", x)?;
    require_index(correct, x.rows())?;
    let values = x.to_vec();
    let mlystar = margin - values[correct];
    let mut active = vec![false; values.len()];
    let mut total = 0.0;
    for (i, &v) in values.iter().enumerate() {
        if i == correct {
            continue;
        }
        let term = (mlystar + v).max(0.0);
        if term > 0.0 {
            active[i] = true;
            total += term;
        }
    }
    Ok((Array::scalar(total), active))
}

// --- Stochastic ---

pub fn gaussian_noise(x: &Array, stddev: f32) -> Result<Array, Error> {
    let noise = init::random_normal(x.shape(), 0.0, stddev)?;
    Ok(Array::new(x.get_data() + noise.get_data()))
}

/// Multiplies `x` by a fresh keep-mask drawn with keep probability `p`.
/// Also returns the mask for the backward pass.
pub fn dropout(x: &Array, p: f32) -> Result<(Array, Array), Error> {
    let mask = init::bernoulli(x.shape(), p)?;
    let fx = cwise_multiply(x, &mask)?;
    Ok((fx, mask))
}
