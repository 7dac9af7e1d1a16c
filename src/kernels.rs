//! Numerically stable elementwise and softmax kernels.
//!
//! Backward kernels take `(grad_output, fx, x)`: the downstream gradient, the
//! forward output and the forward input. Each uses whichever of `fx` or `x`
//! expresses its derivative most cheaply.

use crate::array::Array;
use crate::error::Error;
use ndarray::{Array2, Zip};

fn check_same_shape(op: &str, a: &Array, b: &Array) -> Result<(), Error> {
    if a.shape() != b.shape() {
        return Err(Error::IncompatibleShapes {
            op: op.to_string(),
            shape_a: a.shape().to_vec(),
            shape_b: b.shape().to_vec(),
        });
    }
    Ok(())
}

/// Elementwise `f(a, b)` over two identically shaped arrays.
pub fn zip_map<F>(op: &str, a: &Array, b: &Array, f: F) -> Result<Array, Error>
where
    F: Fn(f32, f32) -> f32,
{
    check_same_shape(op, a, b)?;
    Ok(Array::new(
        Zip::from(a.get_data())
            .and(b.get_data())
            .map_collect(|&x, &y| f(x, y)),
    ))
}

fn zip_map3<F>(op: &str, a: &Array, b: &Array, c: &Array, f: F) -> Result<Array, Error>
where
    F: Fn(f32, f32, f32) -> f32,
{
    check_same_shape(op, a, b)?;
    check_same_shape(op, a, c)?;
    Ok(Array::new(
        Zip::from(a.get_data())
            .and(b.get_data())
            .and(c.get_data())
            .map_collect(|&x, &y, &z| f(x, y, z)),
    ))
}

#[inline]
fn stable_sigmoid(v: f32) -> f32 {
    if v >= 0.0 {
        1.0 / (1.0 + (-v).exp())
    } else {
        let e = v.exp();
        e / (1.0 + e)
    }
}

pub fn exp(x: &Array) -> Array {
    x.mapv(f32::exp)
}

pub fn ln(x: &Array) -> Array {
    x.mapv(f32::ln)
}

pub fn tanh_forward(x: &Array) -> Array {
    x.mapv(f32::tanh)
}

/// `dE/dx = dE/df * (1 - fx^2)`
pub fn tanh_backward(grad_output: &Array, fx: &Array, x: &Array) -> Result<Array, Error> {
    zip_map3("tanh_backward", grad_output, fx, x, |g, f, _| g * (1.0 - f * f))
}

pub fn sigmoid_forward(x: &Array) -> Array {
    x.mapv(stable_sigmoid)
}

/// `dE/dx = dE/df * fx * (1 - fx)`
pub fn sigmoid_backward(grad_output: &Array, fx: &Array, x: &Array) -> Result<Array, Error> {
    zip_map3("sigmoid_backward", grad_output, fx, x, |g, f, _| {
        g * f * (1.0 - f)
    })
}

pub fn relu_forward(x: &Array) -> Array {
    x.mapv(|v| v.max(0.0))
}

/// Passes the gradient where the input was strictly positive.
pub fn relu_backward(grad_output: &Array, fx: &Array, x: &Array) -> Result<Array, Error> {
    zip_map3("relu_backward", grad_output, fx, x, |g, _, v| {
        if v > 0.0 {
            g
        } else {
            0.0
        }
    })
}

/// `log(sum(exp(v)))` with the maximum subtracted before exponentiating.
pub fn log_sum_exp(values: &[f32]) -> f32 {
    let m = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if m == f32::NEG_INFINITY {
        return m;
    }
    let z: f32 = values.iter().map(|&v| (v - m).exp()).sum();
    m + z.ln()
}

/// Softmax over the rows of each column.
pub fn softmax_forward(x: &Array) -> Result<Array, Error> {
    let mut out = x.matrix_view()?.to_owned();
    for mut col in out.columns_mut() {
        let m = col.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        col.mapv_inplace(|v| (v - m).exp());
        let z = col.sum();
        col.mapv_inplace(|v| v / z);
    }
    Ok(Array::from_matrix(out))
}

/// Jacobian-vector product of softmax: `fx * (g - <g, fx>)` per column.
pub fn softmax_backward(grad_output: &Array, fx: &Array) -> Result<Array, Error> {
    check_same_shape("softmax_backward", grad_output, fx)?;
    let g = grad_output.matrix_view()?;
    let f = fx.matrix_view()?;
    let (rows, cols) = f.dim();
    let mut out = Array2::<f32>::zeros((rows, cols));
    for j in 0..cols {
        let g_col = g.column(j);
        let f_col = f.column(j);
        let dot = g_col.dot(&f_col);
        for i in 0..rows {
            out[(i, j)] = f_col[i] * (g_col[i] - dot);
        }
    }
    Ok(Array::from_matrix(out))
}

/// Log-softmax over the rows of each column, computed as `x - logsumexp(x)`.
pub fn log_softmax_forward(x: &Array) -> Result<Array, Error> {
    let mut out = x.matrix_view()?.to_owned();
    for mut col in out.columns_mut() {
        let values: Vec<f32> = col.iter().copied().collect();
        let logz = log_sum_exp(&values);
        col.mapv_inplace(|v| v - logz);
    }
    Ok(Array::from_matrix(out))
}

/// Backward of log-softmax from its own output: `g - exp(fx) * sum(g)` per column.
pub fn log_softmax_backward(grad_output: &Array, fx: &Array) -> Result<Array, Error> {
    check_same_shape("log_softmax_backward", grad_output, fx)?;
    let g = grad_output.matrix_view()?;
    let f = fx.matrix_view()?;
    let (rows, cols) = f.dim();
    let mut out = Array2::<f32>::zeros((rows, cols));
    for j in 0..cols {
        let total = g.column(j).sum();
        for i in 0..rows {
            out[(i, j)] = g[(i, j)] - f[(i, j)].exp() * total;
        }
    }
    Ok(Array::from_matrix(out))
}
