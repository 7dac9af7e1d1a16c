use crate::{Array, Edge, Error};

/// Weight of output element `k` in the scalar objective `L = sum_k w_k f(x)_k`.
/// Non-uniform so that errors which cancel under a plain sum still show up.
pub fn objective_weight(k: usize) -> f32 {
    0.5 + 0.25 * (k % 5) as f32 - 0.1 * (k % 3) as f32
}

/// Evaluates the objective on a forward output, ignoring non-finite entries
/// (e.g. the `-inf` rows of a restricted log-softmax).
fn objective(output: &Array) -> f64 {
    output
        .get_data()
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, &v)| objective_weight(k) as f64 * v as f64)
        .sum()
}

/// The objective's gradient with respect to the output, zero at non-finite entries.
fn objective_gradient(output: &Array) -> Result<Array, Error> {
    let data = output
        .get_data()
        .iter()
        .enumerate()
        .map(|(k, v)| if v.is_finite() { objective_weight(k) } else { 0.0 })
        .collect();
    Array::from_vec(data, output.shape())
}

/// Checks the backward pass of `edge` for input `input_idx_to_check`.
///
/// # Arguments
/// * `edge`: The edge under test. Stochastic edges are rejected.
/// * `inputs`: Input arrays satisfying the edge's shape and domain constraints.
/// * `input_idx_to_check`: The index in the `inputs` slice for which to check the gradient.
/// * `epsilon`: A small value for finite difference perturbation (e.g., 1e-3).
///   Central differences are exact for edges at most quadratic in the checked
///   input, so those can use a large step (e.g., 0.125) and a tight tolerance.
/// * `tolerance`: The maximum allowed relative or absolute difference between analytical and numerical gradients.
///
/// # Returns
/// * `Ok(())` if the gradients match within the tolerance.
/// * `Err(Error::GradientCheckError)` describing the mismatch otherwise.
pub fn check_gradient(
    edge: &Edge,
    inputs: &[Array],
    input_idx_to_check: usize,
    epsilon: f32,
    tolerance: f32,
) -> Result<(), Error> {
    if input_idx_to_check >= inputs.len() {
        return Err(Error::InvalidOperation(format!(
            "input_idx_to_check ({}) is out of bounds for inputs slice (len {})",
            input_idx_to_check,
            inputs.len()
        )));
    }
    if edge.is_stochastic() {
        return Err(Error::InvalidOperation(format!(
            "{} is stochastic; finite differences are meaningless",
            edge
        )));
    }

    let analytical = compute_analytical_gradient(edge, inputs, input_idx_to_check)?;
    let numerical = compute_numerical_gradient(edge, inputs, input_idx_to_check, epsilon)?;

    compare_gradients(&analytical, &numerical, tolerance)
}

pub fn compute_analytical_gradient(
    edge: &Edge,
    inputs: &[Array],
    input_idx_to_check: usize,
) -> Result<Vec<f32>, Error> {
    let xs: Vec<&Array> = inputs.iter().collect();
    let fwd = edge.forward(&xs)?;
    let grad_output = objective_gradient(&fwd.output)?;
    let dx = edge.backward(&xs, &fwd.output, &fwd.context, &grad_output, input_idx_to_check)?;
    Ok(dx.to_vec())
}

pub fn compute_numerical_gradient(
    edge: &Edge,
    inputs: &[Array],
    input_idx_to_check: usize,
    epsilon: f32,
) -> Result<Vec<f32>, Error> {
    let target = &inputs[input_idx_to_check];
    let original_data = target.to_vec();
    let mut numerical_grad_vec = vec![0.0; original_data.len()];
    let mut perturbed_inputs = inputs.to_vec();

    for i in 0..original_data.len() {
        let plus = original_data[i] + epsilon;
        let minus = original_data[i] - epsilon;
        let mut evaluate = |value: f32| -> Result<f64, Error> {
            let mut data = original_data.clone();
            data[i] = value;
            perturbed_inputs[input_idx_to_check] = Array::from_vec(data, target.shape())?;
            let xs: Vec<&Array> = perturbed_inputs.iter().collect();
            Ok(objective(&edge.forward(&xs)?.output))
        };
        let loss_plus = evaluate(plus)?;
        let loss_minus = evaluate(minus)?;

        // Central difference over the step f32 actually represents
        let step = plus as f64 - minus as f64;
        numerical_grad_vec[i] = ((loss_plus - loss_minus) / step) as f32;
    }

    Ok(numerical_grad_vec)
}

fn compare_gradients(analytical: &[f32], numerical: &[f32], tolerance: f32) -> Result<(), Error> {
    if analytical.len() != numerical.len() {
        return Err(Error::InternalLogicError(format!(
            "Gradient size mismatch: analytical size={}, numerical size={}",
            analytical.len(),
            numerical.len()
        )));
    }

    let mut max_rel_err = 0.0;
    let mut max_abs_err = 0.0;
    let mut max_err_idx = 0;

    for (i, (a, n)) in analytical.iter().zip(numerical.iter()).enumerate() {
        let abs_err = (a - n).abs();
        // Small gradients are compared absolutely; f32 rounding dominates there.
        let rel_err = if a.abs() > 1e-3 && n.abs() > 1e-3 {
            abs_err / a.abs().max(n.abs())
        } else {
            abs_err
        };

        if rel_err > max_rel_err {
            max_rel_err = rel_err;
            max_abs_err = abs_err;
            max_err_idx = i;
        }
    }

    if max_rel_err <= tolerance {
        Ok(())
    } else {
        Err(Error::GradientCheckError {
            analytical: analytical.to_vec(),
            numerical: numerical.to_vec(),
            max_rel_error: max_rel_err,
            max_abs_error: max_abs_err,
            at_index: max_err_idx,
        })
    }
}

pub fn assert_array_eq(a: &Array, b: &Array) {
    assert_eq!(a.shape(), b.shape(), "Shapes don't match");
    for (i, (a_val, b_val)) in a.to_vec().iter().zip(b.to_vec().iter()).enumerate() {
        assert_eq!(
            *a_val, *b_val,
            "Values at index {i} don't match: a={a_val}, b={b_val}"
        );
    }
}

pub fn assert_array_close(a: &Array, b: &Array, tol: f32) {
    assert_eq!(a.shape(), b.shape(), "Shapes don't match");
    for (i, (a_val, b_val)) in a.to_vec().iter().zip(b.to_vec().iter()).enumerate() {
        assert!(
            (a_val - b_val).abs() < tol,
            "Values at index {i} aren't close enough: a={a_val}, b={b_val}, diff={}, tol={tol}",
            (a_val - b_val).abs()
        );
    }
}
