use approx::assert_abs_diff_eq;
use tensor_edges::test_utils::{assert_array_close, assert_array_eq};
use tensor_edges::{Array, Context, Edge, Error};

fn column(data: &[f32]) -> Array {
    Array::column(data.to_vec())
}

fn matrix(data: &[f32], rows: usize, cols: usize) -> Array {
    Array::from_vec(data.to_vec(), &[rows, cols]).unwrap()
}

#[test]
fn test_elementwise_forward_values() -> Result<(), Error> {
    let x = column(&[-1.0, 0.0, 2.0]);
    assert_array_eq(&Edge::Identity.forward(&[&x])?.output, &x);
    assert_array_eq(
        &Edge::Negate.forward(&[&x])?.output,
        &column(&[1.0, 0.0, -2.0]),
    );
    assert_array_eq(
        &Edge::one_minus_x().forward(&[&x])?.output,
        &column(&[2.0, 1.0, -1.0]),
    );
    assert_array_eq(
        &Edge::OneMinusX { c: 5.0 }.forward(&[&x])?.output,
        &column(&[6.0, 5.0, 3.0]),
    );
    assert_array_eq(
        &Edge::Square.forward(&[&x])?.output,
        &column(&[1.0, 0.0, 4.0]),
    );
    assert_array_eq(
        &Edge::Rectify.forward(&[&x])?.output,
        &column(&[0.0, 0.0, 2.0]),
    );
    assert_array_close(
        &Edge::Exp.forward(&[&x])?.output,
        &column(&[(-1.0f32).exp(), 1.0, 2.0f32.exp()]),
        1e-5,
    );
    assert_array_close(
        &Edge::Tanh.forward(&[&x])?.output,
        &column(&[(-1.0f32).tanh(), 0.0, 2.0f32.tanh()]),
        1e-6,
    );
    Ok(())
}

#[test]
fn test_log_of_positive_values() -> Result<(), Error> {
    let x = column(&[1.0, std::f32::consts::E, 0.5]);
    let fx = Edge::Log.forward(&[&x])?.output;
    assert_array_close(&fx, &column(&[0.0, 1.0, 0.5f32.ln()]), 1e-6);
    Ok(())
}

#[test]
fn test_sigmoid_is_stable_at_extremes() -> Result<(), Error> {
    let x = column(&[-100.0, 0.0, 100.0]);
    let fx = Edge::LogisticSigmoid.forward(&[&x])?.output.to_vec();
    assert!(fx.iter().all(|v| v.is_finite()));
    assert_abs_diff_eq!(fx[0], 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(fx[1], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(fx[2], 1.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_sum_columns_forward() -> Result<(), Error> {
    let x = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let fx = Edge::SumColumns.forward(&[&x])?.output;
    assert_array_eq(&fx, &column(&[6.0, 15.0]));
    Ok(())
}

#[test]
fn test_sum_matches_elementwise_addition_for_any_count() -> Result<(), Error> {
    let inputs: Vec<Array> = (0..5)
        .map(|k| column(&[k as f32, 2.0 * k as f32, -(k as f32)]))
        .collect();
    for n in 1..=inputs.len() {
        let xs: Vec<&Array> = inputs[..n].iter().collect();
        let fx = Edge::Sum.forward(&xs)?.output;
        let mut expected = vec![0.0f32; 3];
        for x in &inputs[..n] {
            for (e, v) in expected.iter_mut().zip(x.to_vec()) {
                *e += v;
            }
        }
        assert_array_eq(&fx, &column(&expected));
    }
    Ok(())
}

#[test]
fn test_kmh_ngram_forward() -> Result<(), Error> {
    let x = matrix(&[1.0, 2.0, 3.0, 10.0, 20.0, 30.0], 2, 3);
    let fx = Edge::KMHNGram { n: 2 }.forward(&[&x])?.output;
    assert_array_eq(&fx, &matrix(&[3.0, 5.0, 30.0, 50.0], 2, 2));

    // n == 1 is the identity; n == cols collapses to one column
    assert_array_eq(&Edge::KMHNGram { n: 1 }.forward(&[&x])?.output, &x);
    assert_array_eq(
        &Edge::KMHNGram { n: 3 }.forward(&[&x])?.output,
        &column(&[6.0, 60.0]),
    );
    Ok(())
}

#[test]
fn test_concatenate_records_row_offsets() -> Result<(), Error> {
    let a = column(&[1.0, 2.0]);
    let b = column(&[3.0]);
    let c = column(&[4.0, 5.0, 6.0]);
    let fwd = Edge::Concatenate.forward(&[&a, &b, &c])?;
    assert_array_eq(&fwd.output, &column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    assert_eq!(fwd.context, Context::RowOffsets(vec![0, 2, 3]));
    Ok(())
}

#[test]
fn test_concatenate_columns_forward() -> Result<(), Error> {
    let a = column(&[1.0, 2.0]);
    let b = column(&[3.0, 4.0]);
    let fx = Edge::ConcatenateColumns.forward(&[&a, &b])?.output;
    assert_array_eq(&fx, &matrix(&[1.0, 3.0, 2.0, 4.0], 2, 2));
    Ok(())
}

#[test]
fn test_reshape_keeps_element_order() -> Result<(), Error> {
    let x = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let fx = Edge::Reshape { to: vec![3, 2] }.forward(&[&x])?.output;
    assert_eq!(fx.shape(), &[3, 2]);
    assert_eq!(fx.to_vec(), x.to_vec());
    Ok(())
}

#[test]
fn test_max_pooling_picks_window_winners() -> Result<(), Error> {
    let x = column(&[1.0, 5.0, 2.0, 4.0]);
    let fwd = Edge::MaxPooling1D { width: 2 }.forward(&[&x])?;
    assert_array_eq(&fwd.output, &column(&[5.0, 4.0]));
    assert_eq!(fwd.context, Context::ArgMax(vec![1, 3]));
    Ok(())
}

#[test]
fn test_max_pooling_short_last_window_and_ties() -> Result<(), Error> {
    let x = column(&[3.0, 3.0, 1.0, 7.0, -2.0]);
    let fwd = Edge::MaxPooling1D { width: 2 }.forward(&[&x])?;
    assert_array_eq(&fwd.output, &column(&[3.0, 7.0, -2.0]));
    // first index wins a tie
    assert_eq!(fwd.context, Context::ArgMax(vec![0, 3, 4]));
    Ok(())
}

#[test]
fn test_pick_element_and_range() -> Result<(), Error> {
    let x = column(&[3.0, 4.0, 5.0, 6.0]);
    assert_array_eq(
        &Edge::PickElement { index: 1 }.forward(&[&x])?.output,
        &Array::scalar(4.0),
    );
    assert_array_eq(
        &Edge::PickRange { start: 1, end: 3 }.forward(&[&x])?.output,
        &column(&[4.0, 5.0]),
    );
    Ok(())
}

#[test]
fn test_softmax_sums_to_one_per_column() -> Result<(), Error> {
    let x = matrix(&[1.0, -1.0, 2.0, 0.0, 3.0, 1.0], 3, 2);
    let fx = Edge::Softmax.forward(&[&x])?.output;
    let sums = Edge::SumColumns.forward(&[&fx.transpose()?])?.output;
    assert_array_close(&sums, &column(&[1.0, 1.0]), 1e-6);
    Ok(())
}

#[test]
fn test_exp_of_log_softmax_is_softmax() -> Result<(), Error> {
    let x = column(&[0.5, -2.0, 3.0, 1.0]);
    let log_probs = Edge::LogSoftmax.forward(&[&x])?.output;
    let probs = Edge::Exp.forward(&[&log_probs])?.output;
    assert_abs_diff_eq!(probs.to_vec().iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    assert_array_close(&probs, &Edge::Softmax.forward(&[&x])?.output, 1e-6);
    Ok(())
}

#[test]
fn test_softmax_family_handles_large_inputs() -> Result<(), Error> {
    let x = column(&[1000.0, 1001.0, 999.0]);
    let probs = Edge::Softmax.forward(&[&x])?.output.to_vec();
    let log_probs = Edge::LogSoftmax.forward(&[&x])?.output.to_vec();
    assert!(probs.iter().all(|v| v.is_finite()));
    assert!(log_probs.iter().all(|v| v.is_finite()));
    assert_abs_diff_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_restricted_log_softmax_masks_rows_outside_denominator() -> Result<(), Error> {
    let x = column(&[1.0, 2.0, 3.0, 4.0]);
    let fx = Edge::RestrictedLogSoftmax { denom: vec![0, 2] }
        .forward(&[&x])?
        .output
        .to_vec();
    let logz = (1.0f32.exp() + 3.0f32.exp()).ln();
    assert_abs_diff_eq!(fx[0], 1.0 - logz, epsilon = 1e-6);
    assert_abs_diff_eq!(fx[2], 3.0 - logz, epsilon = 1e-6);
    assert_eq!(fx[1], f32::NEG_INFINITY);
    assert_eq!(fx[3], f32::NEG_INFINITY);
    Ok(())
}

#[test]
fn test_restricted_log_softmax_single_element_is_zero() -> Result<(), Error> {
    let x = column(&[1.0, 2.0, 3.0, 4.0]);
    let fx = Edge::RestrictedLogSoftmax { denom: vec![2] }
        .forward(&[&x])?
        .output
        .to_vec();
    assert_eq!(fx[2], 0.0);
    for i in [0, 1, 3] {
        assert_eq!(fx[i], f32::NEG_INFINITY);
    }
    Ok(())
}

#[test]
fn test_pick_neg_log_softmax_forward() -> Result<(), Error> {
    let x = column(&[0.0, 0.0]);
    let fwd = Edge::PickNegLogSoftmax { target: 0 }.forward(&[&x])?;
    assert_abs_diff_eq!(fwd.output.scalar_value()?, 2.0f32.ln(), epsilon = 1e-6);
    match fwd.context {
        Context::Probabilities(probs) => assert_array_close(&probs, &column(&[0.5, 0.5]), 1e-6),
        other => panic!("unexpected context {:?}", other),
    }
    Ok(())
}

#[test]
fn test_matrix_and_cwise_multiply() -> Result<(), Error> {
    let a = matrix(&[1.0, 2.0, 3.0, 4.0], 2, 2);
    let b = column(&[5.0, 6.0]);
    assert_array_eq(
        &Edge::MatrixMultiply.forward(&[&a, &b])?.output,
        &column(&[17.0, 39.0]),
    );
    let c = matrix(&[2.0, 0.5, -1.0, 0.0], 2, 2);
    assert_array_eq(
        &Edge::CwiseMultiply.forward(&[&a, &c])?.output,
        &matrix(&[2.0, 1.0, -3.0, 0.0], 2, 2),
    );
    Ok(())
}

#[test]
fn test_multilinear_mixes_matrix_and_diagonal_terms() -> Result<(), Error> {
    let b = column(&[1.0, 1.0]);
    let a1 = matrix(&[1.0, 0.0, 0.0, 2.0], 2, 2);
    let x1 = column(&[3.0, 4.0]);
    let a2 = column(&[2.0, 3.0]);
    let x2 = column(&[4.0, 5.0]);
    let fx = Edge::Multilinear.forward(&[&b, &a1, &x1, &a2, &x2])?.output;
    // b + [3, 8] + [8, 15]
    assert_array_eq(&fx, &column(&[12.0, 24.0]));

    assert_array_eq(&Edge::Multilinear.forward(&[&b])?.output, &b);
    Ok(())
}

#[test]
fn test_squared_euclidean_distance_forward() -> Result<(), Error> {
    let a = column(&[1.0, 2.0]);
    let b = column(&[3.0, 5.0]);
    let fx = Edge::SquaredEuclideanDistance.forward(&[&a, &b])?.output;
    assert_array_eq(&fx, &Array::scalar(13.0));
    Ok(())
}

#[test]
fn test_binary_log_loss_forward() -> Result<(), Error> {
    let p = Array::scalar(0.5);
    for target in [0.0, 0.5, 1.0] {
        let fx = Edge::BinaryLogLoss { target }.forward(&[&p])?.output;
        assert_abs_diff_eq!(fx.scalar_value()?, 2.0f32.ln(), epsilon = 1e-6);
    }
    // Zero-coefficient terms are skipped, so a certain correct prediction is free
    let sure = Array::scalar(1.0);
    let fx = Edge::BinaryLogLoss { target: 1.0 }.forward(&[&sure])?.output;
    assert_eq!(fx.scalar_value()?, 0.0);
    Ok(())
}

#[test]
fn test_hinge_forward() -> Result<(), Error> {
    let x = column(&[1.0, 2.0, 0.0]);
    let fwd = Edge::Hinge {
        correct: 0,
        margin: 1.0,
    }
    .forward(&[&x])?;
    // max(0, 1 - 1 + 2) + max(0, 1 - 1 + 0)
    assert_array_eq(&fwd.output, &Array::scalar(2.0));
    assert_eq!(fwd.context, Context::ActiveTerms(vec![false, true, false]));
    Ok(())
}
