//! The edge catalog: one enum variant per operator, carrying its configuration.
//!
//! An edge computes its output with [`Edge::forward`], which also returns any
//! [`Context`] its backward pass needs. The graph executor keeps that context
//! next to the output and hands both back to [`Edge::backward`] for each input
//! that needs a gradient. Edges hold no mutable state, so one edge value can be
//! evaluated repeatedly and from several threads at once.

use crate::array::Array;
use crate::error::Error;
use crate::ops::{cpu_backward, cpu_ops};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum Edge {
    Identity,
    Negate,
    /// `c - x`
    OneMinusX { c: f32 },
    Square,
    Exp,
    Log,
    Tanh,
    LogisticSigmoid,
    Rectify,
    SumColumns,
    Sum,
    KMHNGram { n: usize },
    Concatenate,
    ConcatenateColumns,
    Reshape { to: Vec<usize> },
    MaxPooling1D { width: usize },
    PickElement { index: usize },
    /// Rows `[start, end)`.
    PickRange { start: usize, end: usize },
    Softmax,
    LogSoftmax,
    RestrictedLogSoftmax { denom: Vec<usize> },
    PickNegLogSoftmax { target: usize },
    MatrixMultiply,
    CwiseMultiply,
    /// Inputs `(b, A1, x1, A2, x2, ...)`.
    Multilinear,
    SquaredEuclideanDistance,
    BinaryLogLoss { target: f32 },
    Hinge { correct: usize, margin: f32 },
    GaussianNoise { stddev: f32 },
    /// `p` is the keep probability.
    Dropout { p: f32 },
    /// Not supported: both passes return [`Error::Unimplemented`].
    InnerProduct3D1D,
}

/// Values saved by `forward` for the matching `backward` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Context {
    #[default]
    None,
    /// First output row of each concatenated input.
    RowOffsets(Vec<usize>),
    /// Winning input row of each pooling window.
    ArgMax(Vec<usize>),
    /// Softmax of the input.
    Probabilities(Array),
    /// Rows whose hinge term was strictly positive.
    ActiveTerms(Vec<bool>),
    /// Dropout keep-mask.
    Mask(Array),
}

/// Output of a forward pass together with its saved context.
#[derive(Debug, Clone, PartialEq)]
pub struct Forward {
    pub output: Array,
    pub context: Context,
}

impl Forward {
    fn stateless(output: Array) -> Self {
        Self {
            output,
            context: Context::None,
        }
    }

    fn with_context(output: Array, context: Context) -> Self {
        Self { output, context }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
    Odd,
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Odd => n % 2 == 1,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exactly(k) => write!(f, "exactly {}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
            Arity::Odd => write!(f, "an odd number of"),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Edge::Identity => write!(f, "Identity"),
            Edge::Negate => write!(f, "Negate"),
            Edge::OneMinusX { c } => write!(f, "OneMinusX(c={})", c),
            Edge::Square => write!(f, "Square"),
            Edge::Exp => write!(f, "Exp"),
            Edge::Log => write!(f, "Log"),
            Edge::Tanh => write!(f, "Tanh"),
            Edge::LogisticSigmoid => write!(f, "LogisticSigmoid"),
            Edge::Rectify => write!(f, "Rectify"),
            Edge::SumColumns => write!(f, "SumColumns"),
            Edge::Sum => write!(f, "Sum"),
            Edge::KMHNGram { n } => write!(f, "KMHNGram(n={})", n),
            Edge::Concatenate => write!(f, "Concatenate"),
            Edge::ConcatenateColumns => write!(f, "ConcatenateColumns"),
            Edge::Reshape { to } => write!(f, "Reshape(to={:?})", to),
            Edge::MaxPooling1D { width } => write!(f, "MaxPooling1D(width={})", width),
            Edge::PickElement { index } => write!(f, "PickElement(index={})", index),
            Edge::PickRange { start, end } => write!(f, "PickRange({}..{})", start, end),
            Edge::Softmax => write!(f, "Softmax"),
            Edge::LogSoftmax => write!(f, "LogSoftmax"),
            Edge::RestrictedLogSoftmax { denom } => {
                write!(f, "RestrictedLogSoftmax(denom={:?})", denom)
            }
            Edge::PickNegLogSoftmax { target } => {
                write!(f, "PickNegLogSoftmax(target={})", target)
            }
            Edge::MatrixMultiply => write!(f, "MatrixMultiply"),
            Edge::CwiseMultiply => write!(f, "CwiseMultiply"),
            Edge::Multilinear => write!(f, "Multilinear"),
            Edge::SquaredEuclideanDistance => write!(f, "SquaredEuclideanDistance"),
            Edge::BinaryLogLoss { target } => write!(f, "BinaryLogLoss(target={})", target),
            Edge::Hinge { correct, margin } => {
                write!(f, "Hinge(correct={}, margin={})", correct, margin)
            }
            Edge::GaussianNoise { stddev } => write!(f, "GaussianNoise(stddev={})", stddev),
            Edge::Dropout { p } => write!(f, "Dropout(p={})", p),
            Edge::InnerProduct3D1D => write!(f, "InnerProduct3D1D"),
        }
    }
}

fn matrix_dims(op: &Edge, shape: &[usize]) -> Result<(usize, usize), Error> {
    match *shape {
        [rows, cols] => Ok((rows, cols)),
        _ => Err(Error::ShapeError(format!(
            "{} expects 2D inputs, got shape {:?}",
            op, shape
        ))),
    }
}

fn column_rows(op: &Edge, shape: &[usize]) -> Result<usize, Error> {
    match *shape {
        [rows, 1] => Ok(rows),
        _ => Err(Error::ShapeError(format!(
            "{} expects a column vector, got shape {:?}",
            op, shape
        ))),
    }
}

fn same_shape(op: &Edge, a: &[usize], b: &[usize]) -> Result<(), Error> {
    if a != b {
        return Err(Error::IncompatibleShapes {
            op: op.to_string(),
            shape_a: a.to_vec(),
            shape_b: b.to_vec(),
        });
    }
    Ok(())
}

impl Edge {
    /// `c - x` with `c = 1`.
    pub fn one_minus_x() -> Self {
        Edge::OneMinusX { c: 1.0 }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Edge::Sum | Edge::Concatenate | Edge::ConcatenateColumns => Arity::AtLeast(1),
            Edge::Multilinear => Arity::Odd,
            Edge::MatrixMultiply
            | Edge::CwiseMultiply
            | Edge::SquaredEuclideanDistance
            | Edge::InnerProduct3D1D => Arity::Exactly(2),
            _ => Arity::Exactly(1),
        }
    }

    /// Edges whose forward pass draws random numbers.
    pub fn is_stochastic(&self) -> bool {
        matches!(self, Edge::GaussianNoise { .. } | Edge::Dropout { .. })
    }

    fn check_arity(&self, n: usize) -> Result<(), Error> {
        let arity = self.arity();
        if !arity.accepts(n) {
            return Err(Error::InvalidArity {
                op: self.to_string(),
                expected: arity.to_string(),
                actual: n,
            });
        }
        Ok(())
    }

    fn missing_context(&self) -> Error {
        Error::MissingContext {
            op: self.to_string(),
        }
    }

    /// Output shape from input shapes and configuration alone.
    pub fn dim_forward(&self, shapes: &[&[usize]]) -> Result<Vec<usize>, Error> {
        self.check_arity(shapes.len())?;
        let first = shapes[0];
        match self {
            Edge::Identity
            | Edge::Negate
            | Edge::OneMinusX { .. }
            | Edge::Square
            | Edge::Exp
            | Edge::Log
            | Edge::Tanh
            | Edge::LogisticSigmoid
            | Edge::Rectify
            | Edge::GaussianNoise { .. }
            | Edge::Dropout { .. } => Ok(first.to_vec()),
            Edge::Softmax | Edge::LogSoftmax => {
                matrix_dims(self, first)?;
                Ok(first.to_vec())
            }
            Edge::SumColumns => {
                let (rows, _) = matrix_dims(self, first)?;
                Ok(vec![rows, 1])
            }
            Edge::Sum | Edge::CwiseMultiply => {
                for s in &shapes[1..] {
                    same_shape(self, first, s)?;
                }
                Ok(first.to_vec())
            }
            Edge::KMHNGram { n } => {
                let (rows, cols) = matrix_dims(self, first)?;
                if *n == 0 || *n > cols {
                    return Err(Error::InvalidOperation(format!(
                        "KMHNGram window of width {} does not fit {} columns",
                        n, cols
                    )));
                }
                Ok(vec![rows, cols - n + 1])
            }
            Edge::Concatenate => {
                let mut rows = 0;
                for s in shapes {
                    rows += column_rows(self, s)?;
                }
                Ok(vec![rows, 1])
            }
            Edge::ConcatenateColumns => {
                let rows = column_rows(self, first)?;
                for s in &shapes[1..] {
                    same_shape(self, first, s)?;
                }
                Ok(vec![rows, shapes.len()])
            }
            Edge::Reshape { to } => {
                let from_size: usize = first.iter().product();
                let to_size: usize = to.iter().product();
                if from_size != to_size {
                    return Err(Error::ShapeMismatch {
                        expected: to.clone(),
                        actual: first.to_vec(),
                    });
                }
                Ok(to.clone())
            }
            Edge::MaxPooling1D { width } => {
                let rows = column_rows(self, first)?;
                if *width == 0 {
                    return Err(Error::InvalidOperation(
                        "MaxPooling1D window width must be positive".to_string(),
                    ));
                }
                Ok(vec![rows.div_ceil(*width), 1])
            }
            Edge::PickElement { index } | Edge::PickNegLogSoftmax { target: index } => {
                let rows = column_rows(self, first)?;
                if *index >= rows {
                    return Err(Error::IndexOutOfBounds {
                        index: *index,
                        size: rows,
                    });
                }
                Ok(vec![1, 1])
            }
            Edge::PickRange { start, end } => {
                let rows = column_rows(self, first)?;
                if start >= end || *end > rows {
                    return Err(Error::InvalidOperation(format!(
                        "PickRange [{}, {}) is not a non-empty range within {} rows",
                        start, end, rows
                    )));
                }
                Ok(vec![end - start, 1])
            }
            Edge::RestrictedLogSoftmax { denom } => {
                let rows = column_rows(self, first)?;
                crate::ops::validate_denominator(denom, rows)?;
                Ok(first.to_vec())
            }
            Edge::Hinge { correct, .. } => {
                let rows = column_rows(self, first)?;
                if *correct >= rows {
                    return Err(Error::IndexOutOfBounds {
                        index: *correct,
                        size: rows,
                    });
                }
                Ok(vec![1, 1])
            }
            Edge::BinaryLogLoss { .. } => {
                if first != [1, 1] {
                    return Err(Error::ShapeMismatch {
                        expected: vec![1, 1],
                        actual: first.to_vec(),
                    });
                }
                Ok(vec![1, 1])
            }
            Edge::SquaredEuclideanDistance => {
                same_shape(self, first, shapes[1])?;
                Ok(vec![1, 1])
            }
            Edge::MatrixMultiply => {
                let (m, k) = matrix_dims(self, first)?;
                let (k2, n) = matrix_dims(self, shapes[1])?;
                if k != k2 {
                    return Err(Error::IncompatibleShapes {
                        op: self.to_string(),
                        shape_a: first.to_vec(),
                        shape_b: shapes[1].to_vec(),
                    });
                }
                Ok(vec![m, n])
            }
            Edge::Multilinear => {
                for pair in shapes[1..].chunks(2) {
                    let (a, x) = (pair[0], pair[1]);
                    let (a_rows, a_cols) = matrix_dims(self, a)?;
                    let (x_rows, x_cols) = matrix_dims(self, x)?;
                    let term = if a_cols == 1 && a == x {
                        a.to_vec()
                    } else if a_cols == x_rows {
                        vec![a_rows, x_cols]
                    } else {
                        return Err(Error::IncompatibleShapes {
                            op: self.to_string(),
                            shape_a: a.to_vec(),
                            shape_b: x.to_vec(),
                        });
                    };
                    same_shape(self, first, &term)?;
                }
                Ok(first.to_vec())
            }
            Edge::InnerProduct3D1D => Err(Error::Unimplemented(self.to_string())),
        }
    }

    /// Computes the edge output from its inputs.
    pub fn forward(&self, xs: &[&Array]) -> Result<Forward, Error> {
        let shapes: Vec<&[usize]> = xs.iter().map(|x| x.shape()).collect();
        crate::debug_println!("forward {} on {:?}", self, shapes);
        let expected = self.dim_forward(&shapes)?;
        let x = xs[0];
        let result = match self {
            Edge::Identity => Forward::stateless(cpu_ops::identity(x)),
            Edge::Negate => Forward::stateless(cpu_ops::negate(x)),
            Edge::OneMinusX { c } => Forward::stateless(cpu_ops::constant_minus_x(x, *c)),
            Edge::Square => Forward::stateless(cpu_ops::square(x)),
            Edge::Exp => Forward::stateless(crate::kernels::exp(x)),
            Edge::Log => Forward::stateless(crate::kernels::ln(x)),
            Edge::Tanh => Forward::stateless(crate::kernels::tanh_forward(x)),
            Edge::LogisticSigmoid => Forward::stateless(crate::kernels::sigmoid_forward(x)),
            Edge::Rectify => Forward::stateless(crate::kernels::relu_forward(x)),
            Edge::SumColumns => Forward::stateless(cpu_ops::sum_columns(x)?),
            Edge::Sum => Forward::stateless(cpu_ops::sum(xs)?),
            Edge::KMHNGram { n } => Forward::stateless(cpu_ops::kmh_ngram(x, *n)?),
            Edge::Concatenate => {
                let (fx, offsets) = cpu_ops::concatenate(xs)?;
                Forward::with_context(fx, Context::RowOffsets(offsets))
            }
            Edge::ConcatenateColumns => Forward::stateless(cpu_ops::concatenate_columns(xs)?),
            Edge::Reshape { to } => Forward::stateless(cpu_ops::reshape(x, to)?),
            Edge::MaxPooling1D { width } => {
                let (fx, winners) = cpu_ops::max_pooling_1d(x, *width)?;
                Forward::with_context(fx, Context::ArgMax(winners))
            }
            Edge::PickElement { index } => Forward::stateless(cpu_ops::pick_element(x, *index)?),
            Edge::PickRange { start, end } => {
                Forward::stateless(cpu_ops::pick_range(x, *start, *end)?)
            }
            Edge::Softmax => Forward::stateless(cpu_ops::softmax(x)?),
            Edge::LogSoftmax => Forward::stateless(cpu_ops::log_softmax(x)?),
            Edge::RestrictedLogSoftmax { denom } => {
                Forward::stateless(cpu_ops::restricted_log_softmax(x, denom)?)
            }
            Edge::PickNegLogSoftmax { target } => {
                let (fx, probs) = cpu_ops::pick_neg_log_softmax(x, *target)?;
                Forward::with_context(fx, Context::Probabilities(probs))
            }
            Edge::MatrixMultiply => Forward::stateless(cpu_ops::matrix_multiply(x, xs[1])?),
            Edge::CwiseMultiply => Forward::stateless(cpu_ops::cwise_multiply(x, xs[1])?),
            Edge::Multilinear => Forward::stateless(cpu_ops::multilinear(xs)?),
            Edge::SquaredEuclideanDistance => {
                Forward::stateless(cpu_ops::squared_euclidean_distance(x, xs[1])?)
            }
            Edge::BinaryLogLoss { target } => {
                Forward::stateless(cpu_ops::binary_log_loss(x, *target)?)
            }
            Edge::Hinge { correct, margin } => {
                let (fx, active) = cpu_ops::hinge(x, *correct, *margin)?;
                Forward::with_context(fx, Context::ActiveTerms(active))
            }
            Edge::GaussianNoise { stddev } => {
                Forward::stateless(cpu_ops::gaussian_noise(x, *stddev)?)
            }
            Edge::Dropout { p } => {
                let (fx, mask) = cpu_ops::dropout(x, *p)?;
                Forward::with_context(fx, Context::Mask(mask))
            }
            Edge::InnerProduct3D1D => return Err(Error::Unimplemented(self.to_string())),
        };
        if result.output.shape() != expected.as_slice() {
            return Err(Error::InternalLogicError(format!(
                "{} produced shape {:?}, expected {:?}",
                self,
                result.output.shape(),
                expected
            )));
        }
        Ok(result)
    }

    /// Gradient contribution for input `i`, given the edge's own output `fx`,
    /// the context returned alongside it and the downstream gradient.
    pub fn backward(
        &self,
        xs: &[&Array],
        fx: &Array,
        context: &Context,
        grad_output: &Array,
        i: usize,
    ) -> Result<Array, Error> {
        self.check_arity(xs.len())?;
        if i >= xs.len() {
            return Err(Error::IndexOutOfBounds {
                index: i,
                size: xs.len(),
            });
        }
        if grad_output.shape() != fx.shape() {
            return Err(Error::ShapeMismatch {
                expected: fx.shape().to_vec(),
                actual: grad_output.shape().to_vec(),
            });
        }
        crate::debug_println!(
            "backward {} for input {} with gradient {:?}",
            self,
            i,
            grad_output.shape()
        );
        let x = xs[i];
        let dx = match self {
            Edge::Identity => cpu_backward::identity_backward(grad_output),
            Edge::Negate | Edge::OneMinusX { .. } => cpu_backward::negate_backward(grad_output),
            Edge::Square => cpu_backward::square_backward(x, grad_output)?,
            Edge::Exp => cpu_backward::exp_backward(fx, grad_output)?,
            Edge::Log => cpu_backward::log_backward(x, grad_output)?,
            Edge::Tanh => crate::kernels::tanh_backward(grad_output, fx, x)?,
            Edge::LogisticSigmoid => crate::kernels::sigmoid_backward(grad_output, fx, x)?,
            Edge::Rectify => crate::kernels::relu_backward(grad_output, fx, x)?,
            Edge::SumColumns => cpu_backward::sum_columns_backward(x, grad_output)?,
            Edge::Sum => cpu_backward::sum_backward(grad_output),
            Edge::KMHNGram { n } => cpu_backward::kmh_ngram_backward(x, grad_output, *n)?,
            Edge::Concatenate => match context {
                Context::RowOffsets(offsets) => {
                    cpu_backward::concatenate_backward(x, grad_output, offsets, i)?
                }
                _ => return Err(self.missing_context()),
            },
            Edge::ConcatenateColumns => {
                cpu_backward::concatenate_columns_backward(grad_output, i)?
            }
            Edge::Reshape { .. } => cpu_backward::reshape_backward(x, grad_output)?,
            Edge::MaxPooling1D { .. } => match context {
                Context::ArgMax(winners) => {
                    cpu_backward::max_pooling_1d_backward(x, grad_output, winners)?
                }
                _ => return Err(self.missing_context()),
            },
            Edge::PickElement { index } => {
                cpu_backward::pick_element_backward(x, grad_output, *index)?
            }
            Edge::PickRange { start, end } => {
                cpu_backward::pick_range_backward(x, grad_output, *start, *end)?
            }
            Edge::Softmax => cpu_backward::softmax_backward(fx, grad_output)?,
            Edge::LogSoftmax => cpu_backward::log_softmax_backward(fx, grad_output)?,
            Edge::RestrictedLogSoftmax { denom } => {
                cpu_backward::restricted_log_softmax_backward(fx, grad_output, denom)?
            }
            Edge::PickNegLogSoftmax { target } => match context {
                Context::Probabilities(probs) => {
                    cpu_backward::pick_neg_log_softmax_backward(probs, grad_output, *target)?
                }
                _ => return Err(self.missing_context()),
            },
            Edge::MatrixMultiply => {
                cpu_backward::matrix_multiply_backward(xs[0], xs[1], grad_output, i)?
            }
            Edge::CwiseMultiply => {
                cpu_backward::cwise_multiply_backward(xs[0], xs[1], grad_output, i)?
            }
            Edge::Multilinear => cpu_backward::multilinear_backward(xs, grad_output, i)?,
            Edge::SquaredEuclideanDistance => {
                cpu_backward::squared_euclidean_distance_backward(xs[0], xs[1], grad_output, i)?
            }
            Edge::BinaryLogLoss { target } => {
                cpu_backward::binary_log_loss_backward(x, grad_output, *target)?
            }
            Edge::Hinge { correct, .. } => match context {
                Context::ActiveTerms(active) => {
                    cpu_backward::hinge_backward(x, fx, grad_output, active, *correct)?
                }
                _ => return Err(self.missing_context()),
            },
            Edge::GaussianNoise { .. } => cpu_backward::gaussian_noise_backward(grad_output),
            Edge::Dropout { .. } => match context {
                Context::Mask(mask) => cpu_backward::dropout_backward(mask, grad_output)?,
                _ => return Err(self.missing_context()),
            },
            Edge::InnerProduct3D1D => return Err(Error::Unimplemented(self.to_string())),
        };
        if dx.shape() != x.shape() {
            return Err(Error::InternalLogicError(format!(
                "{} backward for input {} produced shape {:?}, expected {:?}",
                self,
                i,
                dx.shape(),
                x.shape()
            )));
        }
        Ok(dx)
    }
}
