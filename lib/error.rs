//! Error type shared by every fallible operation in the crate.

use ndarray as nd;
use ndarray_linalg as la;
use thiserror::Error;
use crate::dtype::DType;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OperatorError {
    /// Returned when an operator is built without any way of inferring its
    /// shape.
    #[error("error in operator construction: missing shape; provide a dimension, a shape, a basis, or at least one term")]
    MissingShape,

    /// Returned when an operator is built with a non-square shape.
    #[error("error in operator construction: operators must be square, got shape {0:?}")]
    NotSquare((usize, usize)),

    /// Returned when a term passed to the builder has a shape different from
    /// the operator's.
    #[error("error in operator construction: term has shape {got:?}, expected {expected:?}")]
    TermShape { expected: (usize, usize), got: (usize, usize) },

    /// Returned when nested rows coerced to a dense matrix are ragged.
    #[error("error in operand coercion: ragged rows")]
    RaggedRows,

    /// Returned when a sparse matrix entry lies outside of the matrix.
    #[error("index ({row}, {col}) out of bounds for shape {shape:?}")]
    IndexOutOfBounds { row: usize, col: usize, shape: (usize, usize) },

    /// Returned when an operand's shape is incompatible with the operator.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// Returned when an in-place operation would require casting the operand
    /// across kinds (e.g. complex into real).
    #[error("cannot cast {from} into {to} under same-kind casting rules")]
    UnsafeCast { from: DType, to: DType },

    /// Returned when adding or subtracting a scalar other than zero.
    #[error("operators do not support addition or subtraction of a non-zero scalar")]
    NonzeroScalar,

    /// Returned when dividing by a zero scalar.
    #[error("division by zero")]
    DivisionByZero,

    /// Returned when an operand kind is not meaningful for an operation.
    #[error("unsupported operand: {0}")]
    UnsupportedOperand(&'static str),

    /// Returned when a state array has an unexpected number of axes.
    #[error("expected {expected} array, got {got} axes")]
    InvalidRank { expected: &'static str, got: usize },

    /// Returned when the number of batched times doesn't match the number of
    /// states.
    #[error("expected {expected} time values, got {got}")]
    TimeCount { expected: usize, got: usize },

    /// Returned when requesting a feature not defined for the
    /// Liouville-von Neumann equation.
    #[error("{0} is not defined for the Liouville-von Neumann equation")]
    UnsupportedForLvne(&'static str),

    /// Returned when requesting a real-split evolution of a complex-valued
    /// operator.
    #[error("real-split evolution requires a real-valued operator, got {0}")]
    RealSplitComplex(DType),

    /// Returned when an equation of motion name is not recognized.
    #[error("unknown equation of motion '{0}'; expected 'SE' or 'LvNE'")]
    UnknownEquation(String),

    /// Returned when a stepper name is not recognized.
    #[error("unknown integrator '{0}'")]
    UnknownIntegrator(String),

    /// Returned when the stepper fails to reach a requested time.
    #[error("failed to evolve to time {time}; the stepper may need a larger step budget or looser tolerances")]
    IntegrationFailed { time: f64 },

    /// Returned when an iterative eigensolver request is malformed.
    #[error("invalid eigensolver request: {0}")]
    InvalidEigenRequest(String),

    /// Returned when the iterative eigensolver runs out of iterations.
    #[error("eigensolver did not converge after {iters} Lanczos vectors")]
    NoConvergence { iters: usize },

    /// Returned by a basis collaborator.
    #[error("error in basis: {0}")]
    Basis(String),

    #[error(transparent)]
    Shape(#[from] nd::ShapeError),

    #[error(transparent)]
    Linalg(#[from] la::error::LinalgError),

    /// Returned when an evolution option has an invalid value.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("error reading configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
pub type OpResult<T> = Result<T, OperatorError>;

impl OperatorError {
    pub(crate) fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch { expected: expected.to_vec(), got: got.to_vec() }
    }
}
