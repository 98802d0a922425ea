#![allow(non_snake_case)]

//! Time-dependent linear operators of the form
//!
//! ```text
//! H(t) = H0 + Σ_k f_k(t) H_k
//! ```
//!
//! with sparse or dense coefficient matrices, closed under the usual algebra,
//! evaluable at fixed times, and integrable in time under the Schrödinger and
//! Liouville-von Neumann equations.

pub mod error;
pub mod dtype;
pub mod sparse;
pub mod matrix;
pub mod drive;
pub mod basis;
pub mod operator;
pub mod linalg;
pub mod ode;
pub mod evolve;
pub mod config;

pub use error::{ OperatorError, OpResult };
pub use dtype::{ Casting, DType, Element, Promote, Promoted };
pub use sparse::CsMatrix;
pub use matrix::Matrix;
pub use drive::{ Drive, DriveKey };
pub use basis::{ Checks, DynamicOpTerm, OpTerm, OperatorBasis };
pub use operator::{
    Operator,
    OperatorBuilder,
    arith::{ Operand, anti_commutator, commutator },
    apply::Expectation,
};
pub use linalg::{ EigshOptions, LinearOperator, OperatorAt, Which };
pub use ode::{ BuildStepper, Integrator, Stepper, StepperOptions };
pub use evolve::{ Equation, EvolveIter, EvolveOptions, Evolution, Times };
