//! Explicit one-step integrators for `dy/dt = f(t, y)` over flat state
//! vectors.
//!
//! Steppers are stateful: they are given an initial value once and then
//! advanced to successive target times with [`Stepper::integrate`].

use std::str::FromStr;
use ndarray as nd;
use ndarray_linalg as la;
use serde::{ Deserialize, Serialize };
use tracing::debug;
use crate::{
    dtype::Element,
    error::{ OperatorError, OpResult },
};

pub mod dopri5;
pub mod rk4;

pub use dopri5::Dopri5;
pub use rk4::Rk4;

/// Right-hand side `f(t, y)` of an ODE.
pub type Rhs<S> = Box<dyn Fn(f64, nd::ArrayView1<S>) -> nd::Array1<S>>;

/// Scalar types the integrators work over: anything with an `f64` real part.
pub trait OdeScalar: Element + la::Scalar<Real = f64> { }

impl<S> OdeScalar for S where S: Element + la::Scalar<Real = f64> { }

/// A stateful ODE integrator.
pub trait Stepper<S> {
    fn name(&self) -> &'static str;

    /// Reset the integrator to state `y0` at time `t0`.
    fn set_initial_value(&mut self, y0: nd::Array1<S>, t0: f64);

    /// Advance to time `t`, returning the new state.
    ///
    /// On failure the state is left at the last accepted step and
    /// [`Self::successful`] returns `false`.
    fn integrate(&mut self, t: f64) -> &nd::Array1<S>;

    /// Return `true` if the last call to [`Self::integrate`] succeeded.
    fn successful(&self) -> bool;

    /// Current time.
    fn t(&self) -> f64;

    /// Current state.
    fn y(&self) -> &nd::Array1<S>;

    fn y_mut(&mut self) -> &mut nd::Array1<S>;
}

/// Tunable parameters shared by all steppers. Unset values fall back to each
/// stepper's own defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperOptions {
    /// Absolute error tolerance.
    pub atol: Option<f64>,
    /// Relative error tolerance.
    pub rtol: Option<f64>,
    /// Maximum number of steps per call to [`Stepper::integrate`].
    pub nsteps: Option<usize>,
    pub first_step: Option<f64>,
    pub max_step: Option<f64>,
}

impl StepperOptions {
    pub fn with_atol(mut self, atol: f64) -> Self {
        self.atol = Some(atol);
        self
    }

    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = Some(rtol);
        self
    }

    pub fn with_nsteps(mut self, nsteps: usize) -> Self {
        self.nsteps = Some(nsteps);
        self
    }

    pub fn with_first_step(mut self, first_step: f64) -> Self {
        self.first_step = Some(first_step);
        self
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = Some(max_step);
        self
    }

    /// Fill unset tolerances with `1e-9` and an unset step budget with
    /// `i32::MAX`.
    pub fn with_high_order_defaults(mut self) -> Self {
        self.atol.get_or_insert(1e-9);
        self.rtol.get_or_insert(1e-9);
        self.nsteps.get_or_insert(i32::MAX as usize);
        self
    }
}

/// Available steppers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrator {
    /// Adaptive Dormand-Prince 5(4).
    Dopri5,
    /// Fixed-step classic fourth-order Runge-Kutta.
    Rk4,
}

impl Integrator {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dopri5 => "dopri5",
            Self::Rk4 => "rk4",
        }
    }

    /// Return `true` for names of the high-order adaptive steppers, which get
    /// tighter default tolerances when used for time evolution.
    pub fn is_high_order_name(name: &str) -> bool {
        matches!(name, "dopri5" | "dop853")
    }
}

impl FromStr for Integrator {
    type Err = OperatorError;

    fn from_str(s: &str) -> OpResult<Self> {
        match s {
            "dopri5" => Ok(Self::Dopri5),
            "rk4" => Ok(Self::Rk4),
            other => Err(OperatorError::UnknownIntegrator(other.to_string())),
        }
    }
}

/// Construct a boxed [`Stepper`] for a right-hand side.
pub trait BuildStepper<S> {
    fn build(&self, f: Rhs<S>, options: &StepperOptions)
        -> OpResult<Box<dyn Stepper<S>>>;
}

impl<S: OdeScalar> BuildStepper<S> for Integrator {
    fn build(&self, f: Rhs<S>, options: &StepperOptions)
        -> OpResult<Box<dyn Stepper<S>>>
    {
        debug!(integrator = self.name(), ?options, "building stepper");
        match self {
            Self::Dopri5 => Ok(Box::new(Dopri5::new(f, options))),
            Self::Rk4 => Ok(Box::new(Rk4::new(f, options))),
        }
    }
}

impl<S: OdeScalar> BuildStepper<S> for str {
    fn build(&self, f: Rhs<S>, options: &StepperOptions)
        -> OpResult<Box<dyn Stepper<S>>>
    {
        self.parse::<Integrator>()?.build(f, options)
    }
}
