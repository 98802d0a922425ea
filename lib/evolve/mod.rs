//! Time evolution of pure states and density matrices under an [`Operator`].
//!
//! Three equations of motion are supported:
//! - the Schrödinger equation `dψ/dt = -i H ψ` for a vector or a matrix of
//!   column vectors, optionally in imaginary time (`dψ/dt = -H ψ`, with every
//!   column renormalized to its initial norm after each requested time) or, for
//!   real operators, split into real and imaginary parts;
//! - the Liouville-von Neumann equation `dρ/dt = -i [H, ρ]` for an `N × N`
//!   density matrix.
//!
//! States are always returned as complex arrays. Multiple requested times are
//! stacked along a new last axis.

use std::{ fmt, rc::Rc, str::FromStr };
use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::{ Deserialize, Serialize };
use tracing::debug;
use crate::{
    dtype::Element,
    error::{ OperatorError, OpResult },
    ode::{ BuildStepper, Integrator, StepperOptions },
    operator::Operator,
};

mod iter;
mod kernels;

pub use iter::EvolveIter;
use iter::Engine;

/// Equation of motion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Equation {
    /// Schrödinger equation.
    #[default]
    #[serde(rename = "SE")]
    Schrodinger,
    /// Liouville-von Neumann equation.
    #[serde(rename = "LvNE")]
    LiouvilleVonNeumann,
}

impl FromStr for Equation {
    type Err = OperatorError;

    fn from_str(s: &str) -> OpResult<Self> {
        match s {
            "SE" => Ok(Self::Schrodinger),
            "LvNE" => Ok(Self::LiouvilleVonNeumann),
            other => Err(OperatorError::UnknownEquation(other.to_string())),
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schrodinger => write!(f, "SE"),
            Self::LiouvilleVonNeumann => write!(f, "LvNE"),
        }
    }
}

/// Options for [`Operator::evolve`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolveOptions {
    pub equation: Equation,
    /// Name of the stepper; see [`Integrator`].
    pub integrator: String,
    /// Integrate the real and imaginary parts of the state separately. Only
    /// valid for real operators under the Schrödinger equation.
    pub real_split: bool,
    /// Evolve in imaginary time; takes precedence over `real_split`.
    pub imaginary_time: bool,
    /// Log the time and state norm after each requested time.
    pub verbose: bool,
    /// Return a lazy iterator instead of computed states.
    pub lazy: bool,
    pub stepper: StepperOptions,
}

impl Default for EvolveOptions {
    fn default() -> Self {
        Self {
            equation: Equation::Schrodinger,
            integrator: "dopri5".to_string(),
            real_split: false,
            imaginary_time: false,
            verbose: false,
            lazy: false,
            stepper: StepperOptions::default(),
        }
    }
}

impl EvolveOptions {
    pub fn with_equation(mut self, equation: Equation) -> Self {
        self.equation = equation;
        self
    }

    pub fn with_integrator<S: Into<String>>(mut self, integrator: S) -> Self {
        self.integrator = integrator.into();
        self
    }

    pub fn with_real_split(mut self, real_split: bool) -> Self {
        self.real_split = real_split;
        self
    }

    pub fn with_imaginary_time(mut self, imaginary_time: bool) -> Self {
        self.imaginary_time = imaginary_time;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_stepper(mut self, stepper: StepperOptions) -> Self {
        self.stepper = stepper;
        self
    }

    // stepper options with the defaults for high-order steppers filled in
    fn resolved_stepper(&self) -> StepperOptions {
        if Integrator::is_high_order_name(&self.integrator) {
            self.stepper.clone().with_high_order_defaults()
        } else {
            self.stepper.clone()
        }
    }
}

/// Requested output time(s).
#[derive(Clone, Debug, PartialEq)]
pub enum Times {
    Single(f64),
    Many(Vec<f64>),
}

impl From<f64> for Times {
    fn from(t: f64) -> Self { Self::Single(t) }
}

impl From<Vec<f64>> for Times {
    fn from(ts: Vec<f64>) -> Self { Self::Many(ts) }
}

impl From<&[f64]> for Times {
    fn from(ts: &[f64]) -> Self { Self::Many(ts.to_vec()) }
}

impl From<nd::Array1<f64>> for Times {
    fn from(ts: nd::Array1<f64>) -> Self { Self::Many(ts.to_vec()) }
}

/// Output of [`Operator::evolve`].
#[derive(Debug)]
pub enum Evolution<D: nd::Dimension> {
    /// State at a single requested time.
    State(nd::Array<C64, D>),
    /// States at each requested time, stacked along the last axis.
    States(nd::Array<C64, D::Larger>),
    /// Lazy iterator over states.
    Lazy(EvolveIter<D>),
}

impl<D> Evolution<D>
where
    D: nd::Dimension,
    D::Larger: nd::RemoveAxis,
{
    /// Convert to an array with time along the last axis, running a lazy
    /// evolution to completion.
    pub fn into_array(self) -> OpResult<nd::Array<C64, D::Larger>> {
        match self {
            Self::State(a) => {
                let ax = nd::Axis(a.ndim());
                Ok(a.insert_axis(ax))
            },
            Self::States(a) => Ok(a),
            Self::Lazy(iter) => iter.stack(),
        }
    }
}

impl<T: Element> Operator<T> {
    /// Evolve `v0` from time `t0` to each requested time.
    ///
    /// The stepper is looked up by `options.integrator`; for `"dopri5"` (and
    /// `"dop853"`) unset tolerances default to `1e-9` and the step budget to
    /// `i32::MAX`.
    pub fn evolve<U, S, D, I>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        times: I,
        options: &EvolveOptions,
    ) -> OpResult<Evolution<D>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
        D::Larger: nd::RemoveAxis,
        I: Into<Times>,
    {
        let stepper = options.resolved_stepper();
        self.run(v0, t0, times.into(), options, &stepper, options.integrator.as_str())
    }

    /// Like [`Self::evolve`], but with a custom stepper constructor.
    /// `options.integrator` is ignored and `options.stepper` is passed through
    /// unchanged.
    pub fn evolve_with<U, S, D, I, B>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        times: I,
        options: &EvolveOptions,
        builder: &B,
    ) -> OpResult<Evolution<D>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
        D::Larger: nd::RemoveAxis,
        I: Into<Times>,
        B: BuildStepper<C64> + BuildStepper<f64> + ?Sized,
    {
        self.run(v0, t0, times.into(), options, &options.stepper, builder)
    }

    /// Evolve `v0` from `t0` to a single time `t`.
    pub fn evolve_at<U, S, D>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        t: f64,
        options: &EvolveOptions,
    ) -> OpResult<nd::Array<C64, D>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
    {
        let stepper = options.resolved_stepper();
        let mut iter = self.start(
            v0, t0, vec![t], options, &stepper, options.integrator.as_str())?;
        iter.next()
            .transpose()?
            .ok_or(OperatorError::IntegrationFailed { time: t })
    }

    /// Evolve `v0` from `t0` through a list of times, stacking the states
    /// along a new last axis.
    pub fn evolve_list<U, S, D>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        times: &[f64],
        options: &EvolveOptions,
    ) -> OpResult<nd::Array<C64, D::Larger>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
        D::Larger: nd::RemoveAxis,
    {
        self.evolve_iter(v0, t0, times.to_vec(), options)?.stack()
    }

    /// Start a lazy evolution of `v0` from `t0` through a list of times.
    pub fn evolve_iter<U, S, D>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        times: Vec<f64>,
        options: &EvolveOptions,
    ) -> OpResult<EvolveIter<D>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
    {
        let stepper = options.resolved_stepper();
        self.start(v0, t0, times, options, &stepper, options.integrator.as_str())
    }

    fn run<U, S, D, B>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        times: Times,
        options: &EvolveOptions,
        stepper: &StepperOptions,
        builder: &B,
    ) -> OpResult<Evolution<D>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
        D::Larger: nd::RemoveAxis,
        B: BuildStepper<C64> + BuildStepper<f64> + ?Sized,
    {
        match times {
            Times::Single(t) if !options.lazy => {
                let mut iter = self.start(v0, t0, vec![t], options, stepper, builder)?;
                let state = iter.next()
                    .transpose()?
                    .ok_or(OperatorError::IntegrationFailed { time: t })?;
                Ok(Evolution::State(state))
            },
            Times::Single(t) => {
                let iter = self.start(v0, t0, vec![t], options, stepper, builder)?;
                Ok(Evolution::Lazy(iter))
            },
            Times::Many(ts) => {
                let iter = self.start(v0, t0, ts, options, stepper, builder)?;
                if options.lazy {
                    Ok(Evolution::Lazy(iter))
                } else {
                    Ok(Evolution::States(iter.stack()?))
                }
            },
        }
    }

    fn check_initial(&self, shape: &[usize], options: &EvolveOptions)
        -> OpResult<()>
    {
        let n = self.dim();
        if self.shape.0 != self.shape.1 {
            return Err(OperatorError::NotSquare(self.shape));
        }
        match options.equation {
            Equation::Schrodinger => {
                if !matches!(shape.len(), 1 | 2) {
                    return Err(OperatorError::InvalidRank {
                        expected: "1 or 2", got: shape.len() });
                }
                if shape[0] != n {
                    return Err(OperatorError::shape_mismatch(&[n], &shape[..1]));
                }
            },
            Equation::LiouvilleVonNeumann => {
                if shape.len() != 2 {
                    return Err(OperatorError::InvalidRank {
                        expected: "2", got: shape.len() });
                }
                if shape != [n, n] {
                    return Err(OperatorError::shape_mismatch(&[n, n], shape));
                }
                if options.imaginary_time {
                    return Err(OperatorError::UnsupportedForLvne("imaginary time"));
                }
                if options.real_split {
                    return Err(OperatorError::UnsupportedForLvne("real split"));
                }
            },
        }
        if options.real_split && !options.imaginary_time && T::DTYPE.is_complex() {
            return Err(OperatorError::RealSplitComplex(T::DTYPE));
        }
        Ok(())
    }

    fn start<U, S, D, B>(
        &self,
        v0: &nd::ArrayBase<S, D>,
        t0: f64,
        times: Vec<f64>,
        options: &EvolveOptions,
        stepper: &StepperOptions,
        builder: &B,
    ) -> OpResult<EvolveIter<D>>
    where
        U: Element,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
        B: BuildStepper<C64> + BuildStepper<f64> + ?Sized,
    {
        self.check_initial(v0.shape(), options)?;
        let n = self.dim();
        let k = v0.shape().get(1).copied().unwrap_or(1);
        let imaginary = options.imaginary_time;
        let split = options.real_split && !imaginary;
        let initial: nd::Array<C64, D> = v0.mapv(|u| u.cast());
        let flat: nd::Array1<C64> = initial.iter().copied().collect();

        let engine
            = if split {
                let H = Rc::new(self.astype::<f64>());
                let f = kernels::real_split(H, n, k);
                let y0: nd::Array1<f64>
                    = flat.iter().map(|z| z.re)
                    .chain(flat.iter().map(|z| z.im))
                    .collect();
                let mut s = <B as BuildStepper<f64>>::build(builder, f, stepper)?;
                s.set_initial_value(y0, t0);
                Engine::Split(s)
            } else {
                let H = Rc::new(self.astype::<C64>());
                let f
                    = match options.equation {
                        Equation::Schrodinger
                            => kernels::schrodinger(H, n, k, imaginary),
                        Equation::LiouvilleVonNeumann
                            => kernels::liouville(H, n),
                    };
                let mut s = <B as BuildStepper<C64>>::build(builder, f, stepper)?;
                s.set_initial_value(flat.clone(), t0);
                Engine::Complex(s)
            };

        let norms
            = imaginary.then(|| {
                flat.view().into_shape((n, k))
                    .expect("start: state must have n·k elements")
                    .axis_iter(nd::Axis(1))
                    .map(|col| col.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt())
                    .collect::<nd::Array1<f64>>()
            });
        debug!(
            equation = %options.equation,
            imaginary,
            split,
            n,
            k,
            num_times = times.len(),
            "starting evolution"
        );
        Ok(EvolveIter {
            engine,
            t0,
            initial,
            times: times.into_iter(),
            n,
            k,
            norms,
            verbose: options.verbose,
            done: false,
        })
    }
}
