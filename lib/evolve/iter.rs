//! Lazy, one-shot evolution over a sequence of times.

use std::{ fmt, iter::FusedIterator };
use ndarray::{ self as nd, Axis };
use num_complex::Complex64 as C64;
use tracing::info;
use crate::{
    error::{ OperatorError, OpResult },
    ode::Stepper,
};

// integrator state: complex, or real and imaginary parts stacked
pub(crate) enum Engine {
    Complex(Box<dyn Stepper<C64>>),
    Split(Box<dyn Stepper<f64>>),
}

impl Engine {
    fn name(&self) -> &'static str {
        match self {
            Self::Complex(s) => s.name(),
            Self::Split(s) => s.name(),
        }
    }

    fn advance(&mut self, t: f64) -> bool {
        match self {
            Self::Complex(s) => { s.integrate(t); s.successful() },
            Self::Split(s) => { s.integrate(t); s.successful() },
        }
    }

    fn state(&self) -> nd::Array1<C64> {
        match self {
            Self::Complex(s) => s.y().clone(),
            Self::Split(s) => {
                let y = s.y();
                let m = y.len() / 2;
                y.iter().take(m).zip(y.iter().skip(m))
                    .map(|(u, v)| C64::new(*u, *v))
                    .collect()
            },
        }
    }

    // rescale each of the `k` columns of the state to its initial norm
    fn renormalize(&mut self, n: usize, k: usize, norms: &nd::Array1<f64>) {
        if let Self::Complex(s) = self {
            let mut y = s.y_mut().view_mut().into_shape((n, k))
                .expect("renormalize: state must have n·k elements");
            y.axis_iter_mut(Axis(1))
                .zip(norms)
                .for_each(|(mut col, &nrm0)| {
                    let nrm = col.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
                    if nrm > 0.0 {
                        let c = C64::from(nrm0 / nrm);
                        col.mapv_inplace(|x| x * c);
                    }
                });
        }
    }
}

/// Iterator over evolved states, advancing the integrator one requested time
/// at a time.
///
/// Produced by [`Operator::evolve_iter`][crate::operator::Operator::evolve_iter]
/// and by [`Operator::evolve`][crate::operator::Operator::evolve] in lazy mode.
/// The iterator owns a snapshot of the operator, so it is independent of later
/// changes to it. After an integration failure it yields the error once and
/// then ends.
pub struct EvolveIter<D: nd::Dimension> {
    pub(crate) engine: Engine,
    pub(crate) t0: f64,
    pub(crate) initial: nd::Array<C64, D>,
    pub(crate) times: std::vec::IntoIter<f64>,
    pub(crate) n: usize,
    pub(crate) k: usize,
    pub(crate) norms: Option<nd::Array1<f64>>,
    pub(crate) verbose: bool,
    pub(crate) done: bool,
}

impl<D: nd::Dimension> fmt::Debug for EvolveIter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvolveIter")
            .field("integrator", &self.engine.name())
            .field("t0", &self.t0)
            .field("shape", &self.initial.shape())
            .field("remaining", &self.times.len())
            .field("done", &self.done)
            .finish()
    }
}

impl<D: nd::Dimension> EvolveIter<D> {
    /// Initial state, converted to complex.
    pub fn initial(&self) -> &nd::Array<C64, D> { &self.initial }

    /// Initial time.
    pub fn t0(&self) -> f64 { self.t0 }

    /// Collect every remaining state, stacked along a new last axis.
    pub fn stack(self) -> OpResult<nd::Array<C64, D::Larger>>
    where D::Larger: nd::RemoveAxis
    {
        let template = self.initial.clone();
        let states: Vec<nd::Array<C64, D>> = self.collect::<OpResult<_>>()?;
        stack_states(&template, &states)
    }
}

impl<D: nd::Dimension> Iterator for EvolveIter<D> {
    type Item = OpResult<nd::Array<C64, D>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done { return None; }
        let t = self.times.next()?;
        let state
            = if t == self.t0 {
                self.initial.clone()
            } else {
                if !self.engine.advance(t) {
                    self.done = true;
                    return Some(Err(OperatorError::IntegrationFailed { time: t }));
                }
                if let Some(norms) = self.norms.as_ref() {
                    self.engine.renormalize(self.n, self.k, norms);
                }
                self.engine.state()
                    .into_shape(self.initial.raw_dim())
                    .expect("EvolveIter: state must have the initial shape")
            };
        if self.verbose {
            let norm = state.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt();
            info!(time = t, norm, "evolved to time");
        }
        Some(Ok(state))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done { (0, Some(0)) } else { (0, Some(self.times.len())) }
    }
}

impl<D: nd::Dimension> FusedIterator for EvolveIter<D> { }

/// Stack states along a new last axis; an empty list gives a zero-length
/// last axis.
pub(crate) fn stack_states<D>(template: &nd::Array<C64, D>, states: &[nd::Array<C64, D>])
    -> OpResult<nd::Array<C64, D::Larger>>
where
    D: nd::Dimension,
    D::Larger: nd::RemoveAxis,
{
    let axis = Axis(template.ndim());
    if states.is_empty() {
        let empty
            = template.view()
            .insert_axis(axis)
            .slice_axis(axis, nd::Slice::from(0..0))
            .to_owned();
        return Ok(empty);
    }
    let views: Vec<nd::ArrayView<C64, D>> = states.iter().map(|a| a.view()).collect();
    Ok(nd::stack(axis, &views)?)
}
