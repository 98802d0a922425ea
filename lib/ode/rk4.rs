//! Fixed-step fourth-order Runge-Kutta.

use ndarray as nd;
use tracing::debug;
use super::{ OdeScalar, Rhs, Stepper, StepperOptions };

/// Classic RK4 with a fixed nominal step.
///
/// Each call to [`Stepper::integrate`] divides the interval into the smallest
/// number of equal steps no longer than `max_step` (default `1e-3`, or
/// `first_step` if only that is given), so target times are hit exactly.
/// Tolerances are ignored.
pub struct Rk4<S> {
    f: Rhs<S>,
    t: f64,
    y: nd::Array1<S>,
    dt: f64,
    nsteps: usize,
    success: bool,
}

impl<S: OdeScalar> Rk4<S> {
    pub fn new(f: Rhs<S>, options: &StepperOptions) -> Self {
        let dt
            = options.max_step
            .or(options.first_step)
            .unwrap_or(1e-3)
            .abs();
        Self {
            f,
            t: 0.0,
            y: nd::Array1::zeros(0),
            dt,
            nsteps: options.nsteps.unwrap_or(usize::MAX),
            success: true,
        }
    }

    fn step(&self, t: f64, y: &nd::Array1<S>, h: f64) -> nd::Array1<S> {
        let half = S::from_real(h / 2.0);
        let full = S::from_real(h);
        let k1 = (self.f)(t, y.view());
        let k2 = (self.f)(t + h / 2.0, (y + &(&k1 * half)).view());
        let k3 = (self.f)(t + h / 2.0, (y + &(&k2 * half)).view());
        let k4 = (self.f)(t + h, (y + &(&k3 * full)).view());
        let two = S::from_real(2.0);
        let sixth = S::from_real(h / 6.0);
        y + &((k1 + &(k2 * two) + &(k3 * two) + &k4) * sixth)
    }
}

impl<S: OdeScalar> Stepper<S> for Rk4<S> {
    fn name(&self) -> &'static str { "rk4" }

    fn set_initial_value(&mut self, y0: nd::Array1<S>, t0: f64) {
        self.y = y0;
        self.t = t0;
        self.success = true;
    }

    fn integrate(&mut self, t_end: f64) -> &nd::Array1<S> {
        self.success = true;
        if t_end == self.t { return &self.y; }
        let span = t_end - self.t;
        let n = (span.abs() / self.dt).ceil().max(1.0) as usize;
        if n > self.nsteps || !span.is_finite() || self.dt == 0.0 {
            debug!(t = self.t, n, "rk4: step budget exceeded");
            self.success = false;
            return &self.y;
        }
        let h = span / n as f64;
        let t0 = self.t;
        for k in 0..n {
            self.y = self.step(t0 + k as f64 * h, &self.y, h);
        }
        self.t = t_end;
        &self.y
    }

    fn successful(&self) -> bool { self.success }

    fn t(&self) -> f64 { self.t }

    fn y(&self) -> &nd::Array1<S> { &self.y }

    fn y_mut(&mut self) -> &mut nd::Array1<S> { &mut self.y }
}
