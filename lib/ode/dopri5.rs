//! Adaptive Dormand-Prince 5(4) with embedded error control.

use ndarray as nd;
use tracing::debug;
use super::{ OdeScalar, Rhs, Stepper, StepperOptions };

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// fifth-order weights; also the last row of the tableau (FSAL)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// difference between fifth- and fourth-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;

/// Dormand-Prince 5(4) stepper.
///
/// Defaults: `atol = 1e-12`, `rtol = 1e-6`, `nsteps = 500`, no maximum step,
/// and an automatically chosen first step.
pub struct Dopri5<S> {
    f: Rhs<S>,
    t: f64,
    y: nd::Array1<S>,
    atol: f64,
    rtol: f64,
    nsteps: usize,
    first_step: Option<f64>,
    max_step: Option<f64>,
    // step size to try next, carried across calls to `integrate`
    h: Option<f64>,
    success: bool,
}

// sqrt(mean((|v_i| / sk_i)^2))
fn rms_norm<S: OdeScalar>(v: &nd::Array1<S>, sk: &nd::Array1<f64>) -> f64 {
    if v.is_empty() { return 0.0; }
    let sum: f64
        = v.iter().zip(sk)
        .map(|(vi, ski)| (vi.modulus() / ski).powi(2))
        .sum();
    (sum / v.len() as f64).sqrt()
}

// y + h Σ_k c_k k_k
fn combine<S: OdeScalar>(y: &nd::Array1<S>, h: f64, terms: &[(f64, &nd::Array1<S>)])
    -> nd::Array1<S>
{
    let mut out = y.clone();
    terms.iter()
        .for_each(|(c, k)| { out.scaled_add(S::from_real(h * c), *k); });
    out
}

impl<S: OdeScalar> Dopri5<S> {
    pub fn new(f: Rhs<S>, options: &StepperOptions) -> Self {
        Self {
            f,
            t: 0.0,
            y: nd::Array1::zeros(0),
            atol: options.atol.unwrap_or(1e-12),
            rtol: options.rtol.unwrap_or(1e-6),
            nsteps: options.nsteps.unwrap_or(500),
            first_step: options.first_step,
            max_step: options.max_step,
            h: None,
            success: true,
        }
    }

    fn scale(&self, y0: &nd::Array1<S>, y1: &nd::Array1<S>) -> nd::Array1<f64> {
        y0.iter().zip(y1)
            .map(|(a, b)| self.atol + self.rtol * a.modulus().max(b.modulus()))
            .collect()
    }

    // initial step size guess following Hairer, Nørsett & Wanner
    fn initial_step(&self, f0: &nd::Array1<S>, dir: f64, max_step: f64) -> f64 {
        let sk = self.scale(&self.y, &self.y);
        let d0 = rms_norm(&self.y, &sk);
        let d1 = rms_norm(f0, &sk);
        let h0
            = (if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 })
            .min(max_step);
        let y1 = combine(&self.y, dir * h0, &[(1.0, f0)]);
        let f1 = (self.f)(self.t + dir * h0, y1.view());
        let d2 = rms_norm(&(&f1 - f0), &sk) / h0;
        let dmax = d1.max(d2);
        let h1
            = if dmax <= 1e-15 {
                (h0 * 1e-3).max(1e-6)
            } else {
                (0.01 / dmax).powf(0.2)
            };
        (100.0 * h0).min(h1).min(max_step)
    }
}

impl<S: OdeScalar> Stepper<S> for Dopri5<S> {
    fn name(&self) -> &'static str { "dopri5" }

    fn set_initial_value(&mut self, y0: nd::Array1<S>, t0: f64) {
        self.y = y0;
        self.t = t0;
        self.h = None;
        self.success = true;
    }

    fn integrate(&mut self, t_end: f64) -> &nd::Array1<S> {
        self.success = true;
        if t_end == self.t { return &self.y; }
        let dir = (t_end - self.t).signum();
        let max_step = self.max_step.unwrap_or(f64::INFINITY).abs();
        let mut k1 = (self.f)(self.t, self.y.view());
        let mut h
            = self.h
            .or(self.first_step)
            .unwrap_or_else(|| self.initial_step(&k1, dir, max_step))
            .abs()
            .min(max_step);
        let mut steps: usize = 0;
        loop {
            if steps >= self.nsteps {
                debug!(t = self.t, steps, "dopri5: step budget exhausted");
                self.success = false;
                break;
            }
            let remaining = (t_end - self.t).abs();
            let last = h >= remaining;
            if last { h = remaining; }
            let hs = dir * h;
            let t = self.t;
            let y = &self.y;
            let k2 = (self.f)(t + C2 * hs, combine(y, hs, &[(A21, &k1)]).view());
            let k3 = (self.f)(
                t + C3 * hs,
                combine(y, hs, &[(A31, &k1), (A32, &k2)]).view(),
            );
            let k4 = (self.f)(
                t + C4 * hs,
                combine(y, hs, &[(A41, &k1), (A42, &k2), (A43, &k3)]).view(),
            );
            let k5 = (self.f)(
                t + C5 * hs,
                combine(y, hs, &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)])
                    .view(),
            );
            let k6 = (self.f)(
                t + hs,
                combine(
                    y, hs,
                    &[(A61, &k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
                ).view(),
            );
            let y_new = combine(
                y, hs, &[(B1, &k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)]);
            let k7 = (self.f)(t + hs, y_new.view());
            let err_vec = combine(
                &nd::Array1::zeros(y.len()),
                hs,
                &[(E1, &k1), (E3, &k3), (E4, &k4), (E5, &k5), (E6, &k6), (E7, &k7)],
            );
            let err = rms_norm(&err_vec, &self.scale(y, &y_new));
            let fac
                = if err == 0.0 {
                    FAC_MAX
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(FAC_MIN, FAC_MAX)
                };
            steps += 1;
            if err <= 1.0 {
                let h_next = (h * fac).min(max_step);
                self.y = y_new;
                self.t = if last { t_end } else { t + hs };
                self.h = Some(h_next);
                if last { break; }
                k1 = k7;
                h = h_next;
            } else {
                h *= fac.min(1.0);
            }
            if h <= 1e-14 * self.t.abs().max(1.0) {
                debug!(t = self.t, h, "dopri5: step size too small");
                self.success = false;
                break;
            }
        }
        &self.y
    }

    fn successful(&self) -> bool { self.success }

    fn t(&self) -> f64 { self.t }

    fn y(&self) -> &nd::Array1<S> { &self.y }

    fn y_mut(&mut self) -> &mut nd::Array1<S> { &mut self.y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex64 as C64;

    #[test]
    fn exponential_decay() {
        let opts = StepperOptions::default().with_atol(1e-12).with_rtol(1e-10);
        let f: Rhs<f64> = Box::new(|_t, y| y.mapv(|x| -x));
        let mut s = Dopri5::new(f, &opts);
        s.set_initial_value(array![1.0], 0.0);
        for &t in [0.5, 1.0, 3.0].iter() {
            let y = s.integrate(t)[0];
            assert!(s.successful());
            assert_eq!(s.t(), t);
            assert!((y - (-t).exp()).abs() < 1e-8);
        }
    }

    #[test]
    fn rotating_phase() {
        let opts = StepperOptions::default().with_high_order_defaults();
        let f: Rhs<C64> = Box::new(|_t, y| y.mapv(|x| -C64::i() * x));
        let mut s = Dopri5::new(f, &opts);
        s.set_initial_value(array![C64::new(1.0, 0.0)], 0.0);
        let t = 10.0;
        let y = s.integrate(t)[0];
        assert!((y - C64::from_polar(1.0, -t)).norm() < 1e-6);
    }

    #[test]
    fn backward_in_time() {
        let opts = StepperOptions::default().with_rtol(1e-10);
        let f: Rhs<f64> = Box::new(|t, _y| array![2.0 * t]);
        let mut s = Dopri5::new(f, &opts);
        s.set_initial_value(array![1.0], 1.0);
        let y = s.integrate(0.0)[0];
        assert!((y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn step_budget() {
        let opts = StepperOptions::default().with_nsteps(2).with_max_step(1e-3);
        let f: Rhs<f64> = Box::new(|_t, y| y.mapv(|x| -x));
        let mut s = Dopri5::new(f, &opts);
        s.set_initial_value(array![1.0], 0.0);
        s.integrate(1.0);
        assert!(!s.successful());
        assert!(s.t() > 0.0 && s.t() < 1.0);
    }
}
