//! Right-hand sides of the supported equations of motion, acting on states
//! flattened in row-major order.

use std::rc::Rc;
use ndarray::{ self as nd, s, Axis };
use num_complex::Complex64 as C64;
use num_traits::One;
use crate::{
    ode::Rhs,
    operator::Operator,
};

/// `dψ/dt = -i H ψ`, or `dψ/dt = -H ψ` in imaginary time, for `n × k` states.
pub(crate) fn schrodinger(H: Rc<Operator<C64>>, n: usize, k: usize, imaginary: bool)
    -> Rhs<C64>
{
    let coeff = if imaginary { -C64::one() } else { -C64::i() };
    Box::new(move |t, y| {
        let y = y.into_shape((n, k))
            .expect("schrodinger: state must have n·k elements");
        let mut out: nd::Array2<C64> = nd::Array2::zeros((n, k));
        H.apply_columns(t, y, out.view_mut());
        out.mapv_inplace(|x| coeff * x);
        out.into_shape(n * k)
            .expect("schrodinger: output must have n·k elements")
    })
}

/// `dρ/dt = -i [H, ρ]` for an `n × n` density matrix.
pub(crate) fn liouville(H: Rc<Operator<C64>>, n: usize) -> Rhs<C64> {
    Box::new(move |t, y| {
        let rho = y.into_shape((n, n))
            .expect("liouville: state must have n² elements");
        let mut out: nd::Array2<C64> = nd::Array2::zeros((n, n));
        H.apply_columns(t, rho, out.view_mut());
        H.apply_left_columns(t, -C64::one(), rho, out.view_mut());
        out.mapv_inplace(|x| -C64::i() * x);
        out.into_shape(n * n)
            .expect("liouville: output must have n² elements")
    })
}

/// Real-valued form of the Schrödinger equation for a real `H`: with
/// `ψ = u + i v` stored as `[u, v]`, `du/dt = H v` and `dv/dt = -H u`.
pub(crate) fn real_split(H: Rc<Operator<f64>>, n: usize, k: usize) -> Rhs<f64> {
    let m = n * k;
    Box::new(move |t, y| {
        let u = y.slice(s![..m]).into_shape((n, k))
            .expect("real_split: state must have 2·n·k elements");
        let v = y.slice(s![m..]).into_shape((n, k))
            .expect("real_split: state must have 2·n·k elements");
        let mut out: nd::Array1<f64> = nd::Array1::zeros(2 * m);
        {
            let (du, dv) = out.view_mut().split_at(Axis(0), m);
            let du = du.into_shape((n, k))
                .expect("real_split: output must have 2·n·k elements");
            let dv = dv.into_shape((n, k))
                .expect("real_split: output must have 2·n·k elements");
            H.apply_columns(t, v, du);
            H.apply_columns(t, u, dv);
        }
        out.slice_mut(s![m..]).mapv_inplace(|x| -x);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_traits::Zero;
    use crate::{ dtype::Element, sparse::CsMatrix };

    fn sx<T: Element>() -> Operator<T> {
        let one = T::one();
        let zero = T::zero();
        Operator::from_static(CsMatrix::from_dense(&array![[zero, one], [one, zero]]))
            .unwrap()
    }

    #[test]
    fn schrodinger_rhs() {
        let f = schrodinger(Rc::new(sx()), 2, 1, false);
        let y = array![C64::one(), C64::zero()];
        assert_eq!(f(0.0, y.view()), array![C64::zero(), -C64::i()]);
        let g = schrodinger(Rc::new(sx()), 2, 1, true);
        assert_eq!(g(0.0, y.view()), array![C64::zero(), -C64::one()]);
    }

    #[test]
    fn liouville_rhs_vanishes_on_commuting_state() {
        let f = liouville(Rc::new(sx()), 2);
        let half = C64::new(0.5, 0.0);
        let rho = array![half, half, half, half];
        assert!(f(0.0, rho.view()).iter().all(|x| x.norm() < 1e-15));
    }

    #[test]
    fn real_split_matches_complex_form() {
        let f = real_split(Rc::new(sx()), 2, 1);
        // ψ = (1, i): u = (1, 0), v = (0, 1)
        let y = array![1.0, 0.0, 0.0, 1.0];
        let dy = f(0.0, y.view());
        let g = schrodinger(Rc::new(sx()), 2, 1, false);
        let dpsi = g(0.0, array![C64::one(), C64::i()].view());
        for j in 0..2 {
            assert_eq!(dy[j], dpsi[j].re);
            assert_eq!(dy[2 + j], dpsi[j].im);
        }
    }
}
