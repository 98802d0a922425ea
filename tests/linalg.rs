#![allow(non_snake_case)]

use approx::assert_abs_diff_eq;
use ndarray::{ self as nd, array };
use num_complex::Complex64 as C64;
use td_hamiltonian::{
    CsMatrix,
    Drive,
    EigshOptions,
    LinearOperator,
    Operator,
    Which,
};

fn ramp(t: f64, args: &[f64]) -> f64 { args[0] * t }

// open tight-binding chain with a linear potential switched on over time
fn stark_chain(n: usize) -> Operator<f64> {
    let hops = (0..n - 1).flat_map(|i| [(i, i + 1, -1.0), (i + 1, i, -1.0)]);
    let tilt = (0..n).map(|i| (i, i, i as f64 - (n as f64 - 1.0) / 2.0));
    Operator::builder()
        .static_term(CsMatrix::from_triplets((n, n), hops).unwrap())
        .dynamic_term(
            CsMatrix::from_triplets((n, n), tilt).unwrap(),
            Drive::new(ramp, vec![0.2]),
        )
        .build()
        .unwrap()
}

// -----------------------------------------------------------------------------

#[test]
fn lanczos_eigenpairs_are_accurate() {
    let H = stark_chain(60);
    let t = 1.5;
    let exact = H.eigvalsh(t).unwrap();
    for which in [Which::Smallest, Which::Largest] {
        let opts = EigshOptions::default().with_k(4).with_which(which);
        let (vals, vecs) = H.eigsh(t, &opts).unwrap();
        assert_eq!(vals.len(), 4);
        assert_eq!(vecs.dim(), (60, 4));
        let offset = if which == Which::Smallest { 0 } else { 56 };
        for j in 0..4 {
            assert_abs_diff_eq!(vals[j], exact[offset + j], epsilon = 1e-8);
            let v = vecs.column(j);
            let residual = H.dot(&v, t).unwrap() - &v.mapv(|x| x * vals[j]);
            let r = residual.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!(r < 1e-6);
        }
    }
}

#[test]
fn full_decomposition_diagonalizes() {
    let H = stark_chain(8);
    let t = -0.4;
    let (vals, vecs) = H.eigh(t).unwrap();
    let D = vecs.t().dot(&H.to_dense(t)).dot(&vecs);
    for i in 0..8 {
        for j in 0..8 {
            let expected = if i == j { vals[i] } else { 0.0 };
            assert_abs_diff_eq!(D[[i, j]], expected, epsilon = 1e-10);
        }
    }
}

#[test]
fn matrix_free_products() {
    fn phase(t: f64, _args: &[f64]) -> C64 { C64::from_polar(1.0, t) }
    let (zero, one) = (C64::new(0.0, 0.0), C64::new(1.0, 0.0));
    let raise = array![[zero, one], [zero, zero]];
    let H: Operator<C64> = Operator::builder()
        .dynamic_term(CsMatrix::from_dense(&raise), Drive::new(phase, Vec::new()))
        .build()
        .unwrap();
    let t = 0.8;
    let A = H.as_linear_operator(t);
    assert_eq!(A.shape(), (2, 2));
    assert_eq!(A.time(), t);
    let e0 = array![one, zero];
    let e1 = array![zero, one];
    let Ae1 = A.matvec(e1.view());
    assert!((Ae1[0] - C64::from_polar(1.0, t)).norm() < 1e-15);
    let Ahe0 = A.rmatvec(e0.view());
    assert!((Ahe0[1] - C64::from_polar(1.0, -t)).norm() < 1e-15);
    let X = nd::stack(nd::Axis(1), &[e0.view(), e1.view()]).unwrap();
    assert_eq!(A.matmat(X.view()), H.to_dense(t));
}
