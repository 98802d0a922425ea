#![allow(non_snake_case)]

use ndarray as nd;
use proptest::prelude::*;
use td_hamiltonian::{ Drive, Operand, Operator };

fn cosine(t: f64, args: &[f64]) -> f64 { (args[0] * t).cos() }

fn ramp(t: f64, args: &[f64]) -> f64 { args[0] * t }

fn max_diff(a: &nd::Array2<f64>, b: &nd::Array2<f64>) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

fn matrix3() -> impl Strategy<Value = nd::Array2<f64>> {
    prop::collection::vec(-1.0_f64..1.0, 9)
        .prop_map(|v| nd::Array2::from_shape_vec((3, 3), v).unwrap())
}

fn operator3(freq: f64) -> impl Strategy<Value = Operator<f64>> {
    (matrix3(), matrix3(), any::<bool>())
        .prop_map(move |(h0, h1, dense)| {
            let h1: nd::Array2<f64>
                = if dense { h1 } else { h1.mapv(|x| if x.abs() < 0.5 { 0.0 } else { x }) };
            let op = Operator::builder()
                .static_term(h0)
                .dynamic_term(
                    td_hamiltonian::CsMatrix::from_dense(&h1),
                    Drive::new(cosine, vec![freq]),
                )
                .build()
                .unwrap();
            if dense { op.as_dense_format() } else { op }
        })
}

// -----------------------------------------------------------------------------

proptest! {
    #[test]
    fn evaluation_is_additive(
        a in operator3(1.0),
        b in operator3(2.0),
        t in -3.0_f64..3.0,
    ) {
        let sum = a.plus(&b).unwrap();
        let expected = a.to_dense(t) + b.to_dense(t);
        prop_assert!(max_diff(&sum.to_dense(t), &expected) < 1e-12);
        let diff = &a - &b;
        let expected = a.to_dense(t) - b.to_dense(t);
        prop_assert!(max_diff(&diff.to_dense(t), &expected) < 1e-12);
    }

    #[test]
    fn evaluation_is_multiplicative(
        a in operator3(1.0),
        b in operator3(2.0),
        t in -3.0_f64..3.0,
    ) {
        let prod = a.times(&b).unwrap();
        let expected = a.to_dense(t).dot(&b.to_dense(t));
        prop_assert!(max_diff(&prod.to_dense(t), &expected) < 1e-12);
        let rprod = a.rtimes(&b).unwrap();
        let expected = b.to_dense(t).dot(&a.to_dense(t));
        prop_assert!(max_diff(&rprod.to_dense(t), &expected) < 1e-12);
    }

    #[test]
    fn scaling_commutes_with_evaluation(
        a in operator3(1.0),
        s in -4.0_f64..4.0,
        t in -3.0_f64..3.0,
    ) {
        let scaled = &a * s;
        let expected = a.to_dense(t) * s;
        prop_assert!(max_diff(&scaled.to_dense(t), &expected) < 1e-12);
    }

    #[test]
    fn adjoint_is_an_involution(a in operator3(1.0), t in -3.0_f64..3.0) {
        let aa = a.adjoint().adjoint();
        prop_assert_eq!(aa.num_dynamic(), a.num_dynamic());
        prop_assert!(max_diff(&aa.to_dense(t), &a.to_dense(t)) < 1e-14);
        prop_assert!(max_diff(&a.adjoint().to_dense(t), &a.to_dense(t).t().to_owned()) < 1e-14);
    }

    #[test]
    fn add_then_subtract_prunes(a in operator3(1.0), h in matrix3()) {
        let b: Operator<f64> = Operator::builder()
            .dynamic_term(h, Drive::new(ramp, vec![1.0]))
            .build()
            .unwrap();
        let c = a.plus(&b).unwrap().minus(&b).unwrap();
        prop_assert_eq!(c.num_dynamic(), a.num_dynamic());
        prop_assert!(c.dynamic_term(&Drive::new(ramp, vec![1.0])).is_none());
    }
}

// -----------------------------------------------------------------------------

#[test]
fn dynamic_products_are_keyed_by_drive_products() {
    let f1 = Drive::new(cosine, vec![1.0]);
    let f2 = Drive::new(ramp, vec![3.0]);
    let x = nd::array![[0.0, 1.0], [1.0, 0.0]];
    let z = nd::array![[1.0, 0.0], [0.0, -1.0]];
    let a: Operator<f64> = Operator::builder()
        .dynamic_term(x.clone(), f1.clone())
        .build()
        .unwrap();
    let b: Operator<f64> = Operator::builder()
        .dynamic_term(z.clone(), f2.clone())
        .build()
        .unwrap();
    let ab = &a * &b;
    assert_eq!(ab.num_dynamic(), 1);
    let term = ab.dynamic_term(&f1.product(&f2)).unwrap();
    assert_eq!(term.to_dense(), x.dot(&z));
    assert!(ab.static_part().is_almost_zero());
    let t = 0.7_f64;
    let expected = x.dot(&z) * (t.cos() * 3.0 * t);
    assert!(max_diff(&ab.to_dense(t), &expected) < 1e-14);
}

#[test]
fn complex_scalars_promote() {
    use num_complex::Complex64 as C64;
    let a: Operator<f64> = Operator::identity(2);
    let b = a.times(Operand::Scalar(C64::i())).unwrap();
    assert_eq!(b.dtype(), td_hamiltonian::DType::Complex128);
    assert_eq!(b.get(0.0, 1, 1).unwrap(), C64::i());
    let mut a = a;
    assert!(matches!(
        a.times_assign(Operand::Scalar(C64::i())),
        Err(td_hamiltonian::OperatorError::UnsafeCast { .. }),
    ));
}
