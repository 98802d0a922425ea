#![allow(non_snake_case)]

use ndarray::{ self as nd, array };
use num_complex::Complex64 as C64;
use td_hamiltonian::{
    Checks,
    CsMatrix,
    Drive,
    DynamicOpTerm,
    Expectation,
    Matrix,
    OpResult,
    OpTerm,
    Operator,
    OperatorBasis,
    OperatorError,
};

fn linear(t: f64, _args: &[f64]) -> f64 { t }

fn c(re: f64, im: f64) -> C64 { C64::new(re, im) }

// H(t) = σx + t σz
fn driven_qubit() -> Operator<f64> {
    Operator::builder()
        .static_term(CsMatrix::from_dense(&array![[0.0, 1.0], [1.0, 0.0]]))
        .dynamic_term(
            CsMatrix::from_dense(&array![[1.0, 0.0], [0.0, -1.0]]),
            Drive::new(linear, Vec::new()),
        )
        .build()
        .unwrap()
}

// -----------------------------------------------------------------------------

#[test]
fn batched_dot_uses_one_time_per_column() {
    let H = driven_qubit();
    let v = array![[1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let times = [0.0, 2.0, -1.0];
    let out = H.dot_times(&v, &times).unwrap();
    for (j, &t) in times.iter().enumerate() {
        let col = H.dot(&v.column(j), t).unwrap();
        assert_eq!(out.column(j), col);
    }
    assert_eq!(out, array![[0.0, 2.0, 1.0], [1.0, 1.0, 1.0]]);
    assert!(matches!(
        H.dot_times(&v, &[0.0, 1.0]),
        Err(OperatorError::TimeCount { expected: 3, got: 2 }),
    ));
}

#[test]
fn static_dot_on_columns_matches_each_column() {
    let H: Operator<f64> = Operator::from_static(
        CsMatrix::from_triplets((3, 3), [(0, 1, 1.0), (1, 0, 1.0), (2, 2, -2.0)]).unwrap(),
    ).unwrap();
    assert!(H.is_static() && !H.is_dense());
    let v = array![[1.0, 0.0, 2.0], [0.0, 1.0, -1.0], [3.0, 0.5, 0.0]];
    let t = 0.7;
    let out = H.dot(&v, t).unwrap();
    assert_eq!(out.dim(), (3, 3));
    for j in 0..3 {
        assert_eq!(out.column(j), H.dot(&v.column(j), t).unwrap());
    }
    assert_eq!(out, array![[0.0, 1.0, -1.0], [1.0, 0.0, 2.0], [-6.0, -1.0, 0.0]]);
}

#[test]
fn dot_rejects_bad_states() {
    let H = driven_qubit();
    assert!(matches!(
        H.dot(&array![1.0, 0.0, 0.0], 0.0),
        Err(OperatorError::ShapeMismatch { .. }),
    ));
    assert!(matches!(
        H.dot(&nd::Array3::<f64>::zeros((2, 2, 2)), 0.0),
        Err(OperatorError::InvalidRank { .. }),
    ));
}

#[test]
fn expectation_values() {
    let H = driven_qubit();
    let plus = array![c(1.0, 0.0), c(1.0, 0.0)].mapv(|x| x / 2.0_f64.sqrt());
    let ex = H.expt_value(&plus, 3.0, false).unwrap();
    assert!((ex.single().unwrap() - c(1.0, 0.0)).norm() < 1e-14);

    let rho = array![[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(0.0, 0.0)]];
    let ex = H.expt_value(&rho, 3.0, false).unwrap();
    assert!((ex.single().unwrap() - c(3.0, 0.0)).norm() < 1e-14);
    match H.expt_value(&rho, 3.0, true).unwrap() {
        Expectation::Many(xs) => {
            assert_eq!(xs.len(), 2);
            assert!((xs[0] - c(3.0, 0.0)).norm() < 1e-14);
            assert!(xs[1].norm() < 1e-14);
        },
        Expectation::Single(_) => panic!("expected one value per column"),
    }

    let rhos = nd::stack(nd::Axis(2), &[rho.view(), rho.view()]).unwrap();
    let ex = H.expt_value_times(&rhos, &[1.0, -2.0]).unwrap();
    assert!((ex[0] - c(1.0, 0.0)).norm() < 1e-14);
    assert!((ex[1] - c(-2.0, 0.0)).norm() < 1e-14);
}

#[test]
fn matrix_elements() {
    let H = driven_qubit();
    let basis = nd::Array2::<f64>::eye(2);
    let m = H.matrix_ele(&basis, &basis, 0.5).unwrap();
    assert_eq!(m, H.to_dense(0.5));
    let d = H.matrix_ele_diag(&basis, &basis, 0.5).unwrap();
    assert_eq!(d, array![0.5, -0.5]);
    let e = H.matrix_ele_vec(&array![1.0, 0.0], &array![0.0, 1.0], 0.5).unwrap();
    assert_eq!(e, 1.0);
}

#[test]
fn evaluation_and_indexing() {
    let H = driven_qubit();
    assert_eq!(H.get(2.0, 0, 0).unwrap(), 2.0);
    assert!(matches!(H.get(2.0, 2, 0), Err(OperatorError::IndexOutOfBounds { .. })));
    assert_eq!(H.get_many(&[0.0, 1.0, 4.0], 1, 1).unwrap(), array![0.0, -1.0, -4.0]);
    assert_eq!(H.diagonal(1.5), array![1.5, -1.5]);
    assert_eq!(H.trace(1.5), 0.0);
    assert_eq!(H.to_sparse(1.0).to_dense(), array![[1.0, 1.0], [1.0, -1.0]]);
    assert!(matches!(H.eval(1.0), Matrix::Sparse(_)));
    assert!(matches!(H.as_dense_format().eval(1.0), Matrix::Dense(_)));
}

// -----------------------------------------------------------------------------

// one spin-1/2 with operator strings "x", "z", and the non-Hermitian "+"
struct Spin;

impl Spin {
    fn single(opstr: &str) -> OpResult<nd::Array2<f64>> {
        match opstr {
            "x" => Ok(array![[0.0, 1.0], [1.0, 0.0]]),
            "z" => Ok(array![[1.0, 0.0], [0.0, -1.0]]),
            "+" => Ok(array![[0.0, 1.0], [0.0, 0.0]]),
            other => Err(OperatorError::Basis(format!("unknown operator string '{other}'"))),
        }
    }

    fn sum(term: &OpTerm<f64>) -> OpResult<nd::Array2<f64>> {
        let op = Self::single(&term.opstr)?;
        Ok(
            term.couplings.iter()
                .map(|(j, _sites)| &op * *j)
                .fold(nd::Array2::zeros((2, 2)), |acc, m| acc + m)
        )
    }
}

impl OperatorBasis<f64> for Spin {
    fn num_states(&self) -> usize { 2 }

    fn check_hermitian(
        &self,
        static_terms: &[OpTerm<f64>],
        dynamic_terms: &[DynamicOpTerm<f64>],
    ) -> OpResult<()>
    {
        let all_terms = static_terms.iter().chain(dynamic_terms.iter().map(|d| &d.term));
        for term in all_terms {
            if term.opstr == "+" {
                return Err(OperatorError::Basis("operator is not Hermitian".into()));
            }
        }
        Ok(())
    }

    fn build_static(&self, terms: &[OpTerm<f64>]) -> OpResult<Matrix<f64>> {
        let mut acc = nd::Array2::zeros((2, 2));
        for term in terms {
            acc = acc + Self::sum(term)?;
        }
        Ok(CsMatrix::from_dense(&acc).into())
    }

    fn build_dynamic(&self, terms: &[DynamicOpTerm<f64>])
        -> OpResult<Vec<(Drive<f64>, Matrix<f64>)>>
    {
        terms.iter()
            .map(|d| {
                let m = Matrix::from(CsMatrix::from_dense(&Self::sum(&d.term)?));
                Ok((d.drive.clone(), m))
            })
            .collect()
    }
}

#[test]
fn build_from_basis() {
    let H: Operator<f64> = Operator::builder()
        .basis(&Spin)
        .static_opstr(OpTerm::new("x", [(1.0, vec![0])]))
        .dynamic_opstr(OpTerm::new("z", [(1.0, vec![0])]), Drive::new(linear, Vec::new()))
        .build()
        .unwrap();
    assert_eq!(H.to_dense(0.25), driven_qubit().to_dense(0.25));
    assert_eq!(H.num_dynamic(), 1);
}

#[test]
fn basis_validation() {
    let build = |checks: Checks| {
        Operator::<f64>::builder()
            .basis(&Spin)
            .static_opstr(OpTerm::new("+", [(1.0, vec![0])]))
            .checks(checks)
            .build()
    };
    assert!(matches!(build(Checks::default()), Err(OperatorError::Basis(_))));
    let H = build(Checks::none()).unwrap();
    assert_eq!(H.get(0.0, 0, 1).unwrap(), 1.0);
    assert!(matches!(
        Operator::<f64>::builder().static_opstr(OpTerm::new("x", [(1.0, vec![0])])).build(),
        Err(OperatorError::Basis(_)),
    ));
    assert!(matches!(
        Operator::<f64>::builder()
            .basis(&Spin)
            .static_opstr(OpTerm::new("y", [(1.0, vec![0])]))
            .build(),
        Err(OperatorError::Basis(_)),
    ));
}

#[test]
fn empty_operator() {
    let H: Operator<f64> = Operator::builder().dim(0).build().unwrap();
    let v = nd::Array1::<f64>::zeros(0);
    assert_eq!(H.dot(&v, 0.0).unwrap().len(), 0);
    assert!(matches!(
        H.expt_value(&v, 0.0, false).unwrap(),
        Expectation::Many(xs) if xs.is_empty(),
    ));
    assert_eq!(H.matrix_ele(&v, &v, 0.0).unwrap().dim(), (0, 0));
}
