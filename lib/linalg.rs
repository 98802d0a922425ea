//! Eigensolvers and matrix-free adapters for an operator frozen at a single
//! time.
//!
//! Partial decompositions use a Lanczos iteration with full
//! reorthogonalization that only touches the operator through
//! matrix-vector products; full decompositions evaluate a dense matrix and hand
//! it to LAPACK.

use std::cell::OnceCell;
use ndarray::{ self as nd, Axis };
use ndarray_linalg::{ EigValshInto, EighInto, UPLO };
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use serde::{ Deserialize, Serialize };
use tracing::debug;
use crate::{
    dtype::Element,
    error::{ OperatorError, OpResult },
    operator::Operator,
};

/// Something that can be applied to vectors without being stored as a matrix.
pub trait LinearOperator<A> {
    fn shape(&self) -> (usize, usize);

    /// Compute `A x`.
    fn matvec(&self, x: nd::ArrayView1<A>) -> nd::Array1<A>;

    /// Compute `A† x`.
    fn rmatvec(&self, x: nd::ArrayView1<A>) -> nd::Array1<A>;

    /// Compute `A X` for a matrix of column vectors.
    fn matmat(&self, x: nd::ArrayView2<A>) -> nd::Array2<A>;
}

/// An [`Operator`] evaluated at a fixed time, applied on demand.
#[derive(Debug)]
pub struct OperatorAt<'a, T: Element> {
    op: &'a Operator<T>,
    adjoint: OnceCell<Operator<T>>,
    t: f64,
}

impl<'a, T: Element> OperatorAt<'a, T> {
    pub fn time(&self) -> f64 { self.t }
}

impl<'a, T: Element> LinearOperator<T> for OperatorAt<'a, T> {
    fn shape(&self) -> (usize, usize) { self.op.shape() }

    fn matvec(&self, x: nd::ArrayView1<T>) -> nd::Array1<T> {
        let mut out: nd::Array1<T> = nd::Array1::zeros(self.op.shape().0);
        self.op.apply_columns(
            self.t, x.insert_axis(Axis(1)), out.view_mut().insert_axis(Axis(1)));
        out
    }

    fn rmatvec(&self, x: nd::ArrayView1<T>) -> nd::Array1<T> {
        let adj = self.adjoint.get_or_init(|| self.op.adjoint());
        let mut out: nd::Array1<T> = nd::Array1::zeros(adj.shape().0);
        adj.apply_columns(
            self.t, x.insert_axis(Axis(1)), out.view_mut().insert_axis(Axis(1)));
        out
    }

    fn matmat(&self, x: nd::ArrayView2<T>) -> nd::Array2<T> {
        let mut out: nd::Array2<T>
            = nd::Array2::zeros((self.op.shape().0, x.ncols()));
        self.op.apply_columns(self.t, x, out.view_mut());
        out
    }
}

/// End of the spectrum to return from [`Operator::eigsh`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Which {
    /// Algebraically smallest eigenvalues.
    #[default]
    Smallest,
    /// Algebraically largest eigenvalues.
    Largest,
}

/// Options for [`Operator::eigsh`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigshOptions {
    /// Number of eigenpairs.
    pub k: usize,
    pub which: Which,
    /// Relative residual below which a Ritz pair is accepted.
    pub tol: f64,
    /// Maximum Krylov dimension; defaults to the operator dimension.
    pub max_iter: Option<usize>,
    /// Seed for the random starting vector.
    pub seed: u64,
}

impl Default for EigshOptions {
    fn default() -> Self {
        Self { k: 6, which: Which::Smallest, tol: 1e-10, max_iter: None, seed: 10546 }
    }
}

impl EigshOptions {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_which(mut self, which: Which) -> Self {
        self.which = which;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn real<T: Element>(x: f64) -> T { T::from_c64(C64::new(x, 0.0)) }

fn vdot<T: Element>(a: &nd::Array1<T>, b: &nd::Array1<T>) -> T {
    a.iter().zip(b).fold(T::zero(), |acc, (x, y)| acc + x.conj() * *y)
}

fn norm<T: Element>(a: &nd::Array1<T>) -> f64 {
    a.iter().map(|x| x.modulus().powi(2)).sum::<f64>().sqrt()
}

// remove the components of `w` along every vector in `basis`; done twice to
// keep orthogonality at working precision
fn orthogonalize<T: Element>(w: &mut nd::Array1<T>, basis: &[nd::Array1<T>]) {
    for _ in 0..2 {
        for q in basis.iter() {
            let c = vdot(q, w);
            w.scaled_add(-c, q);
        }
    }
}

// random unit vector orthogonal to `basis`
fn random_start<T: Element>(
    rng: &mut StdRng,
    n: usize,
    basis: &[nd::Array1<T>],
) -> Option<nd::Array1<T>>
{
    for _ in 0..10 {
        let mut v: nd::Array1<T>
            = (0..n)
            .map(|_| {
                T::from_c64(C64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
            })
            .collect();
        orthogonalize(&mut v, basis);
        let nv = norm(&v);
        if nv > T::atol() {
            v.mapv_inplace(|x| x * real::<T>(nv.recip()));
            return Some(v);
        }
    }
    None
}

impl<T: Element> Operator<T> {
    /// Wrap the operator at time `t` as a matrix-free [`LinearOperator`].
    pub fn as_linear_operator(&self, t: f64) -> OperatorAt<'_, T> {
        OperatorAt { op: self, adjoint: OnceCell::new(), t }
    }

    fn check_square(&self) -> OpResult<()> {
        if self.shape.0 == self.shape.1 {
            Ok(())
        } else {
            Err(OperatorError::NotSquare(self.shape))
        }
    }

    /// Compute `k` eigenpairs at one end of the spectrum of `H(t)`, assumed
    /// Hermitian, with a Lanczos iteration.
    ///
    /// Eigenvalues are returned in ascending order with the corresponding
    /// eigenvectors as columns.
    pub fn eigsh(&self, t: f64, options: &EigshOptions)
        -> OpResult<(nd::Array1<T::Real>, nd::Array2<T>)>
    {
        self.check_square()?;
        let n = self.dim();
        if n == 0 { return Ok((nd::Array1::zeros(0), nd::Array2::zeros((0, 0)))); }
        let k = options.k;
        if k == 0 || k > n {
            return Err(OperatorError::InvalidEigenRequest(
                format!("k = {} for an operator of dimension {}", k, n)));
        }
        let max_iter = options.max_iter.unwrap_or(n).min(n);
        if max_iter < k {
            return Err(OperatorError::InvalidEigenRequest(
                format!("max_iter = {} is smaller than k = {}", max_iter, k)));
        }
        let H = self.as_linear_operator(t);
        let mut rng = StdRng::seed_from_u64(options.seed);

        let mut basis: Vec<nd::Array1<T>> = Vec::new();
        let mut alpha: Vec<f64> = Vec::new();
        // beta[j] couples basis vectors j and j + 1
        let mut beta: Vec<f64> = Vec::new();
        let mut v = random_start(&mut rng, n, &basis)
            .ok_or(OperatorError::NoConvergence { iters: 0 })?;
        let mut target = (2 * k + 1).max(20).min(max_iter);
        loop {
            while basis.len() < target {
                let mut w = H.matvec(v.view());
                alpha.push(vdot(&v, &w).to_c64().re);
                basis.push(v.clone());
                orthogonalize(&mut w, &basis);
                let b = norm(&w);
                if basis.len() == n {
                    beta.push(b);
                    break;
                }
                if b <= T::atol() {
                    debug!(step = basis.len(), "Lanczos breakdown; restarting");
                    beta.push(0.0);
                    v = random_start(&mut rng, n, &basis)
                        .ok_or(OperatorError::NoConvergence { iters: basis.len() })?;
                } else {
                    beta.push(b);
                    w.mapv_inplace(|x| x * real::<T>(b.recip()));
                    v = w;
                }
            }
            let m = basis.len();
            let mut tri: nd::Array2<T> = nd::Array2::zeros((m, m));
            for j in 0..m {
                tri[[j, j]] = real(alpha[j]);
                if j + 1 < m {
                    tri[[j, j + 1]] = real(beta[j]);
                    tri[[j + 1, j]] = real(beta[j]);
                }
            }
            let (theta, S) = tri.eigh_into(UPLO::Lower)?;
            let idx: Vec<usize>
                = match options.which {
                    Which::Smallest => (0..k).collect(),
                    Which::Largest => (m - k..m).collect(),
                };
            let b_last = beta[m - 1];
            let converged
                = m == n
                || idx.iter().all(|&i| {
                    let scale = T::from_real(theta[i]).modulus().max(1.0);
                    b_last * S[[m - 1, i]].modulus() <= options.tol * scale
                });
            debug!(krylov_dim = m, converged, "Lanczos iteration");
            if converged {
                let mut V: nd::Array2<T> = nd::Array2::zeros((n, m));
                V.axis_iter_mut(Axis(1))
                    .zip(basis.iter())
                    .for_each(|(mut col, q)| col.assign(q));
                let vals: nd::Array1<T::Real> = idx.iter().map(|&i| theta[i]).collect();
                let vecs = V.dot(&S.select(Axis(1), &idx));
                return Ok((vals, vecs));
            }
            if m >= max_iter {
                return Err(OperatorError::NoConvergence { iters: m });
            }
            target = (2 * m).min(max_iter);
        }
    }

    /// Compute all eigenpairs of `H(t)`, assumed Hermitian, with a dense
    /// LAPACK solver.
    pub fn eigh(&self, t: f64) -> OpResult<(nd::Array1<T::Real>, nd::Array2<T>)> {
        self.check_square()?;
        if self.dim() == 0 {
            return Ok((nd::Array1::zeros(0), nd::Array2::zeros((0, 0))));
        }
        Ok(self.dense_at(t).eigh_into(UPLO::Lower)?)
    }

    /// Compute all eigenvalues of `H(t)`, assumed Hermitian, in ascending
    /// order.
    pub fn eigvalsh(&self, t: f64) -> OpResult<nd::Array1<T::Real>> {
        self.check_square()?;
        if self.dim() == 0 { return Ok(nd::Array1::zeros(0)); }
        Ok(self.dense_at(t).eigvalsh_into(UPLO::Lower)?)
    }
}
