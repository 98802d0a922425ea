//! Sparse-or-dense matrices.
//!
//! Binary operations between two sparse matrices stay sparse; as soon as a
//! dense matrix participates, the result is dense.

use std::{ any::Any, fmt };
use ndarray as nd;
use crate::{
    dtype::Element,
    sparse::CsMatrix,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Matrix<T> {
    Sparse(CsMatrix<T>),
    Dense(nd::Array2<T>),
}

impl<T> From<CsMatrix<T>> for Matrix<T> {
    fn from(m: CsMatrix<T>) -> Self { Self::Sparse(m) }
}

impl<T> From<nd::Array2<T>> for Matrix<T> {
    fn from(a: nd::Array2<T>) -> Self { Self::Dense(a) }
}

// view `a` as an array of `P` if `T` and `P` are the same type
fn same_elem<T, P>(a: &nd::Array2<T>) -> Option<&nd::Array2<P>>
where
    T: 'static,
    P: 'static,
{
    (a as &dyn Any).downcast_ref::<nd::Array2<P>>()
}

impl<T: Element> Matrix<T> {
    /// Create an empty sparse matrix.
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self::Sparse(CsMatrix::zeros(shape))
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Sparse(m) => m.shape(),
            Self::Dense(a) => a.dim(),
        }
    }

    pub fn is_dense(&self) -> bool { matches!(self, Self::Dense(_)) }

    pub fn is_sparse(&self) -> bool { matches!(self, Self::Sparse(_)) }

    pub fn to_dense(&self) -> nd::Array2<T> {
        match self {
            Self::Sparse(m) => m.to_dense(),
            Self::Dense(a) => a.clone(),
        }
    }

    pub fn into_dense(self) -> nd::Array2<T> {
        match self {
            Self::Sparse(m) => m.to_dense(),
            Self::Dense(a) => a,
        }
    }

    pub fn to_sparse(&self) -> CsMatrix<T> {
        match self {
            Self::Sparse(m) => m.clone(),
            Self::Dense(a) => CsMatrix::from_dense(a),
        }
    }

    pub fn into_sparse(self) -> CsMatrix<T> {
        match self {
            Self::Sparse(m) => m,
            Self::Dense(a) => CsMatrix::from_dense(&a),
        }
    }

    /// Convert to dense storage, keeping the values.
    pub fn densify(self) -> Self { Self::Dense(self.into_dense()) }

    /// Convert to sparse storage, keeping the values.
    pub fn sparsify(self) -> Self { Self::Sparse(self.into_sparse()) }

    pub fn cast<U: Element>(&self) -> Matrix<U> {
        match self {
            Self::Sparse(m) => Matrix::Sparse(m.cast()),
            Self::Dense(a) => Matrix::Dense(a.mapv(|v| v.cast())),
        }
    }

    pub fn conj(&self) -> Self {
        match self {
            Self::Sparse(m) => Self::Sparse(m.conj()),
            Self::Dense(a) => Self::Dense(a.mapv(|v| v.conj())),
        }
    }

    pub fn transpose(&self) -> Self {
        match self {
            Self::Sparse(m) => Self::Sparse(m.transpose()),
            Self::Dense(a) => Self::Dense(a.t().to_owned()),
        }
    }

    pub fn scale(&self, c: T) -> Self {
        match self {
            Self::Sparse(m) => Self::Sparse(m.scale(c)),
            Self::Dense(a) => Self::Dense(a * c),
        }
    }

    pub fn scale_mut(&mut self, c: T) {
        match self {
            Self::Sparse(m) => { *m = m.scale(c); },
            Self::Dense(a) => { a.mapv_inplace(|v| v * c); },
        }
    }

    /// Elementwise sum.
    ///
    /// *Panics* if the shapes differ.
    pub fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Sparse(a), Self::Sparse(b)) => Self::Sparse(a.add(b)),
            (Self::Sparse(a), Self::Dense(b)) => {
                let mut c = b.clone();
                a.add_scaled_to(T::one(), &mut c);
                Self::Dense(c)
            },
            (Self::Dense(a), Self::Sparse(b)) => {
                let mut c = a.clone();
                b.add_scaled_to(T::one(), &mut c);
                Self::Dense(c)
            },
            (Self::Dense(a), Self::Dense(b)) => Self::Dense(a + b),
        }
    }

    /// Elementwise difference.
    ///
    /// *Panics* if the shapes differ.
    pub fn sub(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Sparse(a), Self::Sparse(b)) => Self::Sparse(a.sub(b)),
            (Self::Sparse(a), Self::Dense(b)) => {
                let mut c = b.mapv(|v| -v);
                a.add_scaled_to(T::one(), &mut c);
                Self::Dense(c)
            },
            (Self::Dense(a), Self::Sparse(b)) => {
                let mut c = a.clone();
                b.add_scaled_to(-T::one(), &mut c);
                Self::Dense(c)
            },
            (Self::Dense(a), Self::Dense(b)) => Self::Dense(a - b),
        }
    }

    /// Matrix product `self · other`.
    ///
    /// *Panics* if the inner dimensions differ.
    pub fn matmul(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Sparse(a), Self::Sparse(b)) => Self::Sparse(a.matmul(b)),
            (Self::Sparse(a), Self::Dense(b)) => Self::Dense(a.matmul_dense(b)),
            (Self::Dense(a), Self::Sparse(b)) => Self::Dense(b.left_matmul_dense(a)),
            (Self::Dense(a), Self::Dense(b)) => Self::Dense(a.dot(b)),
        }
    }

    /// Add `coeff · self` to a dense array of the same shape.
    pub fn add_scaled_to(&self, coeff: T, out: &mut nd::Array2<T>) {
        match self {
            Self::Sparse(m) => m.add_scaled_to(coeff, out),
            Self::Dense(a) => out.scaled_add(coeff, a),
        }
    }

    /// Accumulate `coeff · self · x` into `out`, where the elements of `self`
    /// are cast to the element type of `x`.
    pub fn apply_into<P: Element>(
        &self,
        coeff: P,
        x: nd::ArrayView2<P>,
        mut out: nd::ArrayViewMut2<P>,
    ) {
        match self {
            Self::Sparse(m) => m.apply_into(coeff, x, out),
            Self::Dense(a) => {
                if let Some(a) = same_elem::<T, P>(a) {
                    nd::linalg::general_mat_mul(coeff, a, &x, P::one(), &mut out);
                } else {
                    let a: nd::Array2<P> = a.mapv(|v| v.cast());
                    nd::linalg::general_mat_mul(coeff, &a, &x, P::one(), &mut out);
                }
            },
        }
    }

    /// Accumulate `coeff · x · self` into `out`, where the elements of `self`
    /// are cast to the element type of `x`.
    pub fn apply_left_into<P: Element>(
        &self,
        coeff: P,
        x: nd::ArrayView2<P>,
        mut out: nd::ArrayViewMut2<P>,
    ) {
        match self {
            Self::Sparse(m) => m.apply_left_into(coeff, x, out),
            Self::Dense(a) => {
                if let Some(a) = same_elem::<T, P>(a) {
                    nd::linalg::general_mat_mul(coeff, &x, a, P::one(), &mut out);
                } else {
                    let a: nd::Array2<P> = a.mapv(|v| v.cast());
                    nd::linalg::general_mat_mul(coeff, &x, &a, P::one(), &mut out);
                }
            },
        }
    }

    pub fn diag(&self) -> nd::Array1<T> {
        match self {
            Self::Sparse(m) => m.diag(),
            Self::Dense(a) => a.diag().to_owned(),
        }
    }

    pub fn trace(&self) -> T { self.diag().sum() }

    /// Element `(i, j)`, or `None` if out of bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        match self {
            Self::Sparse(m) => m.get(i, j),
            Self::Dense(a) => a.get((i, j)).copied(),
        }
    }

    /// Return `true` if every element is within `T::atol()` of zero.
    pub fn is_almost_zero(&self) -> bool {
        match self {
            Self::Sparse(m) => m.is_almost_zero(),
            Self::Dense(a) => a.iter().all(|v| v.modulus() <= T::atol()),
        }
    }

    /// Drop explicitly stored zeros from sparse storage.
    pub fn eliminate_zeros(&mut self) {
        if let Self::Sparse(m) = self { m.eliminate_zeros(); }
    }

    pub(crate) fn is_exactly_zero(&self) -> bool {
        match self {
            Self::Sparse(m) => m.nnz() == 0,
            Self::Dense(a) => a.iter().all(|v| v.is_zero()),
        }
    }
}

impl<T: Element> fmt::Display for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sparse(m) => write!(f, "{}", m),
            Self::Dense(a) => writeln!(f, "{}", a),
        }
    }
}
