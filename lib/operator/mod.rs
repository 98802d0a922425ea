//! Time-dependent operators `H(t) = H0 + Σ_f f(t) H_f`.
//!
//! An [`Operator`] holds a static matrix `H0` and an insertion-ordered map from
//! [`Drive`]s to coefficient matrices `H_f`. Terms sharing a drive are merged,
//! and any stored matrix that becomes numerically zero (every element within
//! `100 ε` of zero for the element type) is pruned: dynamic terms are removed
//! and the static part is replaced by an empty sparse matrix.
//!
//! Storage is sparse unless a dense matrix has been mixed in, in which case
//! every term touched by that operation becomes dense. [`Operator::is_dense`]
//! reports whether any stored matrix is dense.

use std::{
    cell::Cell,
    fmt,
    hash::BuildHasherDefault,
};
use indexmap::IndexMap;
use ndarray as nd;
use rustc_hash::FxHasher;
use tracing::{ debug, warn };
use crate::{
    basis::{ Checks, DynamicOpTerm, OpTerm, OperatorBasis },
    drive::Drive,
    dtype::{ DType, Element },
    error::{ OperatorError, OpResult },
    matrix::Matrix,
    sparse::CsMatrix,
};

pub mod arith;
pub mod apply;

/// Map from drives to their coefficient matrices.
pub type DynamicMap<T> = IndexMap<Drive<T>, Matrix<T>, BuildHasherDefault<FxHasher>>;

/// A static matrix plus a sum of drive-scaled matrices.
#[derive(Clone, Debug)]
pub struct Operator<T: Element> {
    pub(crate) shape: (usize, usize),
    pub(crate) static_part: Matrix<T>,
    pub(crate) dynamic: DynamicMap<T>,
    pub(crate) is_dense: bool,
    warned_dense: Cell<bool>,
}

impl<T: Element> Operator<T> {
    // assemble from parts; merges nothing but prunes zeros
    pub(crate) fn from_parts(
        shape: (usize, usize),
        static_part: Matrix<T>,
        dynamic: DynamicMap<T>,
    ) -> Self
    {
        let mut new = Self {
            shape,
            static_part,
            dynamic,
            is_dense: false,
            warned_dense: Cell::new(false),
        };
        new.prune();
        new
    }

    /// Create an operator with no terms acting on an `n`-dimensional space.
    pub fn zeros(n: usize) -> Self {
        Self::from_parts((n, n), Matrix::zeros((n, n)), DynamicMap::default())
    }

    /// Create an `n × n` identity operator.
    pub fn identity(n: usize) -> Self {
        Self::from_parts(
            (n, n),
            Matrix::Sparse(CsMatrix::eye(n)),
            DynamicMap::default(),
        )
    }

    /// Create a time-independent operator from a single square matrix.
    pub fn from_static<M>(m: M) -> OpResult<Self>
    where M: Into<Matrix<T>>
    {
        OperatorBuilder::new().static_term(m).build()
    }

    /// Start building an operator term by term.
    pub fn builder<'b>() -> OperatorBuilder<'b, T> { OperatorBuilder::new() }

    pub fn shape(&self) -> (usize, usize) { self.shape }

    /// Dimension of the space the operator acts on.
    pub fn dim(&self) -> usize { self.shape.0 }

    pub fn dtype(&self) -> DType { T::DTYPE }

    /// Return `true` if any stored matrix is dense.
    pub fn is_dense(&self) -> bool { self.is_dense }

    pub fn static_part(&self) -> &Matrix<T> { &self.static_part }

    pub fn dynamic(&self) -> &DynamicMap<T> { &self.dynamic }

    /// Coefficient matrix of a drive, if present.
    pub fn dynamic_term(&self, drive: &Drive<T>) -> Option<&Matrix<T>> {
        self.dynamic.get(drive)
    }

    pub(crate) fn update_is_dense(&mut self) {
        self.is_dense
            = self.static_part.is_dense()
            || self.dynamic.values().any(|m| m.is_dense());
    }

    /// Remove every numerically zero term and recompute [`Self::is_dense`].
    pub(crate) fn prune(&mut self) {
        if self.static_part.is_almost_zero() {
            self.static_part = Matrix::zeros(self.shape);
        } else {
            self.static_part.eliminate_zeros();
        }
        self.dynamic.retain(|_, m| !m.is_almost_zero());
        self.dynamic.values_mut().for_each(|m| m.eliminate_zeros());
        self.update_is_dense();
    }

    /// Merge `m` into the term for `drive`, removing the term if it cancels.
    pub(crate) fn insert_term(
        dynamic: &mut DynamicMap<T>,
        drive: Drive<T>,
        m: Matrix<T>,
    ) {
        if let Some(existing) = dynamic.get_mut(&drive) {
            let sum = existing.add(&m);
            if sum.is_almost_zero() {
                dynamic.shift_remove(&drive);
            } else {
                *existing = sum;
            }
        } else if !m.is_almost_zero() {
            dynamic.insert(drive, m);
        }
    }

    pub(crate) fn warn_dense_mixing(&self, other_dense: bool) {
        if other_dense && !self.is_dense {
            warn!(
                shape = ?self.shape,
                "mixing dense objects will cast internal matrices to dense"
            );
        }
    }

    /// Evaluate at time `t` into a sparse or dense matrix, depending on
    /// [`Self::is_dense`].
    pub fn eval(&self, t: f64) -> Matrix<T> {
        if self.is_dense {
            Matrix::Dense(self.dense_at(t))
        } else {
            Matrix::Sparse(self.to_sparse(t))
        }
    }

    /// Evaluate at time `t` into a sparse matrix.
    pub fn to_sparse(&self, t: f64) -> CsMatrix<T> {
        self.dynamic.iter()
            .fold(
                self.static_part.to_sparse(),
                |acc, (f, m)| acc.add(&m.to_sparse().scale(f.eval(t))),
            )
    }

    /// Evaluate at time `t` into a dense array.
    ///
    /// Logs a warning the first time a sparse operator is densified this way.
    pub fn to_dense(&self, t: f64) -> nd::Array2<T> {
        if !self.is_dense && !self.warned_dense.get() {
            warn!(
                shape = ?self.shape,
                "converting a sparse operator to a dense array; this may be inefficient"
            );
            self.warned_dense.set(true);
        }
        self.dense_at(t)
    }

    pub(crate) fn dense_at(&self, t: f64) -> nd::Array2<T> {
        let mut H = self.static_part.to_dense();
        self.dynamic.iter()
            .for_each(|(f, m)| m.add_scaled_to(f.eval(t), &mut H));
        H
    }

    /// Matrix element `(row, col)` at time `t`.
    pub fn get(&self, t: f64, row: usize, col: usize) -> OpResult<T> {
        let oob = || OperatorError::IndexOutOfBounds { row, col, shape: self.shape };
        let mut val = self.static_part.get(row, col).ok_or_else(oob)?;
        for (f, m) in self.dynamic.iter() {
            val += f.eval(t) * m.get(row, col).ok_or_else(oob)?;
        }
        Ok(val)
    }

    /// Matrix element `(row, col)` at each of `times`.
    pub fn get_many(&self, times: &[f64], row: usize, col: usize)
        -> OpResult<nd::Array1<T>>
    {
        times.iter().map(|t| self.get(*t, row, col)).collect()
    }

    /// Main diagonal at time `t`.
    pub fn diagonal(&self, t: f64) -> nd::Array1<T> {
        self.dynamic.iter()
            .fold(
                self.static_part.diag(),
                |acc, (f, m)| acc + m.diag() * f.eval(t),
            )
    }

    /// Trace at time `t`.
    pub fn trace(&self, t: f64) -> T {
        self.dynamic.iter()
            .fold(
                self.static_part.trace(),
                |acc, (f, m)| acc + m.trace() * f.eval(t),
            )
    }

    /// Apply `f` to every stored matrix and `g` to every drive.
    fn map_terms<U, F, G>(&self, shape: (usize, usize), f: F, g: G) -> Operator<U>
    where
        U: Element,
        F: Fn(&Matrix<T>) -> Matrix<U>,
        G: Fn(&Drive<T>) -> Drive<U>,
    {
        let mut dynamic: DynamicMap<U> = DynamicMap::default();
        for (drive, m) in self.dynamic.iter() {
            Operator::insert_term(&mut dynamic, g(drive), f(m));
        }
        Operator::from_parts(shape, f(&self.static_part), dynamic)
    }

    pub fn transpose(&self) -> Self {
        let shape = (self.shape.1, self.shape.0);
        self.map_terms(shape, Matrix::transpose, Drive::clone)
    }

    /// Transpose, consuming `self`.
    pub fn into_transpose(mut self) -> Self {
        self.static_part = self.static_part.transpose();
        self.dynamic.values_mut().for_each(|m| { *m = m.transpose(); });
        self.shape = (self.shape.1, self.shape.0);
        self
    }

    /// Complex conjugate of every matrix and drive.
    pub fn conj(&self) -> Self {
        self.map_terms(self.shape, Matrix::conj, Drive::conj)
    }

    /// Complex conjugate, consuming `self`.
    pub fn into_conj(self) -> Self {
        if T::DTYPE.is_real() { return self; }
        self.conj()
    }

    /// Hermitian adjoint (conjugate transpose).
    pub fn adjoint(&self) -> Self {
        let shape = (self.shape.1, self.shape.0);
        self.map_terms(shape, |m| m.conj().transpose(), Drive::conj)
    }

    /// Hermitian adjoint, consuming `self`.
    pub fn into_adjoint(self) -> Self { self.into_conj().into_transpose() }

    /// Cast every matrix and drive to element type `U`.
    ///
    /// Casting from a complex to a real type discards imaginary parts.
    pub fn astype<U: Element>(&self) -> Operator<U> {
        self.map_terms(self.shape, Matrix::cast, Drive::cast)
    }

    /// Convert every stored matrix to dense storage.
    pub fn as_dense_format(&self) -> Self {
        self.map_terms(self.shape, |m| m.clone().densify(), Drive::clone)
    }

    /// Convert every stored matrix to sparse storage.
    pub fn as_sparse_format(&self) -> Self {
        self.map_terms(self.shape, |m| m.clone().sparsify(), Drive::clone)
    }
}

impl<T: Element> fmt::Display for Operator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "operator of shape {:?}, dtype {}, {}",
            self.shape, T::DTYPE, if self.is_dense { "dense" } else { "sparse" },
        )?;
        writeln!(f, "static:")?;
        write!(f, "{}", self.static_part)?;
        writeln!(f, "dynamic:")?;
        for (k, (drive, m)) in self.dynamic.iter().enumerate() {
            writeln!(f, "{}) drive: {}", k, drive)?;
            write!(f, "{}", m)?;
        }
        Ok(())
    }
}

/// Term-by-term builder for an [`Operator`].
///
/// The shape is taken from (in order of precedence) an explicit
/// [`dim`][Self::dim] or [`shape`][Self::shape], the basis, or the first term.
pub struct OperatorBuilder<'b, T: Element> {
    shape: Option<(usize, usize)>,
    static_terms: Vec<Matrix<T>>,
    dynamic_terms: Vec<(Matrix<T>, Drive<T>)>,
    basis: Option<&'b dyn OperatorBasis<T>>,
    static_opstrs: Vec<OpTerm<T>>,
    dynamic_opstrs: Vec<DynamicOpTerm<T>>,
    checks: Checks,
}

impl<'b, T: Element> Default for OperatorBuilder<'b, T> {
    fn default() -> Self { Self::new() }
}

impl<'b, T: Element> OperatorBuilder<'b, T> {
    pub fn new() -> Self {
        Self {
            shape: None,
            static_terms: Vec::new(),
            dynamic_terms: Vec::new(),
            basis: None,
            static_opstrs: Vec::new(),
            dynamic_opstrs: Vec::new(),
            checks: Checks::default(),
        }
    }

    /// Set the operator to act on an `n`-dimensional space.
    pub fn dim(mut self, n: usize) -> Self {
        self.shape = Some((n, n));
        self
    }

    /// Set the shape of the operator. Must be square.
    pub fn shape(mut self, shape: (usize, usize)) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Add a time-independent matrix.
    pub fn static_term<M>(mut self, m: M) -> Self
    where M: Into<Matrix<T>>
    {
        self.static_terms.push(m.into());
        self
    }

    /// Add a matrix scaled by `drive`.
    pub fn dynamic_term<M>(mut self, m: M, drive: Drive<T>) -> Self
    where M: Into<Matrix<T>>
    {
        self.dynamic_terms.push((m.into(), drive));
        self
    }

    /// Build operator-string terms through a basis.
    pub fn basis(mut self, basis: &'b dyn OperatorBasis<T>) -> Self {
        self.basis = Some(basis);
        self
    }

    /// Add an operator-string term, to be built by the basis.
    pub fn static_opstr(mut self, term: OpTerm<T>) -> Self {
        self.static_opstrs.push(term);
        self
    }

    /// Add a driven operator-string term, to be built by the basis.
    pub fn dynamic_opstr(mut self, term: OpTerm<T>, drive: Drive<T>) -> Self {
        self.dynamic_opstrs.push(DynamicOpTerm { term, drive });
        self
    }

    /// Select which checks the basis runs on operator-string terms.
    pub fn checks(mut self, checks: Checks) -> Self {
        self.checks = checks;
        self
    }

    pub fn build(self) -> OpResult<Operator<T>> {
        let Self {
            shape,
            mut static_terms,
            mut dynamic_terms,
            basis,
            static_opstrs,
            dynamic_opstrs,
            checks,
        } = self;

        let has_opstrs = !static_opstrs.is_empty() || !dynamic_opstrs.is_empty();
        if let Some(basis) = basis {
            if has_opstrs {
                basis.validate(checks, &static_opstrs, &dynamic_opstrs)?;
                if !static_opstrs.is_empty() {
                    static_terms.push(basis.build_static(&static_opstrs)?);
                }
                if !dynamic_opstrs.is_empty() {
                    dynamic_terms.extend(
                        basis.build_dynamic(&dynamic_opstrs)?
                            .into_iter()
                            .map(|(drive, m)| (m, drive))
                    );
                }
            }
        } else if has_opstrs {
            return Err(OperatorError::Basis(
                "operator-string terms require a basis".into()));
        }

        let shape
            = shape
            .or_else(|| basis.map(|b| (b.num_states(), b.num_states())))
            .or_else(|| static_terms.first().map(|m| m.shape()))
            .or_else(|| dynamic_terms.first().map(|(m, _)| m.shape()))
            .ok_or(OperatorError::MissingShape)?;
        if shape.0 != shape.1 { return Err(OperatorError::NotSquare(shape)); }
        let term_shapes
            = static_terms.iter()
            .chain(dynamic_terms.iter().map(|(m, _)| m))
            .map(|m| m.shape());
        for got in term_shapes {
            if got != shape {
                return Err(OperatorError::TermShape { expected: shape, got });
            }
        }

        let static_part
            = static_terms.into_iter()
            .reduce(|acc, m| acc.add(&m))
            .unwrap_or_else(|| Matrix::zeros(shape));
        let mut dynamic: DynamicMap<T> = DynamicMap::default();
        for (m, drive) in dynamic_terms.into_iter() {
            if m.is_exactly_zero() { continue; }
            Operator::insert_term(&mut dynamic, drive, m);
        }
        let op = Operator::from_parts(shape, static_part, dynamic);
        debug!(
            shape = ?op.shape,
            n_dynamic = op.dynamic.len(),
            dense = op.is_dense,
            "built operator"
        );
        Ok(op)
    }
}

impl<T: Element> Operator<T> {
    /// Return `true` if the operator has no dynamic terms.
    pub fn is_static(&self) -> bool { self.dynamic.is_empty() }

    /// Return `true` if every stored matrix is zero.
    pub fn is_zero(&self) -> bool {
        self.dynamic.is_empty() && self.static_part.is_exactly_zero()
    }

    /// Number of dynamic terms.
    pub fn num_dynamic(&self) -> usize { self.dynamic.len() }
}
