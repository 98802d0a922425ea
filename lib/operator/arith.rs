//! Algebra on operators.
//!
//! Every binary operation takes its right-hand side as an [`Operand`] and comes
//! in two forms: a copying form returning a new operator of the promoted
//! element type, and an in-place form (`*_assign`) that requires the operand to
//! be castable into the operator's element type under same-kind rules.
//! Compatibility is checked before anything is mutated.

use std::{
    borrow::Cow,
    ops::{ Add, Mul, Neg, Sub },
};
use itertools::Itertools;
use ndarray as nd;
use tracing::debug;
use crate::{
    dtype::{ Casting, Element, Promote, Promoted },
    error::{ OperatorError, OpResult },
    matrix::Matrix,
    sparse::CsMatrix,
};
use super::{ DynamicMap, Operator };

/// Right-hand side of an operator algebra operation.
#[derive(Clone, Debug)]
pub enum Operand<'a, U: Element> {
    Scalar(U),
    Sparse(Cow<'a, CsMatrix<U>>),
    Dense(Cow<'a, nd::Array2<U>>),
    Operator(&'a Operator<U>),
}

impl<'a, U: Element> From<&'a CsMatrix<U>> for Operand<'a, U> {
    fn from(m: &'a CsMatrix<U>) -> Self { Self::Sparse(Cow::Borrowed(m)) }
}

impl<'a, U: Element> From<CsMatrix<U>> for Operand<'a, U> {
    fn from(m: CsMatrix<U>) -> Self { Self::Sparse(Cow::Owned(m)) }
}

impl<'a, U: Element> From<&'a nd::Array2<U>> for Operand<'a, U> {
    fn from(a: &'a nd::Array2<U>) -> Self { Self::Dense(Cow::Borrowed(a)) }
}

impl<'a, U: Element> From<nd::Array2<U>> for Operand<'a, U> {
    fn from(a: nd::Array2<U>) -> Self { Self::Dense(Cow::Owned(a)) }
}

impl<'a, 'b, U: Element> From<nd::ArrayView2<'b, U>> for Operand<'a, U> {
    fn from(a: nd::ArrayView2<'b, U>) -> Self { Self::Dense(Cow::Owned(a.to_owned())) }
}

impl<'a, U: Element> From<&'a Matrix<U>> for Operand<'a, U> {
    fn from(m: &'a Matrix<U>) -> Self {
        match m {
            Matrix::Sparse(m) => Self::Sparse(Cow::Borrowed(m)),
            Matrix::Dense(a) => Self::Dense(Cow::Borrowed(a)),
        }
    }
}

impl<'a, U: Element> From<&'a Operator<U>> for Operand<'a, U> {
    fn from(op: &'a Operator<U>) -> Self { Self::Operator(op) }
}

impl<'a, U: Element> Operand<'a, U> {
    /// Coerce nested rows into a dense operand.
    ///
    /// Fails if the rows have unequal lengths.
    pub fn from_rows(rows: Vec<Vec<U>>) -> OpResult<Self> {
        let n = rows.len();
        let m = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != m) {
            return Err(OperatorError::RaggedRows);
        }
        let a = nd::Array2::from_shape_vec((n, m), rows.concat())?;
        Ok(Self::Dense(Cow::Owned(a)))
    }

    /// Shape of a matrix operand; `None` for scalars.
    pub fn shape(&self) -> Option<(usize, usize)> {
        match self {
            Self::Scalar(_) => None,
            Self::Sparse(m) => Some(m.shape()),
            Self::Dense(a) => Some(a.dim()),
            Self::Operator(op) => Some(op.shape()),
        }
    }

    pub fn is_dense(&self) -> bool {
        match self {
            Self::Scalar(_) | Self::Sparse(_) => false,
            Self::Dense(_) => true,
            Self::Operator(op) => op.is_dense(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Sign { Plus, Minus }

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    /// `self · other`
    Right,
    /// `other · self`
    Left,
}

fn check_cast<U: Element, T: Element>() -> OpResult<()> {
    if U::DTYPE.can_cast(T::DTYPE, Casting::SameKind) {
        Ok(())
    } else {
        Err(OperatorError::UnsafeCast { from: U::DTYPE, to: T::DTYPE })
    }
}

fn cast_sparse<U: Element, P: Element>(m: &CsMatrix<U>) -> Matrix<P> {
    Matrix::Sparse(m.cast())
}

fn cast_dense<U: Element, P: Element>(a: &nd::Array2<U>) -> Matrix<P> {
    Matrix::Dense(a.mapv(|v| v.cast()))
}

/// Operator product `lhs · rhs`.
///
/// Static and dynamic parts are expanded term by term: `sA sB` is static,
/// `sA dB_g` and `dA_f sB` keep their drives, and `dA_f dB_g` is keyed by the
/// product drive `f * g`.
pub(crate) fn product<T: Element>(lhs: &Operator<T>, rhs: &Operator<T>)
    -> Operator<T>
{
    lhs.warn_dense_mixing(rhs.is_dense);
    rhs.warn_dense_mixing(lhs.is_dense);
    let static_part = lhs.static_part.matmul(&rhs.static_part);
    let mut dynamic: DynamicMap<T> = DynamicMap::default();
    for (g, Mg) in rhs.dynamic.iter() {
        Operator::insert_term(
            &mut dynamic, g.clone(), lhs.static_part.matmul(Mg));
    }
    for (f, Mf) in lhs.dynamic.iter() {
        Operator::insert_term(
            &mut dynamic, f.clone(), Mf.matmul(&rhs.static_part));
    }
    let pairs = lhs.dynamic.iter().cartesian_product(rhs.dynamic.iter());
    for ((f, Mf), (g, Mg)) in pairs {
        Operator::insert_term(&mut dynamic, f * g, Mf.matmul(Mg));
    }
    let out = Operator::from_parts(
        (lhs.shape.0, rhs.shape.1), static_part, dynamic);
    debug!(
        n_lhs = lhs.dynamic.len(),
        n_rhs = rhs.dynamic.len(),
        n_dynamic = out.dynamic.len(),
        "operator product"
    );
    out
}

/// Compute the commutator `[A, B] = A B - B A`.
pub fn commutator<T: Element>(A: &Operator<T>, B: &Operator<T>)
    -> OpResult<Operator<T>>
{
    A.check_shape(B.shape)?;
    let mut C = product(A, B);
    C.add_operator_mut(&product(B, A), Sign::Minus);
    Ok(C)
}

/// Compute the anti-commutator `{A, B} = A B + B A`.
pub fn anti_commutator<T: Element>(A: &Operator<T>, B: &Operator<T>)
    -> OpResult<Operator<T>>
{
    A.check_shape(B.shape)?;
    let mut C = product(A, B);
    C.add_operator_mut(&product(B, A), Sign::Plus);
    Ok(C)
}

// same-type building blocks
impl<T: Element> Operator<T> {
    fn check_shape(&self, got: (usize, usize)) -> OpResult<()> {
        if got == self.shape {
            Ok(())
        } else {
            Err(OperatorError::shape_mismatch(
                &[self.shape.0, self.shape.1], &[got.0, got.1]))
        }
    }

    fn add_matrix_mut(&mut self, m: &Matrix<T>, sign: Sign) {
        self.warn_dense_mixing(m.is_dense());
        self.static_part = match sign {
            Sign::Plus => self.static_part.add(m),
            Sign::Minus => self.static_part.sub(m),
        };
        self.prune();
    }

    fn add_operator_mut(&mut self, other: &Operator<T>, sign: Sign) {
        self.warn_dense_mixing(other.is_dense);
        self.static_part = match sign {
            Sign::Plus => self.static_part.add(&other.static_part),
            Sign::Minus => self.static_part.sub(&other.static_part),
        };
        for (f, m) in other.dynamic.iter() {
            let m = match sign {
                Sign::Plus => m.clone(),
                Sign::Minus => m.scale(-T::one()),
            };
            Operator::insert_term(&mut self.dynamic, f.clone(), m);
        }
        self.prune();
    }

    fn mul_matrix_mut(&mut self, m: &Matrix<T>, side: Side) {
        self.warn_dense_mixing(m.is_dense());
        let mul = |a: &Matrix<T>| match side {
            Side::Right => a.matmul(m),
            Side::Left => m.matmul(a),
        };
        self.static_part = mul(&self.static_part);
        self.dynamic.values_mut().for_each(|a| { *a = mul(a); });
        self.prune();
    }

    fn scale_mut(&mut self, c: T) {
        self.static_part.scale_mut(c);
        self.dynamic.values_mut().for_each(|a| a.scale_mut(c));
        self.prune();
    }

    fn combine_mut(&mut self, other: Operand<'_, T>, sign: Sign)
        -> OpResult<()>
    {
        match other {
            Operand::Scalar(s) => {
                if !s.is_zero() { return Err(OperatorError::NonzeroScalar); }
            },
            Operand::Sparse(m) => {
                self.check_shape(m.shape())?;
                self.add_matrix_mut(&Matrix::Sparse(m.into_owned()), sign);
            },
            Operand::Dense(a) => {
                self.check_shape(a.dim())?;
                self.add_matrix_mut(&Matrix::Dense(a.into_owned()), sign);
            },
            Operand::Operator(op) => {
                self.check_shape(op.shape)?;
                self.add_operator_mut(op, sign);
            },
        }
        Ok(())
    }

    fn multiply_mut(&mut self, other: Operand<'_, T>, side: Side)
        -> OpResult<()>
    {
        match other {
            Operand::Scalar(s) => { self.scale_mut(s); },
            Operand::Sparse(m) => {
                self.check_shape(m.shape())?;
                self.mul_matrix_mut(&Matrix::Sparse(m.into_owned()), side);
            },
            Operand::Dense(a) => {
                self.check_shape(a.dim())?;
                self.mul_matrix_mut(&Matrix::Dense(a.into_owned()), side);
            },
            Operand::Operator(op) => {
                self.check_shape(op.shape)?;
                *self = match side {
                    Side::Right => product(self, op),
                    Side::Left => product(op, self),
                };
            },
        }
        Ok(())
    }

    fn project_mut(&mut self, P: &Matrix<T>) -> OpResult<()> {
        let (n, m) = P.shape();
        if n != self.shape.1 {
            return Err(OperatorError::shape_mismatch(
                &[self.shape.1, m], &[n, m]));
        }
        self.warn_dense_mixing(P.is_dense());
        let Pd = P.conj().transpose();
        let sandwich = |H: &Matrix<T>| Pd.matmul(&H.matmul(P));
        self.static_part = sandwich(&self.static_part);
        self.dynamic.values_mut().for_each(|H| { *H = sandwich(H); });
        self.shape = (m, m);
        self.prune();
        Ok(())
    }
}

// re-cast an operand to the element type of the operator it acts on
fn cast_operand<'a, U, P>(other: &Operand<'a, U>) -> CastOperand<P>
where
    U: Element,
    P: Element,
{
    match other {
        Operand::Scalar(s) => CastOperand::Scalar(s.cast()),
        Operand::Sparse(m) => CastOperand::Matrix(cast_sparse(m)),
        Operand::Dense(a) => CastOperand::Matrix(cast_dense(a)),
        Operand::Operator(op) => CastOperand::Operator(op.astype()),
    }
}

enum CastOperand<P: Element> {
    Scalar(P),
    Matrix(Matrix<P>),
    Operator(Operator<P>),
}

impl<P: Element> CastOperand<P> {
    fn as_operand(&self) -> Operand<'_, P> {
        match self {
            Self::Scalar(s) => Operand::Scalar(*s),
            Self::Matrix(m) => m.into(),
            Self::Operator(op) => Operand::Operator(op),
        }
    }
}

impl<T: Element> Operator<T> {
    fn promoted_with<'a, U, F>(&self, other: Operand<'a, U>, f: F)
        -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        F: FnOnce(&mut Operator<Promoted<T, U>>, Operand<'_, Promoted<T, U>>)
            -> OpResult<()>,
    {
        let mut new: Operator<Promoted<T, U>> = self.astype();
        let cast = cast_operand::<U, Promoted<T, U>>(&other);
        f(&mut new, cast.as_operand())?;
        Ok(new)
    }

    fn in_place_with<'a, U, F>(&mut self, other: Operand<'a, U>, f: F)
        -> OpResult<&mut Self>
    where
        U: Element,
        F: FnOnce(&mut Self, Operand<'_, T>) -> OpResult<()>,
    {
        check_cast::<U, T>()?;
        let cast = cast_operand::<U, T>(&other);
        f(self, cast.as_operand())?;
        Ok(self)
    }

    /// Return `self + other`.
    ///
    /// Scalars other than zero are rejected; matrices are added to the static
    /// part; operators are merged term by term.
    pub fn plus<'a, U, O>(&self, other: O) -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        O: Into<Operand<'a, U>>,
    {
        self.promoted_with(other.into(), |op, rhs| op.combine_mut(rhs, Sign::Plus))
    }

    /// Return `self - other`.
    pub fn minus<'a, U, O>(&self, other: O) -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        O: Into<Operand<'a, U>>,
    {
        self.promoted_with(other.into(), |op, rhs| op.combine_mut(rhs, Sign::Minus))
    }

    /// Return `self · other`.
    ///
    /// Scalars scale every term; matrices multiply every term from the right;
    /// operators are expanded term by term.
    pub fn times<'a, U, O>(&self, other: O) -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        O: Into<Operand<'a, U>>,
    {
        self.promoted_with(other.into(), |op, rhs| op.multiply_mut(rhs, Side::Right))
    }

    /// Return `other · self`.
    pub fn rtimes<'a, U, O>(&self, other: O) -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        O: Into<Operand<'a, U>>,
    {
        self.promoted_with(other.into(), |op, rhs| op.multiply_mut(rhs, Side::Left))
    }

    /// Return `self / s`.
    pub fn divide<U>(&self, s: U) -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
    {
        if s.is_zero() { return Err(OperatorError::DivisionByZero); }
        self.times(Operand::Scalar(U::one() / s))
    }

    /// Return `P† · self · P`.
    ///
    /// `P` may be an `N × M` matrix, giving an `M × M` operator, or another
    /// operator of the same shape.
    pub fn project_to<'a, U, O>(&self, proj: O)
        -> OpResult<Operator<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        O: Into<Operand<'a, U>>,
    {
        self.promoted_with(proj.into(), |op, P| {
            match P {
                Operand::Scalar(_) => Err(OperatorError::UnsupportedOperand(
                    "a scalar cannot be used as a projector")),
                Operand::Sparse(m) => op.project_mut(&Matrix::Sparse(m.into_owned())),
                Operand::Dense(a) => op.project_mut(&Matrix::Dense(a.into_owned())),
                Operand::Operator(P) => {
                    op.check_shape(P.shape)?;
                    *op = product(&product(&P.adjoint(), op), P);
                    Ok(())
                },
            }
        })
    }

    /// Perform `self += other` in place.
    pub fn plus_assign<'a, U, O>(&mut self, other: O) -> OpResult<&mut Self>
    where
        U: Element,
        O: Into<Operand<'a, U>>,
    {
        self.in_place_with(other.into(), |op, rhs| op.combine_mut(rhs, Sign::Plus))
    }

    /// Perform `self -= other` in place.
    pub fn minus_assign<'a, U, O>(&mut self, other: O) -> OpResult<&mut Self>
    where
        U: Element,
        O: Into<Operand<'a, U>>,
    {
        self.in_place_with(other.into(), |op, rhs| op.combine_mut(rhs, Sign::Minus))
    }

    /// Perform `self = self · other` in place.
    pub fn times_assign<'a, U, O>(&mut self, other: O) -> OpResult<&mut Self>
    where
        U: Element,
        O: Into<Operand<'a, U>>,
    {
        self.in_place_with(other.into(), |op, rhs| op.multiply_mut(rhs, Side::Right))
    }

    /// Perform `self = other · self` in place.
    pub fn rtimes_assign<'a, U, O>(&mut self, other: O) -> OpResult<&mut Self>
    where
        U: Element,
        O: Into<Operand<'a, U>>,
    {
        self.in_place_with(other.into(), |op, rhs| op.multiply_mut(rhs, Side::Left))
    }

    /// Perform `self = self / s` in place.
    pub fn divide_assign<U: Element>(&mut self, s: U) -> OpResult<&mut Self> {
        check_cast::<U, T>()?;
        if s.is_zero() { return Err(OperatorError::DivisionByZero); }
        self.times_assign(Operand::Scalar(U::one() / s))
    }

    /// Integer power, with `pow(0)` the identity.
    pub fn pow(&self, n: u32) -> Self {
        if n == 0 { return Self::identity(self.dim()); }
        (1..n).fold(self.clone(), |acc, _| product(&acc, self))
    }
}

impl<T: Element> Neg for Operator<T> {
    type Output = Operator<T>;

    fn neg(mut self) -> Operator<T> {
        self.scale_mut(-T::one());
        self
    }
}

impl<T: Element> Neg for &Operator<T> {
    type Output = Operator<T>;

    fn neg(self) -> Operator<T> { -self.clone() }
}

/// *Panics* if the shapes differ; see [`Operator::plus`] for the fallible form.
impl<'a, T: Element> Add<&'a Operator<T>> for &'a Operator<T> {
    type Output = Operator<T>;

    fn add(self, rhs: &'a Operator<T>) -> Operator<T> {
        assert_eq!(self.shape, rhs.shape, "Operator::add: shape mismatch");
        let mut new = self.clone();
        new.add_operator_mut(rhs, Sign::Plus);
        new
    }
}

/// *Panics* if the shapes differ; see [`Operator::minus`] for the fallible
/// form.
impl<'a, T: Element> Sub<&'a Operator<T>> for &'a Operator<T> {
    type Output = Operator<T>;

    fn sub(self, rhs: &'a Operator<T>) -> Operator<T> {
        assert_eq!(self.shape, rhs.shape, "Operator::sub: shape mismatch");
        let mut new = self.clone();
        new.add_operator_mut(rhs, Sign::Minus);
        new
    }
}

/// *Panics* if the shapes differ; see [`Operator::times`] for the fallible
/// form.
impl<'a, T: Element> Mul<&'a Operator<T>> for &'a Operator<T> {
    type Output = Operator<T>;

    fn mul(self, rhs: &'a Operator<T>) -> Operator<T> {
        assert_eq!(self.shape, rhs.shape, "Operator::mul: shape mismatch");
        product(self, rhs)
    }
}

impl<'a, T: Element> Mul<T> for &'a Operator<T> {
    type Output = Operator<T>;

    fn mul(self, rhs: T) -> Operator<T> {
        let mut new = self.clone();
        new.scale_mut(rhs);
        new
    }
}
