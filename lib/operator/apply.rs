//! Application of an operator to states, expectation values, and matrix
//! elements.
//!
//! States are `N`-row arrays: a single vector, a matrix of column vectors, or
//! (for the batched-time variants) a stack of `N × N` density matrices along
//! the last axis. Results carry the promoted element type of the operator and
//! the state.

use ndarray::{ self as nd, Axis };
use num_traits::Zero;
use crate::{
    dtype::{ Element, Promote, Promoted },
    error::{ OperatorError, OpResult },
};
use super::Operator;

/// Result of [`Operator::expt_value`]: a single value for one pure state or a
/// density matrix, one value per column or slice otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum Expectation<P> {
    Single(P),
    Many(nd::Array1<P>),
}

impl<P: Element> Expectation<P> {
    /// Return the single value, if there is one.
    pub fn single(&self) -> Option<P> {
        match self {
            Self::Single(x) => Some(*x),
            Self::Many(_) => None,
        }
    }

    /// Flatten into an array; a single value gives a length-1 array.
    pub fn into_array(self) -> nd::Array1<P> {
        match self {
            Self::Single(x) => nd::array![x],
            Self::Many(xs) => xs,
        }
    }
}

// per-column `conj(a) · b`
fn column_vdots<P: Element>(a: nd::ArrayView2<P>, b: nd::ArrayView2<P>)
    -> nd::Array1<P>
{
    (&a.mapv(|x| x.conj()) * &b).sum_axis(Axis(0))
}

// `a† b`
fn adjoint_dot<P: Element>(a: nd::ArrayView2<P>, b: nd::ArrayView2<P>)
    -> nd::Array2<P>
{
    a.t().mapv(|x| x.conj()).dot(&b)
}

// sum of the diagonal of a square slice
fn slice_trace<P: Element>(a: nd::ArrayView2<P>) -> P { a.diag().sum() }

// view an array of rank 1 or 2 as a matrix of columns
fn as_columns<A, D>(a: nd::Array<A, D>) -> nd::Array2<A>
where
    A: Clone,
    D: nd::Dimension,
{
    let n = a.shape()[0];
    let k = a.shape().get(1).copied().unwrap_or(1);
    let a
        = if a.is_standard_layout() {
            a
        } else {
            a.as_standard_layout().into_owned()
        };
    a.into_shape((n, k))
        .expect("as_columns: array of rank 1 or 2 must be reshapeable")
}

impl<T: Element> Operator<T> {
    /// Accumulate-free `out = H(t) x`, with `x` stored as columns.
    pub(crate) fn apply_columns<P: Element>(
        &self,
        t: f64,
        x: nd::ArrayView2<P>,
        mut out: nd::ArrayViewMut2<P>,
    ) {
        out.fill(P::zero());
        self.static_part.apply_into(P::one(), x, out.view_mut());
        for (f, m) in self.dynamic.iter() {
            m.apply_into(f.eval(t).cast(), x, out.view_mut());
        }
    }

    /// Accumulate `coeff · x H(t)` into `out`.
    pub(crate) fn apply_left_columns<P: Element>(
        &self,
        t: f64,
        coeff: P,
        x: nd::ArrayView2<P>,
        mut out: nd::ArrayViewMut2<P>,
    ) {
        self.static_part.apply_left_into(coeff, x, out.view_mut());
        for (f, m) in self.dynamic.iter() {
            m.apply_left_into(coeff * f.eval(t).cast(), x, out.view_mut());
        }
    }

    fn check_state(&self, shape: &[usize]) -> OpResult<()> {
        if !matches!(shape.len(), 1 | 2) {
            return Err(OperatorError::InvalidRank {
                expected: "1 or 2", got: shape.len() });
        }
        if shape[0] != self.shape.1 {
            return Err(OperatorError::shape_mismatch(
                &[self.shape.1], &shape[..1]));
        }
        Ok(())
    }

    fn check_batch(&self, shape: &[usize], times: &[f64]) -> OpResult<()> {
        match shape.len() {
            2 => { self.check_state(shape)?; },
            3 => {
                let n = self.shape.1;
                if shape[0] != n || shape[1] != n {
                    return Err(OperatorError::shape_mismatch(
                        &[n, n], &shape[..2]));
                }
            },
            r => {
                return Err(OperatorError::InvalidRank {
                    expected: "2 or 3", got: r });
            },
        }
        let batch = shape[shape.len() - 1];
        if times.len() != batch {
            return Err(OperatorError::TimeCount {
                expected: batch, got: times.len() });
        }
        Ok(())
    }

    /// Compute `H(t) v` for a vector or a matrix of column vectors.
    pub fn dot<U, S, D>(&self, v: &nd::ArrayBase<S, D>, t: f64)
        -> OpResult<nd::Array<Promoted<T, U>, D>>
    where
        U: Element,
        T: Promote<U>,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
    {
        self.check_state(v.shape())?;
        Ok(self.dot_unchecked(v, t))
    }

    /// Like [`Self::dot`], but without validation.
    ///
    /// *Panics* if `v` is not of rank 1 or 2 or has the wrong leading
    /// dimension.
    pub fn dot_unchecked<U, S, D>(&self, v: &nd::ArrayBase<S, D>, t: f64)
        -> nd::Array<Promoted<T, U>, D>
    where
        U: Element,
        T: Promote<U>,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
    {
        let x = as_columns(v.mapv(|u| u.cast::<Promoted<T, U>>()));
        let mut out: nd::Array2<Promoted<T, U>>
            = nd::Array2::zeros((self.shape.0, x.ncols()));
        self.apply_columns(t, x.view(), out.view_mut());
        let mut dim = v.raw_dim();
        dim[0] = self.shape.0;
        out.into_shape(dim)
            .expect("dot_unchecked: output must have the shape of the input")
    }

    /// Compute `H(t_j) v_j` for each slice `v_j` along the last axis of `v`.
    ///
    /// `v` is either an `N × k` matrix of column vectors or an `N × N × k`
    /// stack of density matrices, and `times` must have length `k`.
    pub fn dot_times<U, S, D>(&self, v: &nd::ArrayBase<S, D>, times: &[f64])
        -> OpResult<nd::Array<Promoted<T, U>, D>>
    where
        U: Element,
        T: Promote<U>,
        S: nd::Data<Elem = U>,
        D: nd::RemoveAxis,
    {
        self.check_batch(v.shape(), times)?;
        let last = Axis(v.ndim() - 1);
        let mut dim = v.raw_dim();
        dim[0] = self.shape.0;
        let mut out: nd::Array<Promoted<T, U>, D> = nd::Array::zeros(dim);
        v.axis_iter(last)
            .zip(out.axis_iter_mut(last))
            .zip(times)
            .for_each(|((vj, mut oj), &tj)| {
                oj.assign(&self.dot_unchecked(&vj, tj));
            });
        Ok(out)
    }

    /// Compute the expectation value of `H(t)`.
    ///
    /// A vector gives `⟨v|H|v⟩`. A non-square matrix, or any matrix if
    /// `enforce_pure` is set, is treated as a collection of pure states and
    /// gives one value per column. A square matrix is otherwise treated as a
    /// density matrix and gives `tr(H ρ)`.
    pub fn expt_value<U, S, D>(
        &self,
        v: &nd::ArrayBase<S, D>,
        t: f64,
        enforce_pure: bool,
    ) -> OpResult<Expectation<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        S: nd::Data<Elem = U>,
        D: nd::Dimension,
    {
        self.check_state(v.shape())?;
        if self.shape.0 == 0 { return Ok(Expectation::Many(nd::Array1::zeros(0))); }
        let rank = v.ndim();
        let Hv = as_columns(self.dot_unchecked(v, t));
        let v = as_columns(v.mapv(|u| u.cast::<Promoted<T, U>>()));
        let (n, k) = v.dim();
        let ex
            = if rank == 1 {
                Expectation::Single(column_vdots(v.view(), Hv.view())[0])
            } else if enforce_pure || n != k {
                Expectation::Many(column_vdots(v.view(), Hv.view()))
            } else {
                Expectation::Single(slice_trace(Hv.view()))
            };
        Ok(ex)
    }

    /// Batched-time variant of [`Self::expt_value`].
    ///
    /// An `N × k` matrix gives `⟨v_j|H(t_j)|v_j⟩` per column; an `N × N × k`
    /// stack gives `tr(H(t_j) ρ_j)` per slice.
    pub fn expt_value_times<U, S, D>(&self, v: &nd::ArrayBase<S, D>, times: &[f64])
        -> OpResult<nd::Array1<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        S: nd::Data<Elem = U>,
        D: nd::RemoveAxis,
    {
        let Hv = self.dot_times(v, times)?.into_dyn();
        if self.shape.0 == 0 { return Ok(nd::Array1::zeros(0)); }
        let ex: nd::Array1<Promoted<T, U>>
            = if v.ndim() == 2 {
                let Hv = Hv.into_dimensionality::<nd::Ix2>()?;
                let v = v.mapv(|u| u.cast::<Promoted<T, U>>()).into_dyn()
                    .into_dimensionality::<nd::Ix2>()?;
                column_vdots(v.view(), Hv.view())
            } else {
                Hv.axis_iter(Axis(2))
                    .map(|Hrho| -> OpResult<Promoted<T, U>> {
                        let Hrho = Hrho.into_dimensionality::<nd::Ix2>()?;
                        Ok(slice_trace(Hrho))
                    })
                    .collect::<OpResult<nd::Array1<_>>>()?
            };
        Ok(ex)
    }

    /// Compute the matrix `Vl† H(t) Vr`.
    ///
    /// Both sides may be single vectors (treated as one column). An empty
    /// operator gives an empty matrix.
    pub fn matrix_ele<U, S1, D1, S2, D2>(
        &self,
        vl: &nd::ArrayBase<S1, D1>,
        vr: &nd::ArrayBase<S2, D2>,
        t: f64,
    ) -> OpResult<nd::Array2<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        S1: nd::Data<Elem = U>,
        D1: nd::Dimension,
        S2: nd::Data<Elem = U>,
        D2: nd::Dimension,
    {
        let (l, Hr) = self.sandwich_parts(vl, vr, t)?;
        if self.shape.0 == 0 { return Ok(nd::Array2::zeros((0, 0))); }
        Ok(adjoint_dot(l.view(), Hr.view()))
    }

    /// Compute only the diagonal of [`Self::matrix_ele`], i.e.
    /// `⟨vl_j|H(t)|vr_j⟩` for each column pair.
    pub fn matrix_ele_diag<U, S1, D1, S2, D2>(
        &self,
        vl: &nd::ArrayBase<S1, D1>,
        vr: &nd::ArrayBase<S2, D2>,
        t: f64,
    ) -> OpResult<nd::Array1<Promoted<T, U>>>
    where
        U: Element,
        T: Promote<U>,
        S1: nd::Data<Elem = U>,
        D1: nd::Dimension,
        S2: nd::Data<Elem = U>,
        D2: nd::Dimension,
    {
        let (l, Hr) = self.sandwich_parts(vl, vr, t)?;
        if l.ncols() != Hr.ncols() {
            return Err(OperatorError::shape_mismatch(
                &[l.nrows(), Hr.ncols()], &[l.nrows(), l.ncols()]));
        }
        if self.shape.0 == 0 { return Ok(nd::Array1::zeros(0)); }
        Ok(column_vdots(l.view(), Hr.view()))
    }

    /// Compute `⟨vl|H(t)|vr⟩` for two single vectors.
    pub fn matrix_ele_vec<U, S1, S2>(
        &self,
        vl: &nd::ArrayBase<S1, nd::Ix1>,
        vr: &nd::ArrayBase<S2, nd::Ix1>,
        t: f64,
    ) -> OpResult<Promoted<T, U>>
    where
        U: Element,
        T: Promote<U>,
        S1: nd::Data<Elem = U>,
        S2: nd::Data<Elem = U>,
    {
        Ok(self.matrix_ele_diag(vl, vr, t)?
            .get(0)
            .copied()
            .unwrap_or_else(<Promoted<T, U>>::zero))
    }

    #[allow(clippy::type_complexity)]
    fn sandwich_parts<U, S1, D1, S2, D2>(
        &self,
        vl: &nd::ArrayBase<S1, D1>,
        vr: &nd::ArrayBase<S2, D2>,
        t: f64,
    ) -> OpResult<(nd::Array2<Promoted<T, U>>, nd::Array2<Promoted<T, U>>)>
    where
        U: Element,
        T: Promote<U>,
        S1: nd::Data<Elem = U>,
        D1: nd::Dimension,
        S2: nd::Data<Elem = U>,
        D2: nd::Dimension,
    {
        self.check_state(vr.shape())?;
        if !matches!(vl.ndim(), 1 | 2) {
            return Err(OperatorError::InvalidRank {
                expected: "1 or 2", got: vl.ndim() });
        }
        if vl.shape()[0] != self.shape.0 {
            return Err(OperatorError::shape_mismatch(
                &[self.shape.0], &vl.shape()[..1]));
        }
        let Hr = as_columns(self.dot_unchecked(vr, t));
        let l = as_columns(vl.mapv(|u| u.cast::<Promoted<T, U>>()));
        Ok((l, Hr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ array, s };
    use num_complex::Complex64 as C64;
    use crate::{ drive::Drive, sparse::CsMatrix };

    fn linear(t: f64, _args: &[f64]) -> f64 { t }

    fn c(re: f64, im: f64) -> C64 { C64::new(re, im) }

    // H(t) = σx + t σz
    fn ham() -> Operator<f64> {
        Operator::builder()
            .static_term(CsMatrix::from_dense(&array![[0.0, 1.0], [1.0, 0.0]]))
            .dynamic_term(
                CsMatrix::from_dense(&array![[1.0, 0.0], [0.0, -1.0]]),
                Drive::new(linear, Vec::new()),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn dot_vector_and_columns() {
        let H = ham();
        let v = array![1.0, 2.0];
        assert_eq!(H.dot(&v, 0.0).unwrap(), array![2.0, 1.0]);
        assert_eq!(H.dot(&v, 1.0).unwrap(), array![3.0, -1.0]);
        let V = array![[1.0, 0.0], [2.0, 1.0]];
        assert_eq!(H.dot(&V, 1.0).unwrap(), array![[3.0, 1.0], [-1.0, -1.0]]);
    }

    #[test]
    fn dot_promotes_to_state_type() {
        let H = ham();
        let v = array![c(0.0, 1.0), c(0.0, 0.0)];
        assert_eq!(H.dot(&v, 0.0).unwrap(), array![c(0.0, 0.0), c(0.0, 1.0)]);
    }

    #[test]
    fn dot_rejects_bad_states() {
        let H = ham();
        assert!(matches!(
            H.dot(&array![1.0, 2.0, 3.0], 0.0),
            Err(OperatorError::ShapeMismatch { .. }),
        ));
        let cube: nd::Array3<f64> = nd::Array3::zeros((2, 2, 2));
        assert!(matches!(
            H.dot(&cube, 0.0),
            Err(OperatorError::InvalidRank { got: 3, .. }),
        ));
    }

    #[test]
    fn reversed_views_are_valid_states() {
        let H = ham();
        let v = array![1.0, 2.0];
        let rev = v.slice(s![..;-1]);
        assert_eq!(H.dot(&rev, 0.0).unwrap(), H.dot(&array![2.0, 1.0], 0.0).unwrap());
        assert_eq!(
            H.expt_value(&rev, 1.0, false).unwrap(),
            H.expt_value(&array![2.0, 1.0], 1.0, false).unwrap(),
        );
        let V = array![[1.0, 0.0, 3.0], [2.0, 1.0, -1.0]];
        let flipped = V.slice(s![.., ..;-1]);
        let owned = flipped.to_owned();
        assert_eq!(H.dot(&flipped, 1.0).unwrap(), H.dot(&owned, 1.0).unwrap());
        assert_eq!(
            H.expt_value(&flipped, 1.0, true).unwrap(),
            H.expt_value(&owned, 1.0, true).unwrap(),
        );
        assert_eq!(
            H.matrix_ele(&flipped, &flipped, 0.5).unwrap(),
            H.matrix_ele(&owned, &owned, 0.5).unwrap(),
        );
        // column-major storage of the same ensemble
        let cols = array![[1.0, 2.0], [0.0, 1.0], [3.0, -1.0]];
        assert_eq!(H.dot(&cols.t(), 0.0).unwrap(), H.dot(&V, 0.0).unwrap());
        assert_eq!(
            H.expt_value(&cols.t(), 2.0, true).unwrap(),
            H.expt_value(&V, 2.0, true).unwrap(),
        );
    }

    #[test]
    fn dot_times_per_column() {
        let H = ham();
        let V = array![[1.0, 1.0], [0.0, 0.0]];
        let out = H.dot_times(&V, &[0.0, 2.0]).unwrap();
        assert_eq!(out, array![[0.0, 2.0], [1.0, 1.0]]);
        assert!(matches!(
            H.dot_times(&V, &[0.0]),
            Err(OperatorError::TimeCount { expected: 2, got: 1 }),
        ));
    }

    #[test]
    fn dot_times_density_stack() {
        let H = ham();
        let mut rhos: nd::Array3<f64> = nd::Array3::zeros((2, 2, 2));
        rhos[[0, 0, 0]] = 1.0;
        rhos[[1, 1, 1]] = 1.0;
        let out = H.dot_times(&rhos, &[1.0, 1.0]).unwrap();
        let h1 = H.dense_at(1.0);
        assert_eq!(out.index_axis(Axis(2), 0), h1.dot(&rhos.index_axis(Axis(2), 0)));
        assert_eq!(out.index_axis(Axis(2), 1), h1.dot(&rhos.index_axis(Axis(2), 1)));
        let ex = H.expt_value_times(&rhos, &[1.0, 1.0]).unwrap();
        assert_eq!(ex, array![1.0, -1.0]);
    }

    #[test]
    fn expectation_dispatch() {
        let H = ham();
        let up = array![1.0, 0.0];
        assert_eq!(H.expt_value(&up, 2.0, false).unwrap(), Expectation::Single(2.0));
        // square matrix of states: density matrix unless forced pure
        let rho = array![[0.5, 0.5], [0.5, 0.5]];
        assert_eq!(H.expt_value(&rho, 0.0, false).unwrap(), Expectation::Single(1.0));
        let pure = H.expt_value(&rho, 0.0, true).unwrap();
        assert_eq!(pure, Expectation::Many(array![0.5, 0.5]));
        let cols = array![[1.0], [0.0]];
        assert_eq!(
            H.expt_value(&cols, 3.0, false).unwrap().into_array(),
            array![3.0],
        );
    }

    #[test]
    fn matrix_elements() {
        let H = ham();
        let basis = array![[1.0, 0.0], [0.0, 1.0]];
        assert_eq!(H.matrix_ele(&basis, &basis, 0.5).unwrap(), H.dense_at(0.5));
        assert_eq!(
            H.matrix_ele_diag(&basis, &basis, 0.5).unwrap(),
            array![0.5, -0.5],
        );
        let (l, r) = (array![c(0.0, 1.0), c(0.0, 0.0)], array![c(0.0, 0.0), c(1.0, 0.0)]);
        assert_eq!(H.matrix_ele_vec(&l, &r, 0.0).unwrap(), c(0.0, -1.0));
    }

    #[test]
    fn empty_operator_gives_empty_results() {
        let H: Operator<f64> = Operator::zeros(0);
        let v: nd::Array1<f64> = nd::Array1::zeros(0);
        assert_eq!(H.dot(&v, 0.0).unwrap().len(), 0);
        assert_eq!(H.expt_value(&v, 0.0, false).unwrap(), Expectation::Many(nd::Array1::zeros(0)));
        assert_eq!(H.matrix_ele(&v, &v, 0.0).unwrap().dim(), (0, 0));
    }
}
