//! Compressed sparse row matrices.
//!
//! Column indices within each row are kept sorted and unique, and explicit
//! zeros are dropped by every operation that can produce them.

use std::fmt;
use ndarray as nd;
use crate::{
    dtype::Element,
    error::{ OperatorError, OpResult },
};

/// CSR matrix of arbitrary shape.
#[derive(Clone, Debug, PartialEq)]
pub struct CsMatrix<T> {
    shape: (usize, usize),
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Element> CsMatrix<T> {
    /// Create an all-zero matrix with no stored entries.
    pub fn zeros(shape: (usize, usize)) -> Self {
        Self {
            shape,
            row_ptr: vec![0; shape.0 + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Create an `n × n` identity matrix.
    pub fn eye(n: usize) -> Self {
        Self {
            shape: (n, n),
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![T::one(); n],
        }
    }

    /// Build from `(row, col, value)` triplets, summing duplicates.
    ///
    /// Fails if any entry lies outside of `shape`.
    pub fn from_triplets<I>(shape: (usize, usize), triplets: I)
        -> OpResult<Self>
    where I: IntoIterator<Item = (usize, usize, T)>
    {
        let mut entries: Vec<(usize, usize, T)> = triplets.into_iter().collect();
        if let Some(&(row, col, _))
            = entries.iter().find(|(i, j, _)| *i >= shape.0 || *j >= shape.1)
        {
            return Err(OperatorError::IndexOutOfBounds { row, col, shape });
        }
        entries.sort_by_key(|(i, j, _)| (*i, *j));
        let mut row_ptr: Vec<usize> = vec![0; shape.0 + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(entries.len());
        let mut values: Vec<T> = Vec::with_capacity(entries.len());
        let mut last: Option<(usize, usize)> = None;
        for (i, j, v) in entries.into_iter() {
            if last == Some((i, j)) {
                if let Some(acc) = values.last_mut() { *acc += v; }
            } else {
                row_ptr[i + 1] += 1;
                col_idx.push(j);
                values.push(v);
                last = Some((i, j));
            }
        }
        for i in 0..shape.0 { row_ptr[i + 1] += row_ptr[i]; }
        let mut new = Self { shape, row_ptr, col_idx, values };
        new.eliminate_zeros();
        Ok(new)
    }

    /// Build from a dense array, storing only its non-zero elements.
    pub fn from_dense<S>(a: &nd::ArrayBase<S, nd::Ix2>) -> Self
    where S: nd::Data<Elem = T>
    {
        let (n, m) = a.dim();
        let mut row_ptr: Vec<usize> = Vec::with_capacity(n + 1);
        let mut col_idx: Vec<usize> = Vec::new();
        let mut values: Vec<T> = Vec::new();
        row_ptr.push(0);
        for row in a.outer_iter() {
            for (j, &v) in row.iter().enumerate() {
                if !v.is_zero() {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self { shape: (n, m), row_ptr, col_idx, values }
    }

    pub fn to_dense(&self) -> nd::Array2<T> {
        let mut a: nd::Array2<T> = nd::Array2::zeros(self.shape);
        self.iter().for_each(|(i, j, v)| { a[[i, j]] = v; });
        a
    }

    pub fn shape(&self) -> (usize, usize) { self.shape }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize { self.values.len() }

    /// Column indices and values of the stored entries in row `i`.
    ///
    /// *Panics* if `i` is out of bounds.
    pub fn row(&self, i: usize) -> (&[usize], &[T]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Get a single element, returning `None` if out of bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<T> {
        if i >= self.shape.0 || j >= self.shape.1 { return None; }
        let (cols, vals) = self.row(i);
        Some(
            cols.binary_search(&j)
                .map(|p| vals[p])
                .unwrap_or_else(|_| T::zero())
        )
    }

    /// Iterate over all stored entries as `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.shape.0)
            .flat_map(move |i| {
                let (cols, vals) = self.row(i);
                cols.iter().zip(vals).map(move |(&j, &v)| (i, j, v))
            })
    }

    /// Drop stored entries that are exactly zero.
    pub fn eliminate_zeros(&mut self) {
        let mut k: usize = 0;
        let mut start: usize = 0;
        for i in 0..self.shape.0 {
            let end = self.row_ptr[i + 1];
            for p in start..end {
                if !self.values[p].is_zero() {
                    self.col_idx[k] = self.col_idx[p];
                    self.values[k] = self.values[p];
                    k += 1;
                }
            }
            start = end;
            self.row_ptr[i + 1] = k;
        }
        self.col_idx.truncate(k);
        self.values.truncate(k);
    }

    /// Return `true` if every element is within `T::atol()` of zero.
    pub fn is_almost_zero(&self) -> bool {
        self.values.iter().all(|v| v.modulus() <= T::atol())
    }

    /// Apply `f` to every stored entry, dropping entries that map to zero.
    pub fn map<U, F>(&self, f: F) -> CsMatrix<U>
    where
        U: Element,
        F: Fn(T) -> U,
    {
        let mut new = CsMatrix {
            shape: self.shape,
            row_ptr: self.row_ptr.clone(),
            col_idx: self.col_idx.clone(),
            values: self.values.iter().map(|v| f(*v)).collect(),
        };
        new.eliminate_zeros();
        new
    }

    pub fn cast<U: Element>(&self) -> CsMatrix<U> { self.map(|v| v.cast()) }

    pub fn conj(&self) -> Self { self.map(|v| v.conj()) }

    pub fn scale(&self, a: T) -> Self { self.map(|v| v * a) }

    pub fn transpose(&self) -> Self {
        let (n, m) = self.shape;
        let mut row_ptr: Vec<usize> = vec![0; m + 1];
        self.col_idx.iter().for_each(|&j| { row_ptr[j + 1] += 1; });
        for j in 0..m { row_ptr[j + 1] += row_ptr[j]; }
        let mut next: Vec<usize> = row_ptr[..m].to_vec();
        let mut col_idx: Vec<usize> = vec![0; self.nnz()];
        let mut values: Vec<T> = vec![T::zero(); self.nnz()];
        for i in 0..n {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                col_idx[next[j]] = i;
                values[next[j]] = v;
                next[j] += 1;
            }
        }
        Self { shape: (m, n), row_ptr, col_idx, values }
    }

    // merge two matrices of equal shape row by row
    fn merge<F>(&self, other: &Self, op: F) -> Self
    where F: Fn(T, T) -> T
    {
        let mut row_ptr: Vec<usize> = Vec::with_capacity(self.shape.0 + 1);
        let mut col_idx: Vec<usize>
            = Vec::with_capacity(self.nnz() + other.nnz());
        let mut values: Vec<T> = Vec::with_capacity(self.nnz() + other.nnz());
        row_ptr.push(0);
        for i in 0..self.shape.0 {
            let (ca, va) = self.row(i);
            let (cb, vb) = other.row(i);
            let (mut p, mut q) = (0, 0);
            while p < ca.len() || q < cb.len() {
                let (j, v)
                    = if q >= cb.len() || (p < ca.len() && ca[p] < cb[q]) {
                        p += 1;
                        (ca[p - 1], op(va[p - 1], T::zero()))
                    } else if p >= ca.len() || cb[q] < ca[p] {
                        q += 1;
                        (cb[q - 1], op(T::zero(), vb[q - 1]))
                    } else {
                        p += 1;
                        q += 1;
                        (ca[p - 1], op(va[p - 1], vb[q - 1]))
                    };
                if !v.is_zero() {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self { shape: self.shape, row_ptr, col_idx, values }
    }

    /// Elementwise sum.
    ///
    /// *Panics* if the shapes differ.
    pub fn add(&self, other: &Self) -> Self {
        assert_eq!(self.shape, other.shape, "CsMatrix::add: shape mismatch");
        self.merge(other, |a, b| a + b)
    }

    /// Elementwise difference.
    ///
    /// *Panics* if the shapes differ.
    pub fn sub(&self, other: &Self) -> Self {
        assert_eq!(self.shape, other.shape, "CsMatrix::sub: shape mismatch");
        self.merge(other, |a, b| a - b)
    }

    /// Sparse matrix product `self · other`.
    ///
    /// *Panics* if the inner dimensions differ.
    pub fn matmul(&self, other: &Self) -> Self {
        assert_eq!(
            self.shape.1, other.shape.0, "CsMatrix::matmul: shape mismatch");
        let (n, m) = (self.shape.0, other.shape.1);
        let mut acc: Vec<T> = vec![T::zero(); m];
        let mut mark: Vec<usize> = vec![usize::MAX; m];
        let mut touched: Vec<usize> = Vec::new();
        let mut row_ptr: Vec<usize> = Vec::with_capacity(n + 1);
        let mut col_idx: Vec<usize> = Vec::new();
        let mut values: Vec<T> = Vec::new();
        row_ptr.push(0);
        for i in 0..n {
            touched.clear();
            let (ca, va) = self.row(i);
            for (&j, &a) in ca.iter().zip(va) {
                let (cb, vb) = other.row(j);
                for (&k, &b) in cb.iter().zip(vb) {
                    if mark[k] != i {
                        mark[k] = i;
                        acc[k] = T::zero();
                        touched.push(k);
                    }
                    acc[k] += a * b;
                }
            }
            touched.sort_unstable();
            for &k in touched.iter() {
                if !acc[k].is_zero() {
                    col_idx.push(k);
                    values.push(acc[k]);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self { shape: (n, m), row_ptr, col_idx, values }
    }

    /// Accumulate `coeff · self · x` into `out`, where the elements of `self`
    /// are cast to the element type of `x`.
    ///
    /// *Panics* if the shapes are incompatible.
    pub fn apply_into<P: Element>(
        &self,
        coeff: P,
        x: nd::ArrayView2<P>,
        mut out: nd::ArrayViewMut2<P>,
    ) {
        assert_eq!(x.nrows(), self.shape.1, "CsMatrix::apply_into: shape mismatch");
        assert_eq!(out.nrows(), self.shape.0, "CsMatrix::apply_into: shape mismatch");
        for i in 0..self.shape.0 {
            let (cols, vals) = self.row(i);
            let mut out_i = out.row_mut(i);
            for (&j, &v) in cols.iter().zip(vals) {
                out_i.scaled_add(coeff * v.cast::<P>(), &x.row(j));
            }
        }
    }

    /// Accumulate `coeff · x · self` into `out`, where the elements of `self`
    /// are cast to the element type of `x`.
    ///
    /// *Panics* if the shapes are incompatible.
    pub fn apply_left_into<P: Element>(
        &self,
        coeff: P,
        x: nd::ArrayView2<P>,
        mut out: nd::ArrayViewMut2<P>,
    ) {
        assert_eq!(x.ncols(), self.shape.0, "CsMatrix::apply_left_into: shape mismatch");
        assert_eq!(out.ncols(), self.shape.1, "CsMatrix::apply_left_into: shape mismatch");
        for i in 0..self.shape.0 {
            let (cols, vals) = self.row(i);
            let x_i = x.column(i);
            for (&j, &v) in cols.iter().zip(vals) {
                out.column_mut(j).scaled_add(coeff * v.cast::<P>(), &x_i);
            }
        }
    }

    /// Dense product `self · b`.
    pub fn matmul_dense<S>(&self, b: &nd::ArrayBase<S, nd::Ix2>)
        -> nd::Array2<T>
    where S: nd::Data<Elem = T>
    {
        let mut out: nd::Array2<T> = nd::Array2::zeros((self.shape.0, b.ncols()));
        self.apply_into(T::one(), b.view(), out.view_mut());
        out
    }

    /// Dense product `a · self`.
    pub fn left_matmul_dense<S>(&self, a: &nd::ArrayBase<S, nd::Ix2>)
        -> nd::Array2<T>
    where S: nd::Data<Elem = T>
    {
        let mut out: nd::Array2<T> = nd::Array2::zeros((a.nrows(), self.shape.1));
        self.apply_left_into(T::one(), a.view(), out.view_mut());
        out
    }

    /// Add `coeff · self` to a dense array of the same shape.
    pub fn add_scaled_to(&self, coeff: T, out: &mut nd::Array2<T>) {
        self.iter().for_each(|(i, j, v)| { out[[i, j]] += coeff * v; });
    }

    pub fn diag(&self) -> nd::Array1<T> {
        let n = self.shape.0.min(self.shape.1);
        (0..n).map(|i| self.get(i, i).unwrap_or_else(T::zero)).collect()
    }

    pub fn trace(&self) -> T { self.diag().sum() }
}

impl<T: Element> fmt::Display for CsMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "<{}x{} sparse matrix with {} stored elements>",
            self.shape.0, self.shape.1, self.nnz(),
        )?;
        for (i, j, v) in self.iter() {
            writeln!(f, "  ({}, {})\t{}", i, j, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use num_complex::Complex64 as C64;

    #[test]
    fn triplets_sum_duplicates_and_drop_zeros() {
        let a: CsMatrix<f64> = CsMatrix::from_triplets(
            (2, 3),
            [(1, 2, 1.0), (0, 0, 2.0), (1, 2, 3.0), (0, 1, 1.0), (0, 1, -1.0)],
        ).unwrap();
        assert_eq!(a.nnz(), 2);
        assert_eq!(a.to_dense(), array![[2.0, 0.0, 0.0], [0.0, 0.0, 4.0]]);
    }

    #[test]
    fn triplets_out_of_bounds() {
        let res = CsMatrix::<f64>::from_triplets((2, 2), [(2, 0, 1.0)]);
        assert!(matches!(res, Err(OperatorError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn products_agree_with_dense() {
        let a = array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]];
        let b = array![[0.0, 1.0], [4.0, 0.0], [0.0, -1.0]];
        let sa = CsMatrix::from_dense(&a);
        let sb = CsMatrix::from_dense(&b);
        assert_eq!(sa.matmul(&sb).to_dense(), a.dot(&b));
        assert_eq!(sa.matmul_dense(&b), a.dot(&b));
        assert_eq!(sb.left_matmul_dense(&a), a.dot(&b));
        assert_eq!(sa.transpose().to_dense(), a.t().to_owned());
    }

    #[test]
    fn add_cancels_to_empty() {
        let a = CsMatrix::from_dense(&array![[0.0, 1.5], [2.0, 0.0]]);
        let d = a.sub(&a);
        assert_eq!(d.nnz(), 0);
        assert!(d.is_almost_zero());
        assert_eq!(a.add(&a).get(1, 0), Some(4.0));
    }

    #[test]
    fn complex_conj_and_trace() {
        let a = CsMatrix::from_triplets(
            (2, 2),
            [(0, 0, C64::new(1.0, 1.0)), (1, 1, C64::new(2.0, -3.0))],
        ).unwrap();
        assert_eq!(a.trace(), C64::new(3.0, -2.0));
        assert_eq!(a.conj().trace(), C64::new(3.0, 2.0));
        assert_eq!(a.cast::<f64>().diag(), array![1.0, 2.0]);
    }
}
