//! Driving functions: scalar functions of time scaling the dynamic terms of an
//! [`Operator`][crate::operator::Operator].
//!
//! Two drives are the same drive (and hence have their terms merged) if and
//! only if their [`DriveKey`]s are equal. Keys are built from the identity of
//! the underlying callable and the bit patterns of its fixed arguments, so
//! `Drive::new(f, [1.0])` created twice yields equal drives.

use std::{
    fmt,
    hash::{ Hash, Hasher },
    ops::Mul,
    rc::Rc,
    sync::atomic::{ AtomicU64, Ordering },
};
use crate::dtype::Element;

/// Signature of plain driving functions: time first, then fixed arguments.
pub type DriveFn<T> = fn(f64, &[f64]) -> T;

static NEXT_CLOSURE_ID: AtomicU64 = AtomicU64::new(0);

/// Origin of a callable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// Address of a function pointer.
    Pointer(usize),
    /// Unique identifier handed out to a closure when wrapped.
    Closure(u64),
}

/// Comparable identity token of a drive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DriveKey {
    Func { source: Source, args: Vec<u64> },
    Conj(Box<DriveKey>),
    /// Sorted list of factors, none of which is itself a product.
    Product(Vec<DriveKey>),
}

impl DriveKey {
    fn func(source: Source, args: &[f64]) -> Self {
        let args
            = args.iter()
            .map(|x| if *x == 0.0 { 0.0_f64.to_bits() } else { x.to_bits() })
            .collect();
        Self::Func { source, args }
    }

    fn factors(self) -> Vec<DriveKey> {
        match self {
            Self::Product(factors) => factors,
            key => vec![key],
        }
    }

    /// Key of the product of two drives.
    pub fn product(&self, other: &Self) -> Self {
        let mut factors = self.clone().factors();
        factors.append(&mut other.clone().factors());
        factors.sort();
        Self::Product(factors)
    }

    /// Key of the complex conjugate of a drive.
    pub fn conj(&self) -> Self {
        match self {
            Self::Conj(key) => key.as_ref().clone(),
            Self::Product(factors) => {
                let mut factors: Vec<DriveKey>
                    = factors.iter().map(|f| f.conj()).collect();
                factors.sort();
                Self::Product(factors)
            },
            key => Self::Conj(Box::new(key.clone())),
        }
    }
}

impl fmt::Display for DriveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func { source, args } => {
                match source {
                    Source::Pointer(addr) => write!(f, "fn@{:#x}(", addr)?,
                    Source::Closure(id) => write!(f, "closure#{}(", id)?,
                }
                let n = args.len();
                for (k, bits) in args.iter().enumerate() {
                    write!(f, "{}", f64::from_bits(*bits))?;
                    if k < n - 1 { write!(f, ", ")?; }
                }
                write!(f, ")")
            },
            Self::Conj(key) => write!(f, "conj({})", key),
            Self::Product(factors) => {
                let n = factors.len();
                for (k, factor) in factors.iter().enumerate() {
                    write!(f, "{}", factor)?;
                    if k < n - 1 { write!(f, " * ")?; }
                }
                Ok(())
            },
        }
    }
}

/// A scalar function of time with fixed arguments.
#[derive(Clone)]
pub struct Drive<T> {
    key: DriveKey,
    f: Rc<dyn Fn(f64) -> T>,
}

impl<T> PartialEq for Drive<T> {
    fn eq(&self, other: &Self) -> bool { self.key == other.key }
}

impl<T> Eq for Drive<T> { }

impl<T> Hash for Drive<T> {
    fn hash<H: Hasher>(&self, state: &mut H) { self.key.hash(state); }
}

impl<T> fmt::Debug for Drive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Drive({})", self.key)
    }
}

impl<T> fmt::Display for Drive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl<T: Element> Drive<T> {
    /// Wrap a plain function with fixed arguments.
    pub fn new<A>(f: DriveFn<T>, args: A) -> Self
    where A: Into<Vec<f64>>
    {
        let args: Vec<f64> = args.into();
        let key = DriveKey::func(Source::Pointer(f as *const () as usize), &args);
        Self { key, f: Rc::new(move |t| f(t, &args)) }
    }

    /// Wrap a closure of time.
    ///
    /// Every call creates a new identity, so two separately wrapped closures
    /// are never merged even if they compute the same values.
    pub fn from_closure<F>(f: F) -> Self
    where F: Fn(f64) -> T + 'static
    {
        let id = NEXT_CLOSURE_ID.fetch_add(1, Ordering::Relaxed);
        Self { key: DriveKey::func(Source::Closure(id), &[]), f: Rc::new(f) }
    }

    pub fn key(&self) -> &DriveKey { &self.key }

    /// Evaluate at time `t`.
    pub fn eval(&self, t: f64) -> T { (self.f)(t) }

    /// Pointwise product of two drives.
    pub fn product(&self, other: &Self) -> Self {
        let f = Rc::clone(&self.f);
        let g = Rc::clone(&other.f);
        Self {
            key: self.key.product(&other.key),
            f: Rc::new(move |t| f(t) * g(t)),
        }
    }

    /// Complex conjugate; the identity for real element types.
    pub fn conj(&self) -> Self {
        if T::DTYPE.is_real() { return self.clone(); }
        let f = Rc::clone(&self.f);
        Self { key: self.key.conj(), f: Rc::new(move |t| f(t).conj()) }
    }

    /// Change the output type, keeping the identity.
    pub fn cast<U: Element>(&self) -> Drive<U> {
        let f = Rc::clone(&self.f);
        Drive { key: self.key.clone(), f: Rc::new(move |t| f(t).cast()) }
    }
}

impl<'a, T: Element> Mul<&'a Drive<T>> for &'a Drive<T> {
    type Output = Drive<T>;

    fn mul(self, rhs: &'a Drive<T>) -> Drive<T> { self.product(rhs) }
}
