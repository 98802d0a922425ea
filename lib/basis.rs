//! Interface to a Hilbert-space basis able to build matrices from symbolic
//! operator strings.
//!
//! No concrete basis lives in this crate; implementors supply the dimension,
//! validation of the requested terms, and the matrices themselves.

use crate::{
    drive::Drive,
    dtype::Element,
    error::OpResult,
    matrix::Matrix,
};

/// A symbolic operator string with its couplings.
///
/// Each coupling is a coefficient followed by the sites the operator string
/// acts on, e.g. `("zz", [(J, [0, 1]), (J, [1, 2])])`.
#[derive(Clone, Debug, PartialEq)]
pub struct OpTerm<T> {
    pub opstr: String,
    pub couplings: Vec<(T, Vec<usize>)>,
}

impl<T> OpTerm<T> {
    pub fn new<S, I>(opstr: S, couplings: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (T, Vec<usize>)>,
    {
        Self { opstr: opstr.into(), couplings: couplings.into_iter().collect() }
    }
}

/// An [`OpTerm`] scaled by a driving function.
#[derive(Clone, Debug)]
pub struct DynamicOpTerm<T> {
    pub term: OpTerm<T>,
    pub drive: Drive<T>,
}

/// Validation performed before building an operator from a basis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Checks {
    pub hermitian: bool,
    pub symmetry: bool,
    pub particle_conservation: bool,
}

impl Default for Checks {
    fn default() -> Self {
        Self { hermitian: true, symmetry: true, particle_conservation: true }
    }
}

impl Checks {
    /// Disable every check.
    pub fn none() -> Self {
        Self { hermitian: false, symmetry: false, particle_conservation: false }
    }
}

/// Basic requirements for a basis usable by
/// [`OperatorBuilder`][crate::operator::OperatorBuilder].
pub trait OperatorBasis<T: Element> {
    /// Dimension of the Hilbert space.
    fn num_states(&self) -> usize;

    /// Verify that the requested terms form a Hermitian operator.
    fn check_hermitian(
        &self,
        _static_terms: &[OpTerm<T>],
        _dynamic_terms: &[DynamicOpTerm<T>],
    ) -> OpResult<()>
    {
        Ok(())
    }

    /// Verify that the requested terms respect the symmetries of the basis.
    fn check_symm(
        &self,
        _static_terms: &[OpTerm<T>],
        _dynamic_terms: &[DynamicOpTerm<T>],
    ) -> OpResult<()>
    {
        Ok(())
    }

    /// Verify that the requested terms conserve particle number.
    fn check_pcon(
        &self,
        _static_terms: &[OpTerm<T>],
        _dynamic_terms: &[DynamicOpTerm<T>],
    ) -> OpResult<()>
    {
        Ok(())
    }

    /// Build the sum of all static terms.
    fn build_static(&self, terms: &[OpTerm<T>]) -> OpResult<Matrix<T>>;

    /// Build one matrix per dynamic term.
    fn build_dynamic(&self, terms: &[DynamicOpTerm<T>])
        -> OpResult<Vec<(Drive<T>, Matrix<T>)>>;

    /// Run the checks enabled in `checks`.
    fn validate(
        &self,
        checks: Checks,
        static_terms: &[OpTerm<T>],
        dynamic_terms: &[DynamicOpTerm<T>],
    ) -> OpResult<()>
    {
        if checks.hermitian {
            self.check_hermitian(static_terms, dynamic_terms)?;
        }
        if checks.symmetry {
            self.check_symm(static_terms, dynamic_terms)?;
        }
        if checks.particle_conservation {
            self.check_pcon(static_terms, dynamic_terms)?;
        }
        Ok(())
    }
}
