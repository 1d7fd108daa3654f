//! Linear equality constraints on a trailing block of variables.

use nalgebra::{storage::Storage, Dim, RealField, Vector};

/// Equality constraint `total - sum(x[offset..]) == 0`.
///
/// With `offset = 0` all variables are summed, which is the probability
/// constraint of the sequential problem. A non-zero offset skips leading
/// variables that are not part of the sum (e.g., flattened sample locations in
/// front of probabilities).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SumConstraint<T> {
    offset: usize,
    total: T,
}

impl<T: RealField + Copy> SumConstraint<T> {
    /// Creates the constraint `sum(x[offset..]) == total`.
    pub fn new(offset: usize, total: T) -> Self {
        Self { offset, total }
    }

    /// Creates the constraint `sum(x[offset..]) == 1`.
    pub fn unit(offset: usize) -> Self {
        Self::new(offset, T::one())
    }

    /// Index of the first constrained variable.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Required value of the sum.
    pub fn total(&self) -> T {
        self.total
    }

    /// Computes `total - sum(x[offset..])`.
    pub fn residual<D, Sx>(&self, x: &Vector<T, D, Sx>) -> T
    where
        D: Dim,
        Sx: Storage<T, D>,
    {
        let sum = x
            .iter()
            .skip(self.offset)
            .fold(T::zero(), |acc, xi| acc + *xi);
        self.total - sum
    }

    /// Checks whether the residual is within given tolerance.
    pub fn is_satisfied<D, Sx>(&self, x: &Vector<T, D, Sx>, tol: T) -> bool
    where
        D: Dim,
        Sx: Storage<T, D>,
    {
        self.residual(x).abs() <= tol
    }
}
