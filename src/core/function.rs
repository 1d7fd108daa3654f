use nalgebra::{
    storage::{Storage, StorageMut},
    Dyn, IsContiguous, Vector,
};

use super::base::Problem;

/// Definition of a function to be minimized.
///
/// ## Defining a function
///
/// A function is any type that implements [`Function`] and [`Problem`] traits.
///
/// ```rust
/// use srom_opt::nalgebra as na;
/// use srom_opt::{Domain, Function, Problem};
/// use na::{Dyn, IsContiguous};
///
/// struct Paraboloid;
///
/// impl Problem for Paraboloid {
///     type Field = f64;
///
///     fn domain(&self) -> Domain<Self::Field> {
///         Domain::unconstrained(2)
///     }
/// }
///
/// impl Function for Paraboloid {
///     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
///     where
///         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
///     {
///         x.norm_squared()
///     }
/// }
/// ```
///
/// Algorithms that need derivatives fall back to finite differences (see
/// [`derivatives`](crate::derivatives)) unless the function overrides
/// [`gradient`](Function::gradient).
pub trait Function: Problem {
    /// Calculates the function value in given point.
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous;

    /// Writes the analytic gradient in given point into `g` and returns
    /// `true`. Returns `false` without touching `g` if the function has no
    /// analytic gradient.
    fn gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        g: &mut Vector<Self::Field, Dyn, Sg>,
    ) -> bool
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>,
    {
        let _ = (x, g);
        false
    }
}
