use nalgebra::{storage::StorageMut, Dyn, IsContiguous, Vector};

use super::{constraint::SumConstraint, domain::Domain, function::Function};

/// Interface of a constrained minimizer.
///
/// A minimizer is an iterative algorithm which takes a feasible point _x_ and
/// computes the next step in the minimization process. Feasibility means that
/// _x_ lies in the [`Domain`] and, if given, satisfies the [`SumConstraint`].
/// Repeated calls to the next step should eventually converge into a
/// (local) minimum _x'_.
///
/// ## Implementing a minimizer
///
/// Here is a "minimizer" which only keeps the point feasible.
///
/// ```rust
/// use srom_opt::nalgebra as na;
/// use srom_opt::{Domain, Function, Minimizer, SumConstraint};
/// use na::{storage::StorageMut, Dyn, IsContiguous, Vector};
///
/// struct Stay;
///
/// impl<F: Function> Minimizer<F> for Stay {
///     const NAME: &'static str = "Stay";
///     type Error = std::convert::Infallible;
///
///     fn min_next<Sx>(
///         &mut self,
///         f: &F,
///         dom: &Domain<F::Field>,
///         con: Option<&SumConstraint<F::Field>>,
///         x: &mut Vector<F::Field, Dyn, Sx>,
///     ) -> Result<F::Field, Self::Error>
///     where
///         Sx: StorageMut<F::Field, Dyn> + IsContiguous,
///     {
///         dom.project_with(x, con);
///         Ok(f.apply(x))
///     }
/// }
/// ```
pub trait Minimizer<F: Function> {
    /// Name of the minimizer.
    const NAME: &'static str;

    /// Error while computing the next step.
    type Error;

    /// Computes the next step in the minimization process.
    ///
    /// After the method returns, `x` must be feasible and the return value
    /// _must_ be the function value in `x` as computed by [`Function::apply`].
    ///
    /// The implementations _can_ assume that subsequent calls to `min_next`
    /// pass the value of `x` as was returned in the previous iteration.
    fn min_next<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        con: Option<&SumConstraint<F::Field>>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, Self::Error>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous;
}
