//! Projected gradient method with backtracking line search.
//!
//! Each iteration takes a step against the gradient, projects the trial point
//! onto the feasible set (bounds intersected with the optional
//! [`SumConstraint`](crate::SumConstraint)) and accepts it if the Armijo
//! sufficient decrease condition holds along the projected direction. The
//! gradient is analytic when the function provides one, otherwise it is
//! approximated by forward differences.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Efficient Projections onto the l1-Ball for Learning in High
//! Dimensions](https://dl.acm.org/doi/10.1145/1390156.1390191)

use getset::{CopyGetters, Setters};
use log::{debug, trace};
use nalgebra::{
    convert, storage::StorageMut, ComplexField, DimName, Dyn, IsContiguous, OVector,
    RealField as _, Vector, U1,
};
use thiserror::Error;

use crate::{
    core::{Domain, Function, Minimizer, Problem, SumConstraint},
    derivatives::Gradient,
};

/// Options for [`ProjectedGradient`] minimizer.
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct ProjectedGradientOptions<P: Problem> {
    /// Initial (and maximal) step length. Default: `1`.
    step_init: P::Field,
    /// Sufficient decrease constant of the Armijo condition. Default: `1e-4`.
    armijo_coeff: P::Field,
    /// Factor by which the step is shortened on rejection. Default: `0.5`.
    backtrack_coeff: P::Field,
    /// Maximal number of step shortenings in one iteration. Default: `40`.
    max_backtracks: usize,
}

impl<P: Problem> Default for ProjectedGradientOptions<P> {
    fn default() -> Self {
        Self {
            step_init: convert(1.0),
            armijo_coeff: convert(1e-4),
            backtrack_coeff: convert(0.5),
            max_backtracks: 40,
        }
    }
}

/// Projected gradient minimizer.
///
/// See [module](self) documentation for more details.
pub struct ProjectedGradient<P: Problem> {
    options: ProjectedGradientOptions<P>,
    scale: OVector<P::Field, Dyn>,
    grad: Gradient<P>,
    trial: OVector<P::Field, Dyn>,
    fx: Option<P::Field>,
    step: P::Field,
}

impl<P: Problem> ProjectedGradient<P> {
    /// Initializes projected gradient minimizer with default options.
    pub fn new(p: &P, dom: &Domain<P::Field>) -> Self {
        Self::with_options(p, dom, ProjectedGradientOptions::default())
    }

    /// Initializes projected gradient minimizer with given options.
    pub fn with_options(_: &P, dom: &Domain<P::Field>, options: ProjectedGradientOptions<P>) -> Self {
        let dim = Dyn(dom.dim());

        Self {
            step: options.step_init,
            options,
            scale: dom.scale_or_ones(),
            grad: Gradient::zeros(dom.dim()),
            trial: OVector::zeros_generic(dim, U1::name()),
            fx: None,
        }
    }

    /// Resets the internal state of the minimizer.
    pub fn reset(&mut self) {
        self.fx = None;
        self.step = self.options.step_init;
    }
}

/// Error returned from [`ProjectedGradient`] minimizer.
#[derive(Debug, Error)]
pub enum ProjectedGradientError {
    /// The function value in the current point is not finite.
    #[error("invalid value encountered")]
    InvalidValue,
    /// No step satisfying sufficient decrease was found.
    #[error("line search failed to find a descent step")]
    LineSearchFailed,
}

impl<F: Function> Minimizer<F> for ProjectedGradient<F> {
    const NAME: &'static str = "Projected gradient";

    type Error = ProjectedGradientError;

    fn min_next<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        con: Option<&SumConstraint<F::Field>>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<F::Field, Self::Error>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        let ProjectedGradientOptions {
            step_init,
            armijo_coeff,
            backtrack_coeff,
            max_backtracks,
        } = self.options;

        let fx = match self.fx {
            Some(fx) => fx,
            None => {
                dom.project_with(x, con);
                f.apply(x)
            }
        };

        if !fx.is_finite() {
            return Err(ProjectedGradientError::InvalidValue);
        }

        if !f.gradient(&*x, &mut *self.grad) {
            self.grad.compute(f, x, &self.scale, fx);
        }

        let mut step = self.step;

        for _ in 0..=max_backtracks {
            // trial = P(x - step * grad)
            self.trial.copy_from(&*x);
            self.trial.axpy(-step, &*self.grad, convert(1.0));
            dom.project_with(&mut self.trial, con);

            // Directional derivative along the projected direction.
            let mut slope: F::Field = convert(0.0);
            for i in 0..x.nrows() {
                slope += self.grad[i] * (self.trial[i] - x[i]);
            }

            if slope >= convert(0.0) {
                // The projected direction is not a descent direction, the
                // point is stationary up to the projection.
                trace!("stationary point, slope = {}", slope);
                self.fx = Some(fx);
                return Ok(fx);
            }

            let ftrial = f.apply(&self.trial);

            if ftrial.is_finite() && ftrial <= fx + armijo_coeff * slope {
                x.copy_from(&self.trial);
                self.fx = Some(ftrial);
                // Let the step grow back after successful iterations.
                self.step = (step / backtrack_coeff).min(step_init);

                debug!("accepted step {},\tfx = {} -> {}", step, fx, ftrial);
                return Ok(ftrial);
            }

            step *= backtrack_coeff;
        }

        debug!("line search failed at fx = {}", fx);
        self.fx = Some(fx);
        Err(ProjectedGradientError::LineSearchFailed)
    }
}
