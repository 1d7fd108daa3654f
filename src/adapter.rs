//! Bridge between the SROM objective and the generic minimizers.
//!
//! For a fixed set of samples, the probabilities are found by minimizing the
//! objective over the box `[0, 1]^size` subject to the probabilities summing to
//! one. [`ProbabilityProblem`] exposes the objective (and its gradient, if
//! available) as a [`Function`] of the probabilities, [`param_bounds`] and
//! [`constraint`] describe the feasible set and [`solve`] runs the chosen
//! [`Method`] from an [`initial_guess`].
//!
//! Joint optimization of samples and probabilities is only a contract: its
//! bounds and constraint fail with [`OptimizeError::NotImplemented`].

use std::fmt;

use log::debug;
use nalgebra::{
    storage::{Storage, StorageMut},
    DMatrix, DVector, Dyn, IsContiguous, Vector,
};
use rand::Rng;

use crate::{
    algo::NelderMead,
    core::{Domain, Function, Minimizer, Problem, SumConstraint},
    driver::MinimizerDriver,
    error::OptimizeError,
    options::{Method, MinimizeOptions},
    srom::{Objective, ObjectiveGradient, RandomVector, Srom},
};

const JOINT_OPT: &str = "SROM joint optimization";

/// Objective as a function of probabilities for fixed samples.
pub struct ProbabilityProblem<'a, O, G> {
    objective: &'a O,
    gradient: Option<&'a G>,
    samples: &'a DMatrix<f64>,
    dom: Domain<f64>,
}

impl<'a, O, G> ProbabilityProblem<'a, O, G> {
    /// Creates the problem. If `gradient` is `None`, the minimizers
    /// approximate it or do not need it at all.
    pub fn new(
        objective: &'a O,
        gradient: Option<&'a G>,
        samples: &'a DMatrix<f64>,
        dom: Domain<f64>,
    ) -> Self {
        Self {
            objective,
            gradient,
            samples,
            dom,
        }
    }
}

impl<O, G> Problem for ProbabilityProblem<'_, O, G> {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        self.dom.clone()
    }
}

impl<O: Objective, G: ObjectiveGradient> Function for ProbabilityProblem<'_, O, G> {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        self.objective.evaluate(self.samples, x.as_slice())
    }

    fn gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        g: &mut Vector<Self::Field, Dyn, Sg>,
    ) -> bool
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>,
    {
        match self.gradient {
            Some(gradient) => {
                g.copy_from(&gradient.evaluate(self.samples, x.as_slice()));
                true
            }
            None => false,
        }
    }
}

/// Equality constraint requiring the probabilities to sum to one.
///
/// Probabilities are the whole vector of unknowns in sequential optimization.
/// In joint optimization they follow the `size × dim` flattened samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbabilitySum {
    size: usize,
    dim: usize,
    joint: bool,
}

impl ProbabilitySum {
    /// Constraint on the unknowns of sequential optimization.
    pub fn sequential(srom: &Srom) -> Self {
        Self {
            size: srom.size(),
            dim: srom.dim(),
            joint: false,
        }
    }

    /// Constraint on the unknowns of joint optimization.
    pub fn joint(srom: &Srom) -> Self {
        Self {
            joint: true,
            ..Self::sequential(srom)
        }
    }

    /// Index of the first probability in the vector of unknowns.
    pub fn offset(&self) -> usize {
        if self.joint {
            self.size * self.dim
        } else {
            0
        }
    }

    /// Returns `1 - sum(probabilities)`.
    pub fn residual(&self, x: &[f64]) -> f64 {
        1.0 - x[self.offset()..].iter().sum::<f64>()
    }

    /// Converts the constraint to the form understood by the minimizers.
    pub fn as_sum_constraint(&self) -> SumConstraint<f64> {
        SumConstraint::unit(self.offset())
    }
}

/// Bounds of the unknowns, `[0, 1]` for every probability.
pub fn param_bounds(srom: &Srom, joint: bool) -> Result<Domain<f64>, OptimizeError> {
    if joint {
        return Err(OptimizeError::NotImplemented(JOINT_OPT));
    }

    Ok(Domain::rect(vec![0.0; srom.size()], vec![1.0; srom.size()]))
}

/// The equality constraint of the unknowns.
pub fn constraint(srom: &Srom, joint: bool) -> Result<ProbabilitySum, OptimizeError> {
    if joint {
        return Err(OptimizeError::NotImplemented(JOINT_OPT));
    }

    Ok(ProbabilitySum::sequential(srom))
}

/// Initial point of the minimization: uniform probabilities.
///
/// For joint optimization, the probabilities are preceded by a fresh draw of
/// samples flattened row by row. Nothing consumes that layout yet because
/// joint bounds and constraint are not implemented.
pub fn initial_guess<T, R>(srom: &Srom, joint: bool, target: &T, rng: &mut R) -> DVector<f64>
where
    T: RandomVector,
    R: Rng + ?Sized,
{
    let uniform = 1.0 / srom.size() as f64;

    if joint {
        let samples = target.draw_random_sample(srom.size(), rng);
        let flattened = samples.transpose();

        DVector::from_iterator(
            flattened.len() + srom.size(),
            flattened
                .iter()
                .copied()
                .chain(std::iter::repeat(uniform).take(srom.size())),
        )
    } else {
        DVector::from_element(srom.size(), uniform)
    }
}

/// Result of [`solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// The final point.
    pub x: DVector<f64>,
    /// Function value in the final point.
    pub fx: f64,
    /// Number of successful iterations.
    pub iterations: usize,
    /// Whether the stopping criterion was met, as opposed to running out of
    /// iterations or the minimizer giving up.
    pub converged: bool,
}

/// Minimizes `f` subject to `con` starting from `x0`.
///
/// Errors of the minimizer are not propagated. The process stops and the best
/// point found so far is returned, because any feasible point is an acceptable
/// result of the search.
pub fn solve<F>(
    f: &F,
    con: SumConstraint<f64>,
    x0: &DVector<f64>,
    method: Method,
    options: &MinimizeOptions,
) -> Minimum
where
    F: Function<Field = f64>,
{
    let builder = MinimizerDriver::builder(f)
        .with_initial(x0.as_slice().to_vec())
        .with_constraint(con);

    match method {
        // Best point of a simplex often stays the same over several
        // iterations, the collapse of the simplex is the stopping criterion.
        Method::NelderMead => run(f, builder.with_algo(NelderMead::new).build(), options, None),
        Method::ProjectedGradient => run(f, builder.build(), options, Some(options.ftol())),
    }
}

fn run<F, A>(
    f: &F,
    mut driver: MinimizerDriver<'_, F, A>,
    options: &MinimizeOptions,
    ftol: Option<f64>,
) -> Minimum
where
    F: Function<Field = f64>,
    A: Minimizer<F>,
    A::Error: fmt::Display,
{
    let x = DVector::from_column_slice(driver.x());
    let fx = f.apply(&x);

    let mut minimum = Minimum {
        x,
        fx,
        iterations: 0,
        converged: false,
    };

    for iter in 1..=options.max_iters() {
        match driver.next() {
            Ok((x, fx)) => {
                let decrease = minimum.fx - fx;

                minimum.x.copy_from_slice(x);
                minimum.fx = fx;
                minimum.iterations = iter;

                if ftol.map(|ftol| decrease.abs() <= ftol).unwrap_or(false) {
                    minimum.converged = true;
                    break;
                }
            }
            Err(error) => {
                debug!(
                    "{} stopped after {} iterations: {}",
                    driver.name(),
                    minimum.iterations,
                    error
                );
                minimum.converged = ftol.is_none();
                break;
            }
        }
    }

    minimum
}
