//! Nelder-Mead (simplex) minimization method.
//!
//! [Nelder-Mead](https://en.wikipedia.org/wiki/Nelder%E2%80%93Mead_method)
//! keeps a [simplex](https://en.wikipedia.org/wiki/Simplex) of _n + 1_ points
//! and moves its worst vertex by reflection, expansion or contraction through
//! the centroid of the others, or shrinks the whole simplex towards the best
//! vertex. No derivatives are needed.
//!
//! Every trial point is projected onto the feasible set before it is
//! evaluated, so the simplex never leaves the bounds nor violates the
//! [`SumConstraint`]. With a sum constraint, the projected simplex lies in a
//! hyperplane of dimension _n - 1_ and is therefore degenerate. It still makes
//! progress inside the hyperplane, but it collapses sooner than an
//! unconstrained one and [`NelderMeadError::SimplexCollapsed`] should be
//! treated as termination rather than failure.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Implementing the Nelder-Mead simplex algorithm with adaptive
//! parameters](https://link.springer.com/article/10.1007/s10589-010-9329-3)

use getset::{CopyGetters, Setters};
use log::{debug, trace};
use nalgebra::{
    convert, storage::StorageMut, ComplexField, DimName, Dyn, IsContiguous, OVector, RealField,
    Vector, U1,
};
use thiserror::Error;

use crate::{
    core::{Domain, Function, Minimizer, Problem, SumConstraint},
    derivatives::EPSILON_SQRT,
};

/// Options for [`NelderMead`] minimizer.
///
/// Coefficients are the textbook ones \[1\] unless
/// [`adaptive`](NelderMeadOptions::adaptive) is set, in which case they depend
/// on the dimension \[2\].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct NelderMeadOptions<P: Problem> {
    /// Reflection coefficient. Default: `1`.
    reflection: P::Field,
    /// Expansion coefficient. Default: `2`.
    expansion: P::Field,
    /// Contraction coefficient, both outside and inside. Default: `0.5`.
    contraction: P::Field,
    /// Shrinking coefficient. Default: `0.5`.
    shrink: P::Field,
    /// Derive the coefficients from the dimension instead. Default: `false`.
    adaptive: bool,
}

impl<P: Problem> Default for NelderMeadOptions<P> {
    fn default() -> Self {
        Self {
            reflection: convert(1.0),
            expansion: convert(2.0),
            contraction: convert(0.5),
            shrink: convert(0.5),
            adaptive: false,
        }
    }
}

/// Nelder-Mead minimizer.
///
/// See [module](self) documentation for more details.
pub struct NelderMead<P: Problem> {
    options: NelderMeadOptions<P>,
    scale: OVector<P::Field, Dyn>,
    centroid: OVector<P::Field, Dyn>,
    trial: OVector<P::Field, Dyn>,
    // Vertices with their values, best first.
    vertices: Vec<(OVector<P::Field, Dyn>, P::Field)>,
}

impl<P: Problem> NelderMead<P> {
    /// Initializes Nelder-Mead minimizer with default options.
    pub fn new(p: &P, dom: &Domain<P::Field>) -> Self {
        Self::with_options(p, dom, NelderMeadOptions::default())
    }

    /// Initializes Nelder-Mead minimizer with given options.
    pub fn with_options(_: &P, dom: &Domain<P::Field>, mut options: NelderMeadOptions<P>) -> Self {
        let n = dom.dim();

        if options.adaptive {
            let one: P::Field = convert(1.0);
            let n_inv = one / convert(n as f64);

            options.reflection = one;
            options.expansion = one + n_inv * convert(2.0);
            options.contraction = convert::<f64, P::Field>(0.75) - n_inv * convert(0.5);
            options.shrink = one - n_inv;
        }

        Self {
            options,
            scale: dom.scale_or_ones(),
            centroid: OVector::zeros_generic(Dyn(n), U1::name()),
            trial: OVector::zeros_generic(Dyn(n), U1::name()),
            vertices: Vec::with_capacity(n + 1),
        }
    }

    /// Resets the internal state of the minimizer.
    pub fn reset(&mut self) {
        self.vertices.clear();
    }
}

/// Error returned from [`NelderMead`] minimizer.
#[derive(Debug, Error)]
pub enum NelderMeadError {
    /// Simplex collapsed so it is impossible to make any progress.
    #[error("simplex collapsed")]
    SimplexCollapsed,
    /// Simplex contains too many invalid values (NaN, infinity).
    #[error("simplex contains too many invalid values")]
    SimplexInvalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Reflection,
    Expansion,
    OuterContraction,
    InnerContraction,
    Shrink,
}

impl<F: Function> NelderMead<F> {
    fn init_simplex<Sx>(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        con: Option<&SumConstraint<F::Field>>,
        x: &mut Vector<F::Field, Dyn, Sx>,
    ) -> Result<(), NelderMeadError>
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
    {
        dom.project_with(x, con);
        self.vertices.push((x.clone_owned(), finite_or_inf(f.apply(x))));

        for j in 0..dom.dim() {
            let mut vertex = x.clone_owned();
            vertex[j] += self.scale[j];
            dom.project_with(&mut vertex, con);

            let value = finite_or_inf(f.apply(&vertex));
            self.vertices.push((vertex, value));
        }

        let invalid = self
            .vertices
            .iter()
            .filter(|(_, value)| !value.is_finite())
            .count();

        if invalid >= self.vertices.len() / 2 {
            debug!(
                "{} of {} simplex vertices have invalid value",
                invalid,
                self.vertices.len()
            );
            self.vertices.clear();
            return Err(NelderMeadError::SimplexInvalid);
        }

        self.sort();
        Ok(())
    }

    fn sort(&mut self) {
        self.vertices
            .sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Writes `centroid + coeff * (centroid - worst)` into the trial point,
    /// projects it and returns its value and whether the projection moved it.
    fn try_point(
        &mut self,
        f: &F,
        dom: &Domain<F::Field>,
        con: Option<&SumConstraint<F::Field>>,
        coeff: F::Field,
    ) -> (F::Field, bool) {
        let worst = &self.vertices[self.vertices.len() - 1].0;

        self.trial.copy_from(&self.centroid);
        self.trial.axpy(coeff, &self.centroid, convert(1.0));
        self.trial.axpy(-coeff, worst, convert(1.0));

        let projected = dom.project_with(&mut self.trial, con);
        (finite_or_inf(f.apply(&self.trial)), projected)
    }

    fn replace_worst(&mut self, value: F::Field) {
        let n = self.vertices.len() - 1;
        self.vertices[n].0.copy_from(&self.trial);
        self.vertices[n].1 = value;
    }
}

impl<F: Function> Minimizer<F> for NelderMead<F> {
    const NAME: &'static str = "Nelder-Mead";

    type Error = NelderMeadError;

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
        if self.vertices.is_empty() {
            self.init_simplex(f, dom, con, x)?;
        }

        let NelderMeadOptions {
            reflection,
            expansion,
            contraction,
            shrink,
            ..
        } = self.options;

        let n = dom.dim();

        self.centroid.fill(convert(0.0));
        for (vertex, _) in &self.vertices[..n] {
            self.centroid += vertex;
        }
        self.centroid /= convert(n as f64);

        let best = self.vertices[0].1;
        let second_worst = self.vertices[n - 1].1;
        let worst = self.vertices[n].1;

        let (reflected, mut projected) = self.try_point(f, dom, con, reflection);

        let step = if reflected < best {
            let reflected_point = self.trial.clone_owned();
            let (expanded, expansion_projected) = self.try_point(f, dom, con, reflection * expansion);

            if expanded < reflected {
                projected = expansion_projected;
                self.replace_worst(expanded);
                Step::Expansion
            } else {
                self.trial.copy_from(&reflected_point);
                self.replace_worst(reflected);
                Step::Reflection
            }
        } else if reflected < second_worst {
            self.replace_worst(reflected);
            Step::Reflection
        } else {
            let (outside, coeff) = if reflected < worst {
                (true, reflection * contraction)
            } else {
                (false, -contraction)
            };

            let (contracted, contraction_projected) = self.try_point(f, dom, con, coeff);
            let bound = if outside { reflected } else { worst };

            if contracted <= bound {
                projected = contraction_projected;
                self.replace_worst(contracted);

                if outside {
                    Step::OuterContraction
                } else {
                    Step::InnerContraction
                }
            } else {
                let (first, rest) = self.vertices.split_at_mut(1);
                let best_point = &first[0].0;

                for (vertex, value) in rest {
                    *vertex -= best_point;
                    *vertex *= shrink;
                    *vertex += best_point;
                    dom.project_with(&mut *vertex, con);
                    *value = finite_or_inf(f.apply(&*vertex));
                }

                projected = false;
                Step::Shrink
            }
        };

        self.sort();

        let best = self.vertices[0].1;
        let worst = self.vertices[n].1;

        trace!(
            "{:?}{}, fx = {} - {}",
            step,
            if projected { " with projection" } else { "" },
            best,
            worst
        );

        x.copy_from(&self.vertices[0].0);

        // Only these steps can fail to reduce the spread of values, see
        // "Less is more: Simplified Nelder-Mead method for large unconstrained
        // optimization".
        if matches!(step, Step::Shrink | Step::InnerContraction) || projected {
            let eps: F::Field = convert(EPSILON_SQRT);
            let spread = (worst - best) * convert(2.0) / (worst.abs() + best.abs() + eps);

            if spread <= eps {
                debug!("simplex collapsed at fx = {}", best);
                return Err(NelderMeadError::SimplexCollapsed);
            }
        }

        Ok(best)
    }
}

fn finite_or_inf<T: RealField>(value: T) -> T {
    if value.is_finite() {
        value
    } else {
        T::from_subset(&f64::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    fn run_until_collapse<F: Function<Field = f64>>(
        f: &F,
        dom: &Domain<f64>,
        con: Option<&SumConstraint<f64>>,
        x: &mut nalgebra::DVector<f64>,
        max_iters: usize,
    ) -> f64 {
        let mut minimizer = NelderMead::new(f, dom);
        let mut fx = f.apply(&*x);

        for _ in 0..max_iters {
            match minimizer.min_next(f, dom, con, x) {
                Ok(value) => fx = value,
                Err(NelderMeadError::SimplexCollapsed) => break,
                Err(error) => panic!("{}", error),
            }
        }

        fx
    }

    #[test]
    fn sphere_unconstrained() {
        let f = Sphere::new(2);
        let dom = f.domain();

        for x in f.initials() {
            let minimizer = NelderMead::new(&f, &dom);
            let x = minimize(&f, &dom, None, minimizer, x, 0.0, 500, 1e-8).unwrap();
            assert!(x.norm() < 1e-3);
        }
    }

    #[test]
    fn adaptive_sphere() {
        let f = Sphere::new(4);
        let dom = f.domain();
        let mut options = NelderMeadOptions::default();
        options.set_adaptive(true);

        let minimizer = NelderMead::with_options(&f, &dom, options);
        assert_abs_diff_eq!(minimizer.options.expansion(), 1.5);
        assert_abs_diff_eq!(minimizer.options.contraction(), 0.625);
        assert_abs_diff_eq!(minimizer.options.shrink(), 0.75);

        let x = minimize(&f, &dom, None, minimizer, f.initials().remove(0), 0.0, 2000, 1e-6).unwrap();
        assert!(x.norm() < 1e-2);
    }

    #[test]
    fn sphere_on_probability_simplex() {
        let f = Sphere::new(3);
        let dom = Domain::rect(vec![0.0; 3], vec![1.0; 3]);
        let con = SumConstraint::unit(0);
        let mut x = dvector![0.6, 0.3, 0.1];
        let initial = f.apply(&x);

        let fx = run_until_collapse(&f, &dom, Some(&con), &mut x, 500);

        assert_abs_diff_eq!(x.sum(), 1.0, epsilon = 1e-12);
        assert!(x.iter().all(|xi| (0.0..=1.0).contains(xi)));
        assert!(fx < initial);
        assert_abs_diff_eq!(fx, f.apply(&x), epsilon = 1e-15);
    }

    #[test]
    fn simplex_collapses_on_flat_function() {
        let f = Flat::new(2);
        let dom = f.domain();
        let mut minimizer = NelderMead::new(&f, &dom);
        let mut x = dvector![0.5, 0.5];

        let result = (0..10)
            .map(|_| minimizer.min_next(&f, &dom, None, &mut x))
            .find(|result| result.is_err());

        assert!(matches!(result, Some(Err(NelderMeadError::SimplexCollapsed))));
    }

    #[test]
    fn invalid_simplex() {
        let f = Sphere::new(2);
        let dom = f.domain();
        let mut minimizer = NelderMead::new(&f, &dom);
        let mut x = dvector![f64::INFINITY, 0.0];

        assert!(matches!(
            minimizer.min_next(&f, &dom, None, &mut x),
            Err(NelderMeadError::SimplexInvalid)
        ));
    }
}
