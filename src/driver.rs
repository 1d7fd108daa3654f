//! High-level API for running a minimizer.
//!
//! The driver encapsulates all internal state of the iterative process and
//! provides a simple API to run it. The simplest way of using the driver is to
//! initialize it with the defaults:
//!
//! ```rust
//! use srom_opt::MinimizerDriver;
//! # use srom_opt::nalgebra as na;
//! # use srom_opt::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyFunction;
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::rect(vec![0.0, 0.0], vec![1.0, 1.0])
//! #     }
//! # }
//! #
//! # impl Function for MyFunction {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0] - 0.2).powi(2) + (x[1] - 0.8).powi(2)
//! #     }
//! # }
//!
//! let f = MyFunction;
//!
//! let mut minimizer = MinimizerDriver::new(&f);
//! ```
//!
//! If you need to specify additional settings, use the builder:
//!
//! ```rust
//! use srom_opt::{MinimizerDriver, SumConstraint};
//! # use srom_opt::nalgebra as na;
//! # use srom_opt::{Domain, Function, Problem};
//! # use na::{Dyn, IsContiguous};
//! #
//! # struct MyFunction;
//! #
//! # impl Problem for MyFunction {
//! #     type Field = f64;
//! #
//! #     fn domain(&self) -> Domain<Self::Field> {
//! #         Domain::rect(vec![0.0, 0.0], vec![1.0, 1.0])
//! #     }
//! # }
//! #
//! # impl Function for MyFunction {
//! #     fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Self::Field
//! #     where
//! #         Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
//! #     {
//! #         (x[0] - 0.2).powi(2) + (x[1] - 0.8).powi(2)
//! #     }
//! # }
//!
//! let f = MyFunction;
//!
//! let mut minimizer = MinimizerDriver::builder(&f)
//!     .with_initial(vec![0.5, 0.5])
//!     .with_constraint(SumConstraint::unit(0))
//!     .with_algo(srom_opt::algo::ProjectedGradient::new)
//!     .build();
//!
//! let (x, fx) = minimizer
//!     .find(|state| state.fx() <= 1e-9 || state.iter() >= 100)
//!     .expect("minimizer error");
//! ```

use nalgebra::{convert, DimName, Dyn, OVector, U1};

use crate::{algo::ProjectedGradient, Domain, Function, Minimizer, Problem, SumConstraint};

struct Builder<'a, F: Problem, A> {
    f: &'a F,
    dom: Domain<F::Field>,
    con: Option<SumConstraint<F::Field>>,
    algo: A,
    x0: OVector<F::Field, Dyn>,
}

impl<'a, F: Problem> Builder<'a, F, ProjectedGradient<F>> {
    fn new(f: &'a F) -> Self {
        let dom = f.domain();
        let algo = ProjectedGradient::new(f, &dom);

        let dim = Dyn(dom.dim());
        let x0 = OVector::from_element_generic(dim, U1::name(), convert(0.0));

        Self {
            f,
            dom,
            con: None,
            algo,
            x0,
        }
    }
}

impl<'a, F: Problem, A> Builder<'a, F, A> {
    fn with_initial(mut self, x0: Vec<F::Field>) -> Self {
        let dim = Dyn(self.dom.dim());
        self.x0 = OVector::from_vec_generic(dim, U1::name(), x0);
        self
    }

    fn with_constraint(mut self, con: SumConstraint<F::Field>) -> Self {
        self.con = Some(con);
        self
    }

    fn with_algo<A2, FA>(self, factory: FA) -> Builder<'a, F, A2>
    where
        FA: FnOnce(&F, &Domain<F::Field>) -> A2,
    {
        let algo = factory(self.f, &self.dom);

        Builder {
            f: self.f,
            dom: self.dom,
            con: self.con,
            algo,
            x0: self.x0,
        }
    }

    fn build(mut self) -> Self {
        self.dom.project_with(&mut self.x0, self.con.as_ref());
        self
    }
}

/// Builder for the [`MinimizerDriver`].
pub struct MinimizerBuilder<'a, F: Problem, A>(Builder<'a, F, A>);

impl<'a, F: Problem, A> MinimizerBuilder<'a, F, A> {
    /// Sets the initial point from which the iterative process starts.
    pub fn with_initial(self, x0: Vec<F::Field>) -> Self {
        Self(self.0.with_initial(x0))
    }

    /// Sets the equality constraint the iterates must satisfy.
    pub fn with_constraint(self, con: SumConstraint<F::Field>) -> Self {
        Self(self.0.with_constraint(con))
    }

    /// Sets specific algorithm to be used.
    ///
    /// This builder method accepts a closure that takes the reference to the
    /// problem and its domain. For the algorithms in this crate, you can
    /// simply pass the `new` constructor directly (e.g., `NelderMead::new`).
    pub fn with_algo<A2, FA>(self, factory: FA) -> MinimizerBuilder<'a, F, A2>
    where
        FA: FnOnce(&F, &Domain<F::Field>) -> A2,
    {
        MinimizerBuilder(self.0.with_algo(factory))
    }

    /// Builds the [`MinimizerDriver`].
    pub fn build(self) -> MinimizerDriver<'a, F, A> {
        let Builder {
            f,
            dom,
            con,
            algo,
            x0,
        } = self.0.build();

        MinimizerDriver {
            f,
            dom,
            con,
            algo,
            x: x0,
            fx: convert(f64::INFINITY),
        }
    }
}

/// The driver for the process of minimizing a function.
///
/// For default settings, use [`MinimizerDriver::new`]. For more flexibility,
/// use [`MinimizerDriver::builder`]. For the usage of the driver, see
/// [module](self) documentation.
pub struct MinimizerDriver<'a, F: Problem, A> {
    f: &'a F,
    dom: Domain<F::Field>,
    con: Option<SumConstraint<F::Field>>,
    algo: A,
    x: OVector<F::Field, Dyn>,
    fx: F::Field,
}

impl<'a, F: Problem> MinimizerDriver<'a, F, ProjectedGradient<F>> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(f: &'a F) -> MinimizerBuilder<'a, F, ProjectedGradient<F>> {
        MinimizerBuilder(Builder::new(f))
    }

    /// Initializes the driver with the default settings.
    pub fn new(f: &'a F) -> Self {
        MinimizerDriver::builder(f).build()
    }
}

impl<'a, F: Problem, A> MinimizerDriver<'a, F, A> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[F::Field] {
        self.x.as_slice()
    }

    /// Returns the current function value, infinity before the first
    /// iteration.
    pub fn fx(&self) -> F::Field {
        self.fx
    }

    /// Returns the constraint the iterates satisfy, if any.
    pub fn constraint(&self) -> Option<&SumConstraint<F::Field>> {
        self.con.as_ref()
    }
}

impl<'a, F: Function, A: Minimizer<F>> MinimizerDriver<'a, F, A> {
    /// Does one iteration of the process, returning the function value in case
    /// of no error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<(&[F::Field], F::Field), A::Error> {
        self.fx = self
            .algo
            .min_next(self.f, &self.dom, self.con.as_ref(), &mut self.x)?;
        Ok((self.x.as_slice(), self.fx))
    }

    /// Runs the iterative process until given stopping criterion is satisfied.
    pub fn find<C>(&mut self, stop: C) -> Result<(&[F::Field], F::Field), A::Error>
    where
        C: Fn(MinimizerIterState<'_, F>) -> bool,
    {
        let mut iter = 0;

        loop {
            self.next()?;

            let state = MinimizerIterState {
                x: &self.x,
                fx: self.fx,
                iter,
            };

            if stop(state) {
                return Ok((self.x.as_slice(), self.fx));
            }

            iter += 1;
        }
    }

    /// Returns the name of the used minimizer.
    pub fn name(&self) -> &str {
        A::NAME
    }
}

/// State of the current iteration.
pub struct MinimizerIterState<'a, F: Problem> {
    x: &'a OVector<F::Field, Dyn>,
    fx: F::Field,
    iter: usize,
}

impl<'a, F: Problem> MinimizerIterState<'a, F> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[F::Field] {
        self.x.as_slice()
    }

    /// Returns the current function value.
    pub fn fx(&self) -> F::Field {
        self.fx
    }

    /// Returns the current iteration number.
    pub fn iter(&self) -> usize {
        self.iter
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{storage::Storage, IsContiguous, Vector};

    use crate::{
        algo::{NelderMead, ProjectedGradient},
        testing::Sphere,
    };

    use super::*;

    struct WithDomain(pub Domain<f64>);

    impl Problem for WithDomain {
        type Field = f64;

        fn domain(&self) -> Domain<Self::Field> {
            self.0.clone()
        }
    }

    /// Squared distance from `(0.2, 0.8)` on the unit square.
    struct Target;

    impl Problem for Target {
        type Field = f64;

        fn domain(&self) -> Domain<Self::Field> {
            Domain::rect(vec![0.0, 0.0], vec![1.0, 1.0])
        }
    }

    impl Function for Target {
        fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
        where
            Sx: Storage<Self::Field, Dyn> + IsContiguous,
        {
            (x[0] - 0.2).powi(2) + (x[1] - 0.8).powi(2)
        }
    }

    #[test]
    fn basic_use_case() {
        let f = Sphere::new(4);
        let mut minimizer = MinimizerDriver::builder(&f)
            // Zeros are the minimum for sphere, there would be no point is
            // such test.
            .with_initial(vec![10.0; 4])
            .build();

        let tolerance = 1e-6;
        let (_, value) = minimizer
            .find(|state| state.iter() >= 100 || state.fx() < tolerance)
            .unwrap();

        assert!(value <= tolerance);
    }

    #[test]
    fn custom_algo() {
        let f = Sphere::new(4);
        let mut minimizer = MinimizerDriver::builder(&f)
            .with_algo(NelderMead::new)
            .with_initial(vec![10.0; 4])
            .build();

        let tolerance = 1e-6;
        let (_, value) = minimizer
            .find(|state| state.iter() >= 1000 || state.fx() < tolerance)
            .unwrap();

        assert!(value <= tolerance);
    }

    #[test]
    fn initial() {
        let x0 = vec![10.0; 4];

        let f = Sphere::new(4);
        let minimizer = MinimizerDriver::builder(&f).with_initial(x0.clone()).build();

        assert_eq!(minimizer.x(), &x0);
        assert!(minimizer.fx().is_infinite());
    }

    #[test]
    fn initial_in_domain() {
        let f = WithDomain(Domain::rect(vec![0.0, 0.0], vec![1.0, 1.0]));
        let minimizer = MinimizerDriver::builder(&f)
            .with_initial(vec![10.0, -10.0])
            .build();

        assert_eq!(minimizer.x(), &[1.0, 0.0]);
    }

    #[test]
    fn initial_satisfies_constraint() {
        let f = WithDomain(Domain::rect(vec![0.0; 4], vec![1.0; 4]));
        let minimizer = MinimizerDriver::builder(&f)
            .with_initial(vec![1.0; 4])
            .with_constraint(SumConstraint::unit(0))
            .build();

        let sum: f64 = minimizer.x().iter().sum();
        approx::assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        assert!(minimizer.constraint().is_some());
    }

    #[test]
    fn constrained_use_case() {
        let f = Target;
        let mut minimizer = MinimizerDriver::builder(&f)
            .with_initial(vec![0.5, 0.5])
            .with_constraint(SumConstraint::unit(0))
            .with_algo(ProjectedGradient::new)
            .build();

        let (x, fx) = minimizer
            .find(|state| state.fx() <= 1e-9 || state.iter() >= 100)
            .unwrap();

        assert!(fx <= 1e-9);
        approx::assert_relative_eq!(x[0], 0.2, epsilon = 1e-4);
        approx::assert_relative_eq!(x[1], 0.8, epsilon = 1e-4);
    }
}
