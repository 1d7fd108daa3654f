//! Testing functions, target random vectors and error models useful for
//! benchmarking, debugging and smoke testing.
//!
//! [`Sphere`] is recommended for first tests of minimizers. [`MomentMatching`]
//! together with [`SampleRandomVector`] is a complete, if simple, setup for
//! running the [`Optimizer`](crate::Optimizer).
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Stochastic reduced order models for uncertain geometrical
//! systems](https://doi.org/10.1016/j.cma.2006.08.023)

#![allow(unused)]

use std::{cell::Cell, error::Error as StdError};

use nalgebra::{
    storage::{Storage, StorageMut},
    DMatrix, DVector, Dyn, IsContiguous, OVector, Vector,
};
use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use rand_distr::Distribution;
use thiserror::Error;

use crate::{
    core::{Domain, Function, Minimizer, Problem, SumConstraint},
    options::{ErrorMode, ObjectiveSettings},
    srom::{ErrorModel, Objective, ObjectiveGradient, RandomVector, Srom},
};

/// Extension of the [`Problem`] trait that provides additional information
/// that is useful for testing minimizers.
pub trait TestProblem: Problem {
    /// Standard initial values for the problem. Using the same initial values is
    /// essential for fair comparison of methods.
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>>;
}

/// [Sphere
/// function](https://en.wikipedia.org/wiki/Test_functions_for_optimization)
/// \[1\].
///
/// This is a simple paraboloid which can be used in early development and
/// sanity checking as it can be considered a trivial problem.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    n: usize,
}

impl Sphere {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Problem for Sphere {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for Sphere {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        x.norm_squared()
    }
}

impl TestProblem for Sphere {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        let init = DVector::from_iterator(
            self.n,
            (0..self.n).map(|i| if i % 2 == 0 { 10.0 } else { -10.0 }),
        );

        vec![init]
    }
}

/// Sphere function scaled by one half which provides its gradient and counts
/// how many times the gradient was requested.
#[derive(Debug, Clone)]
pub struct AnalyticSphere {
    n: usize,
    gradient_calls: Cell<usize>,
}

impl AnalyticSphere {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self {
            n,
            gradient_calls: Cell::new(0),
        }
    }

    /// Number of gradient evaluations so far.
    pub fn gradient_calls(&self) -> usize {
        self.gradient_calls.get()
    }
}

impl Problem for AnalyticSphere {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for AnalyticSphere {
    fn apply<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        0.5 * x.norm_squared()
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
        self.gradient_calls.set(self.gradient_calls.get() + 1);
        g.copy_from(x);
        true
    }
}

impl TestProblem for AnalyticSphere {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::from_element(self.n, 1.0)]
    }
}

/// Function which has the same value everywhere.
#[derive(Debug, Clone, Copy)]
pub struct Flat {
    n: usize,
}

impl Flat {
    /// Initializes the function with given dimension.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        Self { n }
    }
}

impl Problem for Flat {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(self.n)
    }
}

impl Function for Flat {
    fn apply<Sx>(&self, _: &Vector<Self::Field, Dyn, Sx>) -> Self::Field
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        1.0
    }
}

impl TestProblem for Flat {
    fn initials(&self) -> Vec<OVector<Self::Field, Dyn>> {
        vec![DVector::zeros(self.n)]
    }
}

/// Minimization error of the testing driver (see [`minimize`]).
#[derive(Debug, Error)]
pub enum TestingError<E: StdError + 'static> {
    /// Error of the minimizer used.
    #[error("{0}")]
    Inner(#[from] E),
    /// Minimizer did not terminate.
    #[error("minimizer did not terminate")]
    Termination,
}

/// A simple minimizer driver that can be used in tests.
#[allow(clippy::too_many_arguments)]
pub fn minimize<F: Function, M: Minimizer<F>>(
    f: &F,
    dom: &Domain<F::Field>,
    con: Option<&SumConstraint<F::Field>>,
    mut minimizer: M,
    mut x: OVector<F::Field, Dyn>,
    min: F::Field,
    max_iters: usize,
    tolerance: F::Field,
) -> Result<OVector<F::Field, Dyn>, TestingError<M::Error>>
where
    M::Error: StdError,
{
    let mut iter = 0;

    loop {
        let fx = minimizer.min_next(f, dom, con, &mut x)?;

        if fx <= min + tolerance {
            // Converged.
            return Ok(x);
        }

        if iter == max_iters {
            return Err(TestingError::Termination);
        } else {
            iter += 1;
        }
    }
}

/// Random vector given by a fixed set of realizations, one per row.
///
/// Draws are made without replacement as long as there are enough
/// realizations, otherwise with replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRandomVector {
    realizations: DMatrix<f64>,
}

impl SampleRandomVector {
    /// Initializes the random vector from realizations, one per row.
    pub fn new(realizations: DMatrix<f64>) -> Self {
        assert!(
            realizations.nrows() > 0 && realizations.ncols() > 0,
            "realizations must not be empty"
        );
        Self { realizations }
    }

    /// Initializes one-dimensional random vector.
    pub fn from_values(values: &[f64]) -> Self {
        Self::new(DMatrix::from_column_slice(values.len(), 1, values))
    }

    /// Returns the realizations.
    pub fn realizations(&self) -> &DMatrix<f64> {
        &self.realizations
    }
}

impl RandomVector for SampleRandomVector {
    fn dim(&self) -> usize {
        self.realizations.ncols()
    }

    fn draw_random_sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> DMatrix<f64> {
        let n = self.realizations.nrows();

        let rows = if count <= n {
            index::sample(rng, n, count).into_vec()
        } else {
            (0..count).map(|_| rng.gen_range(0..n)).collect()
        };

        DMatrix::from_fn(count, self.dim(), |i, j| self.realizations[(rows[i], j)])
    }
}

/// Random vector with independent components following given distributions.
///
/// Its statistics are estimated from a reference sample of
/// [`AnalyticRandomVector::REFERENCE_SIZE`] realizations drawn with a fixed
/// seed.
#[derive(Debug, Clone)]
pub struct AnalyticRandomVector<D> {
    components: Vec<D>,
}

impl<D: Distribution<f64>> AnalyticRandomVector<D> {
    /// Size of the reference sample.
    pub const REFERENCE_SIZE: usize = 10_000;

    /// Initializes the random vector from the distributions of its components.
    pub fn new(components: Vec<D>) -> Self {
        assert!(!components.is_empty(), "at least one component is required");
        Self { components }
    }

    /// Initializes the random vector with `dim` identically distributed
    /// components.
    pub fn iid(dist: D, dim: usize) -> Self
    where
        D: Clone,
    {
        Self::new(vec![dist; dim])
    }

    /// Draws the reference sample.
    pub fn reference_sample(&self) -> DMatrix<f64> {
        self.draw_random_sample(Self::REFERENCE_SIZE, &mut StdRng::seed_from_u64(0))
    }
}

impl<D: Distribution<f64>> RandomVector for AnalyticRandomVector<D> {
    fn dim(&self) -> usize {
        self.components.len()
    }

    fn draw_random_sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> DMatrix<f64> {
        DMatrix::from_fn(count, self.dim(), |_, j| self.components[j].sample(rng))
    }
}

const MOMENT: usize = 0;
const CDF: usize = 1;
const CORRELATION: usize = 2;

/// Statistics of a sample set which are linear in sample probabilities: raw
/// moments, marginal CDFs on a grid and mixed second moments.
#[derive(Debug, Clone)]
struct Statistics {
    max_moment: usize,
    grids: Vec<Vec<f64>>,
    targets: [DVector<f64>; 3],
    scales: [DVector<f64>; 3],
}

impl Statistics {
    fn new(realizations: &DMatrix<f64>, settings: &ObjectiveSettings) -> Self {
        let max_moment = settings.max_moment();
        let pts = settings.cdf_grid_pts();

        let grids = realizations
            .column_iter()
            .map(|column| {
                let (lo, hi) = (column.min(), column.max());

                if pts == 1 {
                    vec![hi]
                } else {
                    (0..pts)
                        .map(|k| lo + (hi - lo) * k as f64 / (pts - 1) as f64)
                        .collect()
                }
            })
            .collect::<Vec<_>>();

        let n = realizations.nrows();
        let uniform = DVector::from_element(n, 1.0 / n as f64);
        let targets = coefficients(max_moment, &grids, realizations).map(|a| a * &uniform);

        // Moments are compared relatively.
        let scales = [
            targets[MOMENT].map(|t| if t.abs() > 1e-12 { t.abs() } else { 1.0 }),
            DVector::from_element(targets[CDF].len(), 1.0),
            DVector::from_element(targets[CORRELATION].len(), 1.0),
        ];

        Self {
            max_moment,
            grids,
            targets,
            scales,
        }
    }

    fn coefficients(&self, samples: &DMatrix<f64>) -> [DMatrix<f64>; 3] {
        coefficients(self.max_moment, &self.grids, samples)
    }

    fn residuals(&self, coeffs: &[DMatrix<f64>; 3], probabilities: &[f64]) -> [DVector<f64>; 3] {
        let p = DVector::from_column_slice(probabilities);

        [MOMENT, CDF, CORRELATION].map(|g| {
            (&coeffs[g] * &p - &self.targets[g]).component_div(&self.scales[g])
        })
    }
}

fn coefficients(max_moment: usize, grids: &[Vec<f64>], samples: &DMatrix<f64>) -> [DMatrix<f64>; 3] {
    let (m, d) = samples.shape();

    let moment = DMatrix::from_fn(d * max_moment, m, |row, i| {
        let (j, k) = (row / max_moment, row % max_moment + 1);
        samples[(i, j)].powi(k as i32)
    });

    let pts = grids.first().map(Vec::len).unwrap_or(0);
    let cdf = DMatrix::from_fn(d * pts, m, |row, i| {
        let (j, k) = (row / pts, row % pts);
        if samples[(i, j)] <= grids[j][k] {
            1.0
        } else {
            0.0
        }
    });

    let pairs = (0..d)
        .flat_map(|a| (a + 1..d).map(move |b| (a, b)))
        .collect::<Vec<_>>();
    let correlation = DMatrix::from_fn(pairs.len(), m, |row, i| {
        let (a, b) = pairs[row];
        samples[(i, a)] * samples[(i, b)]
    });

    [moment, cdf, correlation]
}

fn aggregate(residuals: &DVector<f64>, mode: ErrorMode) -> f64 {
    match mode {
        ErrorMode::Sse => residuals.norm_squared(),
        ErrorMode::Max => residuals.iter().fold(0.0, |max, r| max.max(r.abs())),
    }
}

/// Error model comparing moments, marginal CDFs and mixed second moments of
/// an SROM with those of a [`SampleRandomVector`] \[2\].
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentMatching;

/// Objective of the [`MomentMatching`] model.
#[derive(Debug, Clone)]
pub struct MomentObjective {
    stats: Statistics,
    weights: [f64; 3],
    mode: ErrorMode,
}

impl MomentObjective {
    fn errors(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> [f64; 3] {
        let coeffs = self.stats.coefficients(samples);
        self.stats
            .residuals(&coeffs, probabilities)
            .map(|r| aggregate(&r, self.mode))
    }
}

impl Objective for MomentObjective {
    fn evaluate(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
        self.errors(samples, probabilities)
            .iter()
            .zip(self.weights.iter())
            .map(|(e, w)| e * w)
            .sum()
    }

    fn moment_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
        self.errors(samples, probabilities)[MOMENT]
    }

    fn cdf_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
        self.errors(samples, probabilities)[CDF]
    }

    fn corr_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
        self.errors(samples, probabilities)[CORRELATION]
    }
}

/// Gradient of the [`MomentObjective`] in SSE mode.
#[derive(Debug, Clone)]
pub struct MomentGradient {
    stats: Statistics,
    weights: [f64; 3],
}

impl ObjectiveGradient for MomentGradient {
    fn evaluate(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> DVector<f64> {
        let coeffs = self.stats.coefficients(samples);
        let residuals = self.stats.residuals(&coeffs, probabilities);

        let mut grad = DVector::zeros(probabilities.len());

        for g in [MOMENT, CDF, CORRELATION] {
            let r = residuals[g].component_div(&self.stats.scales[g]);
            grad.gemv_tr(2.0 * self.weights[g], &coeffs[g], &r, 1.0);
        }

        grad
    }
}

impl MomentMatching {
    fn build(realizations: &DMatrix<f64>, settings: &ObjectiveSettings) -> (MomentObjective, MomentGradient) {
        let stats = Statistics::new(realizations, settings);

        let objective = MomentObjective {
            stats: stats.clone(),
            weights: settings.weights(),
            mode: settings.error_mode(),
        };

        let gradient = MomentGradient {
            stats,
            weights: settings.weights(),
        };

        (objective, gradient)
    }
}

impl ErrorModel<SampleRandomVector> for MomentMatching {
    type Objective = MomentObjective;
    type Gradient = MomentGradient;

    fn objective(
        &self,
        target: &SampleRandomVector,
        _: &Srom,
        settings: &ObjectiveSettings,
    ) -> Self::Objective {
        Self::build(target.realizations(), settings).0
    }

    fn gradient(
        &self,
        target: &SampleRandomVector,
        _: &Srom,
        settings: &ObjectiveSettings,
    ) -> Self::Gradient {
        Self::build(target.realizations(), settings).1
    }
}

impl<D: Distribution<f64>> ErrorModel<AnalyticRandomVector<D>> for MomentMatching {
    type Objective = MomentObjective;
    type Gradient = MomentGradient;

    fn objective(
        &self,
        target: &AnalyticRandomVector<D>,
        _: &Srom,
        settings: &ObjectiveSettings,
    ) -> Self::Objective {
        Self::build(&target.reference_sample(), settings).0
    }

    fn gradient(
        &self,
        target: &AnalyticRandomVector<D>,
        _: &Srom,
        settings: &ObjectiveSettings,
    ) -> Self::Gradient {
        Self::build(&target.reference_sample(), settings).1
    }
}

/// Error model whose only optimum are uniform probabilities, regardless of
/// samples. All sample sets are then equally good.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniformity;

/// Squared distance of probabilities from the uniform ones.
#[derive(Debug, Clone, Copy)]
pub struct UniformityObjective {
    size: usize,
}

impl UniformityObjective {
    fn distance(&self, probabilities: &[f64]) -> f64 {
        let uniform = 1.0 / self.size as f64;
        probabilities.iter().map(|p| (p - uniform).powi(2)).sum()
    }
}

impl Objective for UniformityObjective {
    fn evaluate(&self, _: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
        self.distance(probabilities)
    }

    fn moment_error(&self, _: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
        self.distance(probabilities)
    }

    fn cdf_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
        0.0
    }

    fn corr_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
        0.0
    }
}

/// Gradient of the [`UniformityObjective`].
#[derive(Debug, Clone, Copy)]
pub struct UniformityGradient {
    size: usize,
}

impl ObjectiveGradient for UniformityGradient {
    fn evaluate(&self, _: &DMatrix<f64>, probabilities: &[f64]) -> DVector<f64> {
        let uniform = 1.0 / self.size as f64;
        DVector::from_iterator(
            probabilities.len(),
            probabilities.iter().map(|p| 2.0 * (p - uniform)),
        )
    }
}

impl<T: RandomVector> ErrorModel<T> for Uniformity {
    type Objective = UniformityObjective;
    type Gradient = UniformityGradient;

    fn objective(&self, _: &T, srom: &Srom, _: &ObjectiveSettings) -> Self::Objective {
        UniformityObjective { size: srom.size() }
    }

    fn gradient(&self, _: &T, srom: &Srom, _: &ObjectiveSettings) -> Self::Gradient {
        UniformityGradient { size: srom.size() }
    }
}

/// Error model with the same error for every SROM. The objective is flat, so
/// the initial probabilities are already optimal.
#[derive(Debug, Clone, Copy)]
pub struct Plateau(pub f64);

/// Objective of the [`Plateau`] model.
#[derive(Debug, Clone, Copy)]
pub struct PlateauObjective(f64);

impl Objective for PlateauObjective {
    fn evaluate(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
        self.0
    }

    fn moment_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
        self.0
    }

    fn cdf_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
        self.0
    }

    fn corr_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
        self.0
    }
}

/// Gradient of the [`PlateauObjective`], zero everywhere.
#[derive(Debug, Clone, Copy)]
pub struct PlateauGradient;

impl ObjectiveGradient for PlateauGradient {
    fn evaluate(&self, _: &DMatrix<f64>, probabilities: &[f64]) -> DVector<f64> {
        DVector::zeros(probabilities.len())
    }
}

impl<T: RandomVector> ErrorModel<T> for Plateau {
    type Objective = PlateauObjective;
    type Gradient = PlateauGradient;

    fn objective(&self, _: &T, _: &Srom, _: &ObjectiveSettings) -> Self::Objective {
        PlateauObjective(self.0)
    }

    fn gradient(&self, _: &T, _: &Srom, _: &ObjectiveSettings) -> Self::Gradient {
        PlateauGradient
    }
}
