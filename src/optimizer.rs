//! The entry point for constructing an SROM.
//!
//! [`Optimizer`] validates the configuration once, on construction, and then
//! finds the optimal samples and probabilities with
//! [`get_optimal_params`](Optimizer::get_optimal_params).
//!
//! See the [crate](crate) documentation for a complete example.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    error::{ConfigError, OptimizeError},
    options::{ObjectiveSettings, SearchOptions},
    parallel::{Communicator, ParallelContext, WorkSplit},
    reconcile::{MultiWorkerStrategy, Reconciler, SingleWorkerStrategy},
    search::Search,
    srom::{ErrorModel, RandomVector, Srom, SromErrors},
};

/// Optimizer of SROM samples and probabilities.
///
/// The optimizer runs in one worker. For running in a group of workers, see
/// [`Optimizer::with_communicator`].
pub struct Optimizer<T, M, R = SingleWorkerStrategy>
where
    T: RandomVector,
    M: ErrorModel<T>,
{
    target: T,
    srom: Srom,
    settings: ObjectiveSettings,
    objective: M::Objective,
    gradient: Option<M::Gradient>,
    reconciler: R,
    ctx: ParallelContext,
}

impl<T, M> Optimizer<T, M>
where
    T: RandomVector,
    M: ErrorModel<T>,
{
    /// Creates the optimizer for a lone worker.
    ///
    /// Fails if `settings` are invalid or the dimensions of `target` and
    /// `srom` differ.
    pub fn new(target: T, srom: Srom, model: M, settings: ObjectiveSettings) -> Result<Self, OptimizeError> {
        Self::with_reconciler(target, srom, model, settings, SingleWorkerStrategy)
    }

    /// Creates the optimizer for the worker owning `comm`. All workers of the
    /// group must call [`get_optimal_params`](Optimizer::get_optimal_params)
    /// with the same options, they then all return the same result.
    pub fn with_communicator<C: Communicator>(
        target: T,
        srom: Srom,
        model: M,
        settings: ObjectiveSettings,
        comm: C,
    ) -> Result<Optimizer<T, M, MultiWorkerStrategy<C>>, OptimizeError> {
        Optimizer::with_reconciler(target, srom, model, settings, MultiWorkerStrategy::new(comm))
    }
}

impl<T, M, R> Optimizer<T, M, R>
where
    T: RandomVector,
    M: ErrorModel<T>,
    R: Reconciler,
{
    /// Creates the optimizer with given reconciliation strategy.
    pub fn with_reconciler(
        target: T,
        srom: Srom,
        model: M,
        settings: ObjectiveSettings,
        reconciler: R,
    ) -> Result<Self, OptimizeError> {
        settings.validate()?;

        if target.dim() != srom.dim() {
            return Err(ConfigError::value_error(
                "srom",
                format!(
                    "dimension {} does not match target dimension {}",
                    srom.dim(),
                    target.dim()
                ),
            )
            .into());
        }

        let objective = model.objective(&target, &srom, &settings);

        // Only the sum of squared errors is differentiable.
        let gradient = settings
            .error_mode()
            .has_gradient()
            .then(|| model.gradient(&target, &srom, &settings));

        let ctx = reconciler.context();

        debug!(
            "optimizer for SROM of size {} and dimension {}, worker {} of {}",
            srom.size(),
            srom.dim(),
            ctx.worker_rank(),
            ctx.worker_count()
        );

        Ok(Self {
            target,
            srom,
            settings,
            objective,
            gradient,
            reconciler,
            ctx,
        })
    }

    /// Finds the samples and probabilities minimizing the error of the SROM.
    pub fn get_optimal_params(&self, options: &SearchOptions) -> Result<OptimalParams, OptimizeError> {
        options.validate()?;

        let split = self.ctx.split(options.num_test_samples());

        if options.verbose() {
            self.show_parallelization_information(&split);
        }

        let start = Instant::now();

        let local = Search::new(
            &self.target,
            &self.srom,
            &self.objective,
            self.gradient.as_ref(),
            self.ctx,
        )
        .run(options)?
        .into_best();

        let best = self
            .reconciler
            .reconcile(local, &self.objective)?
            .ok_or_else(|| {
                OptimizeError::NoCandidate(format!(
                    "{} sample sets tried by each of {} workers",
                    split.per_worker, split.workers
                ))
            })?;

        let errors = self.get_errors(&best.samples, best.probabilities.as_slice());
        let elapsed = start.elapsed();

        if options.verbose() && self.ctx.is_coordinator() {
            info!("optimization time: {:.3} seconds", elapsed.as_secs_f64());
            info!("final SROM errors:");
            info!("CDF: {}", errors.cdf);
            info!("moment: {}", errors.moment);
            info!("correlation: {}", errors.correlation);
        }

        Ok(OptimalParams {
            samples: best.samples,
            probabilities: best.probabilities,
            errors,
            elapsed,
            split,
        })
    }

    /// Computes the moment, CDF, correlation and mean errors of given SROM.
    pub fn get_errors(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> SromErrors {
        SromErrors::compute(&self.objective, samples, probabilities)
    }

    fn show_parallelization_information(&self, split: &WorkSplit) {
        if self.ctx.is_single() {
            info!("SROM sequential optimizer:");
        } else if self.ctx.is_coordinator() {
            info!("SROM parallel optimizer ({} workers):", self.ctx.worker_count());
        }

        if self.ctx.is_coordinator() && !split.is_even() {
            warn!(
                "number of test samples not divisible by number of workers: {} per worker, {} total",
                split.per_worker, split.total
            );
        }
    }

    /// Returns the parallel context of this worker.
    pub fn context(&self) -> ParallelContext {
        self.ctx
    }

    /// Returns the SROM descriptor.
    pub fn srom(&self) -> &Srom {
        &self.srom
    }

    /// Returns the objective settings.
    pub fn settings(&self) -> &ObjectiveSettings {
        &self.settings
    }

    /// Returns `true` if the analytic gradient is used.
    pub fn has_gradient(&self) -> bool {
        self.gradient.is_some()
    }
}

/// Result of [`Optimizer::get_optimal_params`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimalParams {
    /// Optimal samples, one per row.
    pub samples: DMatrix<f64>,
    /// Optimal probabilities. They sum to one.
    pub probabilities: DVector<f64>,
    /// Errors of the optimal SROM.
    pub errors: SromErrors,
    /// Wall-clock time of the optimization.
    pub elapsed: Duration,
    /// Distribution of sample sets among workers.
    pub split: WorkSplit,
}

impl OptimalParams {
    /// Returns the samples and the probabilities.
    pub fn into_parts(self) -> (DMatrix<f64>, DVector<f64>) {
        (self.samples, self.probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    use crate::{
        options::{ErrorMode, Method},
        parallel::LocalCommunicator,
        testing::{logs, MomentMatching, Plateau, SampleRandomVector, Uniformity},
    };
    use log::Level;

    // Ten realizations of a uniform random variable.
    const VALUES: [f64; 10] = [
        4.17022005e-01,
        7.20324493e-01,
        1.14374817e-04,
        3.02332573e-01,
        1.46755891e-01,
        9.23385948e-02,
        1.86260211e-01,
        3.45560727e-01,
        3.96767474e-01,
        5.38816734e-01,
    ];

    fn sample_random_vector() -> SampleRandomVector {
        SampleRandomVector::from_values(&VALUES)
    }

    fn valid_srom() -> Srom {
        Srom::new(10, 1).unwrap()
    }

    fn quiet(num_test_samples: usize) -> SearchOptions {
        let mut options = SearchOptions::default();
        options.set_num_test_samples(num_test_samples).set_verbose(false);
        options
    }

    #[test]
    fn valid_construction() {
        let optimizer = Optimizer::new(
            sample_random_vector(),
            valid_srom(),
            MomentMatching,
            ObjectiveSettings::default(),
        )
        .unwrap();

        assert!(optimizer.context().is_single());
        assert!(optimizer.has_gradient());

        let settings = ObjectiveSettings::default().with_weights(&[1.0, 1.0, 1.0]).unwrap();
        assert!(Optimizer::new(sample_random_vector(), valid_srom(), MomentMatching, settings).is_ok());
    }

    #[test]
    fn max_mode_has_no_gradient() {
        let settings = ObjectiveSettings::from_json(&json!({ "error": "MAX" })).unwrap();
        let optimizer = Optimizer::new(sample_random_vector(), valid_srom(), MomentMatching, settings).unwrap();

        assert!(!optimizer.has_gradient());
        assert_eq!(optimizer.settings().error_mode(), ErrorMode::Max);

        let params = optimizer.get_optimal_params(&quiet(3)).unwrap();
        assert_abs_diff_eq!(params.probabilities.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut settings = ObjectiveSettings::default();
        settings.set_weights([1.0, 1.0, -1.0]);

        let result = Optimizer::new(sample_random_vector(), valid_srom(), MomentMatching, settings);
        assert!(matches!(result, Err(OptimizeError::Config(err)) if err.is_value()));

        let mut settings = ObjectiveSettings::default();
        settings.set_cdf_grid_pts(0);

        let result = Optimizer::new(sample_random_vector(), valid_srom(), MomentMatching, settings);
        assert!(matches!(result, Err(OptimizeError::Config(err)) if err.is_value()));
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let result = Optimizer::new(
            sample_random_vector(),
            Srom::new(10, 2).unwrap(),
            MomentMatching,
            ObjectiveSettings::default(),
        );

        assert!(matches!(result, Err(OptimizeError::Config(err)) if err.param() == "srom"));
    }

    #[test]
    fn invalid_num_test_samples_rejected() {
        let optimizer = Optimizer::new(
            sample_random_vector(),
            valid_srom(),
            MomentMatching,
            ObjectiveSettings::default(),
        )
        .unwrap();

        let result = optimizer.get_optimal_params(&quiet(0));
        assert!(matches!(result, Err(OptimizeError::Config(err)) if err.is_value()));

        let err = SearchOptions::from_json(&json!({ "num_test_samples": "One" })).unwrap_err();
        assert!(err.is_type());
    }

    #[test]
    fn joint_optimization_not_implemented() {
        let optimizer = Optimizer::new(
            sample_random_vector(),
            valid_srom(),
            MomentMatching,
            ObjectiveSettings::default(),
        )
        .unwrap();

        let mut options = quiet(10);
        options.set_joint_opt(true);

        assert!(matches!(
            optimizer.get_optimal_params(&options),
            Err(OptimizeError::NotImplemented(_))
        ));
    }

    #[test]
    fn expected_output() {
        let target = sample_random_vector();
        let optimizer =
            Optimizer::new(target.clone(), valid_srom(), Uniformity, ObjectiveSettings::default()).unwrap();

        let (samples, probabilities) = optimizer.get_optimal_params(&quiet(10)).unwrap().into_parts();

        // All sample sets are equally good, so the first one drawn by the
        // worker of rank zero is kept.
        let expected = target.draw_random_sample(10, &mut StdRng::seed_from_u64(0));

        assert_eq!(probabilities.sum(), 1.0);
        assert_eq!(samples, expected);

        let mut drawn = samples.iter().copied().collect::<Vec<_>>();
        let mut values = VALUES.to_vec();
        drawn.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(drawn, values);
    }

    #[test]
    fn deterministic() {
        let optimizer = Optimizer::new(
            sample_random_vector(),
            valid_srom(),
            MomentMatching,
            ObjectiveSettings::default(),
        )
        .unwrap();

        let first = optimizer.get_optimal_params(&quiet(10)).unwrap();
        let second = optimizer.get_optimal_params(&quiet(10)).unwrap();

        assert_eq!(first.samples, second.samples);
        assert_eq!(first.probabilities, second.probabilities);
        assert_eq!(first.errors, second.errors);
    }

    #[test]
    fn probabilities_are_feasible() {
        let target = SampleRandomVector::new(DMatrix::from_fn(40, 2, |i, j| {
            let t = i as f64 / 39.0;
            if j == 0 {
                t
            } else {
                t.powi(3)
            }
        }));

        let optimizer = Optimizer::new(
            target,
            Srom::new(6, 2).unwrap(),
            MomentMatching,
            ObjectiveSettings::default(),
        )
        .unwrap();

        for method in [None, Some(Method::ProjectedGradient), Some(Method::NelderMead)] {
            let mut options = quiet(5);
            options.set_method(method);

            let params = optimizer.get_optimal_params(&options).unwrap();

            assert_eq!(params.samples.shape(), (6, 2));
            assert_abs_diff_eq!(params.probabilities.sum(), 1.0, epsilon = 1e-9);
            assert!(params.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));

            let errors = optimizer.get_errors(&params.samples, params.probabilities.as_slice());
            assert_eq!(errors, params.errors);
            assert_abs_diff_eq!(
                errors.mean,
                (errors.moment + errors.cdf + errors.correlation) / 3.0,
                epsilon = 1e-15
            );
        }
    }

    #[test]
    fn two_workers_agree() {
        let results = thread::scope(|s| {
            let handles = LocalCommunicator::group(2)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let optimizer = Optimizer::with_communicator(
                            sample_random_vector(),
                            valid_srom(),
                            MomentMatching,
                            ObjectiveSettings::default(),
                            comm,
                        )
                        .unwrap();

                        let mut options = SearchOptions::default();
                        options.set_num_test_samples(7);
                        optimizer.get_optimal_params(&options).unwrap()
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(results[0].samples, results[1].samples);
        assert_eq!(results[0].probabilities, results[1].probabilities);

        let split = results[0].split;
        assert_eq!((split.per_worker, split.total, split.workers), (3, 7, 2));
        assert!(!split.is_even());
    }

    #[test]
    fn more_workers_than_samples() {
        let results = thread::scope(|s| {
            let handles = LocalCommunicator::group(3)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        Optimizer::with_communicator(
                            sample_random_vector(),
                            valid_srom(),
                            MomentMatching,
                            ObjectiveSettings::default(),
                            comm,
                        )
                        .unwrap()
                        .get_optimal_params(&quiet(2))
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(results
            .iter()
            .all(|result| matches!(result, Err(OptimizeError::NoCandidate(_)))));
    }

    #[test]
    fn large_objective_values_yield_result() {
        let optimizer = Optimizer::new(
            sample_random_vector(),
            valid_srom(),
            Plateau(2e6),
            ObjectiveSettings::default(),
        )
        .unwrap();

        let params = optimizer.get_optimal_params(&quiet(3)).unwrap();

        assert_eq!(params.probabilities.sum(), 1.0);
        assert_eq!(params.errors.mean, 2e6);
    }

    #[test]
    fn sequential_run_reports_header() {
        let optimizer = Optimizer::new(
            sample_random_vector(),
            valid_srom(),
            Uniformity,
            ObjectiveSettings::default(),
        )
        .unwrap();

        let mut options = SearchOptions::default();
        options.set_num_test_samples(3);

        let (_, records) = logs::capture(|| optimizer.get_optimal_params(&options).unwrap());
        let info = logs::messages(&records, Level::Info);

        assert_eq!(info.first(), Some(&"SROM sequential optimizer:"));
        assert!(info.contains(&"final SROM errors:"));
        assert!(logs::messages(&records, Level::Warn).is_empty());

        options.set_verbose(false);
        let (_, records) = logs::capture(|| optimizer.get_optimal_params(&options).unwrap());
        assert!(records.is_empty());
    }

    #[test]
    fn uneven_split_is_reported_by_coordinator() {
        let records = thread::scope(|s| {
            let handles = LocalCommunicator::group(2)
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let optimizer = Optimizer::with_communicator(
                            sample_random_vector(),
                            valid_srom(),
                            Uniformity,
                            ObjectiveSettings::default(),
                            comm,
                        )
                        .unwrap();

                        let mut options = SearchOptions::default();
                        options.set_num_test_samples(7);
                        logs::capture(|| optimizer.get_optimal_params(&options).unwrap()).1
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        let coordinator = &records[0];
        assert_eq!(
            logs::messages(coordinator, Level::Info).first(),
            Some(&"SROM parallel optimizer (2 workers):")
        );
        assert_eq!(
            logs::messages(coordinator, Level::Warn),
            ["number of test samples not divisible by number of workers: 3 per worker, 7 total"]
        );

        // Other workers stay silent.
        assert!(records[1].is_empty());
    }
}
