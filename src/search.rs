//! Random search over sample sets.
//!
//! Each iteration draws a fresh set of samples from the target, finds the
//! optimal probabilities for it and keeps the candidate if it is strictly
//! better than all candidates seen before. The random generator of a worker
//! is seeded by its rank, so a run is reproducible for a fixed number of
//! workers.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    adapter::{self, ProbabilityProblem},
    error::OptimizeError,
    options::{Method, SearchOptions},
    parallel::ParallelContext,
    srom::{Candidate, Objective, ObjectiveGradient, RandomVector, Srom},
};

/// Best candidate found so far by one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    best_value: f64,
    best: Option<Candidate>,
}

impl SearchState {
    /// Best value of the state with no candidate. Any finite objective value
    /// beats it, NaN and infinity never do.
    pub const SENTINEL: f64 = f64::INFINITY;

    /// Creates the state with no candidate.
    pub fn new() -> Self {
        Self {
            best_value: Self::SENTINEL,
            best: None,
        }
    }

    /// Replaces the best candidate if `value` is strictly lower than the best
    /// value so far. Returns whether the candidate was accepted.
    pub fn offer(&mut self, value: f64, samples: DMatrix<f64>, probabilities: DVector<f64>) -> bool {
        if value < self.best_value {
            self.best_value = value;
            self.best = Some(Candidate::new(samples, probabilities));
            true
        } else {
            false
        }
    }

    /// Objective value of the best candidate, or the sentinel if there is
    /// none.
    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    /// The best candidate, if any.
    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    /// Consumes the state, returning the best candidate.
    pub fn into_best(self) -> Option<Candidate> {
        self.best
    }
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

/// The search loop of one worker.
pub struct Search<'a, T, O, G> {
    target: &'a T,
    srom: &'a Srom,
    objective: &'a O,
    gradient: Option<&'a G>,
    ctx: ParallelContext,
}

impl<'a, T, O, G> Search<'a, T, O, G>
where
    T: RandomVector,
    O: Objective,
    G: ObjectiveGradient,
{
    /// Prepares the search. The analytic `gradient` is used if given.
    pub fn new(
        target: &'a T,
        srom: &'a Srom,
        objective: &'a O,
        gradient: Option<&'a G>,
        ctx: ParallelContext,
    ) -> Self {
        Self {
            target,
            srom,
            objective,
            gradient,
            ctx,
        }
    }

    /// Runs this worker's share of `options.num_test_samples()` iterations.
    ///
    /// Fails with [`OptimizeError::NotImplemented`] for joint optimization
    /// before any iteration is run.
    pub fn run(&self, options: &SearchOptions) -> Result<SearchState, OptimizeError> {
        let joint = options.joint_opt();
        let dom = adapter::param_bounds(self.srom, joint)?;
        let con = adapter::constraint(self.srom, joint)?.as_sum_constraint();

        let method = options.method().unwrap_or(Method::ProjectedGradient);
        let minimize = options.minimize();
        let report = options.verbose() && self.ctx.is_single();

        let mut rng = StdRng::seed_from_u64(self.ctx.worker_rank() as u64);
        let mut state = SearchState::new();

        for i in 0..self.ctx.split(options.num_test_samples()).per_worker {
            let samples = self.target.draw_random_sample(self.srom.size(), &mut rng);
            let x0 = adapter::initial_guess(self.srom, joint, self.target, &mut rng);

            let minimum = {
                let f = ProbabilityProblem::new(self.objective, self.gradient, &samples, dom.clone());
                adapter::solve(&f, con, &x0, method, &minimize)
            };

            let fx = minimum.fx;
            debug!(
                "sample set {}: fx = {} after {} iterations, converged: {}",
                i + 1,
                fx,
                minimum.iterations,
                minimum.converged
            );
            state.offer(fx, samples, minimum.x);

            if report && (i == 0 || (i + 1) % options.output_interval() == 0) {
                info!("iteration {} objective function: {}", i + 1, fx);
                info!("optimal: {}", state.best_value());
            }
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    use crate::{
        options::ObjectiveSettings,
        parallel::LocalCommunicator,
        srom::ErrorModel,
        testing::{logs, MomentGradient, MomentMatching, Plateau, SampleRandomVector, Uniformity},
    };
    use log::Level;

    #[test]
    fn state_keeps_strictly_better() {
        let mut state = SearchState::new();
        assert_eq!(state.best_value(), SearchState::SENTINEL);
        assert!(state.best().is_none());

        assert!(!state.offer(f64::INFINITY, dmatrix![1.0], dvector![1.0]));
        assert!(state.offer(2e6, dmatrix![1.0], dvector![1.0]));
        assert!(state.offer(0.5, dmatrix![1.0], dvector![1.0]));
        assert!(!state.offer(0.5, dmatrix![2.0], dvector![1.0]));
        assert!(state.offer(0.25, dmatrix![3.0], dvector![1.0]));

        assert_eq!(state.best_value(), 0.25);
        assert_eq!(state.into_best().unwrap().samples, dmatrix![3.0]);
    }

    #[test]
    fn nan_is_never_accepted() {
        let mut state = SearchState::new();
        assert!(!state.offer(f64::NAN, dmatrix![1.0], dvector![1.0]));
        assert!(state.best().is_none());
    }

    #[test]
    fn no_iterations_leave_no_candidate() {
        let target = SampleRandomVector::from_values(&[0.0, 1.0, 2.0]);
        let srom = Srom::new(2, 1).unwrap();
        let settings = ObjectiveSettings::default();
        let objective = Uniformity.objective(&target, &srom, &settings);
        let gradient = Uniformity.gradient(&target, &srom, &settings);

        let mut options = SearchOptions::default();
        options.set_num_test_samples(1).set_verbose(false);

        let search = Search::new(&target, &srom, &objective, Some(&gradient), ParallelContext::single());
        assert!(search.run(&options).unwrap().best().is_some());

        // More workers than sample sets.
        let ctx = ParallelContext::from_communicator(&LocalCommunicator::group(2)[1]);
        let search = Search::new(&target, &srom, &objective, Some(&gradient), ctx);
        let state = search.run(&options).unwrap();

        assert!(state.best().is_none());
        assert_eq!(state.best_value(), SearchState::SENTINEL);
    }

    #[test]
    fn joint_fails_before_search() {
        let target = SampleRandomVector::from_values(&[0.0, 1.0, 2.0]);
        let srom = Srom::new(2, 1).unwrap();
        let objective = MomentMatching.objective(&target, &srom, &ObjectiveSettings::default());

        let mut options = SearchOptions::default();
        options.set_joint_opt(true);

        let search = Search::new(&target, &srom, &objective, None::<&MomentGradient>, ParallelContext::single());
        assert!(matches!(search.run(&options), Err(OptimizeError::NotImplemented(_))));
    }

    #[test]
    fn best_candidate_is_feasible() {
        let target = SampleRandomVector::new(DMatrix::from_fn(30, 1, |i, _| (i as f64 * 0.37).sin()));
        let srom = Srom::new(5, 1).unwrap();
        let settings = ObjectiveSettings::default();
        let objective = MomentMatching.objective(&target, &srom, &settings);
        let gradient = MomentMatching.gradient(&target, &srom, &settings);

        let mut options = SearchOptions::default();
        options.set_num_test_samples(8).set_verbose(false);

        let search = Search::new(&target, &srom, &objective, Some(&gradient), ParallelContext::single());
        let state = search.run(&options).unwrap();
        let best = state.best().unwrap();

        assert_abs_diff_eq!(best.probabilities.sum(), 1.0, epsilon = 1e-9);
        assert!(best.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_abs_diff_eq!(
            objective.evaluate(&best.samples, best.probabilities.as_slice()),
            state.best_value(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn large_objective_values_are_accepted() {
        let target = SampleRandomVector::from_values(&[0.0, 1.0, 2.0]);
        let srom = Srom::new(2, 1).unwrap();
        let settings = ObjectiveSettings::default();
        let objective = Plateau(2e6).objective(&target, &srom, &settings);
        let gradient = Plateau(2e6).gradient(&target, &srom, &settings);

        let mut options = SearchOptions::default();
        options.set_num_test_samples(3).set_verbose(false);

        for method in [Method::ProjectedGradient, Method::NelderMead] {
            options.set_method(Some(method));

            let search = Search::new(&target, &srom, &objective, Some(&gradient), ParallelContext::single());
            let state = search.run(&options).unwrap();

            assert_eq!(state.best_value(), 2e6);
            assert_eq!(state.best().unwrap().probabilities, dvector![0.5, 0.5]);
        }
    }

    #[test]
    fn progress_is_reported_every_output_interval() {
        let target = SampleRandomVector::from_values(&[0.0, 1.0, 2.0]);
        let srom = Srom::new(2, 1).unwrap();
        let settings = ObjectiveSettings::default();
        let objective = Uniformity.objective(&target, &srom, &settings);
        let gradient = Uniformity.gradient(&target, &srom, &settings);

        let mut options = SearchOptions::default();
        options.set_num_test_samples(12).set_output_interval(5).set_verbose(true);

        let search = Search::new(&target, &srom, &objective, Some(&gradient), ParallelContext::single());
        let (state, records) = logs::capture(|| search.run(&options).unwrap());
        let info = logs::messages(&records, Level::Info);

        let reported = info
            .iter()
            .filter(|message| message.starts_with("iteration "))
            .map(|message| message.split(' ').nth(1).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(reported, ["1", "5", "10"]);

        let optimal = format!("optimal: {}", state.best_value());
        assert_eq!(info.iter().filter(|message| **message == optimal).count(), 3);
    }

    #[test]
    fn quiet_and_parallel_searches_report_nothing() {
        let target = SampleRandomVector::from_values(&[0.0, 1.0, 2.0]);
        let srom = Srom::new(2, 1).unwrap();
        let settings = ObjectiveSettings::default();
        let objective = Uniformity.objective(&target, &srom, &settings);
        let gradient = Uniformity.gradient(&target, &srom, &settings);

        let mut options = SearchOptions::default();
        options.set_num_test_samples(4).set_output_interval(1).set_verbose(false);

        let search = Search::new(&target, &srom, &objective, Some(&gradient), ParallelContext::single());
        let (_, records) = logs::capture(|| search.run(&options).unwrap());
        assert!(records.is_empty());

        // Workers of a group do not report progress even when verbose.
        options.set_verbose(true);
        let ctx = ParallelContext::from_communicator(&LocalCommunicator::group(2)[0]);
        let search = Search::new(&target, &srom, &objective, Some(&gradient), ctx);
        let (_, records) = logs::capture(|| search.run(&options).unwrap());
        assert!(records.is_empty());
    }
}
