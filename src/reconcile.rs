//! Agreement of workers on the global optimum.
//!
//! Every worker ends its search with the best candidate it has found, or
//! with nothing if it had no sample sets to try. A [`Reconciler`] turns these
//! local results into one result shared by all workers. The strategy is
//! chosen once, when the [`Optimizer`](crate::Optimizer) is constructed.

use log::debug;

use crate::{
    error::OptimizeError,
    parallel::{Communicator, ParallelContext, COORDINATOR},
    srom::{Candidate, Objective},
};

/// Strategy for combining the local results of workers.
pub trait Reconciler {
    /// Returns the context of the worker this reconciler runs in.
    fn context(&self) -> ParallelContext;

    /// Combines the local best candidate of this worker with those of the
    /// other workers. All workers get the same result.
    fn reconcile<O: Objective>(
        &self,
        local: Option<Candidate>,
        objective: &O,
    ) -> Result<Option<Candidate>, OptimizeError>;
}

/// Reconciler of a lone worker. Its local result is the global one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleWorkerStrategy;

impl Reconciler for SingleWorkerStrategy {
    fn context(&self) -> ParallelContext {
        ParallelContext::single()
    }

    fn reconcile<O: Objective>(
        &self,
        local: Option<Candidate>,
        _: &O,
    ) -> Result<Option<Candidate>, OptimizeError> {
        Ok(local)
    }
}

/// Reconciler of a group of workers.
///
/// The local results are gathered in the [`COORDINATOR`], which picks the one
/// with the lowest mean error (see [`select_best`]) and broadcasts it back.
pub struct MultiWorkerStrategy<C> {
    comm: C,
    ctx: ParallelContext,
}

impl<C: Communicator> MultiWorkerStrategy<C> {
    /// Creates the strategy for the worker owning the communicator.
    pub fn new(comm: C) -> Self {
        let ctx = ParallelContext::from_communicator(&comm);
        Self { comm, ctx }
    }
}

impl<C: Communicator> Reconciler for MultiWorkerStrategy<C> {
    fn context(&self) -> ParallelContext {
        self.ctx
    }

    fn reconcile<O: Objective>(
        &self,
        local: Option<Candidate>,
        objective: &O,
    ) -> Result<Option<Candidate>, OptimizeError> {
        let best = self
            .comm
            .gather(local, COORDINATOR)?
            .and_then(|candidates| select_best(candidates, objective));

        Ok(self.comm.broadcast(best, COORDINATOR)?)
    }
}

/// Picks the candidate with the lowest mean error.
///
/// Every candidate is scored by its own samples and probabilities. Missing
/// candidates are skipped. Ties are won by the candidate that comes first.
pub fn select_best<O: Objective>(candidates: Vec<Option<Candidate>>, objective: &O) -> Option<Candidate> {
    let mut best: Option<(f64, Candidate)> = None;

    for (rank, candidate) in candidates.into_iter().enumerate() {
        let candidate = match candidate {
            Some(candidate) => candidate,
            None => {
                debug!("worker {} has no candidate", rank);
                continue;
            }
        };

        let mean = candidate.errors(objective).mean;
        debug!("worker {} candidate mean error = {}", rank, mean);

        let better = best
            .as_ref()
            .map_or(true, |(best_mean, _)| mean < *best_mean || best_mean.is_nan());

        if better {
            best = Some((mean, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use nalgebra::{dmatrix, dvector, DMatrix};

    use crate::parallel::LocalCommunicator;

    /// Mean error is the value of the single sample.
    struct SampleValue;

    impl Objective for SampleValue {
        fn evaluate(&self, samples: &DMatrix<f64>, _: &[f64]) -> f64 {
            samples[(0, 0)]
        }

        fn moment_error(&self, samples: &DMatrix<f64>, _: &[f64]) -> f64 {
            samples[(0, 0)]
        }

        fn cdf_error(&self, samples: &DMatrix<f64>, _: &[f64]) -> f64 {
            samples[(0, 0)]
        }

        fn corr_error(&self, samples: &DMatrix<f64>, _: &[f64]) -> f64 {
            samples[(0, 0)]
        }
    }

    fn candidate(value: f64) -> Candidate {
        Candidate::new(dmatrix![value], dvector![1.0])
    }

    #[test]
    fn scores_each_candidate() {
        let candidates = vec![Some(candidate(3.0)), Some(candidate(1.0)), Some(candidate(2.0))];

        assert_eq!(select_best(candidates, &SampleValue), Some(candidate(1.0)));
    }

    #[test]
    fn skips_missing() {
        let candidates = vec![None, Some(candidate(5.0)), None];
        assert_eq!(select_best(candidates, &SampleValue), Some(candidate(5.0)));

        assert_eq!(select_best(vec![None, None], &SampleValue), None);
    }

    #[test]
    fn first_wins_ties() {
        let first = Candidate::new(dmatrix![1.0], dvector![1.0]);
        let second = Candidate::new(dmatrix![1.0], dvector![0.5]);

        let best = select_best(vec![Some(first.clone()), Some(second)], &SampleValue);
        assert_eq!(best, Some(first));
    }

    #[test]
    fn single_worker_is_identity() {
        let strategy = SingleWorkerStrategy;

        assert!(strategy.context().is_single());
        assert_eq!(
            strategy.reconcile(Some(candidate(4.0)), &SampleValue).unwrap(),
            Some(candidate(4.0))
        );
        assert_eq!(strategy.reconcile(None, &SampleValue).unwrap(), None);
    }

    #[test]
    fn workers_agree_on_best() {
        let locals = [Some(candidate(2.0)), None, Some(candidate(0.5)), Some(candidate(1.0))];

        let results = thread::scope(|s| {
            let handles = LocalCommunicator::group(locals.len())
                .into_iter()
                .zip(locals.iter().cloned())
                .map(|(comm, local)| {
                    s.spawn(move || {
                        MultiWorkerStrategy::new(comm)
                            .reconcile(local, &SampleValue)
                            .unwrap()
                    })
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(results.iter().all(|result| result == &Some(candidate(0.5))));
    }
}
