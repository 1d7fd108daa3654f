//! The SROM descriptor and the interfaces of its collaborators.
//!
//! The optimizer does not know how a target random vector is sampled nor how
//! the discrepancy between an SROM and its target is measured. It only needs
//! the capabilities described by the traits in this module:
//!
//! * [`RandomVector`] draws i.i.d. realizations of the target,
//! * [`Objective`] measures the error of a candidate SROM,
//! * [`ObjectiveGradient`] differentiates the objective with respect to
//!   probabilities,
//! * [`ErrorModel`] builds the latter two from the target, the SROM and the
//!   [`ObjectiveSettings`].

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::{error::ConfigError, options::ObjectiveSettings};

/// Structural parameters of a stochastic reduced order model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Srom {
    size: usize,
    dim: usize,
}

impl Srom {
    /// Creates the descriptor of an SROM with `size` support points in `dim`
    /// dimensions. Both must be positive.
    pub fn new(size: usize, dim: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::value_error("size", "SROM must have at least one sample"));
        }

        if dim == 0 {
            return Err(ConfigError::value_error("dim", "must be positive"));
        }

        Ok(Self { size, dim })
    }

    /// Number of support points.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Dimension of each support point.
    pub fn dim(&self) -> usize {
        self.dim
    }
}

/// Target random vector which can be sampled.
pub trait RandomVector {
    /// Dimension of the random vector.
    fn dim(&self) -> usize;

    /// Draws `count` realizations, one per row of the returned `count × dim`
    /// matrix.
    fn draw_random_sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> DMatrix<f64>;
}

/// Error of an SROM given by `samples` (one per row) and their
/// `probabilities` with respect to a target.
pub trait Objective {
    /// Weighted and aggregated error. This is the value being minimized.
    fn evaluate(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64;

    /// Error in moments.
    fn moment_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64;

    /// Error in marginal CDFs.
    fn cdf_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64;

    /// Error in the correlation matrix.
    fn corr_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64;
}

/// Gradient of an [`Objective`] with respect to probabilities.
pub trait ObjectiveGradient {
    /// Returns the vector of partial derivatives, one per probability.
    fn evaluate(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> DVector<f64>;
}

/// Factory of the objective and its gradient.
pub trait ErrorModel<T: RandomVector> {
    /// Objective built by this model.
    type Objective: Objective;
    /// Gradient built by this model.
    type Gradient: ObjectiveGradient;

    /// Builds the objective for given target, SROM and validated settings.
    fn objective(&self, target: &T, srom: &Srom, settings: &ObjectiveSettings) -> Self::Objective;

    /// Builds the gradient of the objective. It is used only when the error
    /// mode of `settings` has an analytic gradient.
    fn gradient(&self, target: &T, srom: &Srom, settings: &ObjectiveSettings) -> Self::Gradient;
}

/// One trial pair of samples and probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Samples, one per row.
    pub samples: DMatrix<f64>,
    /// Probabilities of the samples.
    pub probabilities: DVector<f64>,
}

impl Candidate {
    /// Creates new candidate.
    pub fn new(samples: DMatrix<f64>, probabilities: DVector<f64>) -> Self {
        Self {
            samples,
            probabilities,
        }
    }

    /// Computes the error breakdown of this candidate.
    pub fn errors<O: Objective>(&self, objective: &O) -> SromErrors {
        SromErrors::compute(objective, &self.samples, self.probabilities.as_slice())
    }
}

/// Breakdown of the errors of an SROM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SromErrors {
    /// Error in moments.
    pub moment: f64,
    /// Error in marginal CDFs.
    pub cdf: f64,
    /// Error in the correlation matrix.
    pub correlation: f64,
    /// Arithmetic mean of the three errors above.
    pub mean: f64,
}

impl SromErrors {
    /// Evaluates all error terms of given SROM.
    pub fn compute<O: Objective>(objective: &O, samples: &DMatrix<f64>, probabilities: &[f64]) -> Self {
        let moment = objective.moment_error(samples, probabilities);
        let cdf = objective.cdf_error(samples, probabilities);
        let correlation = objective.corr_error(samples, probabilities);

        Self {
            moment,
            cdf,
            correlation,
            mean: (moment + cdf + correlation) / 3.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    struct Constant;

    impl Objective for Constant {
        fn evaluate(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
            0.0
        }

        fn moment_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
            1.0
        }

        fn cdf_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
            2.0
        }

        fn corr_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
            6.0
        }
    }

    #[test]
    fn srom_rejects_empty() {
        assert!(Srom::new(0, 1).unwrap_err().is_value());
        assert!(Srom::new(10, 0).unwrap_err().is_value());

        let srom = Srom::new(10, 2).unwrap();
        assert_eq!((srom.size(), srom.dim()), (10, 2));
    }

    #[test]
    fn mean_error() {
        let candidate = Candidate::new(dmatrix![0.0; 1.0], dvector![0.5, 0.5]);
        let errors = candidate.errors(&Constant);

        assert_relative_eq!(errors.moment, 1.0);
        assert_relative_eq!(errors.cdf, 2.0);
        assert_relative_eq!(errors.correlation, 6.0);
        assert_relative_eq!(errors.mean, 3.0);
    }
}
