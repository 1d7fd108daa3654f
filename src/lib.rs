#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![warn(missing_docs)]

//! # SROM optimizer
//!
//! Calibration of stochastic reduced order models (SROMs) written entirely in
//! Rust.
//!
//! An SROM approximates a random vector by a finite set of samples, each with
//! its probability. This library finds the samples and probabilities that
//! minimize the discrepancy between the statistics (moments, marginal CDFs
//! and correlations) of the SROM and those of a target random vector.
//!
//! ## Problem
//!
//! Finding the optimal SROM of a given size is done by random search. Sets of
//! samples are repeatedly drawn from the target and, for each of them, the
//! probabilities minimizing the error are found by a constrained
//! minimization:
//!
//! ```text
//! min E(samples, p)
//!
//! subject to 0 <= pi <= 1 for every i
//! and p1 + ... + pn = 1
//! ```
//!
//! The best candidate over all sample sets is the result. The search can be
//! split among several workers which agree on the global optimum at the end
//! (see [`parallel`]).
//!
//! How the error is measured is up to the user. The library only needs a few
//! capabilities, described by the traits in the [`srom`] module: sampling the
//! [target](RandomVector), evaluating the [objective](Objective) and,
//! optionally, its [gradient](ObjectiveGradient). An [`ErrorModel`] builds the
//! latter two from the target, the [SROM descriptor](Srom) and the
//! [`ObjectiveSettings`].
//!
//! ```rust
//! use rand::Rng;
//! use srom_opt::nalgebra::{DMatrix, DVector};
//! use srom_opt::{
//!     ErrorModel, Objective, ObjectiveGradient, ObjectiveSettings, Optimizer, RandomVector,
//!     SearchOptions, Srom,
//! };
//!
//! // Target is a uniform random variable on [0, 1].
//! struct Uniform;
//!
//! impl RandomVector for Uniform {
//!     fn dim(&self) -> usize {
//!         1
//!     }
//!
//!     fn draw_random_sample<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> DMatrix<f64> {
//!         DMatrix::from_fn(count, 1, |_, _| rng.gen())
//!     }
//! }
//!
//! // Compares only the mean.
//! struct MeanError;
//!
//! impl Objective for MeanError {
//!     fn evaluate(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
//!         self.moment_error(samples, probabilities)
//!     }
//!
//!     fn moment_error(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> f64 {
//!         let mean: f64 = samples.iter().zip(probabilities).map(|(s, p)| s * p).sum();
//!         (mean - 0.5).powi(2)
//!     }
//!
//!     fn cdf_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
//!         0.0
//!     }
//!
//!     fn corr_error(&self, _: &DMatrix<f64>, _: &[f64]) -> f64 {
//!         0.0
//!     }
//! }
//!
//! impl ObjectiveGradient for MeanError {
//!     fn evaluate(&self, samples: &DMatrix<f64>, probabilities: &[f64]) -> DVector<f64> {
//!         let mean: f64 = samples.iter().zip(probabilities).map(|(s, p)| s * p).sum();
//!         samples.column(0).map(|s| 2.0 * (mean - 0.5) * s)
//!     }
//! }
//!
//! struct MeanModel;
//!
//! impl ErrorModel<Uniform> for MeanModel {
//!     type Objective = MeanError;
//!     type Gradient = MeanError;
//!
//!     fn objective(&self, _: &Uniform, _: &Srom, _: &ObjectiveSettings) -> MeanError {
//!         MeanError
//!     }
//!
//!     fn gradient(&self, _: &Uniform, _: &Srom, _: &ObjectiveSettings) -> MeanError {
//!         MeanError
//!     }
//! }
//!
//! let srom = Srom::new(4, 1)?;
//! let optimizer = Optimizer::new(Uniform, srom, MeanModel, ObjectiveSettings::default())?;
//!
//! let mut options = SearchOptions::default();
//! options.set_num_test_samples(20).set_verbose(false);
//!
//! let params = optimizer.get_optimal_params(&options)?;
//!
//! assert!((params.probabilities.sum() - 1.0).abs() < 1e-9);
//! assert!(params.errors.moment < 1e-3);
//! # Ok::<(), srom_opt::OptimizeError>(())
//! ```
//!
//! ## Configuration
//!
//! [`ObjectiveSettings`] and [`SearchOptions`] are validated before any work
//! is done. Both can also be read from JSON (`from_json`), in which case a
//! wrongly typed entry is reported as [`ConfigError::Type`] and an out of
//! range entry as [`ConfigError::Value`].
//!
//! ## Minimizers
//!
//! * [Projected gradient](algo::projected_gradient) -- Default method. Uses
//!   the analytic gradient when the error mode provides one, finite
//!   differences otherwise.
//! * [Nelder-Mead](algo::nelder_mead) -- Derivative-free simplex method.
//!
//! Both work with any [`Function`] over a box [`Domain`] with an optional
//! [`SumConstraint`], and can be run on their own by the [`MinimizerDriver`].
//!
//! ## Logging
//!
//! Progress and final errors are reported through the [`log`] facade at the
//! `info` level when [`verbose`](SearchOptions::verbose) is set, details of
//! the minimizers at `debug` and `trace` levels.
//!
//! ## License
//!
//! Licensed under MIT.

pub mod adapter;
pub mod algo;
pub mod analysis;
mod core;
pub mod derivatives;
pub mod driver;
pub mod error;
pub mod optimizer;
pub mod options;
pub mod parallel;
pub mod reconcile;
pub mod search;
pub mod srom;

pub use core::*;
pub use driver::MinimizerDriver;
pub use error::{ConfigError, OptimizeError};
pub use optimizer::{OptimalParams, Optimizer};
pub use options::{ErrorMode, Method, MinimizeOptions, ObjectiveSettings, SearchOptions};
pub use srom::{
    Candidate, ErrorModel, Objective, ObjectiveGradient, RandomVector, Srom, SromErrors,
};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
