//! Core abstractions of the constrained minimization layer.
//!
//! *Users* of the minimizers implement the [`Function`] trait and specify the
//! [domain](Domain), optionally together with a [`SumConstraint`].
//!
//! Algorithm *developers* implement the [`Minimizer`] trait.

mod base;
mod constraint;
mod domain;
mod function;
mod minimizer;

pub use base::*;
pub use constraint::*;
pub use domain::*;
pub use function::*;
pub use minimizer::*;
