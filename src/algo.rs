//! The collection of implemented minimizers.

pub mod nelder_mead;
pub mod projected_gradient;

pub use nelder_mead::NelderMead;
pub use projected_gradient::ProjectedGradient;
