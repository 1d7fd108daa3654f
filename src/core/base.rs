use nalgebra::RealField;

use super::domain::Domain;

/// The base trait for [`Function`](super::function::Function).
pub trait Problem {
    /// Type of the field, usually f64.
    type Field: RealField + Copy;

    /// Gets the domain (bound constraints) of the problem.
    fn domain(&self) -> Domain<Self::Field>;
}
