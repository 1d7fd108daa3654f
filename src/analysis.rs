//! Various analyses supporting the minimization.

use nalgebra::RealField;

/// Estimates magnitude of the variable given lower and upper bounds.
pub fn estimate_magnitude_from_bounds<T: RealField + Copy>(lower: T, upper: T) -> T {
    let ten = T::from_subset(&10.0);
    let half = T::from_subset(&0.5);

    let avg = half * (lower.abs() + upper.abs());
    let magnitude = ten.powf(avg.abs().log10().trunc());

    // For [0, 0] range, the computed magnitude is undefined. We allow such
    // ranges to support fixing a variable to a value with existing API.
    if magnitude.is_finite() && magnitude > T::zero() {
        magnitude
    } else {
        T::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_of_unit_interval() {
        assert_eq!(estimate_magnitude_from_bounds(0.0, 1.0), 1.0);
    }

    #[test]
    fn magnitude_of_wide_interval() {
        assert_eq!(estimate_magnitude_from_bounds(-500.0, 500.0), 100.0);
    }

    #[test]
    fn magnitude_of_degenerate_interval() {
        assert_eq!(estimate_magnitude_from_bounds(0.0, 0.0), 1.0);
    }
}
