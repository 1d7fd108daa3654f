//! Tools for derivative-based methods.

use std::ops::{Deref, DerefMut};

use nalgebra::{
    convert,
    storage::{Storage, StorageMut},
    ComplexField, DimName, Dyn, IsContiguous, OVector, RealField, Vector, U1,
};
use num_traits::{One, Zero};

use crate::core::{Function, Problem};

/// Square root of double precision machine epsilon. This value is a standard
/// constant for epsilons in approximating first-order derivate-based concepts.
pub const EPSILON_SQRT: f64 = 0.000000014901161193847656;

/// Gradient vector of a function approximated by forward differences.
#[derive(Debug)]
pub struct Gradient<F: Problem> {
    grad: OVector<F::Field, Dyn>,
}

impl<F: Problem> Gradient<F> {
    /// Initializes the gradient vector with zeros.
    pub fn zeros(dim: usize) -> Self {
        Self {
            grad: OVector::zeros_generic(Dyn(dim), U1::name()),
        }
    }
}

impl<F: Function> Gradient<F> {
    /// Computes the gradient vector of the function in given point with given
    /// scale of variables. See [`compute`](Gradient::compute) for more details.
    pub fn new<Sx, Sscale>(
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        fx: F::Field,
    ) -> Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
    {
        let mut grad = Self::zeros(x.nrows());
        grad.compute(f, x, scale, fx);
        grad
    }

    /// Computes the gradient vector of the function in given point with given
    /// scale of variables.
    ///
    /// The parameter `x` is mutable to allow temporary mutations avoiding
    /// unnecessary allocations, but after this method ends, the content of the
    /// vector is exactly the same as before.
    ///
    /// Information about variable scale is useful for problematic cases of
    /// finite differentiation (e.g., when the value is near zero).
    pub fn compute<Sx, Sscale>(
        &mut self,
        f: &F,
        x: &mut Vector<F::Field, Dyn, Sx>,
        scale: &Vector<F::Field, Dyn, Sscale>,
        fx: F::Field,
    ) -> &mut Self
    where
        Sx: StorageMut<F::Field, Dyn> + IsContiguous,
        Sscale: Storage<F::Field, Dyn>,
    {
        let eps: F::Field = convert(EPSILON_SQRT);

        for i in 0..x.nrows() {
            let xi = x[i];

            // We would like to have the step as small as possible, but a very
            // small step gives f(x + e_i * step_i) ~= f(x) with only a few
            // good digits. The step is therefore proportional to x_i, or to
            // the typical magnitude of the variable when x_i is close to zero.
            let magnitude = scale[i];
            let step = eps * xi.abs().max(magnitude) * F::Field::one().copysign(xi);
            let step = if step == F::Field::zero() { eps } else { step };

            x[i] = xi + step;
            let fxi = f.apply(x);

            // grad[i] = (f(x + e_i * step_i) - f(x)) / step_i.
            self.grad[i] = (fxi - fx) / step;

            x[i] = xi;
        }

        self
    }
}

impl<F: Problem> Deref for Gradient<F> {
    type Target = OVector<F::Field, Dyn>;

    fn deref(&self) -> &Self::Target {
        &self.grad
    }
}

impl<F: Problem> DerefMut for Gradient<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::Sphere;
    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn sphere_gradient() {
        let f = Sphere::new(3);
        let mut x = dvector![1.0, -2.0, 0.0];
        let scale = dvector![1.0, 1.0, 1.0];
        let fx = f.apply(&x);

        let grad = Gradient::new(&f, &mut x, &scale, fx);

        assert_abs_diff_eq!(grad[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], -4.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[2], 0.0, epsilon = 1e-6);
        // The point is restored.
        assert_eq!(x, dvector![1.0, -2.0, 0.0]);
    }
}
