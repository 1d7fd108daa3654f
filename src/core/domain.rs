//! Problem domain definition (dimensionality, bounds) and projection onto the
//! feasible set.

use std::iter::FromIterator;

use na::{Dim, DimName};
use nalgebra as na;
use nalgebra::{convert, storage::StorageMut, OVector, RealField, Vector};

use super::constraint::SumConstraint;
use crate::analysis::estimate_magnitude_from_bounds;

/// Number of doublings tried when bracketing the projection shift.
const MAX_BRACKET_ITERS: usize = 128;

/// Number of bisection steps when searching for the projection shift.
const MAX_BISECTION_ITERS: usize = 200;

/// Number of attempts to absorb the rounding error of the sum.
const MAX_CLOSING_ITERS: usize = 4;

/// Domain for a problem.
#[derive(Debug, Clone)]
pub struct Domain<T: RealField + Copy> {
    lower: OVector<T, na::Dyn>,
    upper: OVector<T, na::Dyn>,
    scale: Option<OVector<T, na::Dyn>>,
}

impl<T: RealField + Copy> Domain<T> {
    /// Creates unconstrained domain with given dimensionality.
    pub fn unconstrained(dim: usize) -> Self {
        assert!(dim > 0, "empty domain");

        let inf = T::from_subset(&f64::INFINITY);
        let n = na::Dyn(dim);
        let one = na::Const::<1>;

        Self {
            lower: OVector::from_iterator_generic(n, one, (0..dim).map(|_| -inf)),
            upper: OVector::from_iterator_generic(n, one, (0..dim).map(|_| inf)),
            scale: None,
        }
    }

    /// Creates rectangular domain with given lower and upper bounds.
    ///
    /// Positive and negative infinity can be used to indicate a value unbounded
    /// in that dimension and direction. If the entire domain is unconstrained,
    /// use [`Domain::unconstrained`] instead.
    pub fn rect(lower: Vec<T>, upper: Vec<T>) -> Self {
        assert!(
            lower.len() == upper.len(),
            "lower and upper have different size"
        );

        let dim = lower.len();
        assert!(dim > 0, "empty domain");

        let scale = lower
            .iter()
            .copied()
            .zip(upper.iter().copied())
            .map(|(l, u)| estimate_magnitude_from_bounds(l, u));

        let dim = na::Dyn(dim);
        let scale = OVector::from_iterator_generic(dim, na::U1::name(), scale);
        let lower = OVector::from_iterator_generic(dim, na::U1::name(), lower);
        let upper = OVector::from_iterator_generic(dim, na::U1::name(), upper);

        Self {
            lower,
            upper,
            scale: Some(scale),
        }
    }

    /// Sets a custom scale for the domain.
    ///
    /// Scale of a variable is its expected magnitude. It is used as the
    /// initial simplex edge and as the typical magnitude in finite
    /// differences.
    pub fn with_scale(mut self, scale: Vec<T>) -> Self {
        assert!(
            scale.len() == self.lower.nrows(),
            "scale has invalid dimension"
        );

        let dim = na::Dyn(self.lower.nrows());
        let scale = OVector::from_iterator_generic(dim, na::U1::name(), scale);

        self.scale = Some(scale);
        self
    }

    /// Gets the dimensionality of the domain.
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Gets the lower bounds.
    pub fn lower(&self) -> &OVector<T, na::Dyn> {
        &self.lower
    }

    /// Gets the upper bounds.
    pub fn upper(&self) -> &OVector<T, na::Dyn> {
        &self.upper
    }

    /// Gets the scale if available.
    ///
    /// Scale can be either provided by [`Domain::with_scale`] or estimated for
    /// a constrained domain. If there is no reliable way to estimate the scale
    /// (for unconstrained problem), `None` is returned.
    pub fn scale(&self) -> Option<&OVector<T, na::Dyn>> {
        self.scale.as_ref()
    }

    /// Gets the scale or a vector of ones if there is none.
    pub fn scale_or_ones(&self) -> OVector<T, na::Dyn> {
        self.scale
            .clone()
            .unwrap_or_else(|| OVector::from_element_generic(na::Dyn(self.dim()), na::U1::name(), T::one()))
    }

    /// Projects given point into the domain.
    pub fn project<D, Sx>(&self, x: &mut Vector<T, D, Sx>) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let mut not_feasible = false;

        self.lower
            .iter()
            .zip(self.upper.iter())
            .zip(x.iter_mut())
            .for_each(|((li, ui), xi)| {
                if &*xi < li {
                    *xi = *li;
                    not_feasible = true;
                } else if &*xi > ui {
                    *xi = *ui;
                    not_feasible = true;
                }
            });

        not_feasible
    }

    /// Projects given point into the domain in given dimension.
    pub fn project_in<D, Sx>(&self, x: &mut Vector<T, D, Sx>, i: usize) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let li = self.lower[(i, 0)];
        let ui = self.upper[(i, 0)];
        let xi = &mut x[(i, 0)];

        if *xi < li {
            *xi = li;
            true
        } else if *xi > ui {
            *xi = ui;
            true
        } else {
            false
        }
    }

    /// Projects given point onto the intersection of the domain and the sum
    /// constraint.
    ///
    /// Variables in front of the constraint offset are only clamped into their
    /// bounds. The constrained block is moved to the closest (in Euclidean
    /// sense) point satisfying both the bounds and the sum, which has the form
    /// `clamp(x_i - lambda, l_i, u_i)` for a scalar shift `lambda`. The shift
    /// is found by bisection. A point that is already feasible is left
    /// untouched up to the rounding error of its sum, which is moved into a
    /// single variable so that the sum matches the total exactly.
    ///
    /// If the constraint cannot be satisfied within the bounds, the point ends
    /// up on the bounds closest to satisfying it.
    pub fn project_feasible<D, Sx>(&self, x: &mut Vector<T, D, Sx>, con: &SumConstraint<T>) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let n = x.nrows();
        let offset = con.offset().min(n);

        let mut not_feasible = false;
        for i in 0..offset {
            not_feasible |= self.project_in(x, i);
        }

        if offset == n {
            return not_feasible;
        }

        let one = T::one();
        let two: T = convert(2.0);
        let total = con.total();
        let tol = T::default_epsilon() * convert((n + 1) as f64) * total.abs().max(one);

        let in_bounds = (offset..n).all(|i| self.lower[i] <= x[i] && x[i] <= self.upper[i]);
        if in_bounds && con.is_satisfied(x, tol) {
            self.close_sum(x, con, offset);
            return not_feasible;
        }

        let shifted_sum = |x: &Vector<T, D, Sx>, lambda: T| {
            (offset..n).fold(T::zero(), |acc, i| {
                acc + (x[i] - lambda).max(self.lower[i]).min(self.upper[i])
            })
        };

        // The shifted sum is non-increasing in lambda.
        let mut lo = -one;
        let mut step = one;
        for _ in 0..MAX_BRACKET_ITERS {
            if shifted_sum(&*x, lo) >= total {
                break;
            }
            lo -= step;
            step *= two;
        }

        let mut hi = one;
        step = one;
        for _ in 0..MAX_BRACKET_ITERS {
            if shifted_sum(&*x, hi) <= total {
                break;
            }
            hi += step;
            step *= two;
        }

        for _ in 0..MAX_BISECTION_ITERS {
            let mid = (lo + hi) / two;
            if mid == lo || mid == hi {
                break;
            }

            if shifted_sum(&*x, mid) > total {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let lambda = (lo + hi) / two;
        for i in offset..n {
            x[i] = (x[i] - lambda).max(self.lower[i]).min(self.upper[i]);
        }

        // Spread what is left after bisection over the variables that are not
        // at their bounds.
        let residual = con.residual(x);
        let free = (offset..n)
            .filter(|&i| self.lower[i] < x[i] && x[i] < self.upper[i])
            .count();

        if free > 0 && residual != T::zero() {
            let share = residual / convert(free as f64);
            for i in offset..n {
                if self.lower[i] < x[i] && x[i] < self.upper[i] {
                    x[i] = (x[i] + share).max(self.lower[i]).min(self.upper[i]);
                }
            }
        }

        if con.is_satisfied(x, tol) {
            self.close_sum(x, con, offset);
        }

        true
    }

    /// Moves the rounding error of the sum into the last constrained variable
    /// that can take it without leaving its bounds.
    ///
    /// For the last variable of the block, the value is computed as `total`
    /// minus the sum of the others, which makes the sum exact whenever that
    /// difference is representable.
    fn close_sum<D, Sx>(&self, x: &mut Vector<T, D, Sx>, con: &SumConstraint<T>, offset: usize)
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        let n = x.nrows();

        for _ in 0..MAX_CLOSING_ITERS {
            let residual = con.residual(x);
            if residual == T::zero() {
                return;
            }

            let candidate = |x: &Vector<T, D, Sx>, k: usize| {
                if k + 1 == n {
                    con.total() - (offset..k).fold(T::zero(), |acc, i| acc + x[i])
                } else {
                    x[k] + residual
                }
            };

            let target = (offset..n).rev().find_map(|k| {
                let xk = candidate(&*x, k);
                (self.lower[k] <= xk && xk <= self.upper[k]).then_some((k, xk))
            });

            match target {
                Some((k, xk)) => x[k] = xk,
                None => return,
            }
        }
    }

    /// Projects given point into the domain and, if given, onto the sum
    /// constraint.
    pub fn project_with<D, Sx>(&self, x: &mut Vector<T, D, Sx>, con: Option<&SumConstraint<T>>) -> bool
    where
        D: Dim,
        Sx: StorageMut<T, D>,
    {
        match con {
            Some(con) => self.project_feasible(x, con),
            None => self.project(x),
        }
    }
}

impl<T: RealField + Copy> FromIterator<(T, T)> for Domain<T> {
    fn from_iter<I: IntoIterator<Item = (T, T)>>(iter: I) -> Self {
        let (lower, upper): (Vec<_>, Vec<_>) = iter.into_iter().unzip();
        Self::rect(lower, upper)
    }
}
