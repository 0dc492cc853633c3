use nalgebra::SVector;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A scalar function of the squared radius `r²` that scales normalized image coordinates.
pub trait DistortionFunction: Clone {
    /// Apply the distortion factor at `value`.
    fn evaluate(&self, value: f64) -> f64;
}

/// Polynomial distortion function
///
/// $$
/// f(x, \vec β) = β_0 + β_1 ​⋅ x + β_2 ​⋅ x^2 + ⋯ + β_n ⋅ x^n
/// $$
///
/// Coefficients are stored lowest degree first.
///
/// ```
/// use mvs_camera::{DistortionFunction, Polynomial};
/// use mvs_camera::nalgebra::Vector3;
/// let radial = Polynomial(Vector3::new(1.0, 0.5, 0.25));
/// assert_eq!(radial.evaluate(2.0), 1.0 + 0.5 * 2.0 + 0.25 * 4.0);
/// ```
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Polynomial<const N: usize>(pub SVector<f64, N>);

impl<const N: usize> Polynomial<N> {
    /// The polynomial that is constantly one, i.e. no distortion.
    pub fn identity() -> Self {
        let mut coefficients = SVector::zeros();
        if N > 0 {
            coefficients[0] = 1.0;
        }
        Self(coefficients)
    }

    pub fn coefficients(&self) -> &SVector<f64, N> {
        &self.0
    }
}

impl<const N: usize> Default for Polynomial<N> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<const N: usize> DistortionFunction for Polynomial<N> {
    fn evaluate(&self, value: f64) -> f64 {
        // Basic horner evaluation.
        let mut result = 0.0;
        for i in (0..N).rev() {
            result *= value;
            result += self.0[i];
        }
        result
    }
}

/// Rational distortion function.
///
/// $$
/// f(x) = \frac{P(x)}{Q(x)}
/// $$
///
/// where $P$ and $Q$ are [`Polynomial`]s of `P - 1` and `Q - 1` degrees.
#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Rational<const P: usize, const Q: usize>(pub Polynomial<P>, pub Polynomial<Q>);

impl<const P: usize, const Q: usize> Rational<P, Q> {
    pub fn numerator(&self) -> &Polynomial<P> {
        &self.0
    }

    pub fn denominator(&self) -> &Polynomial<Q> {
        &self.1
    }
}

impl<const P: usize, const Q: usize> Default for Rational<P, Q> {
    fn default() -> Self {
        Self(Polynomial::identity(), Polynomial::identity())
    }
}

impl<const P: usize, const Q: usize> DistortionFunction for Rational<P, Q> {
    fn evaluate(&self, value: f64) -> f64 {
        let p = self.0.evaluate(value);
        let q = self.1.evaluate(value);
        p / q
    }
}
