//! Cubic Hermite interpolation with an explicit arithmetic kernel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::time::Instant;
use crate::vector::Vector3;

/// Arithmetic used when evaluating polynomials.
///
/// Chosen by the caller when a segment is built; the core never probes the
/// CPU. `Fma` fuses each Horner step into a single rounding, which is faster
/// only where the hardware has FMA and is otherwise emulated slowly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    #[default]
    Portable,
    Fma,
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kernel {
    type Err = TrajectoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "portable" => Ok(Kernel::Portable),
            "fma" => Ok(Kernel::Fma),
            other => Err(TrajectoryError::InvalidArgument(format!(
                "unknown kernel {other:?}, expected \"portable\" or \"fma\""
            ))),
        }
    }
}

impl Kernel {
    pub fn as_str(self) -> &'static str {
        match self {
            Kernel::Portable => "portable",
            Kernel::Fma => "fma",
        }
    }

    /// `a * b + c`
    #[inline]
    pub fn mul_add(self, a: f64, b: f64, c: f64) -> f64 {
        match self {
            Kernel::Portable => a * b + c,
            Kernel::Fma => a.mul_add(b, c),
        }
    }

    /// Horner evaluation of `c[0] + c[1]·s + c[2]·s² + c[3]·s³`.
    #[inline]
    fn cubic(self, c: [f64; 4], s: f64) -> f64 {
        self.mul_add(s, self.mul_add(s, self.mul_add(s, c[3], c[2]), c[1]), c[0])
    }

    /// Horner evaluation of the derivative of the same cubic.
    #[inline]
    fn cubic_derivative(self, c: [f64; 4], s: f64) -> f64 {
        self.mul_add(s, self.mul_add(s, 3.0 * c[3], 2.0 * c[2]), c[1])
    }
}

/// The cubic matching a value and its derivative at both ends of `[t0, t1]`.
///
/// Stored in the monomial basis of `s = t - t0`, one coefficient array per
/// coordinate.
#[derive(Clone, Copy, Debug)]
pub struct Hermite3 {
    t0: Instant,
    coefficients: [[f64; 4]; 3],
    kernel: Kernel,
}

impl Hermite3 {
    pub fn new(
        (t0, t1): (Instant, Instant),
        (p0, p1): (Vector3, Vector3),
        (v0, v1): (Vector3, Vector3),
        kernel: Kernel,
    ) -> Self {
        let h = t1 - t0;
        let axis = |p0: f64, p1: f64, v0: f64, v1: f64| {
            let dp = p1 - p0;
            [
                p0,
                v0,
                (3.0 * dp / h - 2.0 * v0 - v1) / h,
                (-2.0 * dp / h + v0 + v1) / (h * h),
            ]
        };
        Self {
            t0,
            coefficients: [
                axis(p0.x, p1.x, v0.x, v1.x),
                axis(p0.y, p1.y, v0.y, v1.y),
                axis(p0.z, p1.z, v0.z, v1.z),
            ],
            kernel,
        }
    }

    pub fn evaluate(&self, t: Instant) -> Vector3 {
        let s = t - self.t0;
        let [x, y, z] = self.coefficients;
        Vector3::new(
            self.kernel.cubic(x, s),
            self.kernel.cubic(y, s),
            self.kernel.cubic(z, s),
        )
    }

    pub fn evaluate_derivative(&self, t: Instant) -> Vector3 {
        let s = t - self.t0;
        let [x, y, z] = self.coefficients;
        Vector3::new(
            self.kernel.cubic_derivative(x, s),
            self.kernel.cubic_derivative(y, s),
            self.kernel.cubic_derivative(z, s),
        )
    }

    /// Largest distance between the interpolant and the given values.
    /// NaN propagates so that callers can detect a degenerate fit.
    pub fn linf_error(&self, values: impl IntoIterator<Item = (Instant, Vector3)>) -> f64 {
        let mut max = 0.0_f64;
        for (t, value) in values {
            let error = (self.evaluate(t) - value).norm();
            if error.is_nan() {
                return f64::NAN;
            }
            max = max.max(error);
        }
        max
    }
}
