//! Continuous evaluation between stored samples.
//!
//! An [`Evaluator`] turns the two samples bracketing a time into position and
//! velocity at that time. It is chosen when a segment is built and is the only
//! interpolation the downsampler ever uses for that segment, so a segment
//! downsampled under one evaluator is always reconstructed with the same one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::frame::{DegreesOfFreedom, Frame, Sample};
use crate::hermite::{Hermite3, Kernel};
use crate::time::Instant;
use crate::vector::Vector3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Cubic matching positions and velocities at both samples.
    #[default]
    Hermite3,
    /// Positions and velocities each interpolated linearly.
    Linear,
}

impl Interpolation {
    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Hermite3 => "hermite3",
            Interpolation::Linear => "linear",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = TrajectoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hermite3" => Ok(Interpolation::Hermite3),
            "linear" => Ok(Interpolation::Linear),
            other => Err(TrajectoryError::InvalidArgument(format!(
                "unknown interpolation {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Evaluator {
    pub interpolation: Interpolation,
    pub kernel: Kernel,
}

impl Evaluator {
    pub const fn new(interpolation: Interpolation, kernel: Kernel) -> Self {
        Self {
            interpolation,
            kernel,
        }
    }

    pub const fn hermite3(kernel: Kernel) -> Self {
        Self::new(Interpolation::Hermite3, kernel)
    }

    pub const fn linear() -> Self {
        Self::new(Interpolation::Linear, Kernel::Portable)
    }

    /// Build the interpolant spanning `left` to `right`.
    pub fn interpolant<F: Frame>(&self, left: &Sample<F>, right: &Sample<F>) -> Interpolant {
        match self.interpolation {
            Interpolation::Hermite3 => Interpolant::Hermite3(Hermite3::new(
                (left.time, right.time),
                (left.position(), right.position()),
                (left.velocity(), right.velocity()),
                self.kernel,
            )),
            Interpolation::Linear => Interpolant::Linear {
                t0: left.time,
                duration: right.time - left.time,
                start: DofPair::of(left),
                end: DofPair::of(right),
                kernel: self.kernel,
            },
        }
    }

    /// Degrees of freedom at `time`, which should lie in
    /// `[left.time, right.time]`.
    pub fn interpolate<F: Frame>(
        &self,
        left: &Sample<F>,
        right: &Sample<F>,
        time: Instant,
    ) -> DegreesOfFreedom<F> {
        let interpolant = self.interpolant(left, right);
        DegreesOfFreedom::new(interpolant.position(time), interpolant.velocity(time))
    }

    /// Largest position error made when the samples strictly inside
    /// `run[begin..=end]` are reconstructed from `run[begin]` and `run[end]`
    /// alone. NaN if any reconstruction is NaN.
    pub(crate) fn position_error<F: Frame>(
        &self,
        run: &[&Sample<F>],
        begin: usize,
        end: usize,
    ) -> f64 {
        let interior = run[begin + 1..end]
            .iter()
            .map(|sample| (sample.time, sample.position()));
        match self.interpolant(run[begin], run[end]) {
            Interpolant::Hermite3(h) => h.linf_error(interior),
            linear => {
                let mut max = 0.0_f64;
                for (t, position) in interior {
                    let error = (linear.position(t) - position).norm();
                    if error.is_nan() {
                        return f64::NAN;
                    }
                    max = max.max(error);
                }
                max
            }
        }
    }
}

/// An interpolating polynomial built once from two samples and evaluated many
/// times.
#[derive(Clone, Copy, Debug)]
pub enum Interpolant {
    Hermite3(Hermite3),
    Linear {
        t0: Instant,
        duration: f64,
        start: DofPair,
        end: DofPair,
        kernel: Kernel,
    },
}

/// Frame-erased position/velocity pair held by a linear interpolant.
#[derive(Clone, Copy, Debug)]
pub struct DofPair {
    pub position: Vector3,
    pub velocity: Vector3,
}

impl DofPair {
    fn of<F: Frame>(sample: &Sample<F>) -> Self {
        Self {
            position: sample.position(),
            velocity: sample.velocity(),
        }
    }
}

impl Interpolant {
    pub fn position(&self, t: Instant) -> Vector3 {
        match self {
            Interpolant::Hermite3(h) => h.evaluate(t),
            Interpolant::Linear {
                t0,
                duration,
                start,
                end,
                kernel,
            } => lerp(*kernel, start.position, end.position, (t - *t0) / duration),
        }
    }

    pub fn velocity(&self, t: Instant) -> Vector3 {
        match self {
            Interpolant::Hermite3(h) => h.evaluate_derivative(t),
            Interpolant::Linear {
                t0,
                duration,
                start,
                end,
                kernel,
            } => lerp(*kernel, start.velocity, end.velocity, (t - *t0) / duration),
        }
    }
}

fn lerp(kernel: Kernel, a: Vector3, b: Vector3, alpha: f64) -> Vector3 {
    a.zip_with(b, |a, b| kernel.mul_add(alpha, b - a, a))
}
