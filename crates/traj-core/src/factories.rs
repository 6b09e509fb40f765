//! Synthetic timelines for demos, tests and benches.
//!
//! Each factory samples an analytic motion at `t1 + i·step` for
//! `i = 0..=n`, `n = round((t2 - t1) / step)`, so both ends are included.

use rand::Rng;

use crate::constants::MAX_TIMELINE_SAMPLES;
use crate::error::{Result, TrajectoryError};
use crate::frame::{DegreesOfFreedom, Frame, Sample};
use crate::time::Instant;
use crate::vector::Vector3;

/// Circular motion in the xy-plane about the origin, with angle
/// `omega · t` measured from the x-axis at absolute time `t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircularMotion {
    pub omega: f64,
    pub radius: f64,
}

impl CircularMotion {
    pub fn degrees_of_freedom<F: Frame>(&self, time: Instant) -> DegreesOfFreedom<F> {
        let (sin, cos) = (self.omega * time.secs()).sin_cos();
        let speed = self.radius * self.omega;
        DegreesOfFreedom::new(
            Vector3::new(self.radius * cos, self.radius * sin, 0.0),
            Vector3::new(-speed * sin, speed * cos, 0.0),
        )
    }
}

fn intervals(t1: Instant, t2: Instant, step: f64) -> Result<usize> {
    if !(step.is_finite() && step > 0.0) {
        return Err(TrajectoryError::InvalidArgument(format!(
            "step must be positive and finite, got {step}"
        )));
    }
    if !(t1.is_finite() && t2.is_finite()) || t2 < t1 {
        return Err(TrajectoryError::InvalidArgument(format!(
            "cannot sample from {t1} to {t2}"
        )));
    }
    let n = ((t2 - t1) / step).round();
    if n >= MAX_TIMELINE_SAMPLES as f64 {
        return Err(TrajectoryError::InvalidArgument(format!(
            "sampling from {t1} to {t2} every {step} s exceeds {MAX_TIMELINE_SAMPLES} samples"
        )));
    }
    Ok(n as usize)
}

/// Uniform motion starting from `start` at `t1`.
pub fn linear_timeline<F: Frame>(
    start: DegreesOfFreedom<F>,
    t1: Instant,
    t2: Instant,
    step: f64,
) -> Result<Vec<Sample<F>>> {
    let n = intervals(t1, t2, step)?;
    Ok((0..=n)
        .map(|i| {
            let time = t1 + i as f64 * step;
            let position = start.position + start.velocity * (time - t1);
            Sample::new(time, DegreesOfFreedom::new(position, start.velocity))
        })
        .collect())
}

pub fn circular_timeline<F: Frame>(
    motion: CircularMotion,
    t1: Instant,
    t2: Instant,
    step: f64,
) -> Result<Vec<Sample<F>>> {
    let n = intervals(t1, t2, step)?;
    Ok((0..=n)
        .map(|i| {
            let time = t1 + i as f64 * step;
            Sample::new(time, motion.degrees_of_freedom(time))
        })
        .collect())
}

/// Like [`circular_timeline`], with each instant shifted by up to
/// `jitter / 2` steps either way. `jitter` must lie in `[0, 1)` so that
/// instants stay strictly increasing.
pub fn jittered_circular_timeline<F: Frame>(
    motion: CircularMotion,
    t1: Instant,
    t2: Instant,
    step: f64,
    jitter: f64,
    rng: &mut impl Rng,
) -> Result<Vec<Sample<F>>> {
    if !(0.0..1.0).contains(&jitter) {
        return Err(TrajectoryError::InvalidArgument(format!(
            "jitter must lie in [0, 1), got {jitter}"
        )));
    }
    let n = intervals(t1, t2, step)?;
    Ok((0..=n)
        .map(|i| {
            let offset = jitter * (rng.random::<f64>() - 0.5);
            let time = t1 + (i as f64 + offset) * step;
            Sample::new(time, motion.degrees_of_freedom(time))
        })
        .collect())
}
