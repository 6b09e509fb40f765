//! Online bounded-error compression of dense sample runs.
//!
//! A segment with downsampling configured counts its trailing samples as a
//! pending dense run. Once the run spans `max_dense_intervals` intervals it is
//! handed to [`fit_hermite_spline`], which picks knots greedily: from the run
//! start it binary-searches the farthest sample that the segment's evaluator
//! can reach from the start while reconstructing every sample in between to
//! within `tolerance`, then repeats from that knot. Samples strictly between
//! knots are dropped by the segment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_MAX_DENSE_INTERVALS, DEFAULT_TOLERANCE};
use crate::error::{Result, TrajectoryError};
use crate::evaluator::Evaluator;
use crate::frame::{Frame, Sample};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownsamplingParameters {
    /// Intervals the pending run may span before a fit is attempted.
    pub max_dense_intervals: usize,
    /// Strict bound on the position error of every dropped sample, in metres.
    pub tolerance: f64,
}

impl DownsamplingParameters {
    pub fn new(max_dense_intervals: usize, tolerance: f64) -> Result<Self> {
        let params = Self {
            max_dense_intervals,
            tolerance,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_dense_intervals == 0 {
            return Err(TrajectoryError::InvalidArgument(
                "max_dense_intervals must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(TrajectoryError::InvalidArgument(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

impl Default for DownsamplingParameters {
    fn default() -> Self {
        Self {
            max_dense_intervals: DEFAULT_MAX_DENSE_INTERVALS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of fitting one dense run.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Fit {
    /// One piece spans the whole run: only its two endpoints are needed.
    Single,
    /// Indices into the run of the knots after the run start, increasing.
    /// The last knot starts the piece that stays dense.
    Knots(Vec<usize>),
}

#[derive(Debug, Error)]
#[error("reconstruction error between run samples {begin} and {end} is not finite")]
pub(crate) struct FitError {
    pub(crate) begin: usize,
    pub(crate) end: usize,
}

pub(crate) fn fit_hermite_spline<F: Frame>(
    run: &[&Sample<F>],
    evaluator: &Evaluator,
    tolerance: f64,
) -> std::result::Result<Fit, FitError> {
    if run.len() < 3 {
        return Ok(Fit::Single);
    }
    let last = run.len() - 1;
    let fits = |begin: usize, end: usize| {
        let error = evaluator.position_error(run, begin, end);
        if error.is_finite() {
            Ok(error < tolerance)
        } else {
            Err(FitError { begin, end })
        }
    };

    if fits(0, last)? {
        return Ok(Fit::Single);
    }

    let mut knots = Vec::new();
    let mut begin = 0;
    loop {
        // Invariant: the piece begin..=lower fits, begin..=upper does not.
        let mut lower = begin + 1;
        let mut upper = last;
        loop {
            let middle = lower + (upper - lower) / 2;
            if middle == lower {
                break;
            }
            if fits(begin, middle)? {
                lower = middle;
            } else {
                upper = middle;
            }
        }
        knots.push(lower);
        begin = lower;
        if last - begin < 2 || fits(begin, last)? {
            break;
        }
    }
    Ok(Fit::Knots(knots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DegreesOfFreedom, World};
    use crate::time::Instant;
    use crate::vector::Vector3;

    fn straight(n: usize) -> Vec<Sample<World>> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                Sample::new(
                    Instant::from_secs(t),
                    DegreesOfFreedom::new(Vector3::new(t, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
                )
            })
            .collect()
    }

    fn circle(n: usize) -> Vec<Sample<World>> {
        (0..n)
            .map(|i| {
                let t = i as f64 * 0.1;
                Sample::new(
                    Instant::from_secs(t),
                    DegreesOfFreedom::new(
                        Vector3::new(t.cos(), t.sin(), 0.0),
                        Vector3::new(-t.sin(), t.cos(), 0.0),
                    ),
                )
            })
            .collect()
    }

    #[test]
    fn test_parameters_validate() {
        assert!(DownsamplingParameters::new(50, 1e-3).is_ok());
        assert!(DownsamplingParameters::new(0, 1e-3).unwrap_err().is_invalid_argument());
        assert!(DownsamplingParameters::new(5, 0.0).is_err());
        assert!(DownsamplingParameters::new(5, f64::NAN).is_err());
        assert!(DownsamplingParameters::new(5, f64::INFINITY).is_err());
    }

    #[test]
    fn test_parameters_default_and_serde() {
        let params = DownsamplingParameters::default();
        assert_eq!(params.max_dense_intervals, DEFAULT_MAX_DENSE_INTERVALS);
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("maxDenseIntervals"), "{json}");
    }

    #[test]
    fn test_uniform_motion_fits_single_piece() {
        let samples = straight(20);
        let run: Vec<_> = samples.iter().collect();
        let fit = fit_hermite_spline(&run, &Evaluator::default(), 1e-6).unwrap();
        assert_eq!(fit, Fit::Single);
    }

    #[test]
    fn test_short_run_is_single() {
        let samples = circle(2);
        let run: Vec<_> = samples.iter().collect();
        assert_eq!(
            fit_hermite_spline(&run, &Evaluator::default(), 1e-12).unwrap(),
            Fit::Single
        );
    }

    #[test]
    fn test_knots_respect_tolerance() {
        let samples = circle(60);
        let run: Vec<_> = samples.iter().collect();
        let evaluator = Evaluator::default();
        let tolerance = 1e-4;
        let Fit::Knots(knots) = fit_hermite_spline(&run, &evaluator, tolerance).unwrap() else {
            panic!("a tight tolerance on a circle needs several pieces");
        };
        assert!(knots.windows(2).all(|w| w[0] < w[1]), "{knots:?}");
        let mut begin = 0;
        for &knot in &knots {
            assert!(evaluator.position_error(&run, begin, knot) < tolerance);
            begin = knot;
        }
        assert!(*knots.last().unwrap() < run.len() - 1);
    }

    #[test]
    fn test_non_finite_error_fails() {
        let mut samples = circle(10);
        samples[4].dof.position.x = f64::NAN;
        let run: Vec<_> = samples.iter().collect();
        let err = fit_hermite_spline(&run, &Evaluator::default(), 1e-3).unwrap_err();
        assert_eq!((err.begin, err.end), (0, 9));
    }
}
