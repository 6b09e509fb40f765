//! A chronological run of samples, optionally compressed as it grows.

use std::collections::VecDeque;
use std::collections::vec_deque;
use std::ops::Range;

use crate::downsampling::{DownsamplingParameters, Fit, fit_hermite_spline};
use crate::error::{Result, TrajectoryError};
use crate::evaluator::Evaluator;
use crate::frame::{DegreesOfFreedom, Frame, Sample};
use crate::time::Instant;
use crate::vector::Vector3;

/// Samples strictly increasing in time, appended at the tail and truncatable
/// at either end.
///
/// When downsampling is configured the segment tracks how many trailing
/// samples form the pending dense run; the run start is always a sample the
/// downsampler will keep.
#[derive(Clone, Debug)]
pub struct Segment<F: Frame> {
    samples: VecDeque<Sample<F>>,
    evaluator: Evaluator,
    downsampling: Option<DownsamplingParameters>,
    dense: usize,
}

impl<F: Frame> Segment<F> {
    pub fn new(evaluator: Evaluator) -> Self {
        Self {
            samples: VecDeque::new(),
            evaluator,
            downsampling: None,
            dense: 0,
        }
    }

    /// A segment whose first sample is a copy of `first`.
    pub(crate) fn seeded(evaluator: Evaluator, first: Sample<F>) -> Self {
        let mut segment = Self::new(evaluator);
        segment.samples.push_back(first);
        segment
    }

    pub fn append(&mut self, time: Instant, dof: DegreesOfFreedom<F>) -> Result<()> {
        if !time.is_finite() {
            return Err(TrajectoryError::InvalidArgument(format!(
                "cannot append at non-finite time {time}"
            )));
        }
        if let Some(last) = self.samples.back()
            && time <= last.time
        {
            return Err(TrajectoryError::InvalidArgument(format!(
                "append at {time} is not after the last sample at {}",
                last.time
            )));
        }
        self.samples.push_back(Sample::new(time, dof));
        if let Some(params) = self.downsampling {
            self.dense += 1;
            if self.dense > params.max_dense_intervals {
                self.downsample(params);
            }
        }
        Ok(())
    }

    /// Fit the pending run and drop the samples the fit makes redundant.
    fn downsample(&mut self, params: DownsamplingParameters) {
        let start = self.samples.len() - self.dense;
        let run: Vec<&Sample<F>> = self.samples.range(start..).collect();
        let fit = fit_hermite_spline(&run, &self.evaluator, params.tolerance);
        let run_len = run.len();
        match fit {
            Ok(Fit::Single) => {
                let last = self.samples.len() - 1;
                self.samples.drain(start + 1..last);
                self.dense = 1;
                tracing::debug!(
                    "downsampled run of {run_len} samples to a single piece ending at {}",
                    self.samples[self.samples.len() - 1].time
                );
            }
            Ok(Fit::Knots(knots)) => {
                let last_knot = knots.last().copied().unwrap_or(0);
                let tail = self.samples.split_off(start);
                let mut knots = knots.iter().copied().peekable();
                for (i, sample) in tail.into_iter().enumerate() {
                    let keep = if i == 0 || i >= last_knot {
                        true
                    } else if knots.peek() == Some(&i) {
                        knots.next();
                        true
                    } else {
                        false
                    };
                    if keep {
                        self.samples.push_back(sample);
                    }
                }
                self.dense = run_len - last_knot;
                tracing::debug!(
                    "downsampled run of {run_len} samples, {} retained before the pending run",
                    self.samples.len() - start - self.dense
                );
            }
            Err(e) => {
                self.dense = 1;
                tracing::debug!("keeping dense run of {run_len} samples: {e}");
            }
        }
    }

    /// Remove every sample after `time`.
    pub fn forget_after(&mut self, time: Instant) {
        let keep = self.upper_index(time);
        let removed = self.samples.len() - keep;
        if removed == 0 {
            return;
        }
        self.samples.truncate(keep);
        if self.downsampling.is_some() {
            if removed >= self.dense {
                self.dense = self.samples.len().min(1);
            } else {
                self.dense -= removed;
            }
        }
    }

    /// Remove every sample strictly before `time`.
    pub fn forget_before(&mut self, time: Instant) {
        let first = self.lower_index(time);
        self.samples.drain(..first);
        self.dense = self.dense.min(self.samples.len());
    }

    /// Make the sample at `time` a run endpoint so downsampling never drops
    /// it. Earlier samples of the pending run are kept as they are.
    pub(crate) fn pin(&mut self, time: Instant) {
        if self.downsampling.is_none() {
            return;
        }
        if let Some(index) = self.index_of(time) {
            let run_start = self.samples.len() - self.dense;
            if index > run_start {
                self.dense = self.samples.len() - index;
            }
        }
    }

    pub fn set_downsampling(&mut self, params: DownsamplingParameters) -> Result<()> {
        params.validate()?;
        self.downsampling = Some(params);
        self.dense = self.samples.len().min(1);
        Ok(())
    }

    pub fn clear_downsampling(&mut self) {
        self.downsampling = None;
        self.dense = 0;
    }

    /// Reinstate a pending run recorded by an export.
    pub(crate) fn restore_dense(&mut self, dense: usize) -> Result<()> {
        if self.downsampling.is_none() {
            if dense != 0 {
                return Err(TrajectoryError::InvalidArgument(
                    "dense run recorded on a segment without downsampling".to_string(),
                ));
            }
            return Ok(());
        }
        if dense > self.samples.len() || (dense == 0 && !self.samples.is_empty()) {
            return Err(TrajectoryError::InvalidArgument(format!(
                "dense run of {dense} samples on a segment of {}",
                self.samples.len()
            )));
        }
        self.dense = dense;
        Ok(())
    }

    pub fn downsampling(&self) -> Option<&DownsamplingParameters> {
        self.downsampling.as_ref()
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Samples in the pending dense run, including its first sample.
    pub fn dense_len(&self) -> usize {
        self.dense
    }

    // --- Lookup ---

    pub(crate) fn lower_index(&self, time: Instant) -> usize {
        self.samples.partition_point(|s| s.time < time)
    }

    pub(crate) fn upper_index(&self, time: Instant) -> usize {
        self.samples.partition_point(|s| s.time <= time)
    }

    fn index_of(&self, time: Instant) -> Option<usize> {
        let index = self.lower_index(time);
        (self.samples.get(index)?.time == time).then_some(index)
    }

    /// The sample at exactly `time`.
    pub fn find(&self, time: Instant) -> Option<&Sample<F>> {
        self.index_of(time).map(|i| &self.samples[i])
    }

    /// The first sample at or after `time`.
    pub fn lower_bound(&self, time: Instant) -> Option<&Sample<F>> {
        self.samples.get(self.lower_index(time))
    }

    /// The first sample strictly after `time`.
    pub fn upper_bound(&self, time: Instant) -> Option<&Sample<F>> {
        self.samples.get(self.upper_index(time))
    }

    // --- Evaluation ---

    pub fn evaluate_degrees_of_freedom(&self, time: Instant) -> Result<DegreesOfFreedom<F>> {
        let (Some(front), Some(back)) = (self.samples.front(), self.samples.back()) else {
            return Err(TrajectoryError::Empty { time });
        };
        if time < front.time || time > back.time {
            return Err(TrajectoryError::OutOfRange {
                time,
                t_min: front.time,
                t_max: back.time,
            });
        }
        let index = self.lower_index(time);
        let right = &self.samples[index];
        if right.time == time {
            return Ok(right.dof);
        }
        let left = &self.samples[index - 1];
        Ok(self.evaluator.interpolate(left, right, time))
    }

    pub fn evaluate_position(&self, time: Instant) -> Result<Vector3> {
        Ok(self.evaluate_degrees_of_freedom(time)?.position)
    }

    pub fn evaluate_velocity(&self, time: Instant) -> Result<Vector3> {
        Ok(self.evaluate_degrees_of_freedom(time)?.velocity)
    }

    // --- Iteration and bounds ---

    pub fn iter(&self) -> vec_deque::Iter<'_, Sample<F>> {
        self.samples.iter()
    }

    pub(crate) fn range(&self, range: Range<usize>) -> vec_deque::Iter<'_, Sample<F>> {
        self.samples.range(range)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn front(&self) -> Option<&Sample<F>> {
        self.samples.front()
    }

    pub fn back(&self) -> Option<&Sample<F>> {
        self.samples.back()
    }

    pub fn t_min(&self) -> Option<Instant> {
        self.front().map(|s| s.time)
    }

    pub fn t_max(&self) -> Option<Instant> {
        self.back().map(|s| s.time)
    }
}

impl<'a, F: Frame> IntoIterator for &'a Segment<F> {
    type Item = &'a Sample<F>;
    type IntoIter = vec_deque::Iter<'a, Sample<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
