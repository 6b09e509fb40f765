//! A root-to-leaf path through the segment tree, read as one timeline.

use std::collections::vec_deque;

use crate::error::{Result, TrajectoryError};
use crate::frame::{DegreesOfFreedom, Frame, Sample};
use crate::segment::Segment;
use crate::time::Instant;
use crate::tree::{BranchId, SegmentId};
use crate::vector::Vector3;

/// The samples one segment contributes to a branch: a prefix of the segment
/// ending before the next segment's fork time.
#[derive(Clone, Debug)]
struct Part<'a, F: Frame> {
    id: SegmentId,
    segment: &'a Segment<F>,
    end: usize,
    t_min: Instant,
    t_max: Instant,
}

impl<'a, F: Frame> Part<'a, F> {
    fn iter(&self) -> vec_deque::Iter<'a, Sample<F>> {
        self.segment.range(0..self.end)
    }
}

/// Borrowed view of a branch.
///
/// A parent segment contributes its samples strictly before the fork time of
/// the next segment on the path; the next segment's first sample stands for
/// the fork sample. Parts are therefore disjoint and strictly increasing, and
/// lookups binary-search them before delegating to the owning segment.
#[derive(Clone, Debug)]
pub struct Branch<'a, F: Frame> {
    id: BranchId,
    is_root: bool,
    fork_time: Option<Instant>,
    path: Vec<(SegmentId, &'a Segment<F>)>,
    parts: Vec<Part<'a, F>>,
    len: usize,
}

impl<'a, F: Frame> Branch<'a, F> {
    /// `path` runs root first, each segment paired with its own fork time.
    pub(crate) fn new(
        id: BranchId,
        is_root: bool,
        fork_time: Option<Instant>,
        path: Vec<(SegmentId, &'a Segment<F>, Option<Instant>)>,
    ) -> Self {
        let mut parts = Vec::with_capacity(path.len());
        for (i, &(segment_id, segment, _)) in path.iter().enumerate() {
            let end = match path.get(i + 1) {
                Some(&(_, _, Some(next_fork))) => segment.lower_index(next_fork),
                _ => segment.len(),
            };
            if end == 0 {
                continue;
            }
            let (Some(first), Some(last)) = (segment.front(), segment.range(0..end).next_back())
            else {
                continue;
            };
            parts.push(Part {
                id: segment_id,
                segment,
                end,
                t_min: first.time,
                t_max: last.time,
            });
        }
        let len = parts.iter().map(|part| part.end).sum();
        Self {
            id,
            is_root,
            fork_time,
            path: path
                .into_iter()
                .map(|(segment_id, segment, _)| (segment_id, segment))
                .collect(),
            parts,
            len,
        }
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Time of the sample this branch was forked at; `None` for the root.
    pub fn fork_time(&self) -> Option<Instant> {
        self.fork_time
    }

    /// Segments from the tree root to this branch's leaf.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &'a Segment<F>> + '_ {
        self.path.iter().map(|&(_, segment)| segment)
    }

    pub fn segment_ids(&self) -> impl DoubleEndedIterator<Item = SegmentId> + '_ {
        self.path.iter().map(|&(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All samples in time order. Reverse with `.rev()`.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'a Sample<F>> + '_ {
        self.parts.iter().flat_map(|part| part.iter())
    }

    /// Samples at or after `time`.
    pub fn iter_from(&self, time: Instant) -> impl DoubleEndedIterator<Item = &'a Sample<F>> + '_ {
        let first = self.parts.partition_point(|part| part.t_max < time);
        self.parts[first..]
            .iter()
            .enumerate()
            .flat_map(move |(i, part)| {
                let start = if i == 0 {
                    part.segment.lower_index(time)
                } else {
                    0
                };
                part.segment.range(start..part.end)
            })
    }

    pub fn times(&self) -> impl DoubleEndedIterator<Item = Instant> + '_ {
        self.iter().map(|sample| sample.time)
    }

    pub fn front(&self) -> Option<&'a Sample<F>> {
        self.parts.first().and_then(|part| part.segment.front())
    }

    pub fn back(&self) -> Option<&'a Sample<F>> {
        self.parts
            .last()
            .and_then(|part| part.segment.range(0..part.end).next_back())
    }

    pub fn t_min(&self) -> Option<Instant> {
        self.parts.first().map(|part| part.t_min)
    }

    pub fn t_max(&self) -> Option<Instant> {
        self.parts.last().map(|part| part.t_max)
    }

    /// The part whose time range reaches `time`, if any.
    fn part_reaching(&self, time: Instant) -> Option<&Part<'a, F>> {
        self.parts.get(self.parts.partition_point(|part| part.t_max < time))
    }

    /// The sample at exactly `time`.
    pub fn find(&self, time: Instant) -> Option<&'a Sample<F>> {
        self.locate(time).map(|(_, sample)| sample)
    }

    /// The sample at exactly `time` and the segment that holds it.
    pub(crate) fn locate(&self, time: Instant) -> Option<(SegmentId, &'a Sample<F>)> {
        let part = self.part_reaching(time)?;
        if time < part.t_min {
            return None;
        }
        part.segment.find(time).map(|sample| (part.id, sample))
    }

    /// The first sample at or after `time`.
    pub fn lower_bound(&self, time: Instant) -> Option<&'a Sample<F>> {
        let part = self.part_reaching(time)?;
        part.segment.lower_bound(time)
    }

    /// The first sample strictly after `time`.
    pub fn upper_bound(&self, time: Instant) -> Option<&'a Sample<F>> {
        let first = self.parts.partition_point(|part| part.t_max <= time);
        self.parts.get(first)?.segment.upper_bound(time)
    }

    pub fn evaluate_degrees_of_freedom(&self, time: Instant) -> Result<DegreesOfFreedom<F>> {
        let (Some(t_min), Some(t_max)) = (self.t_min(), self.t_max()) else {
            return Err(TrajectoryError::Empty { time });
        };
        let out_of_range = TrajectoryError::OutOfRange {
            time,
            t_min,
            t_max,
        };
        if time < t_min || time > t_max {
            return Err(out_of_range);
        }
        let index = self.parts.partition_point(|part| part.t_max < time);
        let part = &self.parts[index];
        if time >= part.t_min {
            return part.segment.evaluate_degrees_of_freedom(time);
        }
        // Between two parts: the previous segment still holds the fork sample
        // that starts this part.
        let previous = &self.parts[index - 1];
        match previous.segment.t_max() {
            Some(reach) if reach >= time => previous.segment.evaluate_degrees_of_freedom(time),
            _ => Err(out_of_range),
        }
    }

    pub fn evaluate_position(&self, time: Instant) -> Result<Vector3> {
        Ok(self.evaluate_degrees_of_freedom(time)?.position)
    }

    pub fn evaluate_velocity(&self, time: Instant) -> Result<Vector3> {
        Ok(self.evaluate_degrees_of_freedom(time)?.velocity)
    }
}

#[cfg(test)]
mod tests {
    use crate::evaluator::Evaluator;
    use crate::frame::World;
    use crate::tree::SegmentTree;

    use super::*;

    fn t(secs: f64) -> Instant {
        Instant::from_secs(secs)
    }

    /// x(t) = t², v(t) = 2t, so cubic Hermite reproduces it exactly.
    fn dof(s: f64) -> DegreesOfFreedom<World> {
        DegreesOfFreedom::new(Vector3::new(s * s, 0.0, 0.0), Vector3::new(2.0 * s, 0.0, 0.0))
    }

    /// Root [0, 1, 2] continued by [2, 3, 4], forked at 3 into [3, 3.5].
    fn fixture() -> (SegmentTree<World>, BranchId) {
        let mut tree = SegmentTree::new(Evaluator::default());
        let root = tree.root();
        for s in [0.0, 1.0, 2.0] {
            tree.append(root, t(s), dof(s)).unwrap();
        }
        tree.new_segment(root).unwrap();
        for s in [3.0, 4.0] {
            tree.append(root, t(s), dof(s)).unwrap();
        }
        let forked = tree.fork(root, t(3.0)).unwrap();
        tree.append(forked, t(3.5), dof(3.5)).unwrap();
        (tree, forked)
    }

    fn secs<'a>(samples: impl Iterator<Item = &'a Sample<World>>) -> Vec<f64> {
        samples.map(|s| s.time.secs()).collect()
    }

    #[test]
    fn test_iteration_spans_segments() {
        let (tree, forked) = fixture();
        let root = tree.branch(tree.root()).unwrap();
        assert_eq!(secs(root.iter()), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(secs(root.iter().rev()), vec![4.0, 3.0, 2.0, 1.0, 0.0]);
        assert_eq!(root.len(), 5);
        assert_eq!(root.segments().count(), 2);

        let branch = tree.branch(forked).unwrap();
        assert_eq!(secs(branch.iter()), vec![0.0, 1.0, 2.0, 3.0, 3.5]);
        assert_eq!(branch.segment_ids().count(), 3);
        assert!(!branch.is_root());
        assert_eq!(branch.fork_time(), Some(t(3.0)));
    }

    #[test]
    fn test_iter_from() {
        let (tree, forked) = fixture();
        let branch = tree.branch(forked).unwrap();
        assert_eq!(secs(branch.iter_from(t(1.5))), vec![2.0, 3.0, 3.5]);
        assert_eq!(secs(branch.iter_from(t(2.0))), vec![2.0, 3.0, 3.5]);
        assert_eq!(secs(branch.iter_from(t(-1.0))).len(), 5);
        assert!(branch.iter_from(t(9.0)).next().is_none());
    }

    #[test]
    fn test_lookups_cross_parts() {
        let (tree, forked) = fixture();
        let branch = tree.branch(forked).unwrap();
        assert_eq!(branch.find(t(2.0)).map(|s| s.time), Some(t(2.0)));
        assert_eq!(branch.find(t(3.0)).map(|s| s.time), Some(t(3.0)));
        assert!(branch.find(t(4.0)).is_none());
        assert_eq!(branch.lower_bound(t(2.5)).map(|s| s.time), Some(t(3.0)));
        assert_eq!(branch.upper_bound(t(2.0)).map(|s| s.time), Some(t(3.0)));
        assert_eq!(branch.upper_bound(t(3.0)).map(|s| s.time), Some(t(3.5)));
        assert!(branch.upper_bound(t(3.5)).is_none());
        assert_eq!(branch.front().map(|s| s.time), Some(t(0.0)));
        assert_eq!(branch.back().map(|s| s.time), Some(t(3.5)));
    }

    #[test]
    fn test_locate_prefers_later_segment() {
        let (tree, _) = fixture();
        let root = tree.branch(tree.root()).unwrap();
        let (id, _) = root.locate(t(2.0)).unwrap();
        assert_eq!(Some(id), tree.leaf(tree.root()));
    }

    #[test]
    fn test_evaluate_across_fork() {
        let (tree, forked) = fixture();
        let branch = tree.branch(forked).unwrap();
        for s in [0.0, 0.5, 1.9, 2.0, 2.5, 3.0, 3.25, 3.5] {
            let dof = branch.evaluate_degrees_of_freedom(t(s)).unwrap();
            assert!((dof.position.x - s * s).abs() < 1e-12, "{s}");
            assert!((dof.velocity.x - 2.0 * s).abs() < 1e-12, "{s}");
        }
        assert!(branch.evaluate_position(t(3.6)).unwrap_err().is_out_of_range());
        assert!(branch.evaluate_velocity(t(-0.1)).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_empty_branch() {
        let tree = SegmentTree::<World>::new(Evaluator::default());
        let branch = tree.branch(tree.root()).unwrap();
        assert!(branch.is_empty());
        assert!(branch.front().is_none());
        assert!(branch.t_min().is_none());
        assert!(matches!(
            branch.evaluate_position(t(0.0)),
            Err(TrajectoryError::Empty { .. })
        ));
    }
}
