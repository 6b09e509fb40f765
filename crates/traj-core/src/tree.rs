//! The segment tree: an arena of segments linked at fork points, and the
//! table of branches that select root-to-leaf paths through it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, Key};
use crate::branch::Branch;
use crate::downsampling::DownsamplingParameters;
use crate::error::{Result, TrajectoryError};
use crate::evaluator::Evaluator;
use crate::frame::{DegreesOfFreedom, Frame, Sample};
use crate::segment::Segment;
use crate::time::Instant;

/// Handle to a segment. Dead once the segment is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(Key);

/// Handle to a branch. Dead once the branch's first segment is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchId(Key);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch {}", self.0)
    }
}

/// How a segment came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrigin {
    /// The first segment of the root branch.
    Root,
    /// Opened by [`SegmentTree::new_segment`]; continues its parent's branch.
    Continuation,
    /// Opened by [`SegmentTree::fork`]; first segment of a new branch.
    Fork,
}

impl SegmentOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentOrigin::Root => "root",
            SegmentOrigin::Continuation => "continuation",
            SegmentOrigin::Fork => "fork",
        }
    }
}

impl FromStr for SegmentOrigin {
    type Err = TrajectoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" => Ok(SegmentOrigin::Root),
            "continuation" => Ok(SegmentOrigin::Continuation),
            "fork" => Ok(SegmentOrigin::Fork),
            other => Err(TrajectoryError::InvalidArgument(format!(
                "unknown segment origin {other:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node<F: Frame> {
    pub(crate) segment: Segment<F>,
    pub(crate) parent: Option<SegmentId>,
    pub(crate) fork_time: Option<Instant>,
    pub(crate) origin: SegmentOrigin,
    pub(crate) branch: BranchId,
    pub(crate) children: Vec<SegmentId>,
}

#[derive(Clone, Copy, Debug)]
struct BranchRecord {
    base: SegmentId,
    leaf: SegmentId,
}

/// Owns every segment of one trajectory and its forks.
///
/// Parent and child links are arena keys. Every branch is a chain of
/// segments from its base to its leaf; the root branch's base is the tree
/// root, and every other branch's base was forked off a sample of some
/// segment. All mutation goes through `&mut self`.
#[derive(Clone, Debug)]
pub struct SegmentTree<F: Frame> {
    nodes: Arena<Node<F>>,
    branches: Arena<BranchRecord>,
    root_segment: SegmentId,
    root_branch: BranchId,
}

impl<F: Frame> SegmentTree<F> {
    pub fn new(evaluator: Evaluator) -> Self {
        Self::with_root(Segment::new(evaluator))
    }

    pub(crate) fn with_root(segment: Segment<F>) -> Self {
        let mut nodes = Arena::new();
        let mut branches = Arena::new();
        // Placeholder keys; the root node and root branch point at each other.
        let placeholder = Key {
            index: 0,
            generation: 0,
        };
        let root_segment = SegmentId(nodes.insert(Node {
            segment,
            parent: None,
            fork_time: None,
            origin: SegmentOrigin::Root,
            branch: BranchId(placeholder),
            children: Vec::new(),
        }));
        let root_branch = BranchId(branches.insert(BranchRecord {
            base: root_segment,
            leaf: root_segment,
        }));
        if let Some(node) = nodes.get_mut(root_segment.0) {
            node.branch = root_branch;
        }
        Self {
            nodes,
            branches,
            root_segment,
            root_branch,
        }
    }

    /// The branch that starts at the tree root.
    pub fn root(&self) -> BranchId {
        self.root_branch
    }

    pub fn root_segment(&self) -> SegmentId {
        self.root_segment
    }

    // --- Growth ---

    pub fn append(&mut self, branch: BranchId, time: Instant, dof: DegreesOfFreedom<F>) -> Result<()> {
        let leaf = self.record(branch)?.leaf;
        self.node_mut(leaf)?.segment.append(time, dof)
    }

    /// Append a whole sequence, typically an integrator's output. Nothing is
    /// appended unless every sample would be accepted.
    pub fn extend(
        &mut self,
        branch: BranchId,
        samples: impl IntoIterator<Item = Sample<F>>,
    ) -> Result<usize> {
        let leaf = self.record(branch)?.leaf;
        let samples: Vec<Sample<F>> = samples.into_iter().collect();
        let mut last = self.node(leaf)?.segment.t_max();
        for sample in &samples {
            if !sample.time.is_finite() || last.is_some_and(|last| sample.time <= last) {
                return Err(TrajectoryError::InvalidArgument(format!(
                    "sample at {} does not extend the branch",
                    sample.time
                )));
            }
            last = Some(sample.time);
        }
        let segment = &mut self.node_mut(leaf)?.segment;
        for sample in &samples {
            segment.append(sample.time, sample.dof)?;
        }
        Ok(samples.len())
    }

    /// Open a segment continuing `branch` from its last sample, without
    /// forking. Used to mark a discontinuity in how the trajectory is built.
    pub fn new_segment(&mut self, branch: BranchId) -> Result<SegmentId> {
        let leaf = self.record(branch)?.leaf;
        let segment = &self.node(leaf)?.segment;
        let Some(last) = segment.back().copied() else {
            return Err(TrajectoryError::InvalidArgument(format!(
                "cannot open a segment after the empty leaf of {branch}"
            )));
        };
        let child = Segment::seeded(*segment.evaluator(), last);
        self.graft(leaf, last.time, SegmentOrigin::Continuation, child)
    }

    /// Start a new branch sharing `branch`'s history up to and including the
    /// sample at `at_time`.
    pub fn fork(&mut self, branch: BranchId, at_time: Instant) -> Result<BranchId> {
        let view = self.branch(branch).ok_or(TrajectoryError::StaleHandle)?;
        let Some((parent, sample)) = view.locate(at_time) else {
            return Err(TrajectoryError::InvalidArgument(format!(
                "{branch} has no sample at {at_time}"
            )));
        };
        let sample = *sample;
        let evaluator = *self.node(parent)?.segment.evaluator();
        let child = self.graft(
            parent,
            at_time,
            SegmentOrigin::Fork,
            Segment::seeded(evaluator, sample),
        )?;
        self.node_mut(parent)?.segment.pin(at_time);
        let forked = self.node(child)?.branch;
        tracing::debug!("forked {forked} from {parent} at {at_time}");
        Ok(forked)
    }

    /// Link `segment` under `parent` at `fork_time`. The segment's first
    /// sample must be a copy of the parent's sample at that time.
    pub(crate) fn graft(
        &mut self,
        parent: SegmentId,
        fork_time: Instant,
        origin: SegmentOrigin,
        segment: Segment<F>,
    ) -> Result<SegmentId> {
        let parent_node = self.node(parent)?;
        let Some(source) = parent_node.segment.find(fork_time) else {
            return Err(TrajectoryError::InvalidArgument(format!(
                "{parent} has no sample at fork time {fork_time}"
            )));
        };
        if segment.front() != Some(source) {
            return Err(TrajectoryError::InvalidArgument(format!(
                "first sample does not match {parent} at {fork_time}"
            )));
        }
        let branch = match origin {
            SegmentOrigin::Root => {
                return Err(TrajectoryError::InvalidArgument(
                    "a tree has exactly one root segment".to_string(),
                ));
            }
            SegmentOrigin::Continuation => {
                let owner = parent_node.branch;
                if self.record(owner)?.leaf != parent {
                    return Err(TrajectoryError::InvalidArgument(format!(
                        "{parent} already has a continuation"
                    )));
                }
                if parent_node.segment.t_max() != Some(fork_time) {
                    return Err(TrajectoryError::InvalidArgument(format!(
                        "continuation of {parent} must start at its last sample"
                    )));
                }
                Some(owner)
            }
            SegmentOrigin::Fork => None,
        };

        let id = SegmentId(self.nodes.insert(Node {
            segment,
            parent: Some(parent),
            fork_time: Some(fork_time),
            origin,
            branch: branch.unwrap_or(self.root_branch),
            children: Vec::new(),
        }));
        let branch = match branch {
            Some(owner) => {
                if let Some(record) = self.branches.get_mut(owner.0) {
                    record.leaf = id;
                }
                owner
            }
            None => BranchId(self.branches.insert(BranchRecord { base: id, leaf: id })),
        };
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.branch = branch;
        }
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children.push(id);
        }
        Ok(id)
    }

    // --- Trimming ---

    /// Remove every sample of `branch` after `time`, together with the
    /// continuation segments that start after it and every subtree forked
    /// after it.
    pub fn forget_after(&mut self, branch: BranchId, time: Instant) -> Result<()> {
        let record = self.record(branch)?;
        let base = self.node(record.base)?;
        if base.origin == SegmentOrigin::Fork
            && let Some(fork_time) = base.fork_time
            && time < fork_time
        {
            return Err(TrajectoryError::InvalidArgument(format!(
                "{branch} was forked at {fork_time}; delete it instead of forgetting after {time}"
            )));
        }

        let mut leaf = record.leaf;
        loop {
            let node = self.node(leaf)?;
            if node.origin != SegmentOrigin::Continuation
                || node.fork_time.is_none_or(|fork_time| fork_time <= time)
            {
                break;
            }
            let Some(parent) = node.parent else {
                break;
            };
            self.remove_subtree(leaf);
            leaf = parent;
        }
        if let Some(record) = self.branches.get_mut(branch.0) {
            record.leaf = leaf;
        }

        let doomed: Vec<SegmentId> = self
            .node(leaf)?
            .children
            .iter()
            .copied()
            .filter(|&child| {
                self.nodes
                    .get(child.0)
                    .and_then(|c| c.fork_time)
                    .is_some_and(|fork_time| fork_time > time)
            })
            .collect();
        for child in doomed {
            self.remove_subtree(child);
        }
        self.node_mut(leaf)?.segment.forget_after(time);
        Ok(())
    }

    /// Remove every sample of the root branch strictly before `time`.
    ///
    /// Fails, changing nothing, if another branch was forked before `time`:
    /// those branches must be deleted first. Branches forked exactly at
    /// `time` survive, reattached to whichever segment becomes the root.
    pub fn forget_before(&mut self, branch: BranchId, time: Instant) -> Result<()> {
        self.record(branch)?;
        if branch != self.root_branch {
            return Err(TrajectoryError::InvalidArgument(format!(
                "forget_before applies to the root branch, not {branch}"
            )));
        }
        let path = self.own_segments(branch)?;
        for &id in &path {
            for &child in &self.node(id)?.children {
                let child = self.node(child)?;
                if child.origin == SegmentOrigin::Fork
                    && child.fork_time.is_some_and(|fork_time| fork_time < time)
                {
                    return Err(TrajectoryError::InvalidArgument(format!(
                        "{} was forked before {time}; delete it first",
                        child.branch
                    )));
                }
            }
        }

        let last = path.len() - 1;
        let mut keep = last;
        for (i, &id) in path.iter().enumerate() {
            if i == last || self.node(id)?.segment.t_max().is_some_and(|t_max| t_max > time) {
                keep = i;
                break;
            }
        }
        let new_root = path[keep];
        let mut adopted = Vec::new();
        for (i, &id) in path[..keep].iter().enumerate() {
            if let Some(node) = self.nodes.remove(id.0) {
                let continuation = path[i + 1];
                adopted.extend(node.children.into_iter().filter(|&c| c != continuation));
            }
        }
        for &child in &adopted {
            if let Some(node) = self.nodes.get_mut(child.0) {
                node.parent = Some(new_root);
            }
        }
        if keep > 0 {
            tracing::debug!("forget_before {time} dropped {keep} segments of the root branch");
        }

        let root = self.node_mut(new_root)?;
        root.parent = None;
        root.fork_time = None;
        root.origin = SegmentOrigin::Root;
        root.children.extend(adopted);
        root.segment.forget_before(time);
        self.root_segment = new_root;
        if let Some(record) = self.branches.get_mut(branch.0) {
            record.base = new_root;
        }
        Ok(())
    }

    /// Remove a forked branch and everything forked off it.
    pub fn delete_branch(&mut self, branch: BranchId) -> Result<()> {
        let record = self.record(branch)?;
        if branch == self.root_branch {
            return Err(TrajectoryError::InvalidArgument(
                "the root branch cannot be deleted".to_string(),
            ));
        }
        self.remove_subtree(record.base);
        Ok(())
    }

    /// Detach `id` from its parent and drop it with all its descendants.
    /// Branches based inside the subtree die with it.
    fn remove_subtree(&mut self, id: SegmentId) {
        if let Some(parent) = self.nodes.get(id.0).and_then(|node| node.parent)
            && let Some(parent) = self.nodes.get_mut(parent.0)
        {
            parent.children.retain(|&child| child != id);
        }
        let mut stack = vec![id];
        let mut segments = 0;
        let mut branches = 0;
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.remove(next.0) else {
                continue;
            };
            segments += 1;
            if node.origin == SegmentOrigin::Fork && self.branches.remove(node.branch.0).is_some() {
                branches += 1;
            }
            stack.extend(node.children);
        }
        tracing::debug!("removed {segments} segments and {branches} branches under {id}");
    }

    // --- Downsampling ---

    /// Configure downsampling on the leaf segment of `branch`.
    pub fn set_downsampling(&mut self, branch: BranchId, params: DownsamplingParameters) -> Result<()> {
        let leaf = self.record(branch)?.leaf;
        self.node_mut(leaf)?.segment.set_downsampling(params)
    }

    pub fn clear_downsampling(&mut self, branch: BranchId) -> Result<()> {
        let leaf = self.record(branch)?.leaf;
        self.node_mut(leaf)?.segment.clear_downsampling();
        Ok(())
    }

    // --- Queries ---

    pub fn is_alive(&self, branch: BranchId) -> bool {
        self.branches.contains(branch.0)
    }

    /// View `branch` as a single timeline.
    pub fn branch(&self, branch: BranchId) -> Option<Branch<'_, F>> {
        let record = self.branches.get(branch.0)?;
        let mut path = Vec::new();
        let mut next = Some(record.leaf);
        while let Some(id) = next {
            let node = self.nodes.get(id.0)?;
            path.push((id, &node.segment, node.fork_time));
            next = node.parent;
        }
        path.reverse();
        let base = self.nodes.get(record.base.0)?;
        let fork_time = match base.origin {
            SegmentOrigin::Fork => base.fork_time,
            _ => None,
        };
        Some(Branch::new(branch, branch == self.root_branch, fork_time, path))
    }

    /// Live branches in depth-first order of their first segments, so the
    /// root branch comes first and the order survives export and import.
    pub fn branches(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.preorder().into_iter().filter_map(|id| {
            let node = self.nodes.get(id.0)?;
            (node.origin != SegmentOrigin::Continuation).then_some(node.branch)
        })
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment<F>> {
        self.nodes.get(id.0).map(|node| &node.segment)
    }

    pub fn parent(&self, id: SegmentId) -> Option<SegmentId> {
        self.nodes.get(id.0)?.parent
    }

    pub fn children(&self, id: SegmentId) -> &[SegmentId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn fork_time(&self, id: SegmentId) -> Option<Instant> {
        self.nodes.get(id.0)?.fork_time
    }

    pub fn origin(&self, id: SegmentId) -> Option<SegmentOrigin> {
        self.nodes.get(id.0).map(|node| node.origin)
    }

    /// The branch that owns segment `id`.
    pub fn owner(&self, id: SegmentId) -> Option<BranchId> {
        self.nodes.get(id.0).map(|node| node.branch)
    }

    pub fn leaf(&self, branch: BranchId) -> Option<SegmentId> {
        self.branches.get(branch.0).map(|record| record.leaf)
    }

    pub fn segment_count(&self) -> usize {
        self.nodes.len()
    }

    /// Samples stored across all segments, fork copies included.
    pub fn sample_count(&self) -> usize {
        self.nodes.iter().map(|(_, node)| node.segment.len()).sum()
    }

    /// Segment ids in depth-first preorder from the root, children in the
    /// order they were created.
    pub fn preorder(&self) -> Vec<SegmentId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root_segment];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    // --- Internals ---

    fn record(&self, branch: BranchId) -> Result<BranchRecord> {
        self.branches
            .get(branch.0)
            .copied()
            .ok_or(TrajectoryError::StaleHandle)
    }

    pub(crate) fn node(&self, id: SegmentId) -> Result<&Node<F>> {
        self.nodes.get(id.0).ok_or(TrajectoryError::StaleHandle)
    }

    fn node_mut(&mut self, id: SegmentId) -> Result<&mut Node<F>> {
        self.nodes.get_mut(id.0).ok_or(TrajectoryError::StaleHandle)
    }

    /// The segments owned by `branch`, base first.
    fn own_segments(&self, branch: BranchId) -> Result<Vec<SegmentId>> {
        let record = self.record(branch)?;
        let mut path = vec![record.leaf];
        let mut id = record.leaf;
        while id != record.base {
            let Some(parent) = self.node(id)?.parent else {
                break;
            };
            path.push(parent);
            id = parent;
        }
        path.reverse();
        Ok(path)
    }
}
