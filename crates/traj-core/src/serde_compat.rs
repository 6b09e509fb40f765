//! JSON serde for segment trees.
//!
//! The wire format uses camelCase field names, lists segments in depth-first
//! preorder with their position in that list as their id, and stores each
//! sample as a `[t, px, py, pz, vx, vy, vz]` array.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::WIRE_VERSION;
use crate::downsampling::DownsamplingParameters;
use crate::error::{Result, TrajectoryError};
use crate::evaluator::{Evaluator, Interpolation};
use crate::frame::{DegreesOfFreedom, Frame, Sample};
use crate::hermite::Kernel;
use crate::segment::Segment;
use crate::time::Instant;
use crate::tree::{SegmentId, SegmentOrigin, SegmentTree};
use crate::vector::Vector3;

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct WireTree {
    pub version: String,
    pub frame: String,
    pub segments: Vec<WireSegment>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireSegment {
    pub id: usize,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(rename = "forkTime", default)]
    pub fork_time: Option<f64>,
    pub origin: SegmentOrigin,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub kernel: Kernel,
    #[serde(default)]
    pub downsampling: Option<DownsamplingParameters>,
    #[serde(rename = "denseSamples", default)]
    pub dense_samples: usize,
    pub samples: Vec<[f64; 7]>,
}

impl WireTree {
    pub fn from_tree<F: Frame>(tree: &SegmentTree<F>) -> Self {
        let order = tree.preorder();
        let index: HashMap<SegmentId, usize> =
            order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let segments = order
            .iter()
            .enumerate()
            .filter_map(|(i, &id)| {
                let segment = tree.segment(id)?;
                Some(WireSegment {
                    id: i,
                    parent: tree.parent(id).and_then(|p| index.get(&p).copied()),
                    fork_time: tree.fork_time(id).map(Instant::secs),
                    origin: tree.origin(id)?,
                    interpolation: segment.evaluator().interpolation,
                    kernel: segment.evaluator().kernel,
                    downsampling: segment.downsampling().copied(),
                    dense_samples: segment.dense_len(),
                    samples: segment.iter().map(sample_to_wire).collect(),
                })
            })
            .collect();
        Self {
            version: WIRE_VERSION.to_string(),
            frame: F::NAME.to_string(),
            segments,
        }
    }

    /// Rebuild the tree, checking the frame, every segment's ordering and the
    /// fork topology.
    pub fn into_tree<F: Frame>(self) -> Result<SegmentTree<F>> {
        if self.version != WIRE_VERSION {
            return Err(invalid(format!(
                "unsupported format version {:?}, expected {WIRE_VERSION:?}",
                self.version
            )));
        }
        if self.frame != F::NAME {
            return Err(invalid(format!(
                "trajectory is in frame {:?}, expected {:?}",
                self.frame,
                F::NAME
            )));
        }

        let mut segments = self.segments.into_iter();
        let Some(root) = segments.next() else {
            return Err(invalid("no segments".to_string()));
        };
        if root.id != 0 || root.origin != SegmentOrigin::Root || root.parent.is_some() {
            return Err(invalid("first segment must be the root".to_string()));
        }
        let mut tree = SegmentTree::with_root(wire_to_segment(&root)?);
        let mut ids = vec![tree.root_segment()];

        for wire in segments {
            if wire.id != ids.len() {
                return Err(invalid(format!(
                    "segment {} listed at position {}",
                    wire.id,
                    ids.len()
                )));
            }
            let (Some(parent), Some(fork_time)) = (wire.parent, wire.fork_time) else {
                return Err(invalid(format!(
                    "segment {} has no fork point",
                    wire.id
                )));
            };
            let Some(&parent_id) = ids.get(parent) else {
                return Err(invalid(format!(
                    "segment {} forks from unknown segment {parent}",
                    wire.id
                )));
            };
            let segment = wire_to_segment(&wire)?;
            let id = tree.graft(
                parent_id,
                Instant::from_secs(fork_time),
                wire.origin,
                segment,
            )?;
            ids.push(id);
        }
        Ok(tree)
    }
}

fn invalid(message: String) -> TrajectoryError {
    TrajectoryError::InvalidArgument(message)
}

fn sample_to_wire<F: Frame>(sample: &Sample<F>) -> [f64; 7] {
    let [px, py, pz] = sample.position().to_array();
    let [vx, vy, vz] = sample.velocity().to_array();
    [sample.time.secs(), px, py, pz, vx, vy, vz]
}

fn wire_to_segment<F: Frame>(wire: &WireSegment) -> Result<Segment<F>> {
    let mut segment = Segment::new(Evaluator::new(wire.interpolation, wire.kernel));
    for &[t, px, py, pz, vx, vy, vz] in &wire.samples {
        let dof = DegreesOfFreedom::new(Vector3::new(px, py, pz), Vector3::new(vx, vy, vz));
        segment.append(Instant::from_secs(t), dof)?;
    }
    if let Some(params) = wire.downsampling {
        segment.set_downsampling(params)?;
    }
    segment.restore_dense(wire.dense_samples)?;
    Ok(segment)
}

pub fn import_json<F: Frame>(json: &str) -> Result<SegmentTree<F>> {
    let wire: WireTree = serde_json::from_str(json)?;
    wire.into_tree()
}

pub fn export_json<F: Frame>(tree: &SegmentTree<F>) -> Result<String> {
    let wire = WireTree::from_tree(tree);
    Ok(serde_json::to_string_pretty(&wire)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::World;

    fn t(secs: f64) -> Instant {
        Instant::from_secs(secs)
    }

    fn dof(s: f64) -> DegreesOfFreedom<World> {
        DegreesOfFreedom::new(
            Vector3::new(s.cos(), s.sin(), 0.1 * s),
            Vector3::new(-s.sin(), s.cos(), 0.1),
        )
    }

    fn make_test_tree() -> SegmentTree<World> {
        let mut tree = SegmentTree::new(Evaluator::hermite3(Kernel::Fma));
        let root = tree.root();
        tree.set_downsampling(root, DownsamplingParameters::new(8, 1e-3).unwrap())
            .unwrap();
        for i in 0..30 {
            let s = i as f64 / 10.0;
            tree.append(root, t(s), dof(s)).unwrap();
        }
        let forked = tree.fork(root, t(2.9)).unwrap();
        tree.append(forked, t(3.05), dof(3.05)).unwrap();
        tree.new_segment(root).unwrap();
        tree.append(root, t(3.3), dof(3.3)).unwrap();
        tree
    }

    #[test]
    fn test_roundtrip() {
        let tree = make_test_tree();
        let json = export_json(&tree).unwrap();
        let tree2: SegmentTree<World> = import_json(&json).unwrap();

        assert_eq!(tree.segment_count(), tree2.segment_count());
        assert_eq!(tree.branch_count(), tree2.branch_count());
        for (a, b) in tree.branches().zip(tree2.branches()) {
            let a = tree.branch(a).unwrap();
            let b = tree2.branch(b).unwrap();
            let sa: Vec<_> = a.iter().copied().collect();
            let sb: Vec<_> = b.iter().copied().collect();
            assert_eq!(sa, sb);
            assert_eq!(a.fork_time(), b.fork_time());
        }
        let root_a = tree.segment(tree.root_segment()).unwrap();
        let root_b = tree2.segment(tree2.root_segment()).unwrap();
        assert_eq!(root_a.downsampling(), root_b.downsampling());
        assert_eq!(root_a.dense_len(), root_b.dense_len());
        assert_eq!(root_a.evaluator(), root_b.evaluator());
    }

    #[test]
    fn test_version_and_frame_fields() {
        let tree = make_test_tree();
        let wire: WireTree = serde_json::from_str(&export_json(&tree).unwrap()).unwrap();
        assert_eq!(wire.version, WIRE_VERSION);
        assert_eq!(wire.frame, "World");
        assert_eq!(wire.segments[0].origin, SegmentOrigin::Root);
        assert!(wire.segments[1..].iter().all(|s| s.parent.is_some()));
    }

    #[test]
    fn test_camel_case_fields() {
        let json = export_json(&make_test_tree()).unwrap();
        assert!(json.contains("\"forkTime\""));
        assert!(json.contains("\"denseSamples\""));
        assert!(json.contains("\"maxDenseIntervals\""));
    }

    #[test]
    fn test_rejects_foreign_frame() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        struct Body;
        impl Frame for Body {
            const NAME: &'static str = "Body";
        }
        let json = export_json(&make_test_tree()).unwrap();
        let err = import_json::<Body>(&json).unwrap_err();
        assert!(err.is_invalid_argument(), "{err}");
    }

    #[test]
    fn test_rejects_non_monotonic_samples() {
        let json = r#"{
            "version": "1",
            "frame": "World",
            "segments": [{
                "id": 0,
                "origin": "root",
                "samples": [[1, 0, 0, 0, 0, 0, 0], [1, 1, 0, 0, 0, 0, 0]]
            }]
        }"#;
        assert!(import_json::<World>(json).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_rejects_mismatched_fork_copy() {
        let json = r#"{
            "version": "1",
            "frame": "World",
            "segments": [
                {"id": 0, "origin": "root", "samples": [[1, 0, 0, 0, 0, 0, 0], [2, 1, 0, 0, 0, 0, 0]]},
                {"id": 1, "parent": 0, "forkTime": 2, "origin": "fork",
                 "samples": [[2, 5, 0, 0, 0, 0, 0]]}
            ]
        }"#;
        assert!(import_json::<World>(json).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_minimal_document_uses_defaults() {
        let json = r#"{
            "version": "1",
            "frame": "World",
            "segments": [{"id": 0, "origin": "root", "samples": [[0, 1, 2, 3, 0, 0, 0]]}]
        }"#;
        let tree = import_json::<World>(json).unwrap();
        let root = tree.segment(tree.root_segment()).unwrap();
        assert_eq!(*root.evaluator(), Evaluator::default());
        assert!(root.downsampling().is_none());
        assert_eq!(root.front().map(|s| s.position()), Some(Vector3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_malformed_json() {
        let err = import_json::<World>("{").unwrap_err();
        assert!(matches!(err, TrajectoryError::Serialization(_)));
    }
}
