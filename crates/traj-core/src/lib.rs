//! Discrete trajectory engine.
//!
//! Records time-ordered samples of a body's position and velocity in
//! chronological segments, links segments into a forking tree, trims
//! trajectories at either end, evaluates position and velocity between
//! samples with cubic Hermite interpolation, and downsamples dense runs
//! online while bounding the reconstruction error.
//!
//! Zero I/O: callers feed samples in and read timelines out. Persistence
//! lives in `traj-store`.

mod arena;
pub mod branch;
pub mod constants;
pub mod downsampling;
pub mod error;
pub mod evaluator;
pub mod factories;
pub mod frame;
pub mod hermite;
pub mod segment;
pub mod serde_compat;
pub mod time;
pub mod tree;
pub mod vector;

pub use branch::Branch;
pub use constants::{
    DEFAULT_MAX_DENSE_INTERVALS, DEFAULT_TOLERANCE, EPSILON, MAX_TIMELINE_SAMPLES, WIRE_VERSION,
};
pub use downsampling::DownsamplingParameters;
pub use error::{Result, TrajectoryError};
pub use evaluator::{Evaluator, Interpolation};
pub use factories::{CircularMotion, circular_timeline, jittered_circular_timeline, linear_timeline};
pub use frame::{DegreesOfFreedom, Frame, Sample, World};
pub use hermite::Kernel;
pub use segment::Segment;
pub use serde_compat::{export_json, import_json};
pub use time::Instant;
pub use tree::{BranchId, SegmentId, SegmentOrigin, SegmentTree};
pub use vector::Vector3;
