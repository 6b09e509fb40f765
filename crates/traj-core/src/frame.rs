//! Reference frames, degrees of freedom and samples.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::time::Instant;
use crate::vector::Vector3;

/// Marker for a reference frame. Values expressed in different frames do not
/// mix: a `SegmentTree<Barycentric>` only accepts `Sample<Barycentric>`.
pub trait Frame: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Name written into persisted trajectories and checked on import.
    const NAME: &'static str;
}

/// Default frame for callers that only ever use one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct World;

impl Frame for World {
    const NAME: &'static str = "World";
}

/// Position and velocity of a body in frame `F`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct DegreesOfFreedom<F: Frame> {
    pub position: Vector3,
    pub velocity: Vector3,
    #[serde(skip)]
    frame: PhantomData<F>,
}

impl<F: Frame> DegreesOfFreedom<F> {
    pub const fn new(position: Vector3, velocity: Vector3) -> Self {
        Self {
            position,
            velocity,
            frame: PhantomData,
        }
    }

    /// At rest at the origin.
    pub const fn origin() -> Self {
        Self::new(Vector3::ZERO, Vector3::ZERO)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

/// One stored state: a time and the degrees of freedom at that time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Sample<F: Frame> {
    pub time: Instant,
    pub dof: DegreesOfFreedom<F>,
}

impl<F: Frame> Sample<F> {
    pub const fn new(time: Instant, dof: DegreesOfFreedom<F>) -> Self {
        Self { time, dof }
    }

    pub fn position(&self) -> Vector3 {
        self.dof.position
    }

    pub fn velocity(&self) -> Vector3 {
        self.dof.velocity
    }
}
