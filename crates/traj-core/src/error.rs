//! Errors reported by trajectory operations.

use thiserror::Error;

use crate::time::Instant;

/// Every failing operation reports one of these synchronously and leaves the
/// segment or tree exactly as it was before the call.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    /// Non-monotonic append, fork at a missing instant, forget on a branch
    /// whose descendants depend on the removed samples, malformed import.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup or evaluation outside the covered time span.
    #[error("{time} is outside [{t_min}, {t_max}]")]
    OutOfRange {
        time: Instant,
        t_min: Instant,
        t_max: Instant,
    },

    /// Lookup or evaluation on a timeline with no samples.
    #[error("{time} is outside an empty timeline")]
    Empty { time: Instant },

    /// The branch or segment handle refers to something that was removed.
    #[error("stale handle: the branch or segment no longer exists")]
    StaleHandle,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrajectoryError {
    /// True for both [`TrajectoryError::OutOfRange`] and
    /// [`TrajectoryError::Empty`].
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            TrajectoryError::OutOfRange { .. } | TrajectoryError::Empty { .. }
        )
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, TrajectoryError::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, TrajectoryError>;
