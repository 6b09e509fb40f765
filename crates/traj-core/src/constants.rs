/// Default number of dense intervals a segment accumulates before the
/// downsampler attempts a fit.
pub const DEFAULT_MAX_DENSE_INTERVALS: usize = 10_000;

/// Default downsampling tolerance on reconstructed positions, in metres.
pub const DEFAULT_TOLERANCE: f64 = 10.0;

/// Upper bound on the samples a synthetic timeline factory will produce.
pub const MAX_TIMELINE_SAMPLES: usize = 100_000_000;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-12;

/// Version tag written into JSON exports of a segment tree.
pub const WIRE_VERSION: &str = "1";
