pub mod async_runtime;
pub mod clock;

pub use clock::*;

/// Maximum random padding added to a millisecond timestamp to build its physical key.
pub const MAX_PADDING: f64 = 0.1;

/// One day in milliseconds.
pub const DAY_MILLIS: u64 = 86_400 * 1000;
