//! Small helpers shared across the updater: filesystem moves, platform naming and
//! retry schedules.

pub mod backoff;
pub mod fs;
pub mod platform;
