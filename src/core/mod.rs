//! Core abstractions shared across syncq.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};
