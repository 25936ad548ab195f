//! Timing Module
//!
//! Wall-clock measurement of code regions.
//!
//! # Components
//!
//! - [`Timer`]: one named, versioned interval plus notes
//! - [`Clock`]: timestamp source shared by timers and samplers

pub mod clock;
pub mod timer;

pub use clock::{wall_clock_ns, Clock, SteppingClock, SystemClock};
pub use timer::{Timer, TimerError, TimerRecord};
