//! Runs the refresh job in the background: periodic cadence, delayed
//! one-time runs, retry with exponential backoff, constraint gating.

pub mod backoff;
pub mod conditions;
pub mod controller;
mod loop_worker;

pub use backoff::{backoff_delay, MAX_BACKOFF, MIN_BACKOFF};
pub use conditions::DeviceMonitor;
pub use controller::{RefreshScheduler, DEFAULT_ONE_TIME_DELAY};
pub use loop_worker::{RunKind, RunReport};
