pub mod job;
pub mod outcome;
pub mod ports;

pub use job::RefreshJob;
pub use outcome::{aggregate, JobResult, RefreshOutcome, RefreshTally};
pub use ports::{DisplaySignal, TargetStore, UpdateSettingsProvider, WeatherSource};

#[cfg(test)]
pub(crate) mod testing;
