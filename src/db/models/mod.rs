pub mod target;

pub use target::{Target, TargetId, DATA_MAX_AGE_MINUTES};
