pub mod lifecycle;

pub use lifecycle::{DisplayState, LocationChoice, WidgetLifecycle, ENABLED_CATCH_UP_DELAY};
