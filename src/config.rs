//! Configuration loading and validation.

pub mod lifecycle;
pub mod logging;
pub mod settings;

pub use lifecycle::LifecycleConfig;
pub use logging::LoggingConfig;
pub use settings::Config;
