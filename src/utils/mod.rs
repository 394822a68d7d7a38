pub mod config;
pub mod errors;

pub use config::{EntityConfig, LoggingConfig, ResolvedEntity, TapConfig};
pub use errors::{ErrorClass, Result, TapError};
