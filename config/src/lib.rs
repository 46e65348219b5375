//! Configuration model and live reload: the YAML schema, its validation, the reload-equality
//! check, and the `notify`-based file watch that drives it.

mod error;
mod model;
mod watch;

pub use error::ConfigError;
pub use model::{Config, SegmentConfig, DEFAULT_ADDRESS, DEFAULT_PORT};
pub use watch::{watch, ConfigWatcher};
