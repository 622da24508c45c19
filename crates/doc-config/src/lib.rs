pub mod config;
pub mod error;
pub mod watch;

pub use config::EngineConfig;
pub use error::ConfigError;
pub use watch::{watch_config, ConfigStore};
