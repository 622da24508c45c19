mod engine;
mod types;
mod worker;

pub use engine::{start_watch, WatcherHandle};
pub use types::{ChangeEvent, WatchConfig, WatchError};
