pub mod drainer;
pub mod health;
pub mod queue;

pub use drainer::{DrainOutcome, Drainer};
pub use health::HealthService;
pub use queue::{DeferredEntry, DeferredQueue, OverflowPolicy};
