pub mod error;
pub mod pipeline;
pub mod reconciliation;

pub use error::PipelineError;
pub use pipeline::{index_file, rename_file, PipelineOutcome, RenameOutcome};
pub use reconciliation::{reconcile, ReconcilePhase, ReconciliationReport};
