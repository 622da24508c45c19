pub mod error;
mod migrations;
mod sqlite_ext;
pub mod store;
mod vector;

pub use error::StorageError;
pub use store::{DeleteFilter, DocumentStore, SearchFilters};
