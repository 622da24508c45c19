pub mod error;
pub mod links;
pub mod rag_query;
pub mod semantic_search;
pub mod snippet;

pub use error::RetrievalError;
pub use rag_query::{rag_query, LinkedDoc, RagAnswer, RagSource};
pub use semantic_search::{semantic_search, SearchHit};
