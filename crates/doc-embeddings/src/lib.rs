pub mod circuit_breaker;
pub mod client;
pub mod concurrency;
pub mod endpoint;
pub mod error;
pub mod retry;

pub use client::EmbeddingClient;
pub use error::EmbeddingError;
