use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use ollama_rs::Ollama;

use crate::circuit_breaker::CircuitBreaker;
use crate::concurrency::ConcurrencyLimiter;
use crate::error::EmbeddingError;
use crate::retry::{self, IsTransient};

impl IsTransient for EmbeddingError {
    fn is_transient(&self) -> bool {
        EmbeddingError::is_transient(self)
    }
}

/// Talks to the inference sidecar for embeddings and generation, guarded by a
/// concurrency limiter, retry policy, and circuit breaker (§5, §6.5).
pub struct EmbeddingClient {
    ollama: Ollama,
    http: reqwest::Client,
    endpoint: String,
    embedding_model: String,
    generation_model: String,
    expected_dim: usize,
    limiter: ConcurrencyLimiter,
    breaker: CircuitBreaker,
}

impl EmbeddingClient {
    pub fn new(
        endpoint: String,
        embedding_model: String,
        generation_model: String,
        expected_dim: usize,
        concurrency: usize,
    ) -> Self {
        let (host, port) = split_endpoint(&endpoint);
        Self {
            ollama: Ollama::new(host, port),
            http: reqwest::Client::new(),
            endpoint,
            embedding_model,
            generation_model,
            expected_dim,
            limiter: ConcurrencyLimiter::new(concurrency),
            breaker: CircuitBreaker::new(),
        }
    }

    pub fn expected_dim(&self) -> usize {
        self.expected_dim
    }

    /// `GET /api/tags`: used by the health service to detect sidecar
    /// availability without consuming a concurrency permit.
    pub async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.breaker.check()?;
        let _permit = self.limiter.acquire().await?;

        let model = self.embedding_model.clone();
        let text = text.to_string();
        let result = retry::with_backoff(|| {
            let ollama = &self.ollama;
            let model = model.clone();
            let text = text.clone();
            async move {
                let request = GenerateEmbeddingsRequest::new(model, text.into());
                ollama
                    .generate_embeddings(request)
                    .await
                    .map_err(|err| EmbeddingError::RequestFailed {
                        attempts: 1,
                        source: anyhow::anyhow!(err.to_string()),
                    })
            }
        })
        .await;

        match result {
            Ok(response) => {
                self.breaker.record_success();
                let mut vector = response
                    .embeddings
                    .into_iter()
                    .next()
                    .ok_or(EmbeddingError::DegenerateVector)?;
                l2_normalize(&mut vector)?;
                if vector.len() != self.expected_dim {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.expected_dim,
                        got: vector.len(),
                    });
                }
                Ok(vector)
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }

    /// Used by `rag_query` synthesis (§4.8) to turn retrieved context into a
    /// generated answer.
    pub async fn generate(&self, prompt: &str) -> Result<String, EmbeddingError> {
        self.breaker.check()?;
        let _permit = self.limiter.acquire().await?;

        let model = self.generation_model.clone();
        let prompt = prompt.to_string();
        let result = retry::with_backoff(|| {
            let ollama = &self.ollama;
            let model = model.clone();
            let prompt = prompt.clone();
            async move {
                let request = GenerationRequest::new(model, prompt);
                ollama
                    .generate(request)
                    .await
                    .map_err(|err| EmbeddingError::RequestFailed {
                        attempts: 1,
                        source: anyhow::anyhow!(err.to_string()),
                    })
            }
        })
        .await;

        match result {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response.response)
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }
}

fn split_endpoint(endpoint: &str) -> (String, u16) {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => {
            let scheme_host = format!(
                "{}://{}",
                url.scheme(),
                url.host_str().unwrap_or("127.0.0.1")
            );
            (scheme_host, url.port_or_known_default().unwrap_or(11434))
        }
        Err(_) => ("http://127.0.0.1".to_string(), 11434),
    }
}

fn l2_normalize(values: &mut [f32]) -> Result<(), EmbeddingError> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(EmbeddingError::DegenerateVector);
    }
    for value in values {
        *value /= norm;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_endpoint_parses_scheme_host_and_port() {
        let (host, port) = split_endpoint("http://127.0.0.1:11434");
        assert_eq!(host, "http://127.0.0.1");
        assert_eq!(port, 11434);
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut values = vec![3.0, 4.0];
        l2_normalize(&mut values).unwrap();
        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_rejects_zero_vector() {
        let mut values = vec![0.0, 0.0];
        assert!(matches!(l2_normalize(&mut values), Err(EmbeddingError::DegenerateVector)));
    }
}
