use doc_embeddings::EmbeddingClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `health_check` hits `GET /api/tags` directly (bypassing the `ollama_rs`
/// client) so the health service can probe sidecar availability without
/// consuming a concurrency permit; exercised here against a mock HTTP server
/// rather than a live Ollama instance.
#[tokio::test]
async fn health_check_is_true_when_sidecar_responds_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(server.uri(), "nomic-embed-text".to_string(), "llama3.1".to_string(), 1024, 2);
    assert!(client.health_check().await);
}

#[tokio::test]
async fn health_check_is_false_when_sidecar_returns_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(server.uri(), "nomic-embed-text".to_string(), "llama3.1".to_string(), 1024, 2);
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn health_check_is_false_when_nothing_is_listening() {
    let client = EmbeddingClient::new(
        "http://127.0.0.1:1".to_string(),
        "nomic-embed-text".to_string(),
        "llama3.1".to_string(),
        1024,
        2,
    );
    assert!(!client.health_check().await);
}
