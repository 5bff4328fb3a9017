use async_trait::async_trait;
use crawlkeep_common::CollaboratorError;
use serde_json::json;

/// The embedding provider contract: turn descriptor text into a vector.
/// Modeled narrowly on the one operation the pipeline needs — nothing
/// about how the model is hosted or tuned is exposed.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;
}

/// HTTP-backed embedding provider: POSTs `{"input": text}` to
/// `<base_url>/embeddings` and expects `{"embedding": [...]}` back.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpEmbeddingProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn get_embedding(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({"input": text}))
            .send()
            .await
            .map_err(|e| CollaboratorError::Embedding(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CollaboratorError::Embedding(format!(
                "embedding provider returned {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::Embedding(e.to_string()))?;

        body.get("embedding")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|n| n.as_f64()).map(|n| n as f32).collect())
            .ok_or_else(|| CollaboratorError::Embedding("missing embedding field in response".into()))
    }
}

/// No-op provider for tests and for running the pipeline without a
/// configured embedding provider.
pub struct NoopEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NoopEmbeddingProvider {
    async fn get_embedding(&self, _text: &str) -> Result<Vec<f32>, CollaboratorError> {
        Ok(Vec::new())
    }
}
