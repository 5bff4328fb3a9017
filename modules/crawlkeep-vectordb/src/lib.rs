use async_trait::async_trait;
use crawlkeep_common::CollaboratorError;
use serde_json::{json, Value};

/// The external vector database contract. `upload_documents` is expected
/// to be idempotent on `url` — the only reason this pipeline can re-upload
/// an unacknowledged batch safely.
#[async_trait]
pub trait VectorDb: Send + Sync {
    async fn upload_documents(&self, documents: Vec<Value>) -> Result<usize, CollaboratorError>;
    async fn delete_documents_by_urls(&self, site: &str, urls: &[String]) -> Result<(), CollaboratorError>;
    async fn delete_documents_by_site(&self, site: &str) -> Result<(), CollaboratorError>;
}

/// Transform a stored embedding record into the DB's document shape.
pub fn to_document(embedding_record: &Value, site: &str) -> Value {
    let key = embedding_record
        .get("key")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut metadata = embedding_record
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    metadata.insert("site".to_string(), json!(site));

    let schema_json = embedding_record
        .get("schema_json")
        .cloned()
        .unwrap_or_else(|| Value::Object(metadata.clone()));

    json!({
        "url": key,
        "embedding": embedding_record.get("embedding").cloned().unwrap_or(Value::Null),
        "timestamp": embedding_record.get("timestamp").cloned().unwrap_or(Value::Null),
        "site": site,
        "metadata": Value::Object(metadata),
        "schema_json": schema_json,
    })
}

/// HTTP-backed vector database client.
pub struct HttpVectorDb {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpVectorDb {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl VectorDb for HttpVectorDb {
    async fn upload_documents(&self, documents: Vec<Value>) -> Result<usize, CollaboratorError> {
        let count = documents.len();
        let resp = self
            .client
            .post(self.url("documents"))
            .bearer_auth(&self.api_key)
            .json(&json!({"documents": documents}))
            .send()
            .await
            .map_err(|e| CollaboratorError::VectorDb(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::VectorDb(format!(
                "upload_documents returned {}",
                resp.status()
            )));
        }
        Ok(count)
    }

    async fn delete_documents_by_urls(&self, site: &str, urls: &[String]) -> Result<(), CollaboratorError> {
        if urls.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.url("documents/delete"))
            .bearer_auth(&self.api_key)
            .json(&json!({"site": site, "urls": urls}))
            .send()
            .await
            .map_err(|e| CollaboratorError::VectorDb(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::VectorDb(format!(
                "delete_documents_by_urls returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_documents_by_site(&self, site: &str) -> Result<(), CollaboratorError> {
        let resp = self
            .client
            .post(self.url("documents/delete_by_site"))
            .bearer_auth(&self.api_key)
            .json(&json!({"site": site}))
            .send()
            .await
            .map_err(|e| CollaboratorError::VectorDb(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::VectorDb(format!(
                "delete_documents_by_site returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// In-memory vector database for tests and for running the pipeline
/// without a configured external store.
pub struct NoopVectorDb;

#[async_trait]
impl VectorDb for NoopVectorDb {
    async fn upload_documents(&self, documents: Vec<Value>) -> Result<usize, CollaboratorError> {
        Ok(documents.len())
    }

    async fn delete_documents_by_urls(&self, _site: &str, _urls: &[String]) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn delete_documents_by_site(&self, _site: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
