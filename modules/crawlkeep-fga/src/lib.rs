use async_trait::async_trait;
use crawlkeep_common::CollaboratorError;
use serde_json::json;

/// The fine-grained authorization contract. Failures here are always
/// best-effort from the caller's perspective — see the database stage,
/// which logs FGA errors but never lets them block marking keys
/// processed.
#[async_trait]
pub trait Fga: Send + Sync {
    async fn add_doc_permissions(&self, user: &str, urls: &[String], site: &str) -> Result<(), CollaboratorError>;
    async fn delete_urls(&self, site: &str, urls: &[String]) -> Result<(), CollaboratorError>;
    async fn delete_site(&self, site: &str) -> Result<(), CollaboratorError>;
}

/// HTTP-backed FGA client.
pub struct HttpFga {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpFga {
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
impl Fga for HttpFga {
    async fn add_doc_permissions(&self, user: &str, urls: &[String], site: &str) -> Result<(), CollaboratorError> {
        if urls.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.url("permissions"))
            .bearer_auth(&self.api_key)
            .json(&json!({"user": user, "urls": urls, "site": site}))
            .send()
            .await
            .map_err(|e| CollaboratorError::Fga(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Fga(format!("add_doc_permissions returned {}", resp.status())));
        }
        Ok(())
    }

    async fn delete_urls(&self, site: &str, urls: &[String]) -> Result<(), CollaboratorError> {
        if urls.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.url("permissions/delete"))
            .bearer_auth(&self.api_key)
            .json(&json!({"site": site, "urls": urls}))
            .send()
            .await
            .map_err(|e| CollaboratorError::Fga(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Fga(format!("delete_urls returned {}", resp.status())));
        }
        Ok(())
    }

    async fn delete_site(&self, site: &str) -> Result<(), CollaboratorError> {
        let resp = self
            .client
            .post(self.url("permissions/delete_site"))
            .bearer_auth(&self.api_key)
            .json(&json!({"site": site}))
            .send()
            .await
            .map_err(|e| CollaboratorError::Fga(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Fga(format!("delete_site returned {}", resp.status())));
        }
        Ok(())
    }
}

/// No-op FGA client for tests and for running without an authorization
/// backend configured.
pub struct NoopFga;

#[async_trait]
impl Fga for NoopFga {
    async fn add_doc_permissions(&self, _user: &str, _urls: &[String], _site: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn delete_urls(&self, _site: &str, _urls: &[String]) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn delete_site(&self, _site: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_fga_is_always_ok() {
        let fga = NoopFga;
        assert!(fga.add_doc_permissions("*", &["https://x/a".into()], "site").await.is_ok());
        assert!(fga.delete_urls("site", &["https://x/a".into()]).await.is_ok());
        assert!(fga.delete_site("site").await.is_ok());
    }
}
