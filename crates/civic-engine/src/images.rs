//! Image store clients: HTTP delete endpoint, log-only fallback, and a test recorder.

use civic_types::{ImageStore, ImageStoreError};

/// Image store reached over HTTP: `DELETE {base_url}/{handle}`.
pub struct HttpImageStore {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpImageStore {
    pub fn new(base_url: String, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    /// `CIVIC_IMAGE_STORE_URL` / `CIVIC_IMAGE_STORE_TOKEN`; `None` when no URL is set.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("CIVIC_IMAGE_STORE_URL").ok()?;
        let token = std::env::var("CIVIC_IMAGE_STORE_TOKEN").ok();
        Some(Self::new(url, token))
    }
}

#[async_trait::async_trait]
impl ImageStore for HttpImageStore {
    async fn delete(&self, handle: &str) -> Result<(), ImageStoreError> {
        let url = format!("{}/{}", self.base_url, handle);
        let mut req = self.client.delete(&url);
        if let Some(ref token) = self.api_token {
            req = req.bearer_auth(token);
        }
        let res = req
            .send()
            .await
            .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        let status = res.status();
        // Already gone counts as released.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        Err(ImageStoreError::Other(format!(
            "image delete failed {}: {}",
            status, body
        )))
    }
}

/// Used when no image store is configured; releases are only logged.
#[derive(Debug, Default)]
pub struct LoggingImageStore;

#[async_trait::async_trait]
impl ImageStore for LoggingImageStore {
    async fn delete(&self, handle: &str) -> Result<(), ImageStoreError> {
        tracing::info!(handle = %handle, "image release requested (no image store configured)");
        Ok(())
    }
}

/// Remembers deleted handles; for tests.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct RecordingImageStore {
    deleted: std::sync::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait::async_trait]
impl ImageStore for RecordingImageStore {
    async fn delete(&self, handle: &str) -> Result<(), ImageStoreError> {
        self.deleted
            .lock()
            .map_err(|e| ImageStoreError::Other(e.to_string()))?
            .push(handle.to_string());
        Ok(())
    }
}
