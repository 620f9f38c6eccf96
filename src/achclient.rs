//! Upstream ACH Service Client
//!
//! Pending transfers and micro-deposits reference fully-built ACH files held
//! by the upstream ACH service; the merger materializes them through this
//! client before folding their batches into a mergable file.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AchClientError {
    #[error("ACH service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ACH service returned {status} for file {file_id}")]
    Status { status: u16, file_id: String },
}

/// Source of built ACH file contents, addressed by file ID.
#[async_trait]
pub trait AchFileSource: Send + Sync {
    async fn get_file_contents(&self, file_id: &str) -> Result<String, AchClientError>;
}

/// HTTP client for the ACH service's `GET /files/{id}/contents` endpoint.
pub struct AchServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl AchServiceClient {
    pub fn new(base_url: &str) -> Result<Self, AchClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AchFileSource for AchServiceClient {
    async fn get_file_contents(&self, file_id: &str) -> Result<String, AchClientError> {
        let url = format!("{}/files/{}/contents", self.base_url, file_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AchClientError::Status {
                status: response.status().as_u16(),
                file_id: file_id.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;

    /// Returns the same canned file contents for every file ID.
    pub struct MockAchFileSource {
        pub contents: String,
    }

    impl MockAchFileSource {
        pub fn new(contents: String) -> Self {
            Self { contents }
        }
    }

    #[async_trait]
    impl AchFileSource for MockAchFileSource {
        async fn get_file_contents(&self, _file_id: &str) -> Result<String, AchClientError> {
            Ok(self.contents.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = AchServiceClient::new("http://ach.service:8080/").unwrap();
        assert_eq!(client.base_url, "http://ach.service:8080");
    }
}
