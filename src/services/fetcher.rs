//! Fetching source document bytes from blob storage.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::FetchError;

/// Capability to resolve a source URL into raw document bytes.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP fetcher for presigned blob-store URLs.
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::ConnectionError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(source_url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::RequestError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(FetchError::RequestError)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/lecture.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.5 fake".to_vec()))
            .mount(&server)
            .await;

        let fetcher = HttpSourceFetcher::new(5).unwrap();
        let bytes = fetcher
            .fetch(&format!("{}/docs/lecture.pdf", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.5 fake");
    }

    #[tokio::test]
    async fn test_non_2xx_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such key"))
            .mount(&server)
            .await;

        let fetcher = HttpSourceFetcher::new(5).unwrap();
        let err = fetcher
            .fetch(&format!("{}/docs/missing.pdf", server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
