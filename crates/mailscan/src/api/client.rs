use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;

use super::types::{
    ProcessRequest, ProcessResponse, UpdatePackageRequest, UpdatePackageResponse, UploadRequest,
    UploadResponse,
};

/// Maximum length of an error body echoed into an `ApiError`, to keep scan
/// payloads and stack traces out of logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn truncate_error_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    // Never split a multi-byte character.
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

/// The backend as consumed by the pipeline. Implemented over HTTP in
/// production; tests substitute fakes.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// `POST /mail-scan-upload`
    async fn upload_scan(&self, request: &UploadRequest) -> Result<UploadResponse, ApiError>;

    /// `POST /mail-package/{id}/process`
    async fn process_package(
        &self,
        package_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProcessResponse, ApiError>;

    /// `PUT /mail-package/{id}`
    async fn update_package(
        &self,
        package_id: &str,
        request: &UpdatePackageRequest,
    ) -> Result<UpdatePackageResponse, ApiError>;
}

/// reqwest-backed implementation against the configured backend base URL.
pub struct HttpBackendClient {
    client: Client,
    base_url: String,
}

impl HttpBackendClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Transport {
                endpoint: base_url.to_string(),
                source: e,
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        self.send_json(reqwest::Method::POST, path, body).await
    }

    async fn put_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        self.send_json(reqwest::Method::PUT, path, body).await
    }

    async fn send_json<B: Serialize, R: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "backend request");

        let response = self
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                endpoint: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: truncate_error_body(&body),
            });
        }

        response.json::<R>().await.map_err(|e| ApiError::Decode {
            endpoint: path.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn upload_scan(&self, request: &UploadRequest) -> Result<UploadResponse, ApiError> {
        self.post_json("/mail-scan-upload", request).await
    }

    async fn process_package(
        &self,
        package_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProcessResponse, ApiError> {
        self.post_json(&format!("/mail-package/{}/process", package_id), request)
            .await
    }

    async fn update_package(
        &self,
        package_id: &str,
        request: &UpdatePackageRequest,
    ) -> Result<UpdatePackageResponse, ApiError> {
        self.put_json(&format!("/mail-package/{}", package_id), request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_body_short_passthrough() {
        assert_eq!(truncate_error_body("oops"), "oops");
    }

    #[test]
    fn test_truncate_error_body_long() {
        let long = "x".repeat(500);
        let truncated = truncate_error_body(&long);
        assert!(truncated.len() < 250);
        assert!(truncated.ends_with("(truncated)"));
    }

    #[test]
    fn test_truncate_error_body_multibyte_boundary() {
        // 300 bytes of three-byte characters: the cut lands mid-character.
        let body = "€".repeat(100);
        let truncated = truncate_error_body(&body);
        assert!(truncated.ends_with("(truncated)"));
        assert_eq!(truncated.matches('€').count(), 66);
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client =
            HttpBackendClient::new("https://backend.example/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "https://backend.example");
    }
}
