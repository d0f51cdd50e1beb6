use super::{ConversionService, ServiceError, ServiceResult};
use crate::session::{GenerationResult, HistoryRecord, SessionDetail, UploadResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

/// `ConversionService` backed by the conversion server's REST API.
#[derive(Clone)]
pub struct HttpConversionService {
    client: Client,
    base_url: String,
}

impl HttpConversionService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolves a download locator returned by the server against the base address.
    pub fn resolve_locator(&self, locator: &str) -> String {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            locator.to_string()
        } else {
            self.endpoint(locator)
        }
    }

    fn check_status(response: Response) -> ServiceResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ServiceError::Status {
                status: status.as_u16(),
            })
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ServiceResult<T> {
        let body = Self::check_status(response)?.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| ServiceError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ConversionService for HttpConversionService {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> ServiceResult<UploadResponse> {
        let url = self.endpoint("/api/upload");
        tracing::info!(%url, file_name, size = bytes.len(), "uploading mesh");

        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let response = self.client.post(&url).multipart(form).send().await?;
        Self::decode(response).await
    }

    async fn generate(&self, session_id: &str) -> ServiceResult<GenerationResult> {
        let url = self.endpoint(&format!("/api/generate/{session_id}"));
        tracing::info!(%url, "requesting generation");

        let response = self.client.post(&url).send().await?;
        Self::decode(response).await
    }

    async fn history(&self) -> ServiceResult<Vec<HistoryRecord>> {
        let url = self.endpoint("/api/history");
        tracing::debug!(%url, "fetching history");

        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn session_detail(&self, session_id: &str) -> ServiceResult<SessionDetail> {
        let url = self.endpoint(&format!("/api/session/{session_id}"));
        tracing::info!(%url, "fetching session detail");

        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn download(&self, locator: &str) -> ServiceResult<Vec<u8>> {
        let url = self.resolve_locator(locator);
        tracing::info!(%url, "downloading artifact");

        let response = self.client.get(&url).send().await?;
        let bytes = Self::check_status(response)?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slashes_are_trimmed() {
        let service = HttpConversionService::new("http://localhost:8000//");
        assert_eq!(service.base_url(), "http://localhost:8000");
        assert_eq!(
            service.endpoint("/api/history"),
            "http://localhost:8000/api/history"
        );
    }

    #[test]
    fn relative_locators_resolve_against_base() {
        let service = HttpConversionService::new("http://localhost:8000");
        assert_eq!(
            service.resolve_locator("/api/download/abc123"),
            "http://localhost:8000/api/download/abc123"
        );
        assert_eq!(
            service.resolve_locator("api/download/abc123"),
            "http://localhost:8000/api/download/abc123"
        );
    }

    #[test]
    fn absolute_locators_are_used_verbatim() {
        let service = HttpConversionService::new("http://localhost:8000");
        assert_eq!(
            service.resolve_locator("https://files.example.com/abc123.step"),
            "https://files.example.com/abc123.step"
        );
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_transport_error() {
        // Port 9 (discard) is closed on loopback in test environments.
        let service = HttpConversionService::new("http://127.0.0.1:9");
        let err = service
            .history()
            .await
            .expect_err("request to a closed port should fail");
        assert!(matches!(err, ServiceError::Transport(_)));
    }
}
