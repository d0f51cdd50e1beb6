//! Remote conversion service contract.
//!
//! The server owns geometry parsing, feature extraction and artifact
//! synthesis. The client only sees the HTTP+JSON surface described here.

use crate::session::{GenerationResult, HistoryRecord, SessionDetail, UploadResponse};
use async_trait::async_trait;
use thiserror::Error;

pub mod http;

#[cfg(test)]
pub mod fake;

pub use http::HttpConversionService;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never produced a response (connection refused, reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("Server responded with status {status}")]
    Status { status: u16 },

    /// The response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local file access failed before the request could be sent.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Uploads a mesh and returns the issued session id with its analysis.
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> ServiceResult<UploadResponse>;

    async fn generate(&self, session_id: &str) -> ServiceResult<GenerationResult>;

    async fn history(&self) -> ServiceResult<Vec<HistoryRecord>>;

    async fn session_detail(&self, session_id: &str) -> ServiceResult<SessionDetail>;

    /// Fetches artifact bytes. `locator` is either a server-relative path
    /// (`/api/download/abc123`) or an absolute URL.
    async fn download(&self, locator: &str) -> ServiceResult<Vec<u8>>;
}

pub fn download_path(session_id: &str) -> String {
    format!("/api/download/{session_id}")
}
