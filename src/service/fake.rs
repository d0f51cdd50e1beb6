use super::{ConversionService, ServiceError, ServiceResult};
use crate::session::{GenerationResult, HistoryRecord, SessionDetail, UploadResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted service for tests. Each operation returns a canned result after
/// an optional delay and counts how often it was called.
pub struct FakeService {
    pub upload: Mutex<ServiceResult<UploadResponse>>,
    pub generate: Mutex<ServiceResult<GenerationResult>>,
    pub generate_delay: Duration,
    pub history: Mutex<ServiceResult<Vec<HistoryRecord>>>,
    pub detail: Mutex<ServiceResult<SessionDetail>>,
    pub download: Mutex<ServiceResult<Vec<u8>>>,
    pub generate_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

fn unset<T>() -> ServiceResult<T> {
    Err(ServiceError::Status { status: 501 })
}

impl Default for FakeService {
    fn default() -> Self {
        Self {
            upload: Mutex::new(unset()),
            generate: Mutex::new(unset()),
            generate_delay: Duration::ZERO,
            history: Mutex::new(Ok(Vec::new())),
            detail: Mutex::new(unset()),
            download: Mutex::new(unset()),
            generate_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeService {
    pub fn with_generate(result: ServiceResult<GenerationResult>, delay: Duration) -> Self {
        Self {
            generate: Mutex::new(result),
            generate_delay: delay,
            ..Self::default()
        }
    }

    fn scripted<T: Clone>(slot: &Mutex<ServiceResult<T>>) -> ServiceResult<T> {
        match slot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ConversionService for FakeService {
    async fn upload(&self, _file_name: &str, _bytes: Vec<u8>) -> ServiceResult<UploadResponse> {
        Self::scripted(&self.upload)
    }

    async fn generate(&self, _session_id: &str) -> ServiceResult<GenerationResult> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.generate_delay.is_zero() {
            tokio::time::sleep(self.generate_delay).await;
        }
        Self::scripted(&self.generate)
    }

    async fn history(&self) -> ServiceResult<Vec<HistoryRecord>> {
        Self::scripted(&self.history)
    }

    async fn session_detail(&self, _session_id: &str) -> ServiceResult<SessionDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Self::scripted(&self.detail)
    }

    async fn download(&self, _locator: &str) -> ServiceResult<Vec<u8>> {
        Self::scripted(&self.download)
    }
}
