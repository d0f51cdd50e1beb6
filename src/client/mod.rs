use crate::event::AppEvent;
use crate::service::{ConversionService, ServiceError};
use crate::session::store::ArtifactStore;
use crate::workflow::progress::{spawn_driver, DriverTiming, ProgressHandle};
use crate::workflow::Effect;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use tokio::runtime::Handle;

/// Runs workflow effects on the tokio runtime and reports completions as
/// `AppEvent`s. Holds the handles of live progress drivers.
pub struct ConversionClient {
    service: Arc<dyn ConversionService>,
    tx: mpsc::Sender<AppEvent>,
    runtime_handle: Handle,
    timing: DriverTiming,
    store: ArtifactStore,
    drivers: HashMap<u64, ProgressHandle>,
}

impl ConversionClient {
    pub fn new(
        service: Arc<dyn ConversionService>,
        tx: mpsc::Sender<AppEvent>,
        runtime_handle: Handle,
        timing: DriverTiming,
        store: ArtifactStore,
    ) -> Self {
        Self {
            service,
            tx,
            runtime_handle,
            timing,
            store,
            drivers: HashMap::new(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        self.store.dir()
    }

    #[cfg(test)]
    pub fn active_drivers(&self) -> usize {
        self.drivers.len()
    }

    /// Notifications are not the client's concern; callers route them to the UI.
    pub fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Upload { ticket, path } => self.upload(ticket, path),
            Effect::StartGeneration { session_id, ticket } => {
                self.drivers.retain(|_, handle| !handle.is_finished());
                let handle = spawn_driver(
                    &self.runtime_handle,
                    Arc::clone(&self.service),
                    session_id,
                    ticket,
                    self.timing,
                    self.tx.clone(),
                );
                self.drivers.insert(ticket, handle);
            }
            Effect::StopGeneration { ticket } => {
                if let Some(handle) = self.drivers.remove(&ticket) {
                    handle.cancel();
                }
            }
            Effect::FetchHistory { ticket } => self.fetch_history(ticket),
            Effect::FetchSessionDetail { record_id } => self.fetch_session_detail(record_id),
            Effect::Download { locator, file_name } => self.download(locator, file_name),
            Effect::Notify(notification) => {
                tracing::debug!(title = %notification.title, "notification reached the client");
            }
        }
    }

    fn upload(&self, ticket: u64, path: PathBuf) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string());

            let outcome = match tokio::fs::read(&path).await {
                Ok(bytes) => service.upload(&file_name, bytes).await,
                Err(err) => Err(ServiceError::Io(format!(
                    "failed to read {}: {err}",
                    path.display()
                ))),
            };

            let event = match outcome {
                Ok(response) => AppEvent::UploadSucceeded {
                    ticket,
                    file_name,
                    response,
                },
                Err(err) => AppEvent::UploadFailed {
                    ticket,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn fetch_history(&self, ticket: u64) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            let event = match service.history().await {
                Ok(records) => AppEvent::HistoryLoaded { ticket, records },
                Err(err) => AppEvent::HistoryFailed {
                    ticket,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn fetch_session_detail(&self, record_id: String) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            let event = match service.session_detail(&record_id).await {
                Ok(detail) => AppEvent::DetailsLoaded { record_id, detail },
                Err(err) => AppEvent::DetailsFailed {
                    record_id,
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn download(&self, locator: String, file_name: String) {
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let store = self.store.clone();

        self.runtime_handle.spawn(async move {
            let event = match service.download(&locator).await {
                Ok(bytes) => {
                    let saved = tokio::task::spawn_blocking(move || store.save(&file_name, &bytes))
                        .await;
                    match saved {
                        Ok(Ok(path)) => AppEvent::DownloadSaved { path },
                        Ok(Err(err)) => AppEvent::DownloadFailed {
                            message: err.to_string(),
                        },
                        Err(err) => AppEvent::DownloadFailed {
                            message: format!("artifact write task failed: {err}"),
                        },
                    }
                }
                Err(err) => AppEvent::DownloadFailed {
                    message: err.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::FakeService;
    use crate::session::{
        AnalysisResult, GenerationResult, HistoryRecord, RecordStatus, UploadResponse,
    };
    use std::fs;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    const WAIT: Duration = Duration::from_secs(5);

    fn temp_path(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "meshstep_client_{prefix}_{}_{}",
            std::process::id(),
            nanos
        ))
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("test runtime should build")
    }

    fn client(
        runtime: &tokio::runtime::Runtime,
        service: FakeService,
        download_dir: PathBuf,
    ) -> (ConversionClient, mpsc::Receiver<AppEvent>, Arc<FakeService>) {
        let (tx, rx) = mpsc::channel();
        let service = Arc::new(service);
        let client = ConversionClient::new(
            service.clone(),
            tx,
            runtime.handle().clone(),
            DriverTiming {
                cadence: Duration::from_millis(10),
                settle: Duration::from_millis(5),
            },
            ArtifactStore::new(download_dir),
        );
        (client, rx, service)
    }

    #[test]
    fn upload_reads_file_and_reports_analysis() {
        let runtime = runtime();
        let mesh = temp_path("mesh.stl");
        fs::write(&mesh, b"solid part\nendsolid part\n").expect("fixture should write");

        let service = FakeService {
            upload: std::sync::Mutex::new(Ok(UploadResponse {
                session_id: "abc123".to_string(),
                analysis: AnalysisResult::default(),
            })),
            ..FakeService::default()
        };
        let (mut client, rx, _) = client(&runtime, service, temp_path("unused"));

        client.execute(Effect::Upload {
            ticket: 1,
            path: mesh.clone(),
        });

        match rx.recv_timeout(WAIT).expect("upload should report") {
            AppEvent::UploadSucceeded {
                ticket, response, ..
            } => {
                assert_eq!(ticket, 1);
                assert_eq!(response.session_id, "abc123");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let _ = fs::remove_file(mesh);
    }

    #[test]
    fn unreadable_file_reports_upload_failure() {
        let runtime = runtime();
        let (mut client, rx, _) = client(&runtime, FakeService::default(), temp_path("unused"));

        client.execute(Effect::Upload {
            ticket: 2,
            path: temp_path("missing.stl"),
        });

        assert!(matches!(
            rx.recv_timeout(WAIT).expect("upload should report"),
            AppEvent::UploadFailed { ticket: 2, .. }
        ));
    }

    #[test]
    fn history_failure_is_reported_as_event() {
        let runtime = runtime();
        let service = FakeService {
            history: std::sync::Mutex::new(Err(ServiceError::Status { status: 500 })),
            ..FakeService::default()
        };
        let (mut client, rx, _) = client(&runtime, service, temp_path("unused"));

        client.execute(Effect::FetchHistory { ticket: 3 });

        assert!(matches!(
            rx.recv_timeout(WAIT).expect("history should report"),
            AppEvent::HistoryFailed { ticket: 3, .. }
        ));
    }

    #[test]
    fn history_records_are_forwarded() {
        let runtime = runtime();
        let service = FakeService {
            history: std::sync::Mutex::new(Ok(vec![HistoryRecord {
                id: "old-1".to_string(),
                file_name: "bracket.stl".to_string(),
                date: "2026-10-17".to_string(),
                time: "14:05".to_string(),
                status: RecordStatus::Success,
                planar_surfaces: 4,
                cylindrical_features: 1,
                edge_features: 0,
                file_size: "0.2 MB".to_string(),
            }])),
            ..FakeService::default()
        };
        let (mut client, rx, _) = client(&runtime, service, temp_path("unused"));

        client.execute(Effect::FetchHistory { ticket: 4 });

        match rx.recv_timeout(WAIT).expect("history should report") {
            AppEvent::HistoryLoaded { ticket, records } => {
                assert_eq!(ticket, 4);
                assert_eq!(records[0].id, "old-1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn generation_driver_runs_to_ready() {
        let runtime = runtime();
        let service = FakeService::with_generate(
            Ok(GenerationResult::default()),
            Duration::from_millis(30),
        );
        let (mut client, rx, service) = client(&runtime, service, temp_path("unused"));

        client.execute(Effect::StartGeneration {
            session_id: "abc123".to_string(),
            ticket: 5,
        });
        assert_eq!(client.active_drivers(), 1);

        let mut saw_ready = false;
        while let Ok(event) = rx.recv_timeout(WAIT) {
            if let AppEvent::Progress(crate::workflow::progress::ProgressEvent::Ready { ticket }) =
                event
            {
                assert_eq!(ticket, 5);
                saw_ready = true;
                break;
            }
        }
        assert!(saw_ready);
        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 1);

        client.execute(Effect::StopGeneration { ticket: 5 });
        assert_eq!(client.active_drivers(), 0);
    }

    #[test]
    fn failed_detail_lookup_is_reported() {
        let runtime = runtime();
        let service = FakeService {
            detail: std::sync::Mutex::new(Err(ServiceError::Status { status: 404 })),
            ..FakeService::default()
        };
        let (mut client, rx, service) = client(&runtime, service, temp_path("unused"));

        client.execute(Effect::FetchSessionDetail {
            record_id: "old-1".to_string(),
        });

        match rx.recv_timeout(WAIT).expect("lookup should report") {
            AppEvent::DetailsFailed { record_id, message } => {
                assert_eq!(record_id, "old-1");
                assert!(message.contains("404"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(service.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn download_saves_artifact_into_store() {
        let runtime = runtime();
        let dir = temp_path("downloads");
        let service = FakeService {
            download: std::sync::Mutex::new(Ok(b"ISO-10303-21;".to_vec())),
            ..FakeService::default()
        };
        let (mut client, rx, _) = client(&runtime, service, dir.clone());

        client.execute(Effect::Download {
            locator: "/api/download/abc123".to_string(),
            file_name: "converted.step".to_string(),
        });

        match rx.recv_timeout(WAIT).expect("download should report") {
            AppEvent::DownloadSaved { path } => {
                assert_eq!(path, dir.join("converted.step"));
                assert_eq!(fs::read(&path).expect("artifact written"), b"ISO-10303-21;");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let _ = fs::remove_dir_all(dir);
    }
}
