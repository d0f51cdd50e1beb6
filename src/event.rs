use crate::session::{HistoryRecord, SessionDetail, UploadResponse};
use crate::workflow::progress::ProgressEvent;
use std::path::PathBuf;

/// Completions of background work, delivered to the UI thread.
#[derive(Debug, Clone)]
pub enum AppEvent {
    UploadSucceeded {
        ticket: u64,
        file_name: String,
        response: UploadResponse,
    },
    UploadFailed {
        ticket: u64,
        message: String,
    },
    Progress(ProgressEvent),
    HistoryLoaded {
        ticket: u64,
        records: Vec<HistoryRecord>,
    },
    HistoryFailed {
        ticket: u64,
        message: String,
    },
    DetailsLoaded {
        record_id: String,
        detail: SessionDetail,
    },
    DetailsFailed {
        record_id: String,
        message: String,
    },
    DownloadSaved {
        path: PathBuf,
    },
    DownloadFailed {
        message: String,
    },
}
