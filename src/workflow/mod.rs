//! Workflow controller: the single owner of screen and session state.
//!
//! Every transition goes through [`WorkflowController::handle`], which maps
//! `(state, event)` to a new state plus the effects the caller must run.
//! Effects are remote calls, driver lifecycle and notifications; the
//! controller itself never performs I/O.

pub mod history;
pub mod progress;

use crate::event::AppEvent;
use crate::service::download_path;
use crate::session::store::DEFAULT_ARTIFACT_NAME;
use crate::session::{AnalysisResult, GenerationResult};
use history::HistoryCache;
use progress::{ProgressEvent, ProgressState};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Upload,
    Progress,
    Result,
    Explanation,
    History,
}

impl Screen {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Progress => "progress",
            Self::Result => "result",
            Self::Explanation => "explanation",
            Self::History => "history",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    fn new(level: NotificationLevel, title: &str, description: Option<String>) -> Self {
        Self {
            level,
            title: title.to_string(),
            description,
        }
    }

    pub fn success(title: &str, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, Some(description.into()))
    }

    pub fn warning(title: &str, description: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, Some(description.into()))
    }

    pub fn error(title: &str) -> Self {
        Self::new(NotificationLevel::Error, title, None)
    }
}

/// User intents emitted by the screens.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    FileChosen { path: PathBuf },
    RequestGeneration,
    ViewResults,
    ViewExplanation,
    BackToResult,
    ViewHistory,
    ViewHistoryDetails { record_id: String },
    ReturnHome,
    DownloadResult,
    DownloadRecord { record_id: String },
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    Intent(Intent),
    Remote(AppEvent),
}

impl From<Intent> for WorkflowEvent {
    fn from(intent: Intent) -> Self {
        Self::Intent(intent)
    }
}

impl From<AppEvent> for WorkflowEvent {
    fn from(event: AppEvent) -> Self {
        Self::Remote(event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Upload { ticket: u64, path: PathBuf },
    StartGeneration { session_id: String, ticket: u64 },
    StopGeneration { ticket: u64 },
    FetchHistory { ticket: u64 },
    FetchSessionDetail { record_id: String },
    Download { locator: String, file_name: String },
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub ticket: u64,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadState {
    pub pending: Option<PendingUpload>,
    /// Name of the file whose analysis is currently held.
    pub file_name: Option<String>,
}

impl UploadState {
    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub screen: Screen,
    pub session: Option<String>,
    pub analysis: Option<AnalysisResult>,
    pub generation: Option<GenerationResult>,
    pub upload: UploadState,
    pub progress: Option<ProgressState>,
    pub pending_lookup: Option<String>,
    pub history: HistoryCache,
    generation_started: bool,
}

impl WorkflowState {
    pub fn can_request_generation(&self) -> bool {
        self.screen == Screen::Upload
            && self.session.is_some()
            && !self.generation_started
            && !self.upload.in_flight()
    }
}

#[derive(Debug, Default)]
pub struct WorkflowController {
    state: WorkflowState,
    next_ticket: u64,
}

impl WorkflowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Effects to run once at startup.
    pub fn bootstrap(&mut self) -> Vec<Effect> {
        vec![self.fetch_history()]
    }

    pub fn handle(&mut self, event: impl Into<WorkflowEvent>) -> Vec<Effect> {
        match event.into() {
            WorkflowEvent::Intent(intent) => self.handle_intent(intent),
            WorkflowEvent::Remote(event) => self.handle_remote(event),
        }
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn fetch_history(&mut self) -> Effect {
        let ticket = self.issue_ticket();
        self.state.history.begin_fetch(ticket);
        Effect::FetchHistory { ticket }
    }

    fn reject(&self, intent: &Intent) -> Vec<Effect> {
        tracing::debug!(screen = self.state.screen.as_str(), ?intent, "intent rejected");
        Vec::new()
    }

    fn handle_intent(&mut self, intent: Intent) -> Vec<Effect> {
        match intent {
            Intent::FileChosen { path } => {
                if self.state.screen != Screen::Upload || self.state.upload.in_flight() {
                    return self.reject(&Intent::FileChosen { path });
                }
                let ticket = self.issue_ticket();
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string_lossy().to_string());
                self.state.upload.pending = Some(PendingUpload { ticket, file_name });
                vec![Effect::Upload { ticket, path }]
            }
            Intent::RequestGeneration => {
                if !self.state.can_request_generation() {
                    return self.reject(&Intent::RequestGeneration);
                }
                let Some(session_id) = self.state.session.clone() else {
                    return Vec::new();
                };
                let ticket = self.issue_ticket();
                self.state.generation_started = true;
                self.state.progress = Some(ProgressState::new(ticket));
                self.state.screen = Screen::Progress;
                vec![Effect::StartGeneration { session_id, ticket }]
            }
            Intent::ViewResults => self.complete_generation(),
            Intent::ViewExplanation => {
                if self.state.screen != Screen::Result || self.state.generation.is_none() {
                    return self.reject(&Intent::ViewExplanation);
                }
                self.state.screen = Screen::Explanation;
                Vec::new()
            }
            Intent::BackToResult => {
                if self.state.screen != Screen::Explanation || self.state.generation.is_none() {
                    return self.reject(&Intent::BackToResult);
                }
                self.state.screen = Screen::Result;
                Vec::new()
            }
            Intent::ViewHistory => {
                let mut effects = self.tear_down_progress();
                self.state.pending_lookup = None;
                self.state.screen = Screen::History;
                effects.push(self.fetch_history());
                effects
            }
            Intent::ViewHistoryDetails { record_id } => {
                if self.state.screen != Screen::History || self.state.pending_lookup.is_some() {
                    return self.reject(&Intent::ViewHistoryDetails { record_id });
                }
                self.state.pending_lookup = Some(record_id.clone());
                vec![Effect::FetchSessionDetail { record_id }]
            }
            Intent::ReturnHome => self.return_home(),
            Intent::DownloadResult => {
                let screen = self.state.screen;
                match &self.state.generation {
                    Some(generation)
                        if matches!(screen, Screen::Result | Screen::Explanation)
                            && !generation.download_url.is_empty() =>
                    {
                        vec![Effect::Download {
                            locator: generation.download_url.clone(),
                            file_name: DEFAULT_ARTIFACT_NAME.to_string(),
                        }]
                    }
                    _ => self.reject(&Intent::DownloadResult),
                }
            }
            Intent::DownloadRecord { record_id } => {
                if self.state.screen != Screen::History {
                    return self.reject(&Intent::DownloadRecord { record_id });
                }
                let file_name = self
                    .state
                    .history
                    .find(&record_id)
                    .map(|record| record.artifact_file_name())
                    .unwrap_or_else(|| DEFAULT_ARTIFACT_NAME.to_string());
                vec![Effect::Download {
                    locator: download_path(&record_id),
                    file_name,
                }]
            }
        }
    }

    fn handle_remote(&mut self, event: AppEvent) -> Vec<Effect> {
        match event {
            AppEvent::UploadSucceeded {
                ticket,
                file_name,
                response,
            } => {
                if !self.is_pending_upload(ticket) {
                    tracing::debug!(ticket, "discarding stale upload response");
                    return Vec::new();
                }
                tracing::info!(session_id = %response.session_id, %file_name, "analysis received");
                self.state.upload.pending = None;
                self.state.upload.file_name = Some(file_name);
                self.state.session = Some(response.session_id);
                self.state.analysis = Some(response.analysis);
                self.state.generation = None;
                self.state.generation_started = false;
                Vec::new()
            }
            AppEvent::UploadFailed { ticket, message } => {
                if !self.is_pending_upload(ticket) {
                    tracing::debug!(ticket, "discarding stale upload failure");
                    return Vec::new();
                }
                tracing::warn!("upload failed: {message}");
                self.state.upload.pending = None;
                vec![Effect::Notify(Notification::error("Error uploading file"))]
            }
            AppEvent::Progress(event) => {
                self.apply_progress(event);
                Vec::new()
            }
            AppEvent::HistoryLoaded { ticket, records } => {
                self.state.history.replace(ticket, records);
                Vec::new()
            }
            AppEvent::HistoryFailed { ticket, message } => {
                self.state.history.fetch_failed(ticket, &message);
                Vec::new()
            }
            AppEvent::DetailsLoaded { record_id, detail } => {
                if !self.is_pending_lookup(&record_id) {
                    tracing::debug!(%record_id, "discarding stale session detail");
                    return Vec::new();
                }
                self.state.pending_lookup = None;
                self.state.session = Some(record_id);
                self.state.analysis = Some(detail.analysis);
                self.state.generation = Some(detail.generation);
                self.state.generation_started = true;
                self.state.upload = UploadState::default();
                self.state.screen = Screen::Result;
                Vec::new()
            }
            AppEvent::DetailsFailed { record_id, message } => {
                if !self.is_pending_lookup(&record_id) {
                    tracing::debug!(%record_id, "discarding stale session detail failure");
                    return Vec::new();
                }
                tracing::warn!(%record_id, "session lookup failed: {message}");
                self.state.pending_lookup = None;
                vec![Effect::Notify(Notification::error(
                    "Could not load details for this session.",
                ))]
            }
            AppEvent::DownloadSaved { path } => vec![Effect::Notify(Notification::success(
                "Download complete",
                format!("Saved to {}", path.display()),
            ))],
            AppEvent::DownloadFailed { message } => {
                tracing::warn!("download failed: {message}");
                vec![Effect::Notify(Notification::error("Download failed"))]
            }
        }
    }

    fn is_pending_upload(&self, ticket: u64) -> bool {
        self.state.screen == Screen::Upload
            && self
                .state
                .upload
                .pending
                .as_ref()
                .is_some_and(|pending| pending.ticket == ticket)
    }

    fn is_pending_lookup(&self, record_id: &str) -> bool {
        self.state.screen == Screen::History
            && self.state.pending_lookup.as_deref() == Some(record_id)
    }

    fn apply_progress(&mut self, event: ProgressEvent) {
        match self.state.progress.as_mut() {
            Some(progress)
                if self.state.screen == Screen::Progress && progress.ticket() == event.ticket() =>
            {
                progress.apply(event);
            }
            _ => tracing::debug!(ticket = event.ticket(), "discarding stale progress event"),
        }
    }

    fn complete_generation(&mut self) -> Vec<Effect> {
        let ready = self.state.screen == Screen::Progress
            && self
                .state
                .progress
                .as_ref()
                .is_some_and(ProgressState::is_ready);
        if !ready {
            return self.reject(&Intent::ViewResults);
        }
        let Some(progress) = self.state.progress.take() else {
            return Vec::new();
        };
        let ticket = progress.ticket();
        let Some(result) = progress.into_result() else {
            return Vec::new();
        };

        let notification = if result.status.is_fallback() {
            Notification::warning(
                "Fallback strategy used",
                "Switched to a fallback extraction strategy.",
            )
        } else {
            Notification::success(
                "Conversion complete",
                "Conversion completed using AI strategy.",
            )
        };

        self.state.generation = Some(result);
        self.state.screen = Screen::Result;
        vec![Effect::StopGeneration { ticket }, Effect::Notify(notification)]
    }

    fn tear_down_progress(&mut self) -> Vec<Effect> {
        match self.state.progress.take() {
            Some(progress) => {
                tracing::info!(ticket = progress.ticket(), "leaving progress screen");
                vec![Effect::StopGeneration {
                    ticket: progress.ticket(),
                }]
            }
            None => Vec::new(),
        }
    }

    fn return_home(&mut self) -> Vec<Effect> {
        let effects = self.tear_down_progress();
        let history = std::mem::take(&mut self.state.history);
        self.state = WorkflowState {
            history,
            ..WorkflowState::default()
        };
        effects
    }
}
