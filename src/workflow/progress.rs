//! Step progress for a single generate call.
//!
//! The server answers generation with one atomic response, so the phase
//! indicator is simulated on a fixed cadence while the real call is in
//! flight. The real completion always wins; simulated advancement stops at
//! the penultimate phase.

use crate::event::AppEvent;
use crate::service::ConversionService;
use crate::session::GenerationResult;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const PHASES: [&str; 3] = [
    "Parsing STL",
    "Extracting geometric features",
    "Generating STEP representation",
];
pub const FINAL_PHASE: usize = PHASES.len() - 1;
pub const PENULTIMATE_PHASE: usize = FINAL_PHASE - 1;

pub const GENERATION_FAILED_MESSAGE: &str = "An error occurred during generation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTiming {
    pub cadence: Duration,
    pub settle: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(1000),
            settle: Duration::from_millis(500),
        }
    }
}

/// Messages from a running driver. Each carries the ticket of the progress
/// pass that produced it so late messages can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase { ticket: u64, phase: usize },
    Succeeded { ticket: u64, result: GenerationResult },
    Ready { ticket: u64 },
    Failed { ticket: u64, message: String },
}

impl ProgressEvent {
    pub fn ticket(&self) -> u64 {
        match self {
            Self::Phase { ticket, .. }
            | Self::Succeeded { ticket, .. }
            | Self::Ready { ticket }
            | Self::Failed { ticket, .. } => *ticket,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressOutcome {
    Running,
    /// Response received; the "view results" affordance is not shown yet.
    Settling(GenerationResult),
    Ready(GenerationResult),
    Failed(String),
}

/// View state of the progress screen, owned by the workflow controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    ticket: u64,
    phase: usize,
    outcome: ProgressOutcome,
}

impl ProgressState {
    pub fn new(ticket: u64) -> Self {
        Self {
            ticket,
            phase: 0,
            outcome: ProgressOutcome::Running,
        }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn outcome(&self) -> &ProgressOutcome {
        &self.outcome
    }

    pub fn percent(&self) -> f32 {
        (self.phase + 1) as f32 / PHASES.len() as f32 * 100.0
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.outcome, ProgressOutcome::Ready(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ProgressOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, .. } => {
                if self.outcome == ProgressOutcome::Running
                    && phase > self.phase
                    && phase <= PENULTIMATE_PHASE
                {
                    self.phase = phase;
                }
            }
            ProgressEvent::Succeeded { result, .. } => {
                if self.outcome == ProgressOutcome::Running {
                    self.phase = FINAL_PHASE;
                    self.outcome = ProgressOutcome::Settling(result);
                }
            }
            ProgressEvent::Ready { .. } => {
                if let ProgressOutcome::Settling(result) = &self.outcome {
                    self.outcome = ProgressOutcome::Ready(result.clone());
                }
            }
            ProgressEvent::Failed { message, .. } => {
                if self.outcome == ProgressOutcome::Running {
                    self.outcome = ProgressOutcome::Failed(message);
                }
            }
        }
    }

    pub fn into_result(self) -> Option<GenerationResult> {
        match self.outcome {
            ProgressOutcome::Ready(result) => Some(result),
            _ => None,
        }
    }
}

/// Owns a spawned driver. Dropping the handle cancels the driver.
pub struct ProgressHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ProgressHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub fn spawn_driver(
    runtime_handle: &Handle,
    service: Arc<dyn ConversionService>,
    session_id: String,
    ticket: u64,
    timing: DriverTiming,
    tx: mpsc::Sender<AppEvent>,
) -> ProgressHandle {
    let token = CancellationToken::new();
    let task = runtime_handle.spawn(run_driver(
        service,
        session_id,
        ticket,
        timing,
        tx,
        token.clone(),
    ));
    ProgressHandle { token, task }
}

pub async fn run_driver(
    service: Arc<dyn ConversionService>,
    session_id: String,
    ticket: u64,
    timing: DriverTiming,
    tx: mpsc::Sender<AppEvent>,
    token: CancellationToken,
) {
    let emit = |event: ProgressEvent| {
        let _ = tx.send(AppEvent::Progress(event));
    };

    let generate = service.generate(&session_id);
    tokio::pin!(generate);

    // `interval_at` panics on a zero period.
    let cadence = timing.cadence.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + cadence, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut phase = 0;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(ticket, "progress driver cancelled before completion");
                return;
            }
            outcome = &mut generate => break outcome,
            _ = ticker.tick() => {
                if phase < PENULTIMATE_PHASE {
                    phase += 1;
                    emit(ProgressEvent::Phase { ticket, phase });
                }
            }
        }
    };

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(ticket, %session_id, "generation failed: {err}");
            if !token.is_cancelled() {
                emit(ProgressEvent::Failed {
                    ticket,
                    message: GENERATION_FAILED_MESSAGE.to_string(),
                });
            }
            return;
        }
    };

    tracing::info!(ticket, %session_id, fallback = result.status.is_fallback(), "generation finished");
    emit(ProgressEvent::Succeeded { ticket, result });

    tokio::select! {
        biased;
        _ = token.cancelled() => {}
        _ = time::sleep(timing.settle) => emit(ProgressEvent::Ready { ticket }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fake::FakeService;
    use crate::service::ServiceError;
    use crate::session::GenerationStatus;
    use std::sync::atomic::Ordering;

    fn success() -> GenerationResult {
        GenerationResult {
            download_url: "/api/download/abc123".to_string(),
            explanation: "...".to_string(),
            status: GenerationStatus::Nominal {
                label: Some("Success".to_string()),
            },
        }
    }

    fn drain(rx: &mpsc::Receiver<AppEvent>) -> Vec<ProgressEvent> {
        rx.try_iter()
            .filter_map(|event| match event {
                AppEvent::Progress(progress) => Some(progress),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_phases_stop_before_final_until_response() {
        let service = Arc::new(FakeService::with_generate(
            Ok(success()),
            Duration::from_millis(3500),
        ));
        let (tx, rx) = mpsc::channel();

        run_driver(
            service.clone(),
            "abc123".to_string(),
            7,
            DriverTiming::default(),
            tx,
            CancellationToken::new(),
        )
        .await;

        let events = drain(&rx);
        assert_eq!(
            events,
            vec![
                ProgressEvent::Phase { ticket: 7, phase: 1 },
                ProgressEvent::Succeeded {
                    ticket: 7,
                    result: success()
                },
                ProgressEvent::Ready { ticket: 7 },
            ]
        );
        assert_eq!(service.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_response_skips_straight_to_success() {
        let service = Arc::new(FakeService::with_generate(
            Ok(success()),
            Duration::from_millis(200),
        ));
        let (tx, rx) = mpsc::channel();

        run_driver(
            service,
            "abc123".to_string(),
            1,
            DriverTiming::default(),
            tx,
            CancellationToken::new(),
        )
        .await;

        let events = drain(&rx);
        assert!(matches!(events[0], ProgressEvent::Succeeded { ticket: 1, .. }));
        assert_eq!(events.last(), Some(&ProgressEvent::Ready { ticket: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reports_generic_message_and_never_ready() {
        let service = Arc::new(FakeService::with_generate(
            Err(ServiceError::Transport("connection reset".to_string())),
            Duration::from_millis(1500),
        ));
        let (tx, rx) = mpsc::channel();

        run_driver(
            service,
            "abc123".to_string(),
            3,
            DriverTiming::default(),
            tx,
            CancellationToken::new(),
        )
        .await;

        let events = drain(&rx);
        assert_eq!(
            events,
            vec![
                ProgressEvent::Phase { ticket: 3, phase: 1 },
                ProgressEvent::Failed {
                    ticket: 3,
                    message: GENERATION_FAILED_MESSAGE.to_string()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_driver_discards_late_response() {
        let service = Arc::new(FakeService::with_generate(
            Ok(success()),
            Duration::from_millis(5000),
        ));
        let (tx, rx) = mpsc::channel();
        let token = CancellationToken::new();

        let task = tokio::spawn(run_driver(
            service,
            "abc123".to_string(),
            9,
            DriverTiming::default(),
            tx,
            token.clone(),
        ));

        time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
        time::sleep(Duration::from_millis(10_000)).await;
        task.await.expect("driver task should not panic");

        let events = drain(&rx);
        assert_eq!(events, vec![ProgressEvent::Phase { ticket: 9, phase: 1 }]);
    }

    #[test]
    fn state_ignores_simulated_final_phase_and_late_failures() {
        let mut state = ProgressState::new(4);
        state.apply(ProgressEvent::Phase {
            ticket: 4,
            phase: FINAL_PHASE,
        });
        assert_eq!(state.phase(), 0);

        state.apply(ProgressEvent::Phase { ticket: 4, phase: 1 });
        assert_eq!(state.phase(), 1);

        state.apply(ProgressEvent::Succeeded {
            ticket: 4,
            result: success(),
        });
        assert_eq!(state.phase(), FINAL_PHASE);
        assert!(!state.is_ready());
        assert_eq!(state.percent(), 100.0);

        state.apply(ProgressEvent::Failed {
            ticket: 4,
            message: "late".to_string(),
        });
        assert!(state.error().is_none());

        state.apply(ProgressEvent::Ready { ticket: 4 });
        assert!(state.is_ready());
        assert_eq!(state.into_result(), Some(success()));
    }

    #[test]
    fn ready_without_response_is_ignored() {
        let mut state = ProgressState::new(2);
        state.apply(ProgressEvent::Ready { ticket: 2 });
        assert!(!state.is_ready());
        assert_eq!(state.outcome(), &ProgressOutcome::Running);
    }
}
