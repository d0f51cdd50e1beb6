use crate::client::ConversionClient;
use crate::config::AppConfig;
use crate::event::AppEvent;
use crate::session::{AnalysisResult, GenerationResult, HistoryRecord};
use crate::theme::Theme;
use crate::workflow::progress::{ProgressOutcome, ProgressState, PHASES};
use crate::workflow::{
    Effect, Intent, Notification, Screen, WorkflowController, WorkflowEvent, WorkflowState,
};
use eframe::egui::{self, RichText, ScrollArea};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

struct Toast {
    notification: Notification,
    shown_at: Instant,
}

pub struct MeshStepApp {
    rx: Receiver<AppEvent>,
    controller: WorkflowController,
    client: ConversionClient,
    theme: Theme,
    theme_applied: bool,
    toasts: Vec<Toast>,
    toast_ttl: Duration,
    diagnostics_log: Vec<String>,
    path_input: String,
    api_base: String,
}

impl MeshStepApp {
    pub fn new(rx: Receiver<AppEvent>, client: ConversionClient, config: &AppConfig) -> Self {
        let mut app = Self {
            rx,
            controller: WorkflowController::new(),
            client,
            theme: Theme::default(),
            theme_applied: false,
            toasts: Vec::new(),
            toast_ttl: config.toast_ttl,
            diagnostics_log: Vec::new(),
            path_input: String::new(),
            api_base: config.api_base.clone(),
        };

        let effects = app.controller.bootstrap();
        app.run_effects(effects);
        app
    }

    fn timestamp() -> String {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs().to_string(),
            Err(_) => "0".to_string(),
        }
    }

    fn log_diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics_log
            .push(format!("[{}] {}", Self::timestamp(), message.into()));
    }

    fn drain_events(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.note_event(&event);
                    self.dispatch(WorkflowEvent::Remote(event));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log_diagnostic("event channel disconnected");
                    break;
                }
            }
        }
    }

    fn note_event(&mut self, event: &AppEvent) {
        match event {
            AppEvent::UploadSucceeded {
                file_name,
                response,
                ..
            } => self.log_diagnostic(format!(
                "analysis received for {file_name} (session {})",
                response.session_id
            )),
            AppEvent::UploadFailed { message, .. } => {
                self.log_diagnostic(format!("upload failed: {message}"));
            }
            AppEvent::HistoryLoaded { records, .. } => {
                self.log_diagnostic(format!("history loaded: {} records", records.len()));
            }
            AppEvent::HistoryFailed { message, .. } => {
                self.log_diagnostic(format!("history fetch failed: {message}"));
            }
            AppEvent::DetailsFailed { record_id, message } => {
                self.log_diagnostic(format!("session lookup {record_id} failed: {message}"));
            }
            AppEvent::DownloadFailed { message } => {
                self.log_diagnostic(format!("download failed: {message}"));
            }
            AppEvent::Progress(_) | AppEvent::DetailsLoaded { .. } | AppEvent::DownloadSaved { .. } => {}
        }
    }

    fn dispatch(&mut self, event: WorkflowEvent) {
        let effects = self.controller.handle(event);
        self.run_effects(effects);
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(notification) => {
                    self.log_diagnostic(format!("notice: {}", notification.title));
                    self.toasts.push(Toast {
                        notification,
                        shown_at: Instant::now(),
                    });
                }
                effect => self.client.execute(effect),
            }
        }
    }

    fn collect_dropped_file(&self, ctx: &egui::Context) -> Option<Intent> {
        let dropped: Option<PathBuf> = ctx.input(|input| {
            input
                .raw
                .dropped_files
                .iter()
                .find_map(|file| file.path.clone())
        });
        dropped.map(|path| Intent::FileChosen { path })
    }

    fn render_top_bar(&self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        let screen = self.controller.state().screen;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("STL to STEP Conversion Assistant");
                ui.separator();
                ui.label(RichText::new(self.api_base.as_str()).color(self.theme.text_muted));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("History").clicked() {
                        intents.push(Intent::ViewHistory);
                    }
                    if screen != Screen::Upload && ui.button("Home").clicked() {
                        intents.push(Intent::ReturnHome);
                    }
                });
            });
        });
    }

    fn render_bottom_panel(&mut self, ctx: &egui::Context) {
        let ttl = self.toast_ttl;
        self.toasts.retain(|toast| toast.shown_at.elapsed() < ttl);

        egui::TopBottomPanel::bottom("notices").show(ctx, |ui| {
            for toast in &self.toasts {
                let level = toast.notification.level;
                self.theme.toast_frame(level).show(ui, |ui| {
                    ui.label(
                        RichText::new(toast.notification.title.as_str())
                            .color(self.theme.notification_color(level))
                            .strong(),
                    );
                    if let Some(description) = &toast.notification.description {
                        ui.label(RichText::new(description.as_str()).color(self.theme.text_muted));
                    }
                });
            }

            egui::CollapsingHeader::new("Diagnostics")
                .default_open(false)
                .show(ui, |ui| {
                    ScrollArea::vertical()
                        .id_salt("diagnostics_log")
                        .max_height(90.0)
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for entry in &self.diagnostics_log {
                                ui.label(entry);
                            }
                        });
                });
        });
    }

    fn render_center_panel(&mut self, ctx: &egui::Context, intents: &mut Vec<Intent>) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical().id_salt("screen").show(ui, |ui| {
                let state = self.controller.state();
                match state.screen {
                    Screen::Upload => {
                        render_upload(ui, &self.theme, state, &mut self.path_input, intents)
                    }
                    Screen::Progress => {
                        if let Some(progress) = &state.progress {
                            render_progress(ui, &self.theme, progress, intents);
                        }
                    }
                    Screen::Result => {
                        if let Some(generation) = &state.generation {
                            render_result(
                                ui,
                                &self.theme,
                                state.analysis.as_ref(),
                                generation,
                                self.client.download_dir().display().to_string(),
                                intents,
                            );
                        }
                    }
                    Screen::Explanation => {
                        if let Some(generation) = &state.generation {
                            render_explanation(ui, &self.theme, generation, intents);
                        }
                    }
                    Screen::History => render_history(ui, &self.theme, state, intents),
                }
            });
        });
    }
}

fn render_analysis_summary(ui: &mut egui::Ui, theme: &Theme, analysis: &AnalysisResult) {
    let stats = &analysis.stats;
    theme.card_frame().show(ui, |ui| {
        ui.heading("STL Analysis Summary");
        egui::Grid::new("analysis_summary")
            .num_columns(2)
            .spacing([theme.spacing_16, theme.spacing_8])
            .show(ui, |ui| {
                let rows = [
                    ("Bounding box", stats.bbox_label()),
                    ("Mesh", stats.watertight_label().to_string()),
                    ("Faces", stats.faces_label()),
                    ("Vertices", stats.vertices_label()),
                    ("Volume", stats.volume_label()),
                    ("Surface area", stats.surface_area_label()),
                    ("Center of mass", stats.center_mass_label()),
                    ("Planar hints", analysis.planar_hints_count.to_string()),
                    (
                        "Cylindrical hints",
                        analysis.cylindrical_hints_count.to_string(),
                    ),
                ];
                for (label, value) in rows {
                    ui.label(RichText::new(label).color(theme.text_muted));
                    ui.label(value);
                    ui.end_row();
                }
            });
    });
}

fn render_upload(
    ui: &mut egui::Ui,
    theme: &Theme,
    state: &WorkflowState,
    path_input: &mut String,
    intents: &mut Vec<Intent>,
) {
    let uploading = state.upload.in_flight();

    theme.card_frame().show(ui, |ui| {
        ui.heading("Upload STL File");
        ui.add_space(theme.spacing_8);
        ui.horizontal(|ui| {
            ui.add_enabled(
                !uploading,
                egui::TextEdit::singleline(path_input)
                    .desired_width(420.0)
                    .hint_text("Path to an .stl file, or drop one onto the window"),
            );
            let ready = !uploading && !path_input.trim().is_empty();
            if ui.add_enabled(ready, egui::Button::new("Upload")).clicked() {
                intents.push(Intent::FileChosen {
                    path: PathBuf::from(path_input.trim()),
                });
            }
        });

        if let Some(pending) = &state.upload.pending {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(format!("Uploading & analyzing {}...", pending.file_name));
            });
        } else if let Some(file_name) = &state.upload.file_name {
            ui.label(RichText::new(format!("✓ {file_name}")).color(theme.success));
        }
    });

    if let Some(analysis) = &state.analysis {
        ui.add_space(theme.spacing_12);
        render_analysis_summary(ui, theme, analysis);
    }

    ui.add_space(theme.spacing_12);
    ui.horizontal(|ui| {
        if ui
            .add_enabled(
                state.can_request_generation(),
                egui::Button::new("Generate STEP"),
            )
            .clicked()
        {
            intents.push(Intent::RequestGeneration);
        }
        if ui.button("View History").clicked() {
            intents.push(Intent::ViewHistory);
        }
    });
}

fn render_progress(
    ui: &mut egui::Ui,
    theme: &Theme,
    progress: &ProgressState,
    intents: &mut Vec<Intent>,
) {
    theme.card_frame().show(ui, |ui| {
        if let Some(message) = progress.error() {
            ui.heading(RichText::new("Generation Failed").color(theme.danger));
            ui.label(message);
            ui.add_space(theme.spacing_12);
            if ui.button("Back to Home").clicked() {
                intents.push(Intent::ReturnHome);
            }
            return;
        }

        let heading = match progress.outcome() {
            ProgressOutcome::Ready(_) => "Generation Complete",
            _ => "Generating STEP Model",
        };
        ui.heading(heading);
        ui.add(
            egui::ProgressBar::new(progress.percent() / 100.0)
                .show_percentage()
                .animate(matches!(progress.outcome(), ProgressOutcome::Running)),
        );
        ui.add_space(theme.spacing_8);

        for (index, phase) in PHASES.iter().enumerate() {
            let (marker, color) = if index < progress.phase() || progress.is_ready() {
                ("✓", theme.success)
            } else if index == progress.phase() {
                ("●", theme.accent_primary)
            } else {
                ("○", theme.text_muted)
            };
            ui.horizontal(|ui| {
                ui.label(RichText::new(marker).color(color));
                ui.label(*phase);
                if index == progress.phase() && !progress.is_ready() {
                    ui.spinner();
                }
            });
        }

        if progress.is_ready() {
            ui.add_space(theme.spacing_12);
            if ui.button("View Results").clicked() {
                intents.push(Intent::ViewResults);
            }
        }
    });
}

fn render_result(
    ui: &mut egui::Ui,
    theme: &Theme,
    analysis: Option<&AnalysisResult>,
    generation: &GenerationResult,
    download_dir: String,
    intents: &mut Vec<Intent>,
) {
    theme.card_frame().show(ui, |ui| {
        ui.heading("Conversion Result");
        if generation.status.is_fallback() {
            ui.label(RichText::new("Fallback extraction strategy").color(theme.warning));
        }
        ui.horizontal(|ui| {
            if ui
                .add_enabled(
                    !generation.download_url.is_empty(),
                    egui::Button::new("Download STEP file"),
                )
                .clicked()
            {
                intents.push(Intent::DownloadResult);
            }
            ui.label(RichText::new(format!("saves into {download_dir}")).color(theme.text_muted));
        });
    });

    if let Some(analysis) = analysis {
        ui.add_space(theme.spacing_12);
        render_analysis_summary(ui, theme, analysis);
    }

    ui.add_space(theme.spacing_12);
    ui.horizontal(|ui| {
        if ui.button("View Explanation").clicked() {
            intents.push(Intent::ViewExplanation);
        }
        if ui.button("Back to Home").clicked() {
            intents.push(Intent::ReturnHome);
        }
    });
}

fn render_explanation(
    ui: &mut egui::Ui,
    theme: &Theme,
    generation: &GenerationResult,
    intents: &mut Vec<Intent>,
) {
    ui.horizontal(|ui| {
        if ui.button("Back to Results").clicked() {
            intents.push(Intent::BackToResult);
        }
        if ui.button("Back to Home").clicked() {
            intents.push(Intent::ReturnHome);
        }
    });
    ui.add_space(theme.spacing_8);
    theme.card_frame().show(ui, |ui| {
        ui.heading("Explanation");
        if generation.explanation.trim().is_empty() {
            ui.label(RichText::new("No explanation available.").color(theme.text_muted));
        } else {
            ui.label(generation.explanation.as_str());
        }
    });
}

fn render_history_record(
    ui: &mut egui::Ui,
    theme: &Theme,
    record: &HistoryRecord,
    lookup_pending: bool,
    intents: &mut Vec<Intent>,
) {
    theme.card_frame().show(ui, |ui| {
        ui.horizontal(|ui| {
            ui.strong(record.file_name.as_str());
            ui.label(
                RichText::new(record.status.as_str()).color(theme.record_status_color(record.status)),
            );
        });
        ui.label(
            RichText::new(format!(
                "{} {} · {} · {} planar · {} cylindrical · {} edges",
                record.date,
                record.time,
                record.file_size,
                record.planar_surfaces,
                record.cylindrical_features,
                record.edge_features
            ))
            .color(theme.text_muted),
        );
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!lookup_pending, egui::Button::new("View Details"))
                .clicked()
            {
                intents.push(Intent::ViewHistoryDetails {
                    record_id: record.id.clone(),
                });
            }
            if ui.button("Download").clicked() {
                intents.push(Intent::DownloadRecord {
                    record_id: record.id.clone(),
                });
            }
        });
    });
}

fn render_history(
    ui: &mut egui::Ui,
    theme: &Theme,
    state: &WorkflowState,
    intents: &mut Vec<Intent>,
) {
    if ui.button("Back to Home").clicked() {
        intents.push(Intent::ReturnHome);
    }
    ui.heading("Conversion History");
    if state.history.is_loading() {
        ui.spinner();
    }

    let records = state.history.records();
    if records.is_empty() {
        theme.card_frame().show(ui, |ui| {
            ui.label("No conversion history yet");
            ui.label(
                RichText::new("Your conversion records will appear here").color(theme.text_muted),
            );
        });
        return;
    }

    let summary = state.history.summary();
    theme.card_frame().show(ui, |ui| {
        ui.horizontal(|ui| {
            let stats = [
                ("Total conversions", summary.total.to_string()),
                ("Successful", summary.successful.to_string()),
                ("Planar surfaces", summary.planar_surfaces.to_string()),
            ];
            for (label, value) in stats {
                ui.vertical(|ui| {
                    ui.heading(value);
                    ui.label(RichText::new(label).color(theme.text_muted));
                });
                ui.add_space(theme.spacing_16);
            }
        });
    });
    ui.add_space(theme.spacing_8);

    let lookup_pending = state.pending_lookup.is_some();
    for record in records {
        render_history_record(ui, theme, record, lookup_pending, intents);
        ui.add_space(theme.spacing_8);
    }
}

impl eframe::App for MeshStepApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            self.theme.apply_visuals(ctx);
            self.theme_applied = true;
        }

        self.drain_events();

        let mut intents = Vec::new();
        intents.extend(self.collect_dropped_file(ctx));
        self.render_top_bar(ctx, &mut intents);
        self.render_bottom_panel(ctx);
        self.render_center_panel(ctx, &mut intents);

        for intent in intents {
            self.dispatch(WorkflowEvent::Intent(intent));
        }

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
