mod app;
mod client;
mod config;
mod event;
mod service;
mod session;
mod theme;
mod workflow;

use app::MeshStepApp;
use client::ConversionClient;
use config::AppConfig;
use eframe::egui;
use service::HttpConversionService;
use session::store::ArtifactStore;
use std::sync::{mpsc, Arc};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("meshstep=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let (tx, rx) = mpsc::channel();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("meshstep-runtime")
        .build()?;

    let service = HttpConversionService::new(config.api_base.as_str());
    tracing::info!(
        api_base = service.base_url(),
        download_dir = %config.download_dir.display(),
        "starting conversion assistant"
    );

    let client = ConversionClient::new(
        Arc::new(service),
        tx,
        runtime.handle().clone(),
        config.driver_timing,
        ArtifactStore::new(config.download_dir.clone()),
    );

    let app = MeshStepApp::new(rx, client, &config);
    let _runtime = runtime;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 780.0])
            .with_min_inner_size([820.0, 560.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "MeshStep",
        native_options,
        Box::new(move |_creation_context| Ok(Box::new(app))),
    )?;

    Ok(())
}
