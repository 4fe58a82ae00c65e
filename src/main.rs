#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use anyhow::{Context, Result};
use eframe::egui;
use tracing_subscriber::EnvFilter;

mod chatapp;
mod chatapp_ui;
mod chatstate;
mod config;
mod dispatcher;
mod error;
mod geminiclient;
mod markdown;
mod session;

use chatapp::ChatApp;
use config::AppConfig;
use geminiclient::GeminiClient;
use session::SessionController;

fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sutrabot=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let client = GeminiClient::new(&config.api_base, &config.model, config.generation.clone())
        .context("Failed to build HTTP client")?;
    let session = SessionController::new(client, config.api_key.as_deref());

    tracing::info!(
        model = %config.model,
        api_key_set = session.has_credential(),
        "Starting Sutrabot"
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(chatapp_ui::TITLE)
            .with_inner_size([600.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        chatapp_ui::TITLE,
        options,
        Box::new(move |cc| Box::new(ChatApp::new(cc, session, &config))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))
}
