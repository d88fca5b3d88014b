//! # WhatsApp Webhook Receiver
//!
//! Main entry point of the WhatsApp Business API webhook service.
//! Loads configuration, sets up logging and serves the webhook routes.

#![recursion_limit = "256"]

pub mod config;
pub mod consts;
pub mod logger;
pub mod metric;
pub mod server;
pub mod webhook;

use envconfig::Envconfig;
use logfire::config::MetricsOptions;
use std::sync::Arc;
use tracing::info;
use webhook::whatsapp::{
    dedupe::RedeliveryGuard, handler::Dispatcher, recorder::LogRecorder, verification::Verifier,
};

#[ntex::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::AppConfig::init_from_env()?;

    // Initialize logging and metrics
    let shutdown_handler = match app_config.logfire_token() {
        Some(token) => Some(
            logfire::configure()
                .install_panic_handler()
                .with_metrics(Some(MetricsOptions::default()))
                .send_to_logfire(logfire::config::SendToLogfire::Yes)
                .with_token(token)
                .finish()?,
        ),
        None => {
            logger::setup_simple_logger(app_config.log_level_filter())?;
            None
        }
    };

    let app_state = server::AppState {
        verifier: Verifier::new(app_config.whatsapp_verify_token.clone()),
        dispatcher: Arc::new(Dispatcher::new(
            Box::new(LogRecorder),
            RedeliveryGuard::new(app_config.dedupe_capacity),
        )),
        app_secret: app_config.app_secret().map(str::to_string),
    };

    let (host, port) = app_config.server_addr();
    info!("webhook server running on {host}:{port}");
    info!("webhook endpoint: {host}:{port}{}", consts::WEBHOOK_PATH);
    if app_state.app_secret.is_none() {
        info!("no app secret configured, payload signatures are not checked");
    }

    server::configure_and_run_server(&app_config, app_state).await?;

    if let Some(shutdown_handler) = shutdown_handler {
        shutdown_handler.shutdown()?;
    }

    Ok(())
}
