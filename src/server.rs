//! Web server wiring: shared state, service endpoints and the server loop.

use crate::{
    config::AppConfig,
    webhook::{self, whatsapp::handler::Dispatcher, whatsapp::verification::Verifier},
};
use anyhow::Context;
use ntex::web;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
use std::sync::Arc;

/// State shared by the webhook handlers of every worker
#[derive(Clone)]
pub struct AppState {
    pub verifier: Verifier,
    pub dispatcher: Arc<Dispatcher>,
    /// App secret for payload signatures, `None` skips the check
    pub app_secret: Option<String>,
}

/// Liveness probe
#[web::get("/health")]
pub async fn health() -> impl web::Responder {
    web::HttpResponse::Ok().json(&serde_json::json!({
        "status": "ok"
    }))
}

pub async fn serve_not_found() -> web::HttpResponse {
    web::HttpResponse::NotFound().finish()
}

/// Configures SSL acceptor for production environments
fn setup_ssl_acceptor(app_config: &AppConfig) -> anyhow::Result<openssl::ssl::SslAcceptorBuilder> {
    let mut ssl_acceptor = SslAcceptor::mozilla_intermediate(SslMethod::tls_server())
        .context("Failed to create SSL acceptor")?;

    ssl_acceptor
        .set_private_key_file(&app_config.private_key_path, SslFiletype::PEM)
        .with_context(|| {
            format!(
                "Failed to load private key from {}",
                app_config.private_key_path
            )
        })?;

    ssl_acceptor
        .set_certificate_file(&app_config.certificate_path, SslFiletype::PEM)
        .with_context(|| {
            format!(
                "Failed to load certificate from {}",
                app_config.certificate_path
            )
        })?;

    Ok(ssl_acceptor)
}

/// Configures and starts the web server, with TLS in production
pub async fn configure_and_run_server(
    app_config: &AppConfig,
    app_state: AppState,
) -> anyhow::Result<()> {
    let server_addr = app_config.server_addr();

    let server = web::server(move || {
        web::App::new()
            .wrap(web::middleware::Logger::default())
            .wrap(web::middleware::Compress::default())
            .state(app_state.clone())
            .configure(webhook::routes::whatsapp)
            .service(health)
            .default_service(web::route().to(serve_not_found))
    });

    let bound_server = if app_config.is_prod() {
        let ssl_acceptor = setup_ssl_acceptor(app_config)?;
        server.bind_openssl(server_addr, ssl_acceptor)?
    } else {
        server.bind(server_addr)?
    };

    bound_server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
