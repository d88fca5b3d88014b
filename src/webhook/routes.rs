use crate::consts;
use ntex::web;

/// Configures webhook routes for the WhatsApp Business API.
///
/// These routes are public endpoints that don't require authentication.
///
/// # Routes
/// - `GET /webhook` - WhatsApp webhook verification
/// - `POST /webhook` - WhatsApp webhook receiver
pub fn whatsapp(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(consts::WEBHOOK_PATH)
            .service((super::whatsapp::verify, super::whatsapp::receive)),
    );
}
