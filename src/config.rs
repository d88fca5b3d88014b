//! Application configuration loaded from the environment.
//!
//! The configuration is read once at startup and handed to the components
//! that need it, so handlers never read process state on their own.
//!
//! # Security Notes
//! - Sensitive fields are clearly marked and should never be logged
//! - Production environments should use secure secret management systems

use envconfig::Envconfig;
use log::LevelFilter;
use std::str::FromStr;

/// Environment variables used to configure the webhook receiver.
#[derive(Envconfig, Clone)]
pub struct AppConfig {
    /// Environment name to deploy the app (NON-SENSITIVE)
    /// Values: "local", "dev", "staging", "prod"
    #[envconfig(default = "local")]
    pub env: String,

    /// Host address for web server binding (NON-SENSITIVE)
    #[envconfig(default = "0.0.0.0")]
    pub web_server_host: String,

    /// Port for web server binding (NON-SENSITIVE)
    #[envconfig(default = "3000")]
    pub web_server_port: u16,

    /// 🔒 SENSITIVE: token the provider echoes during the subscription handshake
    pub whatsapp_verify_token: String,

    /// 🔒 SENSITIVE: app secret used to sign webhook payloads.
    /// Signature checks are skipped when unset or empty.
    pub whatsapp_app_secret: Option<String>,

    /// Number of event keys remembered to drop provider redeliveries.
    /// `0` disables the redelivery guard.
    #[envconfig(default = "4096")]
    pub dedupe_capacity: usize,

    /// 🔒 SENSITIVE: logfire write token, console logging is used when unset
    pub logfire_token: Option<String>,

    /// Console log level (NON-SENSITIVE)
    #[envconfig(default = "info")]
    pub log_level: String,

    /// Path to SSL private key file, only read in production (SENSITIVE PATH)
    #[envconfig(default = "server.key")]
    pub private_key_path: String,

    /// Path to SSL certificate file, only read in production (NON-SENSITIVE)
    #[envconfig(default = "server.crt")]
    pub certificate_path: String,
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_prod(&self) -> bool {
        self.env.to_lowercase() == "prod"
    }

    /// Address the web server binds to
    pub fn server_addr(&self) -> (String, u16) {
        (self.web_server_host.clone(), self.web_server_port)
    }

    /// App secret for payload signatures, `None` when signature checks are off
    pub fn app_secret(&self) -> Option<&str> {
        non_empty(self.whatsapp_app_secret.as_deref())
    }

    pub fn logfire_token(&self) -> Option<&str> {
        non_empty(self.logfire_token.as_deref())
    }

    /// Parsed console log level, falls back to `Info` on unknown values
    pub fn log_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
