use log::LevelFilter;
use simplelog::{ConfigBuilder, SimpleLogger};

/// Console logger used when logs are not exported to logfire.
///
/// `tracing` events are forwarded here through its `log` bridge.
pub fn setup_simple_logger(level: LevelFilter) -> anyhow::Result<()> {
    let logger_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("whatsapp_webhook")
        .add_filter_allow_str("ntex::web::middleware")
        .build();

    Ok(SimpleLogger::init(level, logger_config)?)
}
