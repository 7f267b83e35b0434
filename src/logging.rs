//! Tracing setup: console output by default, daily rolling file when a
//! log directory is configured.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ServiceConfig;
use crate::error::Result;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. The returned guard
/// must live as long as the process so buffered file output is flushed on
/// shutdown; it is `None` in console mode.
pub fn init(service: &ServiceConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{}={}", crate::SERVICE_NAME, service.log_level))
    });

    match &service.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(
                Rotation::DAILY,
                dir,
                format!("{}.log", crate::SERVICE_NAME),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();

            Ok(Some(guard))
        },
        None => {
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_file(true)
                .with_line_number(true)
                .init();

            Ok(None)
        },
    }
}
