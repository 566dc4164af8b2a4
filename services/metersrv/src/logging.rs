//! Logging setup for the meter service
//!
//! Console output always; a daily rolling file under `log_dir` when one is
//! given. `RUST_LOG` takes precedence over the level passed in.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{MeterSrvError, Result};

const LOG_FILE_PREFIX: &str = "metersrv.log";

/// Module path relative to this workspace's crates, e.g. `reader::connection`
fn short_target(target: &str) -> &str {
    ["metersrv::", "meter_protocol::"]
        .iter()
        .find_map(|prefix| target.strip_prefix(prefix))
        .unwrap_or(target)
}

/// `2025-12-02 08:50:44.809 [INFO] reader::manager: Reader targeting COM3@2400`
///
/// Local time, since the CSV file names are local time too.
struct ServiceLogFormat;

impl<S, N> FormatEvent<S, N> for ServiceLogFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} [{}] {}: ",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            meta.level(),
            short_target(meta.target())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter directive for `level`, unless `RUST_LOG` is set
fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !env.trim().is_empty() {
            return EnvFilter::try_new(&env)
                .map_err(|e| MeterSrvError::config(format!("Invalid RUST_LOG '{env}': {e}")));
        }
    }
    EnvFilter::try_new(level)
        .map_err(|e| MeterSrvError::config(format!("Invalid log level '{level}': {e}")))
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(level)?;

    let console_layer = fmt::layer().event_format(ServiceLogFormat).boxed();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .event_format(ServiceLogFormat)
                .boxed();
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| MeterSrvError::internal(format!("Logging already initialized: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_target() {
        assert_eq!(short_target("metersrv::reader::connection"), "reader::connection");
        assert_eq!(short_target("meter_protocol::frame"), "frame");
        assert_eq!(short_target("tower_http::trace"), "tower_http::trace");
    }

    #[test]
    fn test_filter_accepts_directives() {
        assert!(build_filter("info,metersrv=debug").is_ok());
    }
}
