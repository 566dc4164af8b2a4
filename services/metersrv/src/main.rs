//! Meter reader service (`metersrv`)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use metersrv::{
    api::create_routes,
    app_state::AppState,
    config::{resolve_app_dir, resolve_log_dir, AppConfig},
    logging::init_logging,
    reader::{ConnectionManager, LatestValue, ReaderSettings, SerialDeviceOpener},
    recorder::CsvRecorder,
    sink::MeasurementSink,
    wait_for_shutdown,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "metersrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "HP-90EPC multimeter reader service",
    long_about = None
)]
struct Args {
    /// Serial port of the meter (e.g. /dev/ttyUSB0 or COM3)
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// HTTP listen address
    #[arg(long)]
    http: Option<String>,

    /// Directory for CSV measurement files
    #[arg(long)]
    log_dir: Option<String>,

    /// Minimum spacing between CSV rows in milliseconds
    #[arg(long)]
    log_interval_ms: Option<u64>,

    /// Directory for config.yaml and default log location
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Keep config and logs next to the executable
    #[arg(long)]
    portable: bool,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Also write service logs to daily files in this directory
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Flags given on the command line override the loaded values
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.device_port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if let Some(http) = &self.http {
            config.http_addr = http.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        if let Some(interval) = self.log_interval_ms {
            config.log_interval_ms = interval;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app_dir = resolve_app_dir(args.app_dir.as_deref(), args.portable)
        .context("Failed to resolve app directory")?;
    let loaded = AppConfig::load(&app_dir);

    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref())
        .context("Failed to initialize logging")?;

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration ({}), using defaults", e);
            AppConfig::default()
        },
    };
    args.apply(&mut config);
    let config = config.normalized();
    if let Err(e) = config.save(&app_dir).await {
        warn!("Failed to save configuration: {}", e);
    }

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let log_dir = resolve_log_dir(&config.log_dir, &app_dir, &cwd);

    let recorder = Arc::new(CsvRecorder::new(log_dir, config.log_interval_ms));
    let sink: Arc<dyn MeasurementSink> = recorder.clone();
    let settings = ReaderSettings::default().with_stale_after(config.stale_after());
    let manager = Arc::new(ConnectionManager::new(
        SerialDeviceOpener,
        Arc::new(LatestValue::new()),
        sink,
        settings,
    ));

    manager.start(config.device_port.clone(), config.baud);

    info!(
        "HP-90EPC service started. HTTP={} Device={}@{} AppDir={} LogDir={}",
        config.http_addr,
        config.device_port,
        config.baud,
        app_dir.display(),
        recorder.dir().display()
    );

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;
    info!("API server listening on http://{}", config.http_addr);

    let state = Arc::new(AppState::new(
        manager.clone(),
        recorder.clone(),
        config,
        Some(app_dir),
    ));
    let app = create_routes(state);

    let shutdown_token = CancellationToken::new();
    let server_token = shutdown_token.clone();
    let server_handle = tokio::spawn(async move {
        let shutdown = async move { server_token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Server error: {}", e);
        }
    });

    let signal = wait_for_shutdown().await;
    info!("Received {}, shutting down", signal);

    shutdown_token.cancel();
    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }
    if let Err(e) = recorder.stop() {
        warn!("Failed to close CSV file: {}", e);
    }
    manager.shutdown().await;

    info!("metersrv stopped");
    Ok(())
}
