use clap::Parser;
use eyre::WrapErr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;

use capture_agent::api::{self, AppState};
use capture_agent::config::parse_config_file;
use capture_agent::range_log::{RangeEventLog, SharedActiveSession};
use capture_agent::telemetry::{telemetry_consumer, telemetry_listener, TELEMETRY_QUEUE_DEPTH};
use telemetry_stability::{StabilityMonitor, TelemetryTracker};

#[derive(Debug, Parser)]
#[command(about = "telemetry-gated multi-camera capture agent")]
struct Cli {
    /// Path to the agent configuration file.
    config_file: std::path::PathBuf,
}

fn init_logging() -> eyre::Result<()> {
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info"));
    let collector = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter);
    tracing::subscriber::set_global_default(collector)?;
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let config = parse_config_file(&cli.config_file)
        .wrap_err_with(|| format!("reading config file {}", cli.config_file.display()))?;

    let monitor = StabilityMonitor::new(TelemetryTracker::new());
    let active_session: SharedActiveSession = Default::default();

    let telemetry_socket = tokio::net::UdpSocket::bind(&config.telemetry_listen_addr)
        .await
        .wrap_err_with(|| format!("binding telemetry socket {}", config.telemetry_listen_addr))?;
    let (telemetry_tx, telemetry_rx) = tokio::sync::mpsc::channel(TELEMETRY_QUEUE_DEPTH);
    let _listener_jh = tokio::spawn(telemetry_listener(telemetry_socket, telemetry_tx));
    let _consumer_jh = tokio::spawn(telemetry_consumer(
        telemetry_rx,
        monitor.clone(),
        RangeEventLog::new(active_session.clone()),
    ));

    let listener = tokio::net::TcpListener::bind(&config.http_listen_addr)
        .await
        .wrap_err_with(|| format!("binding HTTP listener {}", config.http_listen_addr))?;
    info!("trigger API listening on http://{}", listener.local_addr()?);

    let state = AppState::new(config, monitor, active_session);
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}
