use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use hudlink_app::{MediaDeviceFactory, RuntimeOptions, SessionController};
use hudlink_audio::AudioOutput;
use hudlink_foundation::{real_clock, ShutdownHandler};
use hudlink_insight::HttpInsightClient;
use hudlink_live::protocol::{DEFAULT_REALTIME_MODEL, DEFAULT_VOICE};
use hudlink_live::WsEndpoint;
use hudlink_vision::SharedScreenSource;

const DEFAULT_PERSONA: &str = "You are a tactical gaming copilot. You watch the user's \
gameplay and listen to their voice. Call out what matters, keep it short during action, \
and always answer in the user's language.";

#[derive(Parser, Debug)]
#[command(name = "hudlink", about = "Live copilot session engine")]
struct Cli {
    /// WebSocket URL of the duplex streaming endpoint.
    #[arg(long, env = "HUDLINK_ENDPOINT")]
    endpoint: String,

    /// API key for the classification/advisory endpoints.
    #[arg(long, env = "HUDLINK_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Base URL for the classification/advisory endpoints.
    #[arg(
        long,
        env = "HUDLINK_INSIGHT_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    insight_url: String,

    /// Model used for frame classification and advisories.
    #[arg(long, default_value = "gemini-3-flash-preview")]
    insight_model: String,

    /// Realtime audio/vision model for the duplex session.
    #[arg(long, default_value = DEFAULT_REALTIME_MODEL)]
    model: String,

    /// Persona / system instruction forwarded to the endpoint.
    #[arg(long)]
    persona: Option<String>,

    /// Reply voice.
    #[arg(long, default_value = DEFAULT_VOICE)]
    voice: String,

    /// Input device name; system default when omitted.
    #[arg(long)]
    device: Option<String>,

    /// Start with the microphone muted.
    #[arg(long)]
    muted: bool,
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "hudlink.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().map_err(|e| anyhow::anyhow!("logging init failed: {e}"))?;
    let cli = Cli::parse();
    tracing::info!("Starting hudlink");

    // The embedding UI feeds this source; until it does, sampling ticks
    // are skipped.
    let screen = SharedScreenSource::new();
    let devices = Arc::new(MediaDeviceFactory::new(cli.device.clone(), screen.clone()));
    let endpoint = Arc::new(WsEndpoint::new(cli.endpoint.clone()));
    let insight = Arc::new(HttpInsightClient::new(
        cli.insight_url.clone(),
        cli.insight_model.clone(),
        cli.api_key.clone(),
    ));

    let sink = AudioOutput::start().context("opening audio output")?;

    let options = RuntimeOptions {
        persona: cli
            .persona
            .clone()
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
        voice: cli.voice.clone(),
        model: cli.model.clone(),
        ..Default::default()
    };

    let handle = SessionController::start(
        options,
        endpoint,
        devices,
        insight,
        sink,
        real_clock(),
    );
    if cli.muted {
        handle.set_mute(true).await;
    }

    // Periodic status line: the UI-facing observations, on the log.
    let status_metrics = handle.metrics.clone();
    let status_state = handle.subscribe_state();
    let status_task = tokio::spawn(async move {
        use std::sync::atomic::Ordering;
        let mut current = String::from("offline");
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            while let Ok(state) = status_state.try_recv() {
                current = state.label().to_string();
            }
            tracing::info!(
                status = %current,
                context = %status_metrics.context_label(),
                video_fps = status_metrics.video_fps.load(Ordering::Relaxed) as f64 / 10.0,
                blocks_sent = status_metrics.audio_blocks_sent.load(Ordering::Relaxed),
                muted = status_metrics.is_muted(),
                "session status"
            );
        }
    });

    let shutdown = ShutdownHandler::new().install().await;
    shutdown.wait().await;

    tracing::info!("Shutting down");
    status_task.abort();
    handle.exit().await;
    handle.join().await;
    Ok(())
}
