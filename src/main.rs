//! Peer-to-peer voice call binary: loads configuration, initializes
//! logging, negotiates one WebRTC connection over a libp2p-discovered
//! peer, and runs the terminal control surface until the user exits or
//! the connection drops (ported from `cmd/main.go`'s fully-automatic
//! discovery flow in `internal/rtc/rtc.go`, not the deprecated
//! interactive `internal/webrtc_con/peer.go` connector — see
//! `SPEC_FULL.md` §9).

mod audio;
mod config;
mod control;
mod error;
mod p2p;
mod rtc;
mod system;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    config::load_dotenv();
    let _log_guard = init_logging();

    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("panic occurred: {panic_info}");
    }));

    let audio_cfg = config::AudioConfig::for_codec(config::CodecKind::from_env());
    tracing::info!(codec = ?audio_cfg.codec, sample_rate = audio_cfg.sample_rate, "starting p2p voice call");

    let handle = match rtc::connect(audio_cfg).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to establish connection");
            std::process::exit(1);
        }
    };

    let capture = handle.capture.clone();
    let playback = handle.playback.clone();
    let control_task = tokio::task::spawn_blocking(move || control::run(capture, playback));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
        }
        result = control_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "control surface task panicked");
            }
        }
    }

    handle.close().await;
}

/// Sets up a daily rolling log file plus an env-filtered stdout layer,
/// matching the teacher's `tracing_subscriber::registry()` wiring in
/// `main.rs`. `LOG_LEVEL` (default `info`) drives the filter.
fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("logs", "p2p-voice-call.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_timer(fmt::time::OffsetTime::local_rfc_3339().unwrap())
                .with_ansi(false),
        )
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(EnvFilter::new(log_level))
        .init();

    guard
}
