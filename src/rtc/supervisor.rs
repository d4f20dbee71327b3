//! Connection supervisor: startup sequence and status publication,
//! ported from `internal/rtc/rtc.go::Connect` and
//! `internal/webrtc_con/peer.go`'s config builder (STUN/TURN merge,
//! `SettingEngine` only — the interactive offer/answer menu in that
//! file is not carried forward, see `SPEC_FULL.md` §9).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::Error as WebrtcError;

use crate::audio::{pipeline, Capture, Playback};
use crate::config::{self, AudioConfig};
use crate::error::AppError;
use crate::p2p::{discovery, SignalingChannel};
use crate::rtc::handlers::EventHandlers;
use crate::rtc::negotiator;
use crate::rtc::track::setup_audio_track;
use crate::system;

const ICE_CANDIDATE_POOL_SIZE: u8 = 15;
const ICE_DISCONNECTED_TIMEOUT: Duration = Duration::from_secs(60);
const ICE_FAILED_TIMEOUT: Duration = Duration::from_secs(30);
const ICE_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

fn build_ice_servers() -> Result<Vec<RTCIceServer>, AppError> {
    let mut servers = config::stun_servers()?;
    servers.extend(config::turn_servers());
    Ok(servers)
}

fn build_rtc_configuration() -> Result<RTCConfiguration, AppError> {
    Ok(RTCConfiguration {
        ice_servers: build_ice_servers()?,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ice_candidate_pool_size: ICE_CANDIDATE_POOL_SIZE,
        ..Default::default()
    })
}

fn build_setting_engine() -> SettingEngine {
    let mut setting_engine = SettingEngine::default();
    setting_engine.set_ice_timeouts(
        Some(ICE_DISCONNECTED_TIMEOUT),
        Some(ICE_FAILED_TIMEOUT),
        Some(ICE_KEEPALIVE_INTERVAL),
    );
    setting_engine.set_network_types(vec![
        webrtc::ice::network_type::NetworkType::Udp4,
        webrtc::ice::network_type::NetworkType::Udp6,
        webrtc::ice::network_type::NetworkType::Tcp4,
        webrtc::ice::network_type::NetworkType::Tcp6,
    ]);
    setting_engine
}

fn register_codec(media_engine: &mut MediaEngine, audio_cfg: &AudioConfig) -> Result<(), WebrtcError> {
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: audio_cfg.mime_type.to_owned(),
                clock_rate: audio_cfg.sample_rate,
                channels: audio_cfg.channels,
                sdp_fmtp_line: audio_cfg.sdp_fmtp_line.to_owned(),
                rtcp_feedback: vec![],
            },
            payload_type: audio_cfg.payload_type,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )
}

/// Everything the supervisor keeps alive for the lifetime of a
/// connected call: dropping this tears down the devices and the peer
/// connection.
pub struct ConnectionHandle {
    pub pc: Arc<webrtc::peer_connection::RTCPeerConnection>,
    pub capture: Arc<Capture>,
    pub playback: Arc<Playback>,
    outbound_cancel: CancellationToken,
    inbound_cancel: CancellationToken,
    monitor: tokio::task::JoinHandle<()>,
}

impl ConnectionHandle {
    /// Tears down the pipelines and closes the peer connection
    /// (spec.md §5 shutdown).
    pub async fn close(self) {
        self.outbound_cancel.cancel();
        self.inbound_cancel.cancel();
        self.monitor.abort();
        if let Err(e) = self.pc.close().await {
            error!(error = %e, "error closing peer connection");
        }
    }
}

/// Runs one full connection attempt: builds the peer connection, wires
/// event handlers, starts audio devices and discovery, waits for the
/// handshake, runs negotiation, then blocks until the connection
/// either succeeds or fails for good.
///
/// On success this returns the live [`ConnectionHandle`] once
/// `RTCPeerConnectionState::Connected` is observed; a monitor task
/// keeps watching the status channel afterwards and, on any later
/// terminal failure, logs it and invites the user to press Enter
/// before exiting with status 1 (`LogConnectionErrors` +
/// `system.WaitForUserResponse`). On initial failure the same
/// prompt-and-exit happens before the error is returned here.
pub async fn connect(audio_cfg: AudioConfig) -> Result<ConnectionHandle, AppError> {
    match run(audio_cfg).await {
        Ok(handle) => {
            println!("You can start messaging!");
            Ok(handle)
        }
        Err(e) => {
            error!(error = %e, "webrtc connection error");
            system::wait_for_user_response(true);
            Err(e)
        }
    }
}

async fn run(audio_cfg: AudioConfig) -> Result<ConnectionHandle, AppError> {
    let rtc_config = build_rtc_configuration()?;
    let setting_engine = build_setting_engine();

    let mut media_engine = MediaEngine::default();
    register_codec(&mut media_engine, &audio_cfg)
        .map_err(|e| AppError::Config(format!("failed to register codec: {e}")))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| AppError::Config(format!("failed to register interceptors: {e}")))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_setting_engine(setting_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
        AppError::Negotiation(format!("failed to create peer connection: {e}"))
    })?);

    let audio_track = setup_audio_track(&pc, &audio_cfg).await?;

    let session_id = system::generate_session_id();
    println!("Session ID: {session_id}");

    let playback = Arc::new(Playback::start(&audio_cfg)?);
    playback.play()?;
    playback.set_paused(false);

    let (status_tx, mut status_rx) = tokio::sync::mpsc::channel::<Option<AppError>>(1);
    let inbound_cancel = CancellationToken::new();

    let handlers = EventHandlers {
        status_tx: status_tx.clone(),
        audio_cfg: audio_cfg.clone(),
        playback: playback.clone(),
        inbound_cancel: inbound_cancel.clone(),
    };
    handlers.setup(pc.clone());

    let (packet_tx, packet_rx) = async_channel::bounded(audio_cfg.queue_capacity);
    let capture = Arc::new(Capture::start(&audio_cfg, packet_tx)?);
    capture.play()?;

    let outbound_cancel = CancellationToken::new();
    tokio::spawn(pipeline::spawn_outbound(
        audio_track,
        packet_rx,
        outbound_cancel.clone(),
    ));

    let local_key = libp2p::identity::Keypair::generate_ed25519();
    let local_peer_id = libp2p::PeerId::from(local_key.public());

    let ready = Arc::new(tokio::sync::Notify::new());
    let (discovered_tx, discovered_rx) = async_channel::bounded(1);

    let discovery_ready = ready.clone();
    let discovery_task = tokio::spawn(async move {
        if let Err(e) = discovery::run_discovery(local_key, discovery_ready, discovered_tx).await {
            error!(error = %e, "discovery failed");
        }
    });

    let discovered = discovered_rx
        .recv()
        .await
        .map_err(|_| AppError::Discovery("discovery ended without finding a peer".into()))?;
    let remote_peer_id = discovered.peer;

    let signaling = SignalingChannel::spawn(discovered.stream, session_id.clone(), status_tx.clone());
    ready.notify_waiters();
    let _ = discovery_task.await;

    signaling.handshake.wait().await;
    info!("handshake completed");

    negotiator::negotiate(&pc, &signaling, &session_id, local_peer_id, remote_peer_id).await?;

    // The monitor task owns the status channel for the rest of the
    // connection's life: it reports the very first outcome back here,
    // then keeps logging later transitions the way `LogConnectionErrors`
    // never stops reading from its channel.
    let (first_outcome_tx, first_outcome_rx) = tokio::sync::oneshot::channel();
    let monitor = tokio::spawn(monitor_status(
        status_rx,
        first_outcome_tx,
        inbound_cancel.clone(),
        outbound_cancel.clone(),
    ));

    first_outcome_rx
        .await
        .map_err(|_| AppError::ConnectionFailed)??;

    Ok(ConnectionHandle {
        pc,
        capture,
        playback,
        outbound_cancel,
        inbound_cancel,
        monitor,
    })
}

/// Reads connection status events for the lifetime of the connection.
/// The first event is forwarded to `first_outcome`; every later
/// terminal failure is logged and prompts the user before the process
/// exits (ported from `LogConnectionErrors`).
async fn monitor_status(
    mut status_rx: tokio::sync::mpsc::Receiver<Option<AppError>>,
    first_outcome: tokio::sync::oneshot::Sender<Result<(), AppError>>,
    inbound_cancel: CancellationToken,
    outbound_cancel: CancellationToken,
) {
    let mut first_outcome = Some(first_outcome);
    while let Some(event) = status_rx.recv().await {
        let result = event.map_or(Ok(()), Err);
        if let Some(tx) = first_outcome.take() {
            let _ = tx.send(result.clone());
            if result.is_ok() {
                continue;
            }
        }
        if let Err(err) = result {
            error!(error = %err, "webrtc connection error");
            inbound_cancel.cancel();
            outbound_cancel.cancel();
            system::wait_for_user_response(true);
        }
    }
}
