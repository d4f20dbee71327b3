//! Peer-connection event wiring, ported from `internal/rtc/handlers.go`.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

use crate::audio::{codec, pipeline, Playback};
use crate::config::AudioConfig;
use crate::error::AppError;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Bundles the state the peer-connection callbacks close over:
/// the status channel, the codec config needed to build a decoder per
/// remote track, the playback device, and the cancellation token the
/// inbound pipeline task observes.
#[derive(Clone)]
pub struct EventHandlers {
    pub status_tx: tokio::sync::mpsc::Sender<Option<AppError>>,
    pub audio_cfg: AudioConfig,
    pub playback: Arc<Playback>,
    pub inbound_cancel: CancellationToken,
}

impl EventHandlers {
    /// Wires every callback `setupEventHandlers` wires, plus the
    /// periodic stats logger.
    pub fn setup(self, pc: Arc<RTCPeerConnection>) {
        let status_tx = self.status_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                let conn_type = match candidate.typ.to_string().as_str() {
                    "host" => "Direct",
                    "srflx" => "STUN",
                    "relay" => "TURN",
                    "prflx" => "Peer",
                    _ => "Undefined",
                };
                debug!(
                    r#type = conn_type,
                    protocol = %candidate.protocol,
                    address = %candidate.address,
                    port = candidate.port,
                    priority = candidate.priority,
                    "new ice candidate gathered"
                );
            }
            Box::pin(async {})
        }));

        let status_tx_ice = status_tx.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            info!(%state, "ice connection state changed");
            let status_tx = status_tx_ice.clone();
            Box::pin(async move {
                let err = match state {
                    RTCIceConnectionState::Connected => {
                        info!("ice connection is set");
                        None
                    }
                    RTCIceConnectionState::Failed => {
                        error!("ice connection failed");
                        Some(AppError::IceFailed)
                    }
                    RTCIceConnectionState::Disconnected => {
                        warn!("ice disconnected");
                        Some(AppError::IceDisconnected)
                    }
                    RTCIceConnectionState::Closed => {
                        info!("ice connection closed");
                        Some(AppError::IceClosed)
                    }
                    _ => return,
                };
                let _ = status_tx.send(err).await;
            })
        }));

        let status_tx_pc = status_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            info!(%state, "peer connection state changed");
            let status_tx = status_tx_pc.clone();
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Connected => {
                        info!("you can start messaging!");
                        let _ = status_tx.send(None).await;
                    }
                    RTCPeerConnectionState::Failed => {
                        let _ = status_tx.send(Some(AppError::ConnectionFailed)).await;
                    }
                    RTCPeerConnectionState::Closed => {
                        let _ = status_tx.send(Some(AppError::ConnectionClosed)).await;
                    }
                    _ => {}
                }
            })
        }));

        let audio_cfg = self.audio_cfg.clone();
        let playback = self.playback.clone();
        let inbound_cancel = self.inbound_cancel.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver| {
                info!(track_id = %track.id(), kind = %track.kind(), "received track");
                let audio_cfg = audio_cfg.clone();
                let playback = playback.clone();
                let cancel = inbound_cancel.clone();
                Box::pin(async move {
                    if track.kind() != webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Audio {
                        return;
                    }
                    info!("audio track received from peer");
                    let decoder = match codec::create_decoder(&audio_cfg) {
                        Ok(d) => d,
                        Err(e) => {
                            error!(error = %e, "failed to create decoder for remote track");
                            return;
                        }
                    };
                    tokio::spawn(pipeline::spawn_inbound(track, decoder, playback, cancel));
                })
            },
        ));

        tokio::spawn(log_stats(pc));
    }
}

/// Periodically logs inbound/outbound RTP stats, ported from `logStat`.
async fn log_stats(pc: Arc<RTCPeerConnection>) {
    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    loop {
        ticker.tick().await;
        let report = pc.get_stats().await;
        for (_, stat) in report.reports.iter() {
            match stat {
                StatsReportType::InboundRTP(inbound) => {
                    debug!(
                        packets = inbound.packets_received,
                        bytes = inbound.bytes_received,
                        lost = inbound.packets_lost,
                        jitter = inbound.jitter,
                        "inbound rtp stats"
                    );
                }
                StatsReportType::OutboundRTP(outbound) => {
                    debug!(
                        packets = outbound.packets_sent,
                        bytes = outbound.bytes_sent,
                        "outbound rtp stats"
                    );
                }
                _ => {}
            }
        }
    }
}
