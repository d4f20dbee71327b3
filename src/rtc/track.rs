//! Local audio track setup, ported from `internal/rtc/track.go`.

use std::sync::Arc;

use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::config::AudioConfig;
use crate::error::AppError;

/// Creates the one local audio track this crate ever sends and adds it
/// to `pc` as a send-only sender (`setupAudioTrack`).
pub async fn setup_audio_track(
    pc: &RTCPeerConnection,
    audio_cfg: &AudioConfig,
) -> Result<Arc<TrackLocalStaticSample>, AppError> {
    let capability = RTCRtpCodecCapability {
        mime_type: audio_cfg.mime_type.to_owned(),
        clock_rate: audio_cfg.sample_rate,
        channels: audio_cfg.channels,
        sdp_fmtp_line: audio_cfg.sdp_fmtp_line.to_owned(),
        rtcp_feedback: vec![],
    };

    let audio_track = Arc::new(TrackLocalStaticSample::new(
        capability,
        "audio".to_owned(),
        "microphone".to_owned(),
    ));

    pc.add_track(audio_track.clone())
        .await
        .map_err(|e| AppError::Device(format!("failed to add audio track: {e}")))?;

    tracing::info!(
        mime_type = audio_cfg.mime_type,
        sample_rate = audio_cfg.sample_rate,
        "audio track added"
    );

    Ok(audio_track)
}
