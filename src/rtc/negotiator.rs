//! Offer/answer negotiation, ported from
//! `internal/rtc/negotiator/negotiator.go` and the role-election logic
//! from `internal/rtc/signal.go`.

use std::sync::Arc;
use std::time::Duration;

use libp2p::PeerId;
use tokio::sync::Notify;
use tracing::{info, warn};
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::error::AppError;
use crate::p2p::{SignalMessage, SignalingChannel};

const ICE_GATHERING_TIMEOUT: Duration = Duration::from_secs(45);
const OFFER_ANSWER_TIMEOUT: Duration = Duration::from_secs(30);

/// `local_peer_id < remote_peer_id` is offerer, else answerer.
/// Discovery never hands us a stream to ourselves, so equality cannot
/// occur (ported from `s.hostID < s.peerID`).
pub fn is_offerer(local_peer_id: PeerId, remote_peer_id: PeerId) -> bool {
    local_peer_id.to_bytes() < remote_peer_id.to_bytes()
}

/// Runs the full negotiation for one connection: role election
/// followed by the offerer or answerer flow.
pub async fn negotiate(
    pc: &RTCPeerConnection,
    signaling: &SignalingChannel,
    session_id: &str,
    local_peer_id: PeerId,
    remote_peer_id: PeerId,
) -> Result<(), AppError> {
    if is_offerer(local_peer_id, remote_peer_id) {
        info!("acting as offerer");
        create_offer(pc, signaling, session_id).await
    } else {
        info!("acting as answerer");
        accept_offer(pc, signaling, session_id).await
    }
}

async fn create_offer(
    pc: &RTCPeerConnection,
    signaling: &SignalingChannel,
    session_id: &str,
) -> Result<(), AppError> {
    let offer = pc
        .create_offer(None)
        .await
        .map_err(|e| AppError::Negotiation(format!("failed to create offer: {e}")))?;
    pc.set_local_description(offer)
        .await
        .map_err(|e| AppError::Negotiation(format!("failed to set local description: {e}")))?;

    wait_for_ice_gathering(pc).await;

    let local_desc = pc
        .local_description()
        .await
        .ok_or_else(|| AppError::Negotiation("no local description after gathering".into()))?;

    signaling
        .outgoing_tx
        .send(SignalMessage::offer(session_id.to_owned(), local_desc))
        .await
        .map_err(|_| AppError::Negotiation("signalling channel closed".into()))?;
    info!("offer sent, waiting for answer...");

    let answer = tokio::time::timeout(OFFER_ANSWER_TIMEOUT, signaling.answer_rx.recv())
        .await
        .map_err(|_| AppError::NegotiationTimeout)?
        .map_err(|_| AppError::Negotiation("signalling channel closed".into()))?;

    let sdp = answer
        .sdp
        .ok_or_else(|| AppError::SignalParse("answer missing sdp".into()))?;
    pc.set_remote_description(sdp)
        .await
        .map_err(|e| AppError::Negotiation(format!("failed to set remote description: {e}")))?;
    info!("answer processed successfully");
    Ok(())
}

async fn accept_offer(
    pc: &RTCPeerConnection,
    signaling: &SignalingChannel,
    session_id: &str,
) -> Result<(), AppError> {
    info!("waiting for offer...");
    let offer = tokio::time::timeout(OFFER_ANSWER_TIMEOUT, signaling.offer_rx.recv())
        .await
        .map_err(|_| AppError::NegotiationTimeout)?
        .map_err(|_| AppError::Negotiation("signalling channel closed".into()))?;

    let sdp = offer
        .sdp
        .ok_or_else(|| AppError::SignalParse("offer missing sdp".into()))?;
    pc.set_remote_description(sdp)
        .await
        .map_err(|e| AppError::Negotiation(format!("failed to set remote description: {e}")))?;

    let answer = pc
        .create_answer(None)
        .await
        .map_err(|e| AppError::Negotiation(format!("failed to create answer: {e}")))?;
    pc.set_local_description(answer)
        .await
        .map_err(|e| AppError::Negotiation(format!("failed to set local description: {e}")))?;

    info!("gathering ice candidates...");
    wait_for_ice_gathering(pc).await;

    let local_desc = pc
        .local_description()
        .await
        .ok_or_else(|| AppError::Negotiation("no local description after gathering".into()))?;

    signaling
        .outgoing_tx
        .send(SignalMessage::answer(session_id.to_owned(), local_desc))
        .await
        .map_err(|_| AppError::Negotiation("signalling channel closed".into()))?;
    info!("answer sent");
    Ok(())
}

/// Resolves when ICE gathering completes, or after 45 s, whichever
/// comes first (`waitForICEGathering`).
async fn wait_for_ice_gathering(pc: &RTCPeerConnection) {
    if pc.ice_gathering_state() == RTCIceGatheringState::Complete {
        return;
    }

    let done = Arc::new(Notify::new());
    let done_setter = done.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGatheringState| {
        info!(%state, "ice gathering state");
        if state == RTCIceGatheringState::Complete {
            done_setter.notify_waiters();
        }
        Box::pin(async {})
    }));

    if pc.ice_gathering_state() == RTCIceGatheringState::Complete {
        return;
    }

    if tokio::time::timeout(ICE_GATHERING_TIMEOUT, done.notified())
        .await
        .is_ok()
    {
        info!("ice candidates gathered");
    } else {
        warn!("ice gathering timeout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offerer_is_determined_by_peer_id_total_order() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(is_offerer(a, b), is_offerer(b, a));
    }
}
