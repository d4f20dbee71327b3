//! Length-prefixed JSON signalling over a framed byte stream, grounded
//! in `internal/rtc/message.go`, `internal/rtc/negotiator/stream_handler.go`,
//! and `internal/p2p/signaling/handshake.go`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::AppError;

/// Wire tag for a [`SignalMessage`] (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Handshake,
    Ack,
    Offer,
    Answer,
    SimpleMsg,
    ErrorMsg,
}

/// One signalling record. `sdp` is present only for `Offer`/`Answer`;
/// `candidate` is reserved for trickle ICE, unused by this crate's
/// wait-for-gathering-complete strategy but kept for wire compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: SignalType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp: Option<RTCSessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<RTCIceCandidateInit>,
    pub session_id: String,
}

impl SignalMessage {
    pub fn handshake(session_id: String) -> Self {
        SignalMessage {
            kind: SignalType::Handshake,
            sdp: None,
            candidate: None,
            session_id,
        }
    }

    pub fn ack(session_id: String) -> Self {
        SignalMessage {
            kind: SignalType::Ack,
            sdp: None,
            candidate: None,
            session_id,
        }
    }

    pub fn offer(session_id: String, sdp: RTCSessionDescription) -> Self {
        SignalMessage {
            kind: SignalType::Offer,
            sdp: Some(sdp),
            candidate: None,
            session_id,
        }
    }

    pub fn answer(session_id: String, sdp: RTCSessionDescription) -> Self {
        SignalMessage {
            kind: SignalType::Answer,
            sdp: Some(sdp),
            candidate: None,
            session_id,
        }
    }
}

/// Reads a `u32` big-endian length prefix followed by that many UTF-8
/// JSON bytes (`handleRead`'s `binary.Read`/`io.ReadFull`).
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes a `u32` big-endian length prefix followed by `payload`,
/// flushing immediately (`handleWrite`).
async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    writer
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// One-shot ready gate, the async equivalent of the original's
/// `sync.Once`-guarded closed channel: any waiter that arrives after
/// [`HandshakeGate::mark_ready`] resolves immediately.
#[derive(Default)]
pub struct HandshakeGate {
    ready: AtomicBool,
    notify: Notify,
}

impl HandshakeGate {
    pub fn new() -> Self {
        HandshakeGate {
            ready: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn mark_ready(&self) {
        if self
            .ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        if self.ready.load(Ordering::Acquire) {
            return;
        }
        let notified = self.notify.notified();
        if self.ready.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

/// Outgoing message queue capacity; a handful of application-controlled
/// records, never a hot path (spec.md §4.5).
const OUTGOING_QUEUE_CAPACITY: usize = 16;
/// Offer/answer intake capacity matches the original's `select`-with-
/// `default` overflow-drop behaviour: only the newest matters.
const NEGOTIATION_INTAKE_CAPACITY: usize = 1;

/// Owns the split halves of a signalling stream and the channels the
/// negotiator and control surface use to interact with it.
pub struct SignalingChannel {
    pub outgoing_tx: Sender<SignalMessage>,
    pub offer_rx: Receiver<SignalMessage>,
    pub answer_rx: Receiver<SignalMessage>,
    pub handshake: Arc<HandshakeGate>,
}

impl SignalingChannel {
    /// Spawns the reader and writer tasks over `stream` and sends the
    /// initial handshake record (`HandleStream`). `stream` is split
    /// into owned read/write halves by the caller (libp2p_stream hands
    /// back a type implementing both `AsyncRead` and `AsyncWrite`).
    pub fn spawn<S>(
        stream: S,
        session_id: String,
        status_tx: tokio::sync::mpsc::Sender<Option<AppError>>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut read_half, mut write_half) = futures::io::AsyncReadExt::split(stream);

        let (outgoing_tx, outgoing_rx) = async_channel::bounded(OUTGOING_QUEUE_CAPACITY);
        let (offer_tx, offer_rx) = async_channel::bounded(NEGOTIATION_INTAKE_CAPACITY);
        let (answer_tx, answer_rx) = async_channel::bounded(NEGOTIATION_INTAKE_CAPACITY);
        let handshake = Arc::new(HandshakeGate::new());

        // Writer task.
        {
            let outgoing_rx = outgoing_rx.clone();
            tokio::spawn(async move {
                while let Ok(msg) = outgoing_rx.recv().await {
                    let payload = match serde_json::to_vec(&msg) {
                        Ok(p) => p,
                        Err(e) => {
                            error!(error = %e, "failed to marshal signal message");
                            continue;
                        }
                    };
                    if let Err(e) = write_frame(&mut write_half, &payload).await {
                        error!(error = %e, "signalling write failed, closing writer");
                        return;
                    }
                }
                debug!("signalling writer exited: outgoing channel closed");
            });
        }

        // Reader task.
        {
            let session_id = session_id.clone();
            let outgoing_tx_for_replies = outgoing_tx.clone();
            let handshake = handshake.clone();
            tokio::spawn(async move {
                loop {
                    let payload = match read_frame(&mut read_half).await {
                        Ok(p) => p,
                        Err(e) => {
                            error!(error = %e, "signalling read failed");
                            let _ = status_tx.send(Some(AppError::ConnectionFailed)).await;
                            return;
                        }
                    };

                    let msg: SignalMessage = match serde_json::from_slice(&payload) {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(error = %e, "malformed signal record, ignoring");
                            continue;
                        }
                    };

                    match msg.kind {
                        SignalType::Handshake => {
                            debug!("received handshake");
                            let ack = SignalMessage::ack(session_id.clone());
                            let _ = outgoing_tx_for_replies.send(ack).await;
                        }
                        SignalType::Ack => {
                            debug!("received ack");
                            handshake.mark_ready();
                        }
                        SignalType::Offer => {
                            if let Err(async_channel::TrySendError::Full(_)) =
                                offer_tx.try_send(msg)
                            {
                                warn!("offer intake full, dropping offer record");
                            }
                        }
                        SignalType::Answer => {
                            if let Err(async_channel::TrySendError::Full(_)) =
                                answer_tx.try_send(msg)
                            {
                                warn!("answer intake full, dropping answer record");
                            }
                        }
                        SignalType::SimpleMsg | SignalType::ErrorMsg => {
                            debug!(kind = ?msg.kind, "received bookkeeping-only signal record");
                        }
                    }
                }
            });
        }

        let channel = SignalingChannel {
            outgoing_tx: outgoing_tx.clone(),
            offer_rx,
            answer_rx,
            handshake,
        };

        let initial = SignalMessage::handshake(session_id);
        let _ = outgoing_tx.try_send(initial);

        channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_message_round_trips_through_json() {
        let msg = SignalMessage::handshake("deadbeefcafebabe".into());
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: SignalMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.session_id, msg.session_id);
        assert_eq!(back.kind, SignalType::Handshake);
    }

    #[test]
    fn signal_type_serializes_to_spec_wire_strings() {
        assert_eq!(serde_json::to_string(&SignalType::Handshake).unwrap(), "\"handshake\"");
        assert_eq!(serde_json::to_string(&SignalType::SimpleMsg).unwrap(), "\"simple_msg\"");
        assert_eq!(serde_json::to_string(&SignalType::ErrorMsg).unwrap(), "\"error_msg\"");
    }

    #[tokio::test]
    async fn handshake_gate_resolves_immediately_after_mark_ready() {
        let gate = HandshakeGate::new();
        gate.mark_ready();
        tokio::time::timeout(std::time::Duration::from_millis(50), gate.wait())
            .await
            .expect("wait should resolve immediately once ready");
    }

    #[tokio::test]
    async fn handshake_gate_blocks_until_marked_ready() {
        let gate = Arc::new(HandshakeGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.wait().await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        gate.mark_ready();
        tokio::time::timeout(std::time::Duration::from_millis(50), waiter)
            .await
            .expect("waiter should finish after mark_ready")
            .unwrap();
    }

    #[tokio::test]
    async fn frame_round_trips_through_length_prefix() {
        let payload = b"{\"type\":\"handshake\",\"session_id\":\"ab\"}".to_vec();
        let mut buf = Vec::new();
        write_frame(&mut buf, &payload).await.unwrap();

        let mut cursor = futures::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();
        assert_eq!(read_back, payload);
    }
}
