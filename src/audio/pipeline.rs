//! Outbound/inbound media pipeline tasks, grounded in
//! `internal/audio/pipeline/pipeline.go`'s `StartSending`/
//! `StartReceiving`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use super::codec::Decoder;
use super::playback::Playback;
use crate::config::JITTER_BUFFER_SIZE;

const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Consumes encoded packets from [`super::capture::Capture`] and writes
/// each one as a `Sample` on the local track, until `cancel` fires.
pub async fn spawn_outbound(
    track: Arc<TrackLocalStaticSample>,
    packet_rx: async_channel::Receiver<Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("outbound pipeline cancelled");
                return;
            }
            packet = packet_rx.recv() => packet,
        };

        let Ok(packet) = packet else {
            debug!("outbound pipeline: capture queue closed");
            return;
        };

        let sample = Sample {
            data: Bytes::from(packet),
            duration: FRAME_DURATION,
            ..Default::default()
        };

        if let Err(e) = track.write_sample(&sample).await {
            warn!(error = %e, "failed to write outbound sample, stopping outbound pipeline");
            return;
        }
    }
}

/// A small jitter buffer of decoded PCM frames, `VecDeque<Vec<i16>>`
/// bounded to `3 * JITTER_BUFFER_SIZE`, oldest-dropped on overflow.
struct JitterBuffer {
    frames: Mutex<VecDeque<Vec<i16>>>,
    max_len: usize,
    low_water: usize,
}

impl JitterBuffer {
    fn new() -> Self {
        JitterBuffer {
            frames: Mutex::new(VecDeque::new()),
            max_len: 3 * JITTER_BUFFER_SIZE,
            low_water: JITTER_BUFFER_SIZE,
        }
    }

    fn push(&self, frame: Vec<i16>) {
        let mut frames = self.frames.lock();
        frames.push_back(frame);
        while frames.len() > self.max_len {
            frames.pop_front();
        }
    }

    /// Pops one frame if the buffer has reached its low-water mark,
    /// otherwise yields silence without consuming anything (the tick
    /// never blocks, never panics).
    fn pop(&self) -> Option<Vec<i16>> {
        let mut frames = self.frames.lock();
        if frames.len() < self.low_water {
            return None;
        }
        frames.pop_front()
    }
}

/// Reads RTP payloads off the remote track, decodes each immediately,
/// and pushes the PCM frame onto a jitter buffer; a separate 20 ms
/// ticker drains at most one frame per tick into `playback`.
pub async fn spawn_inbound(
    track: Arc<TrackRemote>,
    mut decoder: Box<dyn Decoder>,
    playback: Arc<Playback>,
    cancel: CancellationToken,
) {
    let jitter = Arc::new(JitterBuffer::new());

    let reader = {
        let jitter = jitter.clone();
        let cancel = cancel.clone();
        async move {
            loop {
                let read = tokio::select! {
                    _ = cancel.cancelled() => return,
                    read = track.read_rtp() => read,
                };
                let (packet, _attrs) = match read {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(error = %e, "inbound track closed");
                        return;
                    }
                };
                match decoder.decode(&packet.payload) {
                    Ok(frame) => jitter.push(frame),
                    Err(e) => warn!(error = %e, "decode failed, dropping packet"),
                }
            }
        }
    };

    let ticker = {
        let jitter = jitter.clone();
        let cancel = cancel.clone();
        async move {
            let mut interval = tokio::time::interval(FRAME_DURATION);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {
                        if let Some(frame) = jitter.pop() {
                            playback.push_frame(&frame);
                        }
                    }
                }
            }
        }
    };

    tokio::join!(reader, ticker);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_buffer_drops_oldest_past_bound() {
        let jb = JitterBuffer::new();
        for i in 0..(jb.max_len + 5) {
            jb.push(vec![i as i16]);
        }
        let mut count = 0;
        while jb.pop().is_some() {
            count += 1;
        }
        assert!(count <= jb.max_len);
    }

    #[test]
    fn jitter_buffer_withholds_below_low_water() {
        let jb = JitterBuffer::new();
        jb.push(vec![1]);
        if jb.low_water > 1 {
            assert!(jb.pop().is_none());
        }
    }
}
