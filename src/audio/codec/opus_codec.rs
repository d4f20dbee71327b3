use opus::{Application, Channels, Decoder as NativeDecoder, Encoder as NativeEncoder};

use super::{Decoder, Encoder};
use crate::config::AudioConfig;
use crate::error::AppError;

/// Opus packets smaller than this are DTX/silence and suppressed
/// (`internal/audio/encoder/encoder_opus.go`'s `n < 3` check).
const DTX_MIN_PACKET_BYTES: usize = 3;
const MAX_PACKET_BYTES: usize = 4000;

fn channels_for(count: u16) -> Result<Channels, AppError> {
    match count {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(AppError::Codec(format!("unsupported channel count {other}"))),
    }
}

pub struct OpusEncoderAdapter {
    inner: NativeEncoder,
    frame_len: usize,
}

impl OpusEncoderAdapter {
    pub fn new(cfg: &AudioConfig) -> Result<Self, AppError> {
        let mut inner = NativeEncoder::new(cfg.sample_rate, channels_for(cfg.channels)?, Application::Voip)
            .map_err(|e| AppError::Codec(format!("failed to create opus encoder: {e}")))?;
        if let Err(e) = inner.set_dtx(true) {
            tracing::warn!(error = %e, "failed to enable opus DTX, falling back to size-based suppression");
        }
        Ok(OpusEncoderAdapter {
            inner,
            frame_len: cfg.frame_len(),
        })
    }
}

impl Encoder for OpusEncoderAdapter {
    fn encode(&mut self, pcm: &[i16]) -> Result<Option<Vec<u8>>, AppError> {
        if pcm.len() != self.frame_len {
            return Err(AppError::Codec(format!(
                "expected {} samples, got {}",
                self.frame_len,
                pcm.len()
            )));
        }

        let mut out = [0u8; MAX_PACKET_BYTES];
        let n = self
            .inner
            .encode(pcm, &mut out)
            .map_err(|e| AppError::Codec(format!("opus encode failed: {e}")))?;

        if n < DTX_MIN_PACKET_BYTES {
            return Ok(None);
        }
        Ok(Some(out[..n].to_vec()))
    }
}

pub struct OpusDecoderAdapter {
    inner: NativeDecoder,
    frame_len: usize,
    channels: usize,
}

impl OpusDecoderAdapter {
    pub fn new(cfg: &AudioConfig) -> Result<Self, AppError> {
        let inner = NativeDecoder::new(cfg.sample_rate, channels_for(cfg.channels)?)
            .map_err(|e| AppError::Codec(format!("failed to create opus decoder: {e}")))?;
        Ok(OpusDecoderAdapter {
            inner,
            frame_len: cfg.frame_len(),
            channels: cfg.channels as usize,
        })
    }
}

impl Decoder for OpusDecoderAdapter {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, AppError> {
        let mut out = vec![0i16; self.frame_len];
        let n = self
            .inner
            .decode(packet, &mut out, false)
            .map_err(|e| AppError::Codec(format!("opus decode failed: {e}")))?;
        out.truncate(n * self.channels);
        Ok(out)
    }
}
