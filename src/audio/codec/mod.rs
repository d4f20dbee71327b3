//! Uniform encode/decode facade over Opus and PCMU (spec.md §4.1),
//! grounded in `internal/audio/codec/iface/codec.go` and the factory
//! split between `factory.go`/`factory_opus.go` of the original.

#[cfg(feature = "opus-codec")]
mod opus_codec;
mod pcmu;

use crate::config::{AudioConfig, CodecKind};
use crate::error::AppError;

/// Encodes one 20 ms PCM frame at a time.
///
/// `encode` receives exactly `frame_size * channels` interleaved `i16`
/// samples. Returns `Ok(None)` for DTX/silence suppression, `Ok(Some(_))`
/// for an encoded packet, `Err` if the input is malformed.
pub trait Encoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> Result<Option<Vec<u8>>, AppError>;
}

/// Decodes one encoded packet into a PCM frame of `frame_size *
/// channels` samples.
pub trait Decoder: Send {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, AppError>;
}

/// Builds the encoder for `cfg.codec`. Fails with
/// [`AppError::CodecUnavailable`] if Opus is requested in a build
/// compiled without the `opus-codec` feature.
pub fn create_encoder(cfg: &AudioConfig) -> Result<Box<dyn Encoder>, AppError> {
    match cfg.codec {
        CodecKind::Pcmu => Ok(Box::new(pcmu::PcmuEncoder::new())),
        #[cfg(feature = "opus-codec")]
        CodecKind::Opus => Ok(Box::new(opus_codec::OpusEncoderAdapter::new(cfg)?)),
        #[cfg(not(feature = "opus-codec"))]
        CodecKind::Opus => Err(AppError::CodecUnavailable(
            "opus codec requires the opus-codec feature".into(),
        )),
    }
}

/// Builds the decoder for `cfg.codec`. See [`create_encoder`].
pub fn create_decoder(cfg: &AudioConfig) -> Result<Box<dyn Decoder>, AppError> {
    match cfg.codec {
        CodecKind::Pcmu => Ok(Box::new(pcmu::PcmuDecoder::new())),
        #[cfg(feature = "opus-codec")]
        CodecKind::Opus => Ok(Box::new(opus_codec::OpusDecoderAdapter::new(cfg)?)),
        #[cfg(not(feature = "opus-codec"))]
        CodecKind::Opus => Err(AppError::CodecUnavailable(
            "opus codec requires the opus-codec feature".into(),
        )),
    }
}
