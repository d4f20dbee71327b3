//! PCMU/G.711 μ-law codec, ported from
//! `internal/audio/encoder/encoder_pcmu.go` and
//! `internal/audio/decoder/decoder_pcmu.go`.

use super::{Decoder, Encoder};
use crate::config::ENERGY_THRESHOLD;
use crate::error::AppError;

const MU_BIAS: i16 = 0x84;
const MU_CLIP: i16 = 32635;

/// μ-law encodes one linear PCM16 sample (sign/clamp/bias/segment
/// search, then complement the byte).
pub fn linear16_to_mulaw(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80u8 } else { 0x00 };
    let mut magnitude = if sample < 0 {
        sample.saturating_neg()
    } else {
        sample
    };
    if magnitude > MU_CLIP {
        magnitude = MU_CLIP;
    }
    magnitude += MU_BIAS;

    let mut exponent: u8 = 7;
    let mut mask: i16 = 0x4000;
    while (magnitude & mask) == 0 && exponent > 0 {
        mask >>= 1;
        exponent -= 1;
    }
    let mantissa = ((magnitude >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Inverse of [`linear16_to_mulaw`].
pub fn mulaw_to_linear16(mu: u8) -> i16 {
    let mu = !mu;
    let sign = mu & 0x80;
    let exponent = (mu >> 4) & 0x07;
    let mantissa = (mu & 0x0F) as i16;
    let segment_end = (MU_BIAS) << exponent;
    let step = 1i16 << (exponent + 3);
    let value = segment_end + mantissa * step - MU_BIAS;
    if sign != 0 {
        -value
    } else {
        value
    }
}

fn encode_pcm16_to_mulaw(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().copied().map(linear16_to_mulaw).collect()
}

fn decode_mulaw_to_pcm16(mu: &[u8]) -> Vec<i16> {
    mu.iter().copied().map(mulaw_to_linear16).collect()
}

/// RMS energy AND zero-crossing-rate gate (spec.md §4.1); only used by
/// the PCMU path since Opus relies on native DTX.
fn is_silence(frame: &[i16]) -> bool {
    if frame.is_empty() {
        return true;
    }

    let sum_squares: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / frame.len() as f64).sqrt();
    if rms < ENERGY_THRESHOLD {
        return true;
    }

    let zero_crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0) != (w[1] >= 0))
        .count();
    let zcr = zero_crossings as f64 / frame.len() as f64;
    zcr < 0.1
}

#[derive(Default)]
pub struct PcmuEncoder;

impl PcmuEncoder {
    pub fn new() -> Self {
        PcmuEncoder
    }
}

impl Encoder for PcmuEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Option<Vec<u8>>, AppError> {
        if is_silence(pcm) {
            return Ok(None);
        }
        Ok(Some(encode_pcm16_to_mulaw(pcm)))
    }
}

#[derive(Default)]
pub struct PcmuDecoder;

impl PcmuDecoder {
    pub fn new() -> Self {
        PcmuDecoder
    }
}

impl Decoder for PcmuDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, AppError> {
        Ok(decode_mulaw_to_pcm16(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clamp(s: i16) -> i16 {
        s.clamp(-MU_CLIP, MU_CLIP)
    }

    #[test]
    fn mulaw_round_trip_is_within_one_segment_quantum() {
        for sample in (-32000i32..32000).step_by(137) {
            let s = sample as i16;
            let encoded = linear16_to_mulaw(s);
            let decoded = mulaw_to_linear16(encoded);
            let clamped = clamp(s);
            assert!(
                (decoded - clamped).abs() <= 8 * 32,
                "sample {s} decoded to {decoded}, expected near {clamped}"
            );
        }
    }

    #[test]
    fn silent_frame_is_suppressed() {
        let mut enc = PcmuEncoder::new();
        let frame = vec![0i16; 160];
        assert_eq!(enc.encode(&frame).unwrap(), None);
    }

    #[test]
    fn loud_frame_is_encoded() {
        let mut enc = PcmuEncoder::new();
        let frame: Vec<i16> = (0..160)
            .map(|i| ((i as f32 / 160.0 * std::f32::consts::TAU * 4.0).sin() * 20000.0) as i16)
            .collect();
        let packet = enc.encode(&frame).unwrap().expect("should not be silence");
        assert_eq!(packet.len(), frame.len());
    }

    #[test]
    fn decode_output_length_matches_input_length() {
        let mut dec = PcmuDecoder::new();
        let packet = vec![0xFFu8; 160];
        let pcm = dec.decode(&packet).unwrap();
        assert_eq!(pcm.len(), 160);
    }
}
