/// Frames to retain in the jitter buffer before applying back-pressure
/// (spec.md §3, `JitterBufferSize` in the original).
pub const JITTER_BUFFER_SIZE: usize = 2;

/// RMS threshold under which a PCMU frame is treated as silence.
pub const ENERGY_THRESHOLD: f64 = 500.0;

const SAMPLE_RATE_OPUS: u32 = 48_000;
const FRAME_SAMPLES_OPUS: usize = 960; // 20 ms @ 48 kHz
const CHANNELS_OPUS: u16 = 1;

const SAMPLE_RATE_PCMU: u32 = 8_000;
const FRAME_SAMPLES_PCMU: usize = 160; // 20 ms @ 8 kHz
const CHANNELS_PCMU: u16 = 1;

const DEFAULT_QUEUE_CAPACITY: usize = 300;

/// Which codec a session was built with. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Opus,
    Pcmu,
}

impl CodecKind {
    /// Reads the `AUDIO_CODEC` environment variable (`opus` | `pcmu`),
    /// defaulting to Opus when unset.
    pub fn from_env() -> Self {
        match std::env::var("AUDIO_CODEC").as_deref() {
            Ok("pcmu") | Ok("PCMU") => CodecKind::Pcmu,
            _ => CodecKind::Opus,
        }
    }
}

/// Immutable per-session audio configuration (spec.md §3).
///
/// Invariant: `frame_size` milliseconds always equals
/// `1000 * frame_size / sample_rate`, fixed at 20 ms for both codecs.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub codec: CodecKind,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub channels: u16,
    pub queue_capacity: usize,
    pub mime_type: &'static str,
    pub payload_type: u8,
    pub sdp_fmtp_line: &'static str,
}

impl AudioConfig {
    pub fn opus() -> Self {
        AudioConfig {
            codec: CodecKind::Opus,
            sample_rate: SAMPLE_RATE_OPUS,
            frame_size: FRAME_SAMPLES_OPUS,
            channels: CHANNELS_OPUS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mime_type: webrtc::api::media_engine::MIME_TYPE_OPUS,
            payload_type: 111,
            sdp_fmtp_line:
                "minptime=10;useinbandfec=1;maxaveragebitrate=64000;stereo=0;sprop-stereo=0;cbr=0",
        }
    }

    pub fn pcmu() -> Self {
        AudioConfig {
            codec: CodecKind::Pcmu,
            sample_rate: SAMPLE_RATE_PCMU,
            frame_size: FRAME_SAMPLES_PCMU,
            channels: CHANNELS_PCMU,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mime_type: webrtc::api::media_engine::MIME_TYPE_PCMU,
            payload_type: 0,
            sdp_fmtp_line: "",
        }
    }

    pub fn for_codec(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Opus => Self::opus(),
            CodecKind::Pcmu => Self::pcmu(),
        }
    }

    /// Samples per 20 ms frame across all channels.
    pub fn frame_len(&self) -> usize {
        self.frame_size * self.channels as usize
    }
}

/// Valid Opus frame sizes per the rates the encoder may be asked to
/// support: `{2.5, 5, 10, 20, 40, 60}` ms (spec.md §8).
pub fn is_opus_frame_size_valid(sample_rate: u32, frame_size: usize) -> bool {
    let unit = sample_rate as usize / 400; // 2.5 ms worth of samples
    if unit == 0 {
        return false;
    }
    [unit, unit * 2, unit * 4, unit * 8, unit * 16, unit * 24].contains(&frame_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opus_config_is_20ms_at_48khz() {
        let cfg = AudioConfig::opus();
        let ms = 1000.0 * cfg.frame_size as f64 / cfg.sample_rate as f64;
        assert_eq!(ms, 20.0);
    }

    #[test]
    fn pcmu_config_is_20ms_at_8khz() {
        let cfg = AudioConfig::pcmu();
        let ms = 1000.0 * cfg.frame_size as f64 / cfg.sample_rate as f64;
        assert_eq!(ms, 20.0);
        assert_eq!(cfg.sample_rate, 8_000);
        assert_eq!(cfg.channels, 1);
    }

    #[test]
    fn every_standard_opus_rate_accepts_the_six_canonical_frame_sizes() {
        for &rate in &[8_000u32, 16_000, 24_000, 48_000] {
            let unit = rate as usize / 400;
            for k in [1, 2, 4, 8, 16, 24] {
                assert!(is_opus_frame_size_valid(rate, unit * k));
            }
            assert!(!is_opus_frame_size_valid(rate, unit * 3));
        }
    }
}
