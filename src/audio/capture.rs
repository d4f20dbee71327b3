//! Microphone capture → encode → bounded queue, grounded in the
//! teacher's `build_input_stream`/`build_input`, generalized from raw
//! UDP framing to the codec facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_channel::Sender;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, warn};

use super::codec::{self, Encoder};
use super::convert::ToI16Sample;
use super::SendStream;
use crate::config::AudioConfig;
use crate::error::AppError;

/// Owns the input `cpal::Stream`. Created paused; the caller toggles
/// audibility with [`Capture::set_paused`] from the control surface.
pub struct Capture {
    stream: SendStream,
    paused: Arc<AtomicBool>,
}

impl Capture {
    /// Opens the default input device and starts encoding into
    /// `packet_tx`, dropping frames once the queue is full rather than
    /// blocking the real-time audio thread.
    pub fn start(cfg: &AudioConfig, packet_tx: Sender<Vec<u8>>) -> Result<Self, AppError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AppError::Device("no default input device found".into()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| AppError::Device(format!("no default input config: {e}")))?;
        let sample_format = supported.sample_format();
        let stream_cfg: cpal::StreamConfig = supported.into();

        let encoder = codec::create_encoder(cfg)?;
        let paused = Arc::new(AtomicBool::new(true));

        let stream = build_stream_for_format(
            sample_format,
            &device,
            &stream_cfg,
            cfg.frame_len(),
            encoder,
            packet_tx,
            paused.clone(),
        )?;
        stream
            .pause()
            .map_err(|e| AppError::Device(format!("failed to pause input stream: {e}")))?;

        Ok(Capture {
            stream: SendStream(stream),
            paused,
        })
    }

    /// Starts the device callback running. The stream itself always
    /// runs once started; muting is implemented by the `paused` flag
    /// the callback checks first, never by pausing the OS stream.
    pub fn play(&self) -> Result<(), AppError> {
        self.stream
            .play()
            .map_err(|e| AppError::Device(format!("failed to start input stream: {e}")))
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

fn build_stream_for_format(
    format: cpal::SampleFormat,
    device: &cpal::Device,
    stream_cfg: &cpal::StreamConfig,
    frame_len: usize,
    encoder: Box<dyn Encoder>,
    packet_tx: Sender<Vec<u8>>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, AppError> {
    match format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, stream_cfg, frame_len, encoder, packet_tx, paused)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, stream_cfg, frame_len, encoder, packet_tx, paused)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, stream_cfg, frame_len, encoder, packet_tx, paused)
        }
        other => Err(AppError::Device(format!(
            "unsupported input sample format {other:?}"
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_cfg: &cpal::StreamConfig,
    frame_len: usize,
    mut encoder: Box<dyn Encoder>,
    packet_tx: Sender<Vec<u8>>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, AppError>
where
    T: cpal::Sample + cpal::SizedSample + ToI16Sample + Send + 'static,
{
    let err_fn = |e| error!(error = %e, "input stream error");
    let mut residual: Vec<i16> = Vec::with_capacity(frame_len);

    let stream = device
        .build_input_stream(
            stream_cfg,
            move |data: &[T], _| {
                if paused.load(Ordering::Relaxed) {
                    return;
                }
                for &sample in data {
                    residual.push(sample.to_i16_sample());
                    if residual.len() == frame_len {
                        match encoder.encode(&residual) {
                            Ok(Some(packet)) => {
                                let _ = packet_tx.try_send(packet);
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, "capture encode failed, dropping frame"),
                        }
                        residual.clear();
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AppError::Device(format!("failed to build input stream: {e}")))?;
    Ok(stream)
}
