//! Speaker playback, grounded in the teacher's `build_output_stream`
//! and the original's `internal/audio/playback/playback.go`. Decoding
//! and jitter handling live in [`super::pipeline`]; this module only
//! owns the device and the PCM residual the pipeline's ticker feeds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::error;

use super::convert::FromI16Sample;
use super::SendStream;
use crate::config::AudioConfig;
use crate::error::AppError;

/// Bound on the residual queue, generous enough to absorb a scheduling
/// hiccup without unbounded growth (`queue_capacity` frames worth).
fn residual_cap(cfg: &AudioConfig) -> usize {
    cfg.frame_len() * 4
}

/// Owns the output `cpal::Stream` and the PCM residual buffer fed by
/// the inbound pipeline task.
pub struct Playback {
    stream: SendStream,
    residual: Arc<Mutex<VecDeque<i16>>>,
    paused: Arc<AtomicBool>,
    cap: usize,
}

impl Playback {
    pub fn start(cfg: &AudioConfig) -> Result<Self, AppError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AppError::Device("no default output device found".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| AppError::Device(format!("no default output config: {e}")))?;
        let sample_format = supported.sample_format();
        let stream_cfg: cpal::StreamConfig = supported.into();

        let residual = Arc::new(Mutex::new(VecDeque::<i16>::new()));
        let paused = Arc::new(AtomicBool::new(true));
        let channels = stream_cfg.channels as usize;

        let stream = build_stream_for_format(
            sample_format,
            &device,
            &stream_cfg,
            channels,
            residual.clone(),
            paused.clone(),
        )?;
        stream
            .pause()
            .map_err(|e| AppError::Device(format!("failed to pause output stream: {e}")))?;

        Ok(Playback {
            stream: SendStream(stream),
            residual,
            paused,
            cap: residual_cap(cfg),
        })
    }

    pub fn play(&self) -> Result<(), AppError> {
        self.stream
            .play()
            .map_err(|e| AppError::Device(format!("failed to start output stream: {e}")))
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Appends one decoded PCM frame to the residual, dropping the
    /// oldest samples if the device has fallen behind and the residual
    /// would otherwise grow without bound.
    pub fn push_frame(&self, frame: &[i16]) {
        let mut residual = self.residual.lock();
        residual.extend(frame.iter().copied());
        while residual.len() > self.cap {
            residual.pop_front();
        }
    }
}

fn build_stream_for_format(
    format: cpal::SampleFormat,
    device: &cpal::Device,
    stream_cfg: &cpal::StreamConfig,
    channels: usize,
    residual: Arc<Mutex<VecDeque<i16>>>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, AppError> {
    match format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, stream_cfg, channels, residual, paused)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, stream_cfg, channels, residual, paused)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, stream_cfg, channels, residual, paused)
        }
        other => Err(AppError::Device(format!(
            "unsupported output sample format {other:?}"
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    stream_cfg: &cpal::StreamConfig,
    _channels: usize,
    residual: Arc<Mutex<VecDeque<i16>>>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, AppError>
where
    T: cpal::Sample + cpal::SizedSample + FromI16Sample + Send + 'static,
{
    let err_fn = |e| error!(error = %e, "output stream error");

    let stream = device
        .build_output_stream(
            stream_cfg,
            move |out: &mut [T], _| {
                if paused.load(Ordering::Relaxed) {
                    out.fill(T::from_i16_sample(0));
                    return;
                }
                let mut residual = residual.lock();
                for slot in out.iter_mut() {
                    let sample = residual.pop_front().unwrap_or(0);
                    *slot = T::from_i16_sample(sample);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AppError::Device(format!("failed to build output stream: {e}")))?;
    Ok(stream)
}
