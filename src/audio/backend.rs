// Render backends - who calls `RenderEngine::process`
//
// # Format Support
//
// `CpalBackend` opens the default output device and builds a stream in the
// device's preferred sample format:
// - **F32**: natif, pas de conversion
// - **I16**: commun sur Windows/WASAPI
// - **U16**: moins courant
//
// The engine always renders f32; `write_interleaved` converts while copying
// into the device buffer.
//
// Note: Sur macOS (CoreAudio), le Stream n'est pas Send/Sync. The backend has
// to stay on the thread that created it; only the engine moves into the
// callback.
//
// `OfflineBackend` pulls blocks by hand, for tests and bouncing.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{error, info};

use super::cpu_monitor::CpuMonitor;
use super::engine::RenderEngine;
use super::format_conversion::write_interleaved;
use crate::config::EngineConfig;
use crate::connection::status::{AtomicDeviceStatus, DeviceStatus};
use crate::error::{EngineError, EngineResult};

/// Narrow contract between the session and whatever drives the render engine
pub trait RenderBackend {
    fn sample_rate(&self) -> f32;

    /// Largest block the engine will be asked for at once
    fn block_size(&self) -> usize;

    /// Shared status handle; the session checks it before doing anything
    fn status(&self) -> AtomicDeviceStatus;

    fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Hand the engine over and start rendering
    fn start(&mut self, engine: RenderEngine) -> EngineResult<()>;
}

pub struct CpalBackend {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    block_size: usize,
    stream: Option<Stream>,
    status: AtomicDeviceStatus,
    cpu_monitor: CpuMonitor,
}

impl CpalBackend {
    /// Open the default output device. Nothing plays until `start`.
    pub fn open(engine_config: &EngineConfig) -> EngineResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::BackendUnavailable("no output device found".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::StreamConfig(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "Audio device opened"
        );

        let block_size = match config.buffer_size {
            cpal::BufferSize::Fixed(size) => size as usize,
            cpal::BufferSize::Default => engine_config.block_size,
        };
        let cpu_monitor = CpuMonitor::new(config.sample_rate.0 as f32, 10);

        Ok(Self {
            device,
            config,
            sample_format,
            block_size,
            stream: None,
            status: AtomicDeviceStatus::new(DeviceStatus::Connecting),
            cpu_monitor,
        })
    }

    pub fn cpu_monitor(&self) -> &CpuMonitor {
        &self.cpu_monitor
    }

    /// Stop the stream. The engine is dropped with it.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            self.status.set(DeviceStatus::Disconnected);
            info!("Audio stream stopped");
        }
    }

    fn build_stream<T>(&self, engine: RenderEngine) -> EngineResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let cpu_monitor = self.cpu_monitor.clone();
        let status = self.status.clone();
        let mut engine = engine;
        let mut left = vec![0.0f32; engine.max_block()];
        let mut right = vec![0.0f32; engine.max_block()];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // ========== SACRED ZONE ==========
                    let measure = cpu_monitor.start_measure();
                    let total = data.len() / channels.max(1);

                    let mut done = 0;
                    for chunk in data.chunks_mut(left.len() * channels.max(1)) {
                        let frames = chunk.len() / channels.max(1);
                        engine.process(&mut left[..frames], &mut right[..frames]);
                        write_interleaved(&left[..frames], &right[..frames], chunk, channels);
                        done += frames;
                    }

                    cpu_monitor.end_measure(measure, done.min(total));
                    // ========== SACRED ZONE END ==========
                },
                move |err| {
                    error!(%err, "Audio stream error");
                    status.set(DeviceStatus::Error);
                },
                None,
            )
            .map_err(|e| EngineError::StreamConfig(e.to_string()))
    }
}

impl RenderBackend for CpalBackend {
    fn sample_rate(&self) -> f32 {
        self.config.sample_rate.0 as f32
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn status(&self) -> AtomicDeviceStatus {
        self.status.clone()
    }

    fn start(&mut self, engine: RenderEngine) -> EngineResult<()> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(engine),
            SampleFormat::I16 => self.build_stream::<i16>(engine),
            SampleFormat::U16 => self.build_stream::<u16>(engine),
            other => Err(EngineError::UnsupportedSampleFormat(format!("{other:?}"))),
        };
        let stream = stream.inspect_err(|_| self.status.set(DeviceStatus::Error))?;

        stream.play().map_err(|e| {
            self.status.set(DeviceStatus::Error);
            EngineError::BackendUnavailable(e.to_string())
        })?;

        self.stream = Some(stream);
        self.status.set(DeviceStatus::Connected);
        info!(sample_rate = self.sample_rate(), "Audio engine started");
        Ok(())
    }
}

/// Renders only when asked to
pub struct OfflineBackend {
    sample_rate: f32,
    block_size: usize,
    engine: Option<RenderEngine>,
    status: AtomicDeviceStatus,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl OfflineBackend {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            sample_rate,
            block_size,
            engine: None,
            status: AtomicDeviceStatus::new(DeviceStatus::Disconnected),
            left: vec![0.0; block_size],
            right: vec![0.0; block_size],
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate as f32, config.block_size)
    }

    /// Render one block; `None` before `start`
    pub fn render_block(&mut self) -> Option<(&[f32], &[f32])> {
        let engine = self.engine.as_mut()?;
        engine.process(&mut self.left, &mut self.right);
        Some((&self.left, &self.right))
    }

    /// Render `frames` frames into new planar buffers
    pub fn render(&mut self, frames: usize) -> EngineResult<(Vec<f32>, Vec<f32>)> {
        let engine = self.engine.as_mut().ok_or(EngineError::BackendNotReady)?;
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        engine.process(&mut left, &mut right);
        Ok((left, right))
    }

    /// Render `frames` frames as interleaved stereo
    pub fn render_interleaved(&mut self, frames: usize) -> EngineResult<Vec<f32>> {
        let (left, right) = self.render(frames)?;
        let mut out = vec![0.0; frames * 2];
        write_interleaved(&left, &right, &mut out, 2);
        Ok(out)
    }
}

impl RenderBackend for OfflineBackend {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn status(&self) -> AtomicDeviceStatus {
        self.status.clone()
    }

    fn start(&mut self, engine: RenderEngine) -> EngineResult<()> {
        self.engine = Some(engine);
        self.status.set(DeviceStatus::Connected);
        Ok(())
    }
}
