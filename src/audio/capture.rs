//! Microphone capture
//!
//! Device samples are downmixed to mono, resampled to the agent rate and cut
//! into fixed-size windows. Each full window is quantized to PCM16 and handed
//! to the frame sink as an [`AudioChunk`]. The sink decides whether a frame is
//! forwarded or dropped; capture itself never queues frames.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::chunk::{AudioChunk, SAMPLE_RATE};
use super::convert;
use crate::error::DeviceError;

/// Samples per captured window
pub const DEFAULT_WINDOW_SIZE: usize = 2048;

/// Receives every completed capture window
///
/// Called from the device thread; implementations must not block.
pub type FrameSink = Box<dyn FnMut(AudioChunk) + Send + 'static>;

/// Configuration for microphone capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Output sample rate (frames are resampled if the device differs)
    pub sample_rate: u32,
    /// Samples per emitted frame
    pub window_size: usize,
    /// Input device name (None = host default)
    pub device_name: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            device_name: None,
        }
    }
}

/// Audio capture source
///
/// Implementations:
/// - [`MicrophoneCapture`]: cpal input device
/// - test doubles that push synthetic frames
pub trait CaptureSource {
    /// Acquire the device and start delivering frames to `sink`
    fn start(&mut self, sink: FrameSink) -> Result<(), DeviceError>;

    /// Release the device. Idempotent; a no-op when not started.
    fn stop(&mut self);

    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Turns raw interleaved device samples into fixed-size mono PCM16 frames
pub struct FrameAssembler {
    window_size: usize,
    channels: usize,
    /// Input samples consumed per output sample
    step: f64,
    /// Read position relative to the current input block; -1 addresses `previous`
    position: f64,
    previous: f32,
    mono: Vec<f32>,
    window: Vec<f32>,
    pcm: Vec<i16>,
}

impl FrameAssembler {
    pub fn new(window_size: usize, channels: u16, input_rate: u32, output_rate: u32) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            channels: channels.max(1) as usize,
            step: input_rate as f64 / output_rate as f64,
            position: 0.0,
            previous: 0.0,
            mono: Vec::new(),
            window: Vec::with_capacity(window_size),
            pcm: Vec::with_capacity(window_size),
        }
    }

    /// Samples collected towards the next frame
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    /// Discard any partial window and resampler history
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.previous = 0.0;
        self.mono.clear();
        self.window.clear();
    }

    /// Feed interleaved device samples; `emit` is called once per completed window
    pub fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(AudioChunk)) {
        let mut mono = std::mem::take(&mut self.mono);
        mono.clear();
        for frame in interleaved.chunks(self.channels) {
            let sum: f32 = frame.iter().sum();
            mono.push(sum / frame.len() as f32);
        }

        if (self.step - 1.0).abs() < f64::EPSILON {
            for &sample in &mono {
                self.push_sample(sample, &mut emit);
            }
        } else if !mono.is_empty() {
            // Linear interpolation across block boundaries
            let last = (mono.len() - 1) as f64;
            while self.position < last {
                let index = self.position.floor();
                let frac = (self.position - index) as f32;
                let a = if index < 0.0 {
                    self.previous
                } else {
                    mono[index as usize]
                };
                let b = mono[(index + 1.0) as usize];
                self.push_sample(a + (b - a) * frac, &mut emit);
                self.position += self.step;
            }
            self.position -= mono.len() as f64;
            self.previous = mono[mono.len() - 1];
        }

        self.mono = mono;
    }

    fn push_sample(&mut self, sample: f32, emit: &mut impl FnMut(AudioChunk)) {
        self.window.push(sample);
        if self.window.len() == self.window_size {
            convert::float_to_pcm16(&self.window, &mut self.pcm);
            self.window.clear();
            emit(AudioChunk::from_samples(&self.pcm));
        }
    }
}

/// Microphone capture through the host's default audio API
pub struct MicrophoneCapture {
    config: CaptureConfig,
    stream: Option<cpal::Stream>,
    capturing: Arc<AtomicBool>,
    device_name: String,
}

impl MicrophoneCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stream: None,
            capturing: Arc::new(AtomicBool::new(false)),
            device_name: String::from("microphone"),
        }
    }
}

impl CaptureSource for MicrophoneCapture {
    fn start(&mut self, sink: FrameSink) -> Result<(), DeviceError> {
        if self.stream.is_some() {
            warn!("Capture already running on {}", self.device_name);
            return Ok(());
        }

        let host = cpal::default_host();
        let device = select_input_device(&host, self.config.device_name.as_deref())?;
        self.device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = choose_input_config(&device, self.config.sample_rate)?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        info!(
            "Using input device: {} ({}Hz, {} channels, {:?})",
            self.device_name, stream_config.sample_rate.0, stream_config.channels, sample_format
        );
        info!("Echo cancellation, noise suppression and gain control are not exposed by the host API; capturing raw input");

        let assembler = FrameAssembler::new(
            self.config.window_size,
            stream_config.channels,
            stream_config.sample_rate.0,
            self.config.sample_rate,
        );

        // Set before play() so the first callback is not discarded
        self.capturing.store(true, Ordering::SeqCst);

        let built = match sample_format {
            cpal::SampleFormat::F32 => {
                build_input::<f32>(&device, &stream_config, assembler, sink, &self.capturing)
            }
            cpal::SampleFormat::I16 => {
                build_input::<i16>(&device, &stream_config, assembler, sink, &self.capturing)
            }
            cpal::SampleFormat::U16 => {
                build_input::<u16>(&device, &stream_config, assembler, sink, &self.capturing)
            }
            format => Err(DeviceError::UnsupportedFormat(format!("{:?}", format))),
        };

        let stream = match built.and_then(|s| s.play().map(|_| s).map_err(DeviceError::from)) {
            Ok(stream) => stream,
            Err(e) => {
                self.capturing.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        self.stream = Some(stream);
        info!("Capture started");

        Ok(())
    }

    fn stop(&mut self) {
        self.capturing.store(false, Ordering::SeqCst);

        // Dropping the stream detaches the callback and releases the device
        if self.stream.take().is_some() {
            info!("Capture stopped: {}", self.device_name);
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut assembler: FrameAssembler,
    mut sink: FrameSink,
    capturing: &Arc<AtomicBool>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    use cpal::Sample;

    let capturing = Arc::clone(capturing);
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !capturing.load(Ordering::Relaxed) {
                return;
            }
            scratch.clear();
            scratch.extend(data.iter().map(|s| s.to_sample::<f32>()));
            assembler.push(&scratch, &mut sink);
        },
        |err| error!("Audio input error: {}", err),
        None,
    )?;

    Ok(stream)
}

fn select_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    match name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string())),
        None => host
            .default_input_device()
            .ok_or(DeviceError::NoDevice("input")),
    }
}

/// Prefer a mono config at the agent rate, then any channel count at that
/// rate, then the device default
fn choose_input_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let rate = cpal::SampleRate(sample_rate);
    let ranges: Vec<_> = device
        .supported_input_configs()?
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .collect();

    let preferred = ranges
        .iter()
        .find(|r| r.channels() == 1)
        .or_else(|| ranges.first());

    match preferred {
        Some(range) => Ok(range.clone().with_sample_rate(rate)),
        None => Ok(device.default_input_config()?),
    }
}

/// Names of the available input devices
pub fn input_device_names() -> Result<Vec<String>, DeviceError> {
    let host = cpal::default_host();
    Ok(host
        .input_devices()?
        .filter_map(|d| d.name().ok())
        .collect())
}
