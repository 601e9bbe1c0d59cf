//! Speaker output honouring scheduled start times
//!
//! The scheduler hands over owned sample buffers tagged with a start frame.
//! They travel to the real-time callback through a lock-free SPSC ring, so the
//! callback never waits on a lock held by the coordinator. The callback keeps
//! the output clock: a count of elapsed frames at the agent sample rate.
//!
//! Forced stop works through a generation counter. `stop_all` bumps it, and
//! the callback discards every buffer from an older generation on its next
//! period, including one that is partway through playing. A buffer can carry
//! a newer generation than the counter the callback last read; it counts as
//! the stop having happened.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::chunk::SAMPLE_RATE;
use super::playback::PlaybackSink;
use crate::error::{DeviceError, PlaybackError};

/// Scheduled buffers that can be in flight to the callback at once
const SCHEDULE_CAPACITY: usize = 256;

struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
    generation: u64,
}

/// State owned by the output callback
struct OutputTimeline {
    consumer: HeapCons<ScheduledBuffer>,
    pending: VecDeque<ScheduledBuffer>,
    played_frames: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
    seen_generation: u64,
    /// Timeline frames per device frame
    step: f64,
    position: f64,
}

impl OutputTimeline {
    fn render<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        use cpal::Sample;

        let generation = self.generation.load(Ordering::Acquire);
        self.advance_generation(generation);

        while let Some(buffer) = self.consumer.try_pop() {
            self.advance_generation(buffer.generation);
            if buffer.generation == self.seen_generation {
                self.pending.push_back(buffer);
            }
        }

        for frame in data.chunks_mut(channels) {
            let value = self.sample_at(self.position as u64);
            for out in frame.iter_mut() {
                *out = T::from_sample(value);
            }
            self.position += self.step;
        }

        self.played_frames
            .store(self.position as u64, Ordering::Release);
    }

    /// Generations only move forward; anything older is stale
    fn advance_generation(&mut self, generation: u64) {
        if generation > self.seen_generation {
            self.pending.clear();
            self.seen_generation = generation;
        }
    }

    fn sample_at(&mut self, frame: u64) -> f32 {
        while let Some(front) = self.pending.front() {
            let end = front.start_frame + front.samples.len() as u64;
            if end <= frame {
                self.pending.pop_front();
                continue;
            }
            if front.start_frame <= frame {
                return front.samples[(frame - front.start_frame) as usize];
            }
            break;
        }
        0.0
    }
}

/// cpal-backed [`PlaybackSink`]
pub struct CpalPlaybackSink {
    _stream: cpal::Stream,
    producer: HeapProd<ScheduledBuffer>,
    played_frames: Arc<AtomicU64>,
    generation: Arc<AtomicU64>,
    last_error: Arc<Mutex<Option<String>>>,
    sample_rate: u32,
}

impl CpalPlaybackSink {
    /// Open the named (or default) output device and start the clock
    pub fn open(device_name: Option<&str>, sample_rate: u32) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_output_device()
                .ok_or(DeviceError::NoDevice("output"))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = choose_output_config(&device, sample_rate)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        info!(
            "Using output device: {} ({}Hz, {} channels, {:?})",
            device_name, config.sample_rate.0, config.channels, sample_format
        );

        let (producer, consumer) = HeapRb::<ScheduledBuffer>::new(SCHEDULE_CAPACITY).split();
        let played_frames = Arc::new(AtomicU64::new(0));
        let generation = Arc::new(AtomicU64::new(0));
        let last_error = Arc::new(Mutex::new(None));

        let timeline = OutputTimeline {
            consumer,
            pending: VecDeque::with_capacity(SCHEDULE_CAPACITY),
            played_frames: Arc::clone(&played_frames),
            generation: Arc::clone(&generation),
            seen_generation: 0,
            step: sample_rate as f64 / config.sample_rate.0 as f64,
            position: 0.0,
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, timeline, &last_error),
            cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, timeline, &last_error),
            cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, timeline, &last_error),
            format => Err(DeviceError::UnsupportedFormat(format!("{:?}", format))),
        }?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            producer,
            played_frames,
            generation,
            last_error,
            sample_rate,
        })
    }

    fn take_device_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl PlaybackSink for CpalPlaybackSink {
    fn now(&self) -> f64 {
        self.played_frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn schedule(&mut self, samples: &[f32], start_at: f64) -> Result<(), PlaybackError> {
        // Stream errors arrive asynchronously; surface them on the next call
        if let Some(message) = self.take_device_error() {
            return Err(PlaybackError::Device(message));
        }

        let buffer = ScheduledBuffer {
            start_frame: (start_at * self.sample_rate as f64).round() as u64,
            samples: samples.to_vec(),
            generation: self.generation.load(Ordering::Acquire),
        };

        self.producer
            .try_push(buffer)
            .map_err(|_| PlaybackError::Device("output schedule is full".to_string()))
    }

    fn stop_all(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut timeline: OutputTimeline,
    last_error: &Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let last_error = Arc::clone(last_error);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| timeline.render(data, channels),
        move |err| {
            error!("Audio output error: {}", err);
            if let Ok(mut slot) = last_error.lock() {
                *slot = Some(err.to_string());
            }
        },
        None,
    )?;

    Ok(stream)
}

fn choose_output_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, DeviceError> {
    let rate = cpal::SampleRate(sample_rate);
    let matching = device
        .supported_output_configs()?
        .find(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate());

    match matching {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => Ok(device.default_output_config()?),
    }
}

/// Names of the available output devices
pub fn output_device_names() -> Result<Vec<String>, DeviceError> {
    let host = cpal::default_host();
    Ok(host
        .output_devices()?
        .filter_map(|d| d.name().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(step: f64) -> (OutputTimeline, HeapProd<ScheduledBuffer>, Arc<AtomicU64>, Arc<AtomicU64>) {
        let (producer, consumer) = HeapRb::<ScheduledBuffer>::new(8).split();
        let played = Arc::new(AtomicU64::new(0));
        let generation = Arc::new(AtomicU64::new(0));
        let timeline = OutputTimeline {
            consumer,
            pending: VecDeque::new(),
            played_frames: Arc::clone(&played),
            generation: Arc::clone(&generation),
            seen_generation: 0,
            step,
            position: 0.0,
        };
        (timeline, producer, played, generation)
    }

    fn buffer(start_frame: u64, samples: Vec<f32>, generation: u64) -> ScheduledBuffer {
        ScheduledBuffer {
            start_frame,
            samples,
            generation,
        }
    }

    #[test]
    fn test_renders_at_scheduled_frame() {
        let (mut timeline, mut producer, played, _) = timeline(1.0);
        assert!(producer.try_push(buffer(2, vec![0.5, 0.25], 0)).is_ok());

        let mut out = [1.0f32; 5];
        timeline.render(&mut out, 1);

        assert_eq!(out, [0.0, 0.0, 0.5, 0.25, 0.0]);
        assert_eq!(played.load(Ordering::Acquire), 5);
    }

    #[test]
    fn test_contiguous_buffers_play_back_to_back() {
        let (mut timeline, mut producer, _, _) = timeline(1.0);
        assert!(producer.try_push(buffer(0, vec![0.1, 0.2], 0)).is_ok());
        assert!(producer.try_push(buffer(2, vec![0.3], 0)).is_ok());

        let mut out = [0.0f32; 4];
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.0]);
    }

    #[test]
    fn test_stop_generation_silences_in_flight_buffer() {
        let (mut timeline, mut producer, _, generation) = timeline(1.0);
        assert!(producer.try_push(buffer(0, vec![0.5; 8], 0)).is_ok());

        let mut out = [0.0f32; 2];
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.5, 0.5]);

        generation.fetch_add(1, Ordering::AcqRel);
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.0, 0.0]);
    }

    #[test]
    fn test_buffer_from_newer_generation_survives_stop() {
        let (mut timeline, mut producer, _, generation) = timeline(1.0);
        assert!(producer.try_push(buffer(0, vec![0.25; 4], 0)).is_ok());
        // Scheduled after a stop the callback has not observed yet
        assert!(producer.try_push(buffer(0, vec![0.5; 8], 1)).is_ok());

        let mut out = [0.0f32; 2];
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.5, 0.5]);

        generation.fetch_add(1, Ordering::AcqRel);
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.5, 0.5]);
    }

    #[test]
    fn test_stale_buffer_dropped_after_stop() {
        let (mut timeline, mut producer, _, generation) = timeline(1.0);
        generation.fetch_add(1, Ordering::AcqRel);
        assert!(producer.try_push(buffer(0, vec![0.5; 4], 0)).is_ok());

        let mut out = [1.0f32; 4];
        timeline.render(&mut out, 1);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_stereo_output_duplicates_mono() {
        let (mut timeline, mut producer, played, _) = timeline(0.5);
        assert!(producer.try_push(buffer(0, vec![0.5], 0)).is_ok());

        // 48kHz stereo device: two device frames per timeline frame
        let mut out = [0.0f32; 6];
        timeline.render(&mut out, 2);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(played.load(Ordering::Acquire), 1);
    }
}
