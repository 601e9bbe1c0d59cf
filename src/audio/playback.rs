//! Gapless playback scheduling for agent speech
//!
//! Chunks arrive from the transport at network cadence. Each one is decoded
//! and placed on the output clock exactly where the previous chunk ends, so
//! consecutive chunks play with no gap and no overlap. When the user starts
//! talking over the agent, [`PlaybackScheduler::interrupt`] silences the
//! output immediately.

use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

use super::chunk::{AudioChunk, SAMPLE_RATE};
use super::convert;
use crate::error::{DecodeError, PlaybackError};

/// Rounding slack when deciding that the last scheduled chunk has finished
///
/// Applied to the end time only. Speech may be reported finished at most this
/// long before the final sample; the output clock moves in whole frames, so
/// an exact comparison can miss the end by a fraction of a frame.
pub const SPEAKING_EPSILON_SECS: f64 = 0.001;

/// Output device abstraction used by the scheduler
///
/// Implementations:
/// - [`crate::audio::CpalPlaybackSink`]: speaker output through cpal
/// - test doubles with a manually advanced clock
pub trait PlaybackSink {
    /// Current output clock time in seconds
    fn now(&self) -> f64;

    /// Queue `samples` (mono, at the agent rate) to start at `start_at` seconds
    fn schedule(&mut self, samples: &[f32], start_at: f64) -> Result<(), PlaybackError>;

    /// Silence everything scheduled, including a buffer that is already playing
    fn stop_all(&mut self);
}

/// Placement of one chunk on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledWindow {
    pub start: f64,
    pub duration: f64,
}

impl ScheduledWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Result of draining the queue
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Windows handed to the sink, in queue order
    pub scheduled: Vec<ScheduledWindow>,
    /// Chunks that were skipped; the drain continued past each of them
    pub failures: Vec<PlaybackError>,
    /// True when this drain began a new burst of agent speech
    pub started_speaking: bool,
}

/// FIFO playback scheduler
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    sample_rate: u32,
    queue: VecDeque<AudioChunk>,
    next_start_time: f64,
    last_end_time: f64,
    speaking: bool,
    active: bool,
    scheduled_total: u64,
    scratch: Vec<f32>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self::with_sample_rate(sink, SAMPLE_RATE)
    }

    pub fn with_sample_rate(sink: Box<dyn PlaybackSink>, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            queue: VecDeque::new(),
            next_start_time: 0.0,
            last_end_time: 0.0,
            speaking: false,
            active: false,
            scheduled_total: 0,
            scratch: Vec::new(),
        }
    }

    /// Start accepting chunks; the schedule restarts at the current clock time
    pub fn activate(&mut self) {
        let now = self.sink.now();
        self.next_start_time = now;
        self.last_end_time = now;
        self.speaking = false;
        self.active = true;
        debug!("Playback activated at {:.3}s", now);
    }

    /// Flush everything and reject further chunks
    pub fn deactivate(&mut self) {
        if self.active {
            self.interrupt();
            self.active = false;
            debug!("Playback deactivated");
        }
    }

    /// Append a chunk without draining
    pub fn push(&mut self, chunk: AudioChunk) -> Result<(), PlaybackError> {
        if !self.active {
            return Err(PlaybackError::Inactive);
        }
        self.queue.push_back(chunk);
        Ok(())
    }

    /// Append a chunk and schedule everything queued
    pub fn enqueue(&mut self, chunk: AudioChunk) -> Result<DrainReport, PlaybackError> {
        self.push(chunk)?;
        Ok(self.drain())
    }

    /// Schedule every queued chunk, in arrival order
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(chunk) = self.queue.pop_front() {
            if chunk.is_empty() {
                warn!("Skipping empty audio chunk");
                report.failures.push(DecodeError::Empty.into());
                continue;
            }

            if let Err(e) = convert::pcm16_to_float(chunk.as_bytes(), &mut self.scratch) {
                warn!("Skipping malformed audio chunk: {}", e);
                report.failures.push(e.into());
                continue;
            }

            // Never schedule behind the clock
            let start = self.next_start_time.max(self.sink.now());
            let duration = self.scratch.len() as f64 / self.sample_rate as f64;

            match self.sink.schedule(&self.scratch, start) {
                Ok(()) => {
                    self.next_start_time = start + duration;
                    self.last_end_time = self.next_start_time;
                    self.scheduled_total += 1;

                    if !self.speaking {
                        self.speaking = true;
                        report.started_speaking = true;
                        debug!("Agent speech started at {:.3}s", start);
                    }

                    report.scheduled.push(ScheduledWindow { start, duration });
                }
                Err(e) => {
                    error!("Failed to schedule audio chunk: {}", e);
                    report.failures.push(e);
                }
            }
        }

        report
    }

    /// Barge-in: drop queued chunks, stop in-flight audio, restart the schedule at now
    ///
    /// Returns the number of queued chunks that were discarded.
    pub fn interrupt(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.sink.stop_all();

        let now = self.sink.now();
        self.next_start_time = now;
        self.last_end_time = now;
        self.speaking = false;

        info!("Playback interrupted ({} queued chunks dropped)", dropped);
        dropped
    }

    /// Re-evaluate the speaking flag against the clock
    ///
    /// Returns `Some(false)` on the transition to silence.
    pub fn refresh_speaking(&mut self) -> Option<bool> {
        if self.speaking
            && self.queue.is_empty()
            && self.sink.now() >= self.last_end_time - SPEAKING_EPSILON_SECS
        {
            self.speaking = false;
            debug!("Agent speech finished");
            return Some(false);
        }
        None
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn now(&self) -> f64 {
        self.sink.now()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Chunks successfully scheduled since creation
    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct NullSink {
        clock: Rc<Cell<f64>>,
        stops: Rc<Cell<usize>>,
    }

    impl PlaybackSink for NullSink {
        fn now(&self) -> f64 {
            self.clock.get()
        }

        fn schedule(&mut self, _samples: &[f32], _start_at: f64) -> Result<(), PlaybackError> {
            Ok(())
        }

        fn stop_all(&mut self) {
            self.stops.set(self.stops.get() + 1);
        }
    }

    fn scheduler() -> (PlaybackScheduler, Rc<Cell<f64>>, Rc<Cell<usize>>) {
        let clock = Rc::new(Cell::new(0.0));
        let stops = Rc::new(Cell::new(0));
        let sink = NullSink {
            clock: Rc::clone(&clock),
            stops: Rc::clone(&stops),
        };
        (PlaybackScheduler::new(Box::new(sink)), clock, stops)
    }

    #[test]
    fn test_inactive_rejects_chunks() {
        let (mut playback, _, _) = scheduler();
        let result = playback.enqueue(AudioChunk::from_samples(&[0; 10]));
        assert_eq!(result.unwrap_err(), PlaybackError::Inactive);
    }

    #[test]
    fn test_start_never_behind_clock() {
        let (mut playback, clock, _) = scheduler();
        playback.activate();

        let report = playback.enqueue(AudioChunk::from_samples(&[0; 2400])).unwrap();
        assert_eq!(report.scheduled[0].start, 0.0);

        // Underrun: clock passed the end of the previous chunk
        clock.set(1.0);
        let report = playback.enqueue(AudioChunk::from_samples(&[0; 2400])).unwrap();
        assert_eq!(report.scheduled[0].start, 1.0);
        assert!((playback.next_start_time() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_speaking_lifecycle() {
        let (mut playback, clock, _) = scheduler();
        playback.activate();

        let report = playback.enqueue(AudioChunk::from_samples(&[0; 24000])).unwrap();
        assert!(report.started_speaking);
        assert!(playback.is_speaking());

        clock.set(0.5);
        assert_eq!(playback.refresh_speaking(), None);

        // 50ms before the 1.0s end is still speaking
        clock.set(0.95);
        assert_eq!(playback.refresh_speaking(), None);

        clock.set(1.0);
        assert_eq!(playback.refresh_speaking(), Some(false));
        assert!(!playback.is_speaking());
    }

    #[test]
    fn test_deactivate_stops_output() {
        let (mut playback, _, stops) = scheduler();
        playback.activate();
        playback.enqueue(AudioChunk::from_samples(&[0; 100])).unwrap();

        playback.deactivate();
        assert_eq!(stops.get(), 1);
        assert!(!playback.is_active());

        // Second deactivate is a no-op
        playback.deactivate();
        assert_eq!(stops.get(), 1);
    }
}
