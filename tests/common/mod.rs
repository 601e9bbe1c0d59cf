// Test doubles shared by the integration tests
//
// Each fake records what the coordinator did to it behind an `Arc<Mutex<_>>`
// so tests can inspect it while the coordinator owns the boxed fake.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use voice_agent::agent::{
    AgentConnection, AgentEvent, AgentSettings, AgentTransport, TransportConnector,
};
use voice_agent::audio::{AudioChunk, CaptureSource, FrameSink, PlaybackSink};
use voice_agent::auth::{AccessToken, TokenSource};
use voice_agent::error::{AuthError, DeviceError, PlaybackError, TransportError};
use voice_agent::session::{SessionConfig, SessionCoordinator, SessionState, SessionUpdate};

// ============================================================================
// Playback
// ============================================================================

/// Everything a [`ManualClockSink`] was asked to do
#[derive(Debug, Default)]
pub struct SinkLog {
    pub now: f64,
    /// (start time, sample count) per scheduled buffer
    pub scheduled: Vec<(f64, usize)>,
    pub stops: usize,
    /// Upcoming `schedule` calls that report a device error
    pub failures_pending: usize,
}

/// Playback sink with a clock the test moves by hand
pub struct ManualClockSink {
    log: Arc<Mutex<SinkLog>>,
}

impl ManualClockSink {
    pub fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl PlaybackSink for ManualClockSink {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn schedule(&mut self, samples: &[f32], start_at: f64) -> Result<(), PlaybackError> {
        let mut log = self.log.lock().unwrap();
        if log.failures_pending > 0 {
            log.failures_pending -= 1;
            return Err(PlaybackError::Device("output underrun".to_string()));
        }
        log.scheduled.push((start_at, samples.len()));
        Ok(())
    }

    fn stop_all(&mut self) {
        self.log.lock().unwrap().stops += 1;
    }
}

pub fn advance_clock(log: &Arc<Mutex<SinkLog>>, secs: f64) {
    log.lock().unwrap().now += secs;
}

pub fn fail_next_schedules(log: &Arc<Mutex<SinkLog>>, count: usize) {
    log.lock().unwrap().failures_pending = count;
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Default)]
pub struct CaptureState {
    /// Sink from the most recent start; kept after stop to model a late callback
    pub sink: Option<FrameSink>,
    pub starts: usize,
    pub stops: usize,
    pub capturing: bool,
    pub fail_start: bool,
}

/// Capture source driven by the test instead of a device
pub struct FakeCapture {
    state: Arc<Mutex<CaptureState>>,
}

#[derive(Clone)]
pub struct CaptureHandle {
    state: Arc<Mutex<CaptureState>>,
}

impl FakeCapture {
    pub fn new() -> (Self, CaptureHandle) {
        let state = Arc::new(Mutex::new(CaptureState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            CaptureHandle { state },
        )
    }
}

impl CaptureSource for FakeCapture {
    fn start(&mut self, sink: FrameSink) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_start {
            return Err(DeviceError::NoDevice("input"));
        }
        state.sink = Some(sink);
        state.starts += 1;
        state.capturing = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.capturing {
            state.stops += 1;
        }
        state.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().capturing
    }

    fn name(&self) -> &str {
        "fake-microphone"
    }
}

impl CaptureHandle {
    /// Fire the capture callback; false when capture was never started
    pub fn emit(&self, chunk: AudioChunk) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.sink.as_mut() {
            Some(sink) => {
                sink(chunk);
                true
            }
            None => false,
        }
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().capturing
    }

    pub fn fail_next_start(&self) {
        self.state.lock().unwrap().fail_start = true;
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Default)]
pub struct TransportLog {
    pub connects: usize,
    pub settings: Vec<AgentSettings>,
    pub audio: Vec<AudioChunk>,
    pub keep_alives: usize,
    pub disconnects: usize,
    pub fail_sends: bool,
    /// `disconnect` never completes
    pub stall_disconnect: bool,
}

/// Connector handing out [`FakeTransport`]s that share one log
pub struct FakeConnector {
    log: Arc<Mutex<TransportLog>>,
    events: Arc<Mutex<Option<mpsc::Sender<AgentEvent>>>>,
}

#[derive(Clone)]
pub struct TransportHandle {
    pub log: Arc<Mutex<TransportLog>>,
    events: Arc<Mutex<Option<mpsc::Sender<AgentEvent>>>>,
}

impl FakeConnector {
    pub fn new() -> (Self, TransportHandle) {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        let events = Arc::new(Mutex::new(None));
        (
            Self {
                log: Arc::clone(&log),
                events: Arc::clone(&events),
            },
            TransportHandle { log, events },
        )
    }
}

#[async_trait::async_trait]
impl TransportConnector for FakeConnector {
    async fn connect(&self, _token: &AccessToken) -> Result<AgentConnection, TransportError> {
        let (tx, rx) = mpsc::channel(64);
        *self.events.lock().unwrap() = Some(tx);
        self.log.lock().unwrap().connects += 1;

        Ok(AgentConnection {
            transport: Box::new(FakeTransport {
                log: Arc::clone(&self.log),
            }),
            events: rx,
        })
    }
}

pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    fn check(&self) -> Result<(), TransportError> {
        if self.log.lock().unwrap().fail_sends {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl AgentTransport for FakeTransport {
    async fn configure(&mut self, settings: &AgentSettings) -> Result<(), TransportError> {
        self.check()?;
        self.log.lock().unwrap().settings.push(settings.clone());
        Ok(())
    }

    async fn send_audio(&mut self, chunk: AudioChunk) -> Result<(), TransportError> {
        self.check()?;
        self.log.lock().unwrap().audio.push(chunk);
        Ok(())
    }

    async fn keep_alive(&mut self) -> Result<(), TransportError> {
        self.check()?;
        self.log.lock().unwrap().keep_alives += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let stall = {
            let mut log = self.log.lock().unwrap();
            log.disconnects += 1;
            log.stall_disconnect
        };
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

impl TransportHandle {
    /// Sender feeding the most recent connection's event stream
    pub fn events(&self) -> mpsc::Sender<AgentEvent> {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("no connection has been opened")
    }

    /// Release the connector's copy of the event sender
    pub fn drop_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn audio_frames(&self) -> usize {
        self.log.lock().unwrap().audio.len()
    }

    pub fn keep_alives(&self) -> usize {
        self.log.lock().unwrap().keep_alives
    }

    pub fn connects(&self) -> usize {
        self.log.lock().unwrap().connects
    }

    pub fn disconnects(&self) -> usize {
        self.log.lock().unwrap().disconnects
    }

    pub fn fail_sends(&self) {
        self.log.lock().unwrap().fail_sends = true;
    }

    pub fn stall_disconnect(&self) {
        self.log.lock().unwrap().stall_disconnect = true;
    }
}

// ============================================================================
// Auth
// ============================================================================

pub enum StaticTokenSource {
    Token(String),
    Rejected { status: u16, body: String },
}

#[async_trait::async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        match self {
            Self::Token(token) => Ok(AccessToken::new(token.clone())),
            Self::Rejected { status, body } => Err(AuthError::Rejected {
                status: *status,
                body: body.clone(),
            }),
        }
    }

    fn describe(&self) -> String {
        "static token".to_string()
    }
}

// ============================================================================
// Coordinator harness
// ============================================================================

pub struct Harness {
    pub clock: Arc<Mutex<SinkLog>>,
    pub capture: CaptureHandle,
    pub transport: TransportHandle,
}

pub fn coordinator_with(
    config: SessionConfig,
    token_source: Box<dyn TokenSource>,
) -> (SessionCoordinator, Harness) {
    let (sink, clock) = ManualClockSink::new();
    let (capture, capture_handle) = FakeCapture::new();
    let (connector, transport) = FakeConnector::new();

    let coordinator = SessionCoordinator::new(
        config,
        token_source,
        Box::new(connector),
        Box::new(capture),
        Box::new(sink),
    );

    (
        coordinator,
        Harness {
            clock,
            capture: capture_handle,
            transport,
        },
    )
}

pub fn coordinator() -> (SessionCoordinator, Harness) {
    coordinator_with(
        SessionConfig::default(),
        Box::new(StaticTokenSource::Token("test-token".to_string())),
    )
}

/// Authenticate, connect and complete the Welcome/SettingsApplied handshake
pub async fn open_session(coordinator: &mut SessionCoordinator) {
    coordinator.authenticate().await.unwrap();
    coordinator
        .connect(voice_agent::ModelSelection::default())
        .await
        .unwrap();
    coordinator
        .handle_agent_event(AgentEvent::Welcome)
        .await;
    coordinator
        .handle_agent_event(AgentEvent::SettingsApplied)
        .await;
    assert_eq!(coordinator.state(), SessionState::Open);
}

/// `samples` of silence-free PCM16
pub fn pcm_chunk(samples: usize) -> AudioChunk {
    AudioChunk::from_samples(&vec![1000i16; samples])
}

/// Wait until the coordinator publishes `state`
pub async fn wait_for_state(updates: &mut broadcast::Receiver<SessionUpdate>, state: SessionState) {
    loop {
        match updates.recv().await {
            Ok(SessionUpdate::State(s)) if s == state => return,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => panic!("update channel closed"),
        }
    }
}

/// Updates already published, without waiting
pub fn drain_updates(updates: &mut broadcast::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    seen
}
