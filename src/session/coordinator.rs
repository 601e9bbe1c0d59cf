use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{SessionCommand, SessionMessage, SessionUpdate};
use super::state::SessionState;
use super::stats::SessionStats;
use super::transcript::Transcript;
use crate::agent::{AgentEvent, AgentSettings, AgentTransport, ModelSelection, TransportConnector};
use crate::audio::{AgentAudioRecorder, AudioChunk, CaptureSource, FrameSink, PlaybackScheduler, PlaybackSink};
use crate::auth::{AccessToken, TokenSource};
use crate::error::{SessionError, TransportError};

/// How often the speaking flag is re-evaluated against the output clock
const SPEAKING_REFRESH: Duration = Duration::from_millis(50);

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Longest wait for the transport to close before it is abandoned
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns one voice session: token, transport, capture, playback and transcript
///
/// All mutation happens on the task that drives the coordinator. The capture
/// callback and the transport reader only post [`SessionMessage`]s into the
/// inbox, tagged with the connection epoch.
pub struct SessionCoordinator {
    config: SessionConfig,
    state: SessionState,

    token_source: Box<dyn TokenSource>,
    token: Option<AccessToken>,

    connector: Box<dyn TransportConnector>,
    transport: Option<Box<dyn AgentTransport>>,
    forwarder: Option<JoinHandle<()>>,

    /// Settings to send once the agent says Welcome
    pending_settings: Option<AgentSettings>,

    capture: Box<dyn CaptureSource>,
    capture_gate: Arc<AtomicBool>,
    playback: PlaybackScheduler,
    recorder: Option<AgentAudioRecorder>,
    transcript: Transcript,

    keep_alive: Option<Interval>,

    /// Current connection; bumped on every connect and teardown
    epoch: u64,
    inbox_tx: mpsc::Sender<SessionMessage>,
    inbox_rx: mpsc::Receiver<SessionMessage>,

    updates: broadcast::Sender<SessionUpdate>,
    last_error: Option<String>,

    connected_at: Option<DateTime<Utc>>,
    frames_sent: u64,
    frames_dropped: Arc<AtomicU64>,
    chunks_received: u64,
    interruptions: u64,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        token_source: Box<dyn TokenSource>,
        connector: Box<dyn TransportConnector>,
        capture: Box<dyn CaptureSource>,
        playback_sink: Box<dyn PlaybackSink>,
    ) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let playback = PlaybackScheduler::with_sample_rate(playback_sink, config.sample_rate);

        Self {
            config,
            state: SessionState::Unauthenticated,
            token_source,
            token: None,
            connector,
            transport: None,
            forwarder: None,
            pending_settings: None,
            capture,
            capture_gate: Arc::new(AtomicBool::new(false)),
            playback,
            recorder: None,
            transcript: Transcript::default(),
            keep_alive: None,
            epoch: 0,
            inbox_tx,
            inbox_rx,
            updates,
            last_error: None,
            connected_at: None,
            frames_sent: 0,
            frames_dropped: Arc::new(AtomicU64::new(0)),
            chunks_received: 0,
            interruptions: 0,
        }
    }

    /// Receive state, transcript and speaking updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Most recent user-visible error
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn stats(&self) -> SessionStats {
        let duration_secs = self
            .connected_at
            .map(|at| Utc::now().signed_duration_since(at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.config.session_id.clone(),
            state: self.state,
            connected_at: self.connected_at,
            duration_secs,
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_received: self.chunks_received,
            chunks_scheduled: self.playback.scheduled_total(),
            interruptions: self.interruptions,
            transcript_entries: self.transcript.len(),
        }
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Obtain an access token
    ///
    /// On failure the state stays `Unauthenticated` and the error text
    /// (including the endpoint's response body) becomes [`Self::last_error`].
    pub async fn authenticate(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Unauthenticated {
            return self.fail(SessionError::AlreadyAuthenticated);
        }

        info!("Authenticating via {}", self.token_source.describe());

        match self.token_source.fetch_token().await {
            Ok(token) => {
                self.token = Some(token);
                self.last_error = None;
                self.set_state(SessionState::Authenticated);
                Ok(())
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Open the agent connection
    ///
    /// Rejected while a connection exists; the existing transport is left
    /// untouched in that case.
    pub async fn connect(&mut self, selection: ModelSelection) -> Result<(), SessionError> {
        if self.state.is_connected() {
            return self.fail(SessionError::AlreadyConnected(self.state));
        }

        let Some(token) = self.token.clone() else {
            return self.fail(SessionError::NotAuthenticated);
        };

        let connection = match self.connector.connect(&token).await {
            Ok(connection) => connection,
            Err(e) => return self.fail(e.into()),
        };

        self.epoch += 1;
        self.forwarder = Some(spawn_forwarder(
            connection.events,
            self.inbox_tx.clone(),
            self.epoch,
        ));

        info!(
            "Connected to agent via {} (epoch {})",
            connection.transport.name(),
            self.epoch
        );

        self.transport = Some(connection.transport);
        self.pending_settings = Some(AgentSettings::from_selection(
            &selection,
            self.config.sample_rate,
        ));
        self.last_error = None;
        self.set_state(SessionState::Configuring);

        Ok(())
    }

    /// Close the agent connection
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if !self.state.is_connected() {
            return self.fail(SessionError::NotConnected);
        }

        self.teardown().await;
        self.set_state(SessionState::Closed);
        Ok(())
    }

    /// Drop the connection and the token
    pub async fn reset(&mut self) {
        if self.state.is_connected() {
            self.teardown().await;
        }

        self.token = None;
        self.transcript.clear();
        self.last_error = None;
        self.set_state(SessionState::Unauthenticated);
    }

    // ========================================================================
    // Inbound work
    // ========================================================================

    /// React to one agent event
    pub async fn handle_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Welcome => {
                if self.state != SessionState::Configuring {
                    debug!("Ignoring Welcome in state {}", self.state);
                    return;
                }

                let Some(settings) = self.pending_settings.take() else {
                    warn!("Welcome received without pending settings");
                    return;
                };

                let result = match self.transport.as_mut() {
                    Some(transport) => transport.configure(&settings).await,
                    None => return,
                };
                if let Err(e) = result {
                    self.transport_failed(e).await;
                }
            }
            AgentEvent::SettingsApplied => {
                if self.state == SessionState::Configuring {
                    self.open().await;
                } else {
                    debug!("Ignoring SettingsApplied in state {}", self.state);
                }
            }
            AgentEvent::Audio(chunk) => self.handle_agent_audio(chunk),
            AgentEvent::AgentAudioDone => {
                debug!("Agent finished sending audio");
            }
            AgentEvent::ConversationText { role, content } => {
                info!("{}: {}", role, content);
                let entry = self.transcript.push(role, content).clone();
                self.publish(SessionUpdate::Transcript(entry));
            }
            AgentEvent::UserStartedSpeaking => {
                let was_speaking = self.playback.is_speaking();
                if self.playback.is_active() {
                    self.playback.interrupt();
                    self.interruptions += 1;
                }
                if was_speaking {
                    self.publish(SessionUpdate::Speaking(false));
                }
            }
            AgentEvent::AgentStartedSpeaking => {
                debug!("Agent started speaking");
            }
            AgentEvent::Error { description, code } => {
                self.transport_failed(TransportError::Agent { description, code })
                    .await;
            }
            AgentEvent::Close => {
                if self.state.is_connected() {
                    info!("Agent connection closed");
                    self.teardown().await;
                    self.set_state(SessionState::Closed);
                    self.publish(SessionUpdate::Notice("Connection closed".to_string()));
                }
            }
            AgentEvent::Other(kind) => {
                debug!("Ignoring agent event: {}", kind);
            }
        }
    }

    /// Stream one captured frame to the agent
    pub async fn handle_captured(&mut self, chunk: AudioChunk) {
        if !self.state.accepts_audio() {
            return;
        }

        let result = match self.transport.as_mut() {
            Some(transport) => transport.send_audio(chunk).await,
            None => return,
        };

        match result {
            Ok(()) => self.frames_sent += 1,
            Err(e) => self.transport_failed(e).await,
        }
    }

    /// Handle every message already waiting in the inbox without blocking
    ///
    /// Returns the number of messages taken from the inbox.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle_message(message).await;
            handled += 1;
        }
        handled
    }

    /// Send a liveness signal on the open connection
    pub async fn keep_alive_tick(&mut self) {
        if self.state != SessionState::Open {
            return;
        }

        let result = match self.transport.as_mut() {
            Some(transport) => transport.keep_alive().await,
            None => return,
        };
        if let Err(e) = result {
            self.transport_failed(e).await;
        }
    }

    /// Re-evaluate the speaking flag against the output clock
    pub fn refresh_playback(&mut self) {
        if let Some(speaking) = self.playback.refresh_speaking() {
            self.publish(SessionUpdate::Speaking(speaking));
        }
    }

    // ========================================================================
    // Run loop
    // ========================================================================

    /// Drive the session until `Quit` arrives or the command channel closes
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut refresh = time::interval(SPEAKING_REFRESH);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Session loop started: {}", self.config.session_id);

        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                Some(message) = self.inbox_rx.recv() => Step::Inbox(message),
                _ = next_keep_alive(&mut self.keep_alive) => Step::KeepAlive,
                _ = refresh.tick() => Step::Refresh,
            };

            match step {
                Step::Command(None) | Step::Command(Some(SessionCommand::Quit)) => break,
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Inbox(message) => self.handle_message(message).await,
                Step::KeepAlive => self.keep_alive_tick().await,
                Step::Refresh => self.refresh_playback(),
            }
        }

        if self.state.is_connected() {
            self.teardown().await;
            self.set_state(SessionState::Closed);
        }

        info!("Session loop stopped: {}", self.stats().summary());
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        // Failures are already reported through `fail`
        let _ = match command {
            SessionCommand::Authenticate => self.authenticate().await,
            SessionCommand::Connect(selection) => self.connect(selection).await,
            SessionCommand::Disconnect => self.disconnect().await,
            SessionCommand::Reset => {
                self.reset().await;
                Ok(())
            }
            SessionCommand::Status => {
                self.publish(SessionUpdate::Notice(self.stats().summary()));
                Ok(())
            }
            SessionCommand::Quit => Ok(()),
        };
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        if message.epoch() != self.epoch {
            debug!(
                "Discarding message from stale connection (epoch {} != {})",
                message.epoch(),
                self.epoch
            );
            return;
        }

        match message {
            SessionMessage::Captured { chunk, .. } => self.handle_captured(chunk).await,
            SessionMessage::Agent { event, .. } => self.handle_agent_event(event).await,
        }
    }

    // ========================================================================
    // Lifecycle internals
    // ========================================================================

    /// Configuring -> Open
    async fn open(&mut self) {
        self.set_state(SessionState::Open);
        self.connected_at = Some(Utc::now());

        self.playback.activate();

        self.capture_gate.store(true, Ordering::SeqCst);
        let sink = self.frame_sink();
        if let Err(e) = self.capture.start(sink) {
            // Microphone problems do not end the conversation
            error!("Failed to start capture: {}", e);
            self.publish(SessionUpdate::Notice(format!("Microphone unavailable: {}", e)));
        }

        if let Some(dir) = self.config.recording_dir.clone() {
            let id = format!("{}-{}", self.config.session_id, self.epoch);
            match AgentAudioRecorder::create(&dir, &id, self.config.sample_rate) {
                Ok(recorder) => self.recorder = Some(recorder),
                Err(e) => {
                    warn!("Agent audio recording disabled: {:#}", e);
                    self.publish(SessionUpdate::Notice(format!("Recording disabled: {:#}", e)));
                }
            }
        }

        // First heartbeat goes out immediately, the rest on the interval
        self.keep_alive_tick().await;
        if self.state == SessionState::Open {
            let period = self.config.keep_alive_interval;
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.keep_alive = Some(interval);
        }

        info!("Session open: {}", self.config.session_id);
    }

    /// Release everything tied to the current connection
    ///
    /// The capture gate closes first so no further frames are posted, and
    /// the epoch moves on so anything already queued is discarded.
    async fn teardown(&mut self) {
        info!("Tearing down connection (epoch {})", self.epoch);

        self.capture_gate.store(false, Ordering::SeqCst);
        self.capture.stop();

        let was_speaking = self.playback.is_speaking();
        self.playback.deactivate();
        if was_speaking {
            self.publish(SessionUpdate::Speaking(false));
        }

        self.keep_alive = None;
        self.epoch += 1;
        self.pending_settings = None;

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        if let Some(mut transport) = self.transport.take() {
            match time::timeout(DISCONNECT_TIMEOUT, transport.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error while closing agent connection: {}", e),
                Err(_) => warn!(
                    "Agent connection did not close within {:?}, dropping it",
                    DISCONNECT_TIMEOUT
                ),
            }
        }

        self.transcript.clear();
        self.connected_at = None;

        if let Some(recorder) = self.recorder.take() {
            match recorder.finish() {
                Ok(summary) => info!(
                    "Saved agent audio: {} ({:.1}s)",
                    summary.file_path.display(),
                    summary.duration_secs
                ),
                Err(e) => error!("Failed to finalize agent audio recording: {:#}", e),
            }
        }
    }

    /// Terminal transport failure: report, tear down, Closed
    async fn transport_failed(&mut self, error: TransportError) {
        let _ = self.fail::<()>(error.into());
        if self.state.is_connected() {
            self.teardown().await;
            self.set_state(SessionState::Closed);
        }
    }

    fn handle_agent_audio(&mut self, chunk: AudioChunk) {
        self.chunks_received += 1;

        if !self.state.accepts_audio() {
            debug!("Dropping agent audio in state {}", self.state);
            return;
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.write_chunk(&chunk) {
                warn!("Failed to record agent audio: {:#}", e);
            }
        }

        match self.playback.enqueue(chunk) {
            Ok(report) => {
                if report.started_speaking {
                    self.publish(SessionUpdate::Speaking(true));
                }
                for failure in report.failures {
                    self.publish(SessionUpdate::Notice(failure.to_string()));
                }
            }
            Err(e) => warn!("Agent audio not played: {}", e),
        }
    }

    fn frame_sink(&self) -> FrameSink {
        let gate = Arc::clone(&self.capture_gate);
        let dropped = Arc::clone(&self.frames_dropped);
        let inbox = self.inbox_tx.clone();
        let epoch = self.epoch;

        Box::new(move |chunk| {
            if !gate.load(Ordering::SeqCst) {
                return;
            }
            if inbox
                .try_send(SessionMessage::Captured { epoch, chunk })
                .is_err()
            {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!("Session state: {} -> {}", self.state, state);
            self.state = state;
        }
        self.publish(SessionUpdate::State(state));
    }

    fn fail<T>(&mut self, error: SessionError) -> Result<T, SessionError> {
        error!("{}", error);
        let message = error.to_string();
        self.last_error = Some(message.clone());
        self.publish(SessionUpdate::Error(message));
        Err(error)
    }

    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.capture_gate.store(false, Ordering::SeqCst);
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

enum Step {
    Command(Option<SessionCommand>),
    Inbox(SessionMessage),
    KeepAlive,
    Refresh,
}

async fn next_keep_alive(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Move transport events into the inbox, tagged with the connection epoch
fn spawn_forwarder(
    mut events: mpsc::Receiver<AgentEvent>,
    inbox: mpsc::Sender<SessionMessage>,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let closed = event == AgentEvent::Close;
            if inbox.send(SessionMessage::Agent { epoch, event }).await.is_err() || closed {
                return;
            }
        }

        // Event source went away without a Close
        let _ = inbox
            .send(SessionMessage::Agent {
                epoch,
                event: AgentEvent::Close,
            })
            .await;
    })
}
