//! Session controller: the inbound protocol state machine.
//!
//! One controller instance owns everything mutable about a session: the
//! lifecycle state, the in-flight turn accumulator, the playback buffer
//! handle, and the device handles. Events are applied strictly in arrival
//! order by a single task; the playback buffer is the only state it shares
//! with another execution context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::SessionError;
use super::reset::ResetLock;
use super::turn::{Turn, TurnAccumulator};
use crate::core::audio::{
    CaptureSource, DeviceError, DeviceFactory, FrameChunker, PlaybackBuffer, RenderSink,
    pcm16_from_le_bytes,
};
use crate::core::protocol::{
    ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, TurnDetection, Voice,
};
use crate::core::transport::EventChannel;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection
    #[default]
    Idle,
    /// Configuration sent, awaiting acknowledgment
    Configuring,
    /// Accepting and emitting turns
    Active,
    /// Terminal; connection closed by either side or by explicit stop
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Configuring => write!(f, "Configuring"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// Collaborator-facing notifications
// =============================================================================

/// Events surfaced to the transcript renderer / UI layer.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    /// The session lifecycle state changed.
    StateChanged(SessionState),
    /// The user started a new turn (speech detected).
    TurnStarted,
    /// A turn was finalized with its full question and answer text.
    TurnFinalized(Turn),
    /// Connection-level failure, human readable.
    ConnectionError(String),
    /// Device-level failure, human readable.
    DeviceError(String),
}

/// Per-session options carried into the configuration frame.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// System instructions for the assistant
    pub instructions: Option<String>,
    /// Temperature for response generation
    pub temperature: Option<f32>,
    /// Voice for synthesized speech
    pub voice: Option<Voice>,
}

/// Remote control for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    stop: CancellationToken,
}

impl SessionHandle {
    /// Request the session to stop: tears down audio, closes the channel.
    /// Idempotent; safe to call when no session is running.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives one realtime session over an [`EventChannel`].
pub struct SessionController<C: EventChannel> {
    channel: C,
    settings: SessionSettings,
    devices: Box<dyn DeviceFactory>,

    state: SessionState,
    accumulator: TurnAccumulator,
    turns: Vec<Turn>,

    playback: PlaybackBuffer,
    capture_active: Arc<AtomicBool>,
    capture: Option<Box<dyn CaptureSource>>,
    render: Option<Box<dyn RenderSink>>,
    reset_lock: ResetLock,

    notifications: mpsc::Sender<SessionNotification>,
    stop: CancellationToken,
}

impl<C: EventChannel> SessionController<C> {
    /// Create a controller and the handle used to stop it.
    pub fn new(
        channel: C,
        settings: SessionSettings,
        devices: Box<dyn DeviceFactory>,
        notifications: mpsc::Sender<SessionNotification>,
    ) -> (Self, SessionHandle) {
        let stop = CancellationToken::new();
        let handle = SessionHandle { stop: stop.clone() };
        let controller = Self {
            channel,
            settings,
            devices,
            state: SessionState::Idle,
            accumulator: TurnAccumulator::default(),
            turns: Vec::new(),
            playback: PlaybackBuffer::new(),
            capture_active: Arc::new(AtomicBool::new(false)),
            capture: None,
            render: None,
            reset_lock: ResetLock::new(),
            notifications,
            stop,
        };
        (controller, handle)
    }

    /// Handle on the playback buffer shared with the render sink.
    pub fn playback(&self) -> PlaybackBuffer {
        self.playback.clone()
    }

    /// Run the session to completion.
    ///
    /// Sends the configuration frame, starts capture and playback, then
    /// applies inbound events in arrival order until the channel closes, the
    /// stream fails, or [`SessionHandle::stop`] is called. Audio teardown and
    /// channel close always run, whatever ended the loop. Returns the
    /// finalized turns of the session.
    pub async fn run(mut self) -> Result<Vec<Turn>, SessionError> {
        self.set_state(SessionState::Configuring).await;
        if let Err(e) = self.channel.send(self.config_event()).await {
            tracing::error!("failed to send session configuration: {e}");
            self.notify(SessionNotification::ConnectionError(format!(
                "Unable to send initial config message. Please check your endpoint and \
                 authentication details. ({e})"
            )))
            .await;
            self.set_state(SessionState::Idle).await;
            return Err(e.into());
        }

        if let Err(e) = self.reset_audio(true).await {
            // The service side still works; continue the session without
            // local audio rather than aborting it.
            tracing::error!("audio initialization failed: {e}");
            self.notify(SessionNotification::DeviceError(e.to_string()))
                .await;
        }

        let result = self.event_loop().await;

        if let Err(e) = self.reset_audio(false).await {
            tracing::warn!("audio teardown failed: {e}");
        }
        self.channel.close().await;
        self.set_state(SessionState::Closed).await;

        result.map(|()| self.turns)
    }

    async fn event_loop(&mut self) -> Result<(), SessionError> {
        let stop = self.stop.clone();
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::info!("stop requested, ending session");
                    return Ok(());
                }
                next = self.channel.recv() => match next {
                    Ok(Some(event)) => self.handle_event(event).await,
                    Ok(None) => {
                        tracing::info!("event channel closed");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::error!("event stream failed: {e}");
                        return Err(SessionError::Stream(e.to_string()));
                    }
                },
            }
        }
    }

    /// Apply one inbound event to the session state.
    ///
    /// Malformed payloads (undecodable audio) cost only the single event;
    /// unrecognized event types are ignored for forward compatibility.
    async fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated {} => {
                tracing::info!("session created");
                self.accumulator.reset();
                self.set_state(SessionState::Active).await;
            }

            ServerEvent::AudioTranscriptDelta { delta } => {
                self.accumulator.push_delta(&delta);
            }

            ServerEvent::AudioDelta { delta } => {
                match ServerEvent::decode_audio_delta(&delta) {
                    Ok(bytes) => self.playback.push(&pcm16_from_le_bytes(&bytes)),
                    Err(e) => tracing::warn!("dropping undecodable audio delta: {e}"),
                }
            }

            ServerEvent::SpeechStarted {} => {
                // Barge-in: queued assistant audio is discarded, not drained.
                tracing::debug!("speech started, flushing playback");
                self.playback.clear();
                if let Some(interrupted) = self.accumulator.open() {
                    self.push_turn(interrupted).await;
                }
                self.notify(SessionNotification::TurnStarted).await;
            }

            ServerEvent::TranscriptionCompleted { transcript } => {
                tracing::debug!(%transcript, "user transcription completed");
                self.accumulator.set_question(transcript);
            }

            ServerEvent::AudioTranscriptDone { .. } => {
                if let Some(turn) = self.accumulator.finalize() {
                    self.push_turn(turn).await;
                }
            }

            ServerEvent::ResponseDone {} => {
                // Turn boundary; content was already finalized on transcript done.
                tracing::debug!("response done");
            }

            ServerEvent::Error { error } => {
                tracing::error!(
                    error_type = %error.error_type,
                    "service error: {}",
                    error.message
                );
            }

            ServerEvent::Unrecognized => {
                tracing::debug!("ignoring unrecognized server event");
            }
        }
    }

    /// Reset the audio pipeline under the reset lock.
    ///
    /// Deactivates and stops capture, clears playback, rebuilds both device
    /// handles, and (when `restart`) begins a new capture session feeding a
    /// fresh chunker. The lock guard guarantees release on every failure path.
    async fn reset_audio(&mut self, restart: bool) -> Result<(), DeviceError> {
        let _guard = self.reset_lock.acquire().await;

        self.capture_active.store(false, Ordering::SeqCst);
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.playback.clear();
        if let Some(mut render) = self.render.take() {
            render.stop();
        }

        let mut render = self.devices.create_render()?;
        render.start(self.playback.clone())?;
        self.render = Some(render);

        let mut capture = self.devices.create_capture()?;
        if restart {
            let mut chunker =
                FrameChunker::new(self.capture_active.clone(), self.channel.outbound());
            capture.start(Box::new(move |bytes| chunker.ingest(bytes)))?;
            self.capture_active.store(true, Ordering::SeqCst);
        }
        self.capture = Some(capture);

        Ok(())
    }

    fn config_event(&self) -> ClientEvent {
        ClientEvent::SessionUpdate {
            session: SessionConfig {
                turn_detection: TurnDetection::ServerVad,
                input_audio_transcription: InputAudioTranscription::default(),
                instructions: self.settings.instructions.clone(),
                temperature: self.settings.temperature,
                voice: self.settings.voice,
            },
        }
    }

    async fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn.clone());
        self.notify(SessionNotification::TurnFinalized(turn)).await;
    }

    async fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::info!(%state, "session state changed");
            self.state = state;
            self.notify(SessionNotification::StateChanged(state)).await;
        }
    }

    async fn notify(&self, notification: SessionNotification) {
        // A departed collaborator is not an error; the session keeps running.
        let _ = self.notifications.send(notification).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::CaptureCallback;
    use crate::core::transport::MemoryChannel;
    use base64::prelude::*;

    struct NullCapture;
    impl CaptureSource for NullCapture {
        fn start(&mut self, _on_data: CaptureCallback) -> Result<(), DeviceError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    struct NullRender;
    impl RenderSink for NullRender {
        fn start(&mut self, _buffer: PlaybackBuffer) -> Result<(), DeviceError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    struct NullDevices;
    impl DeviceFactory for NullDevices {
        fn create_capture(&self) -> Result<Box<dyn CaptureSource>, DeviceError> {
            Ok(Box::new(NullCapture))
        }
        fn create_render(&self) -> Result<Box<dyn RenderSink>, DeviceError> {
            Ok(Box::new(NullRender))
        }
    }

    struct BrokenDevices;
    impl DeviceFactory for BrokenDevices {
        fn create_capture(&self) -> Result<Box<dyn CaptureSource>, DeviceError> {
            Err(DeviceError::NoInputDevice)
        }
        fn create_render(&self) -> Result<Box<dyn RenderSink>, DeviceError> {
            Err(DeviceError::NoOutputDevice)
        }
    }

    fn controller(
        channel: MemoryChannel,
    ) -> (
        SessionController<MemoryChannel>,
        SessionHandle,
        mpsc::Receiver<SessionNotification>,
    ) {
        let (note_tx, note_rx) = mpsc::channel(64);
        let (controller, handle) = SessionController::new(
            channel,
            SessionSettings::default(),
            Box::new(NullDevices),
            note_tx,
        );
        (controller, handle, note_rx)
    }

    fn audio_delta(samples: &[i16]) -> ServerEvent {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        ServerEvent::AudioDelta {
            delta: BASE64_STANDARD.encode(&bytes),
        }
    }

    #[tokio::test]
    async fn test_turn_assembled_from_event_sequence() {
        let (channel, _driver) = MemoryChannel::pair();
        let (mut controller, _handle, _notes) = controller(channel);

        controller.handle_event(ServerEvent::SpeechStarted {}).await;
        controller
            .handle_event(ServerEvent::TranscriptionCompleted {
                transcript: "What is LIBOR?".to_string(),
            })
            .await;
        controller
            .handle_event(ServerEvent::AudioTranscriptDelta {
                delta: "It's a ".to_string(),
            })
            .await;
        controller
            .handle_event(ServerEvent::AudioTranscriptDelta {
                delta: "benchmark rate.".to_string(),
            })
            .await;
        controller
            .handle_event(ServerEvent::AudioTranscriptDone {
                transcript: String::new(),
            })
            .await;
        controller.handle_event(ServerEvent::ResponseDone {}).await;

        assert_eq!(controller.turns.len(), 1);
        assert_eq!(controller.turns[0].question, "What is LIBOR?");
        assert_eq!(controller.turns[0].answer, "It's a benchmark rate.");
        assert!(controller.turns[0].is_complete);
    }

    #[tokio::test]
    async fn test_barge_in_empties_playback_buffer() {
        let (channel, _driver) = MemoryChannel::pair();
        let (mut controller, _handle, mut notes) = controller(channel);
        let playback = controller.playback();

        controller.handle_event(audio_delta(&[10, 20, 30])).await;
        assert_eq!(playback.len(), 3);

        controller.handle_event(ServerEvent::SpeechStarted {}).await;
        assert_eq!(playback.len(), 0);
        assert!(matches!(
            notes.recv().await,
            Some(SessionNotification::TurnStarted)
        ));
    }

    #[tokio::test]
    async fn test_audio_delta_decodes_to_playback_samples() {
        let (channel, _driver) = MemoryChannel::pair();
        let (mut controller, _handle, _notes) = controller(channel);
        let playback = controller.playback();

        controller.handle_event(audio_delta(&[16384, -16384])).await;
        let mut block = [0.0f32; 2];
        playback.pull_block(&mut block);
        assert_eq!(block, [0.5, -0.5]);
    }

    #[tokio::test]
    async fn test_undecodable_audio_delta_is_dropped() {
        let (channel, _driver) = MemoryChannel::pair();
        let (mut controller, _handle, _notes) = controller(channel);

        controller
            .handle_event(ServerEvent::AudioDelta {
                delta: "not base64 ###".to_string(),
            })
            .await;
        assert!(controller.playback().is_empty());
    }

    #[tokio::test]
    async fn test_config_send_failure_returns_to_idle() {
        let (channel, driver) = MemoryChannel::pair();
        drop(driver); // every send now fails

        let (note_tx, mut notes) = mpsc::channel(64);
        let (controller, _handle) = SessionController::new(
            channel,
            SessionSettings::default(),
            Box::new(NullDevices),
            note_tx,
        );

        let result = controller.run().await;
        assert!(matches!(result, Err(SessionError::Connection(_))));

        let mut states = Vec::new();
        let mut saw_connection_error = false;
        while let Ok(note) = notes.try_recv() {
            match note {
                SessionNotification::StateChanged(s) => states.push(s),
                SessionNotification::ConnectionError(_) => saw_connection_error = true,
                _ => {}
            }
        }
        assert!(saw_connection_error);
        assert_eq!(states, vec![SessionState::Configuring, SessionState::Idle]);
        assert!(!states.contains(&SessionState::Active));
    }

    #[tokio::test]
    async fn test_device_failure_reports_and_session_survives() {
        let (channel, mut driver) = MemoryChannel::pair();
        let (note_tx, mut notes) = mpsc::channel(64);
        let (controller, _handle) = SessionController::new(
            channel,
            SessionSettings::default(),
            Box::new(BrokenDevices),
            note_tx,
        );

        let session = tokio::spawn(controller.run());

        // Config frame still goes out despite broken devices.
        assert!(matches!(
            driver.outbound_rx.recv().await,
            Some(ClientEvent::SessionUpdate { .. })
        ));
        driver
            .inbound_tx
            .send(ServerEvent::SessionCreated {})
            .await
            .unwrap();
        drop(driver);

        let turns = session.await.unwrap().unwrap();
        assert!(turns.is_empty());

        let mut saw_device_error = false;
        let mut saw_active = false;
        while let Ok(note) = notes.try_recv() {
            match note {
                SessionNotification::DeviceError(_) => saw_device_error = true,
                SessionNotification::StateChanged(SessionState::Active) => saw_active = true,
                _ => {}
            }
        }
        assert!(saw_device_error);
        assert!(saw_active);
    }

    #[tokio::test]
    async fn test_stop_unblocks_event_loop() {
        let (channel, mut driver) = MemoryChannel::pair();
        let (controller, handle, _notes) = controller(channel);

        let session = tokio::spawn(controller.run());
        assert!(matches!(
            driver.outbound_rx.recv().await,
            Some(ClientEvent::SessionUpdate { .. })
        ));

        // Stop twice: must be idempotent.
        handle.stop();
        handle.stop();

        let turns = session.await.unwrap().unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_barge_in_finalizes_interrupted_turn() {
        let (channel, _driver) = MemoryChannel::pair();
        let (mut controller, _handle, _notes) = controller(channel);

        controller.handle_event(ServerEvent::SpeechStarted {}).await;
        controller
            .handle_event(ServerEvent::TranscriptionCompleted {
                transcript: "First".to_string(),
            })
            .await;
        controller
            .handle_event(ServerEvent::AudioTranscriptDelta {
                delta: "partial answer".to_string(),
            })
            .await;

        // User interrupts before transcript done.
        controller.handle_event(ServerEvent::SpeechStarted {}).await;

        assert_eq!(controller.turns.len(), 1);
        assert_eq!(controller.turns[0].question, "First");
        assert_eq!(controller.turns[0].answer, "partial answer");
        assert!(!controller.turns[0].is_complete);
    }
}
