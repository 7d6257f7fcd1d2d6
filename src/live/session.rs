//! Voice session controller
//!
//! Owns everything a live interview needs: the two audio devices, the live
//! stream, the playback scheduler and the transcript. Lifecycle decisions go
//! through the reducer in [`crate::state_machine`]; this module executes the
//! resulting effects.
//!
//! # Teardown
//!
//! Resources are released exactly once, whoever ends the session (user stop,
//! server close, transport error, device fault):
//!
//! 1. Close the capture gate and the input device
//! 2. Cancel the sender task and wait for its in-flight send
//! 3. Close the stream
//! 4. Stop all playback, reset the cursor and close the output device

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::capture::{run_sender, CapturePipeline, CAPTURE_FRAME_SAMPLES, DEFAULT_QUEUE_CAPACITY};
use super::client::{LiveSink, LiveStream, LiveTransport};
use super::context::SessionContext;
use super::interrupt::barge_in;
use super::playback::{PlaybackScheduler, PlaybackSnapshot};
use super::protocol::{InboundEvent, SetupConfig, DEFAULT_LIVE_MODEL, DEFAULT_VOICE};
use super::transcript::{TranscriptLine, TranscriptLog, DEFAULT_TRANSCRIPT_WINDOW};
use super::{SessionError, StreamingError};
use crate::audio::{
    AudioDeviceProvider, AudioError, CaptureFormat, InputDevice, PlaybackFormat, VoiceId,
    DEFAULT_PLAYBACK_RATE,
};
use crate::state_machine::{reduce, Effect, Event, State};
use crate::stats::{ErrorRecord, SessionStats, StatsCollector};

pub use crate::state_machine::SessionStatus;

/// Capacity of the transcript broadcast channel
const TRANSCRIPT_CHANNEL_CAPACITY: usize = 64;

/// Tunables of a voice session
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub model: String,
    pub voice: String,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_samples: usize,
    pub queue_capacity: usize,
    pub transcript_window: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            capture_sample_rate: 16000,
            playback_sample_rate: DEFAULT_PLAYBACK_RATE,
            frame_samples: CAPTURE_FRAME_SAMPLES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            transcript_window: DEFAULT_TRANSCRIPT_WINDOW,
        }
    }
}

/// Handles held only while a session is active
struct SessionResources {
    session_id: Uuid,
    input: Box<dyn InputDevice>,
    capture: CapturePipeline,
    sender: JoinHandle<Box<dyn LiveSink>>,
    cancel: CancellationToken,
}

struct Shared {
    provider: Arc<dyn AudioDeviceProvider>,
    transport: Arc<dyn LiveTransport>,
    config: LiveConfig,
    state: Mutex<State>,
    /// Token of the attempt that may still be connecting, keyed by its id
    connect_cancel: Mutex<Option<(Uuid, CancellationToken)>>,
    resources: tokio::sync::Mutex<Option<SessionResources>>,
    playback: Mutex<Option<PlaybackScheduler>>,
    transcript: Mutex<TranscriptLog>,
    status_tx: watch::Sender<SessionStatus>,
    transcript_tx: broadcast::Sender<TranscriptLine>,
    stats: Arc<StatsCollector>,
}

/// Recover the guard even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to the voice session. Cheap to clone; all clones control the
/// same session, so `stop()` can be called from any task.
#[derive(Clone)]
pub struct VoiceSession {
    shared: Arc<Shared>,
}

impl VoiceSession {
    pub fn new(
        provider: Arc<dyn AudioDeviceProvider>,
        transport: Arc<dyn LiveTransport>,
        config: LiveConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let (transcript_tx, _) = broadcast::channel(TRANSCRIPT_CHANNEL_CAPACITY);
        let transcript = TranscriptLog::new(config.transcript_window);

        Self {
            shared: Arc::new(Shared {
                provider,
                transport,
                config,
                state: Mutex::new(State::Idle),
                connect_cancel: Mutex::new(None),
                resources: tokio::sync::Mutex::new(None),
                playback: Mutex::new(None),
                transcript: Mutex::new(transcript),
                status_tx,
                transcript_tx,
                stats: Arc::new(StatsCollector::new()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn status(&self) -> SessionStatus {
        lock(&self.shared.state).status()
    }

    /// Id of the current or last session attempt
    pub fn session_id(&self) -> Option<Uuid> {
        lock(&self.shared.state).session_id()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptLine> {
        self.shared.transcript_tx.subscribe()
    }

    /// Current transcript window, oldest first
    pub fn transcript(&self) -> Vec<TranscriptLine> {
        lock(&self.shared.transcript).lines()
    }

    /// Playback cursor and pending set, `None` when no session is active
    pub fn playback(&self) -> Option<PlaybackSnapshot> {
        lock(&self.shared.playback).as_ref().map(|s| s.snapshot())
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.shared.stats.errors()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Apply an event and publish the new status if it changed
    fn dispatch(&self, event: Event) -> (State, Vec<Effect>) {
        let mut state = lock(&self.shared.state);
        let (next, effects) = reduce(&state, event);
        *state = next.clone();
        if effects.contains(&Effect::Notify) {
            self.shared.status_tx.send_replace(next.status());
        }
        (next, effects)
    }

    /// Start a voice session.
    ///
    /// Returns once the stream is open and capture is running. Fails with
    /// `AlreadyStarted` while another attempt is connecting or active, and
    /// with `Cancelled` if `stop()` is called before the stream opens.
    pub async fn start(&self, context: SessionContext) -> Result<(), SessionError> {
        let cancel = CancellationToken::new();

        let session_id = {
            let mut state = lock(&self.shared.state);
            let (next, effects) = reduce(&state, Event::Start);
            let id = match effects.iter().find_map(|e| match e {
                Effect::Connect { id } => Some(*id),
                _ => None,
            }) {
                Some(id) => id,
                None => {
                    log::warn!("VoiceSession: start rejected, session is {}", state.status());
                    return Err(SessionError::AlreadyStarted);
                }
            };
            *state = next.clone();
            // Registered under the state lock so a concurrent stop always finds it
            *lock(&self.shared.connect_cancel) = Some((id, cancel.clone()));
            self.shared.status_tx.send_replace(next.status());
            id
        };

        log::info!("VoiceSession: starting session {}", session_id);
        self.shared.stats.reset();
        lock(&self.shared.transcript).clear();

        let config = &self.shared.config;
        let instruction = context.system_instruction();
        let setup = SetupConfig::interview(&config.model, &config.voice, &instruction);

        // Devices first: no stream is opened without both
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (device_fault_tx, device_fault_rx) = mpsc::unbounded_channel();
        let output = match self.shared.provider.open_output(
            PlaybackFormat {
                sample_rate: config.playback_sample_rate,
            },
            finished_tx,
            device_fault_tx.clone(),
        ) {
            Ok(output) => output,
            Err(e) => return Err(self.fail_start(session_id, e.into())),
        };

        let (capture, on_frame, chunk_rx) = CapturePipeline::new(
            config.frame_samples,
            config.queue_capacity,
            self.shared.stats.clone(),
        );
        let input = match self.shared.provider.open_input(
            CaptureFormat {
                sample_rate: config.capture_sample_rate,
            },
            on_frame,
            device_fault_tx,
        ) {
            Ok(input) => input,
            Err(e) => {
                output.close();
                return Err(self.fail_start(session_id, e.into()));
            }
        };

        let connected = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.shared.transport.connect(&setup) => Some(result),
        };

        let LiveStream { sink, events } = match connected {
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                input.close();
                output.close();
                return Err(self.fail_start(session_id, e.into()));
            }
            None => {
                input.close();
                output.close();
                log::info!("VoiceSession: session {} cancelled while connecting", session_id);
                return Err(SessionError::Cancelled);
            }
        };

        let scheduler = PlaybackScheduler::new(output, self.shared.stats.clone())
            .with_default_rate(config.playback_sample_rate);
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let sender = tokio::spawn(run_sender(
            chunk_rx,
            sink,
            cancel.clone(),
            fault_tx,
            self.shared.stats.clone(),
        ));

        // Resources are stored before the state turns Active, so a stop that
        // observes Active always finds something to release
        let mut resources = self.shared.resources.lock().await;
        *lock(&self.shared.playback) = Some(scheduler);
        *resources = Some(SessionResources {
            session_id,
            input,
            capture,
            sender,
            cancel: cancel.clone(),
        });

        let (state, _) = self.dispatch(Event::StreamOpened { id: session_id });
        if !matches!(state, State::Active { session_id: id, .. } if id == session_id) {
            drop(resources);
            log::info!("VoiceSession: session {} stopped during setup", session_id);
            self.release(session_id).await;
            return Err(SessionError::Cancelled);
        }

        if let Some(active) = resources.as_ref() {
            active.capture.open();
        }
        drop(resources);

        tokio::spawn(self.clone().run_inbound(
            session_id,
            events,
            finished_rx,
            fault_rx,
            device_fault_rx,
            cancel,
        ));

        log::info!("VoiceSession: session {} active", session_id);
        Ok(())
    }

    fn fail_start(&self, session_id: Uuid, err: SessionError) -> SessionError {
        log::error!("VoiceSession: {}", err);
        let category = match &err {
            SessionError::DeviceUnavailable(_) => "device",
            _ => "transport",
        };
        self.shared
            .stats
            .record_error(category, &err.to_string(), Some(session_id.to_string()));
        self.dispatch(Event::StartFailed {
            id: session_id,
            err: err.to_string(),
        });
        err
    }

    /// Stop the session. Always succeeds and may be called repeatedly.
    pub async fn stop(&self) {
        let (_, effects) = self.dispatch(Event::Stop);
        self.run_effects(effects).await;
    }

    async fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::AbortConnect { id } => {
                    log::info!("VoiceSession: aborting connect for session {}", id);
                    if let Some(token) = self.take_connect_cancel(id) {
                        token.cancel();
                    }
                }
                Effect::Release { id } => self.release(id).await,
                _ => {}
            }
        }
    }

    /// Take the connect token if it still belongs to `session_id`
    fn take_connect_cancel(&self, session_id: Uuid) -> Option<CancellationToken> {
        let mut slot = lock(&self.shared.connect_cancel);
        match slot.as_ref() {
            Some((id, _)) if *id == session_id => slot.take().map(|(_, token)| token),
            _ => None,
        }
    }

    /// Release everything held by `session_id`. Only the first call for a
    /// session finds the resources; later calls do nothing.
    async fn release(&self, session_id: Uuid) {
        let (resources, scheduler) = {
            let mut guard = self.shared.resources.lock().await;
            if guard.as_ref().map(|r| r.session_id) != Some(session_id) {
                return;
            }
            let scheduler = lock(&self.shared.playback).take();
            (guard.take(), scheduler)
        };

        if let Some(resources) = resources {
            resources.capture.close();
            resources.input.close();

            resources.cancel.cancel();
            match resources.sender.await {
                Ok(mut sink) => sink.close().await,
                Err(e) => log::error!("VoiceSession: sender task failed: {}", e),
            }
        }

        if let Some(mut scheduler) = scheduler {
            scheduler.shutdown();
        }

        // A newer attempt may have registered its own token meanwhile
        self.take_connect_cancel(session_id);

        let stats = self.shared.stats.snapshot();
        log::info!(
            "VoiceSession: session {} released ({} chunks sent, {} dropped, {} fragments played, {} interruptions)",
            session_id,
            stats.chunks_sent,
            stats.chunks_dropped,
            stats.fragments_scheduled,
            stats.interruptions
        );
    }

    // ------------------------------------------------------------------
    // Inbound loop
    // ------------------------------------------------------------------

    async fn run_inbound(
        self,
        session_id: Uuid,
        mut events: mpsc::Receiver<InboundEvent>,
        mut finished: mpsc::UnboundedReceiver<VoiceId>,
        mut send_faults: mpsc::UnboundedReceiver<StreamingError>,
        mut device_faults: mpsc::UnboundedReceiver<AudioError>,
        cancel: CancellationToken,
    ) {
        log::debug!("VoiceSession: inbound loop started for {}", session_id);

        loop {
            let ending = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(voice) = finished.recv() => {
                    if let Some(scheduler) = lock(&self.shared.playback).as_mut() {
                        scheduler.on_finished(voice);
                    }
                    None
                }
                Some(err) = send_faults.recv() => Some(Event::TransportFailed {
                    id: session_id,
                    err: err.to_string(),
                }),
                Some(err) = device_faults.recv() => {
                    self.shared.stats.record_error(
                        "device",
                        &err.to_string(),
                        Some(session_id.to_string()),
                    );
                    Some(Event::DeviceFailed {
                        id: session_id,
                        err: err.to_string(),
                    })
                }
                event = events.recv() => match event {
                    Some(event) => self.apply_event(session_id, event),
                    None => Some(Event::RemoteClosed {
                        id: session_id,
                        reason: Some("stream ended".to_string()),
                    }),
                },
            };

            if let Some(event) = ending {
                let (_, effects) = self.dispatch(event);
                self.run_effects(effects).await;
                break;
            }
        }

        log::debug!("VoiceSession: inbound loop for {} exiting", session_id);
    }

    /// Handle one inbound event. Returns the lifecycle event if the stream ended.
    fn apply_event(&self, session_id: Uuid, event: InboundEvent) -> Option<Event> {
        match event {
            InboundEvent::TranscriptFragment { speaker, text } => {
                let line = lock(&self.shared.transcript).push(speaker, &text);
                if let Some(line) = line {
                    self.shared.stats.transcript_line();
                    log::debug!("VoiceSession: {}", line);
                    // No subscribers is fine
                    let _ = self.shared.transcript_tx.send(line);
                }
                None
            }
            InboundEvent::AudioFragment(blob) => {
                if let Some(scheduler) = lock(&self.shared.playback).as_mut() {
                    if let Err(e) = scheduler.enqueue_encoded(&blob) {
                        log::warn!("VoiceSession: skipping audio fragment: {}", e);
                    }
                }
                None
            }
            InboundEvent::Interrupted => {
                if let Some(scheduler) = lock(&self.shared.playback).as_mut() {
                    barge_in(scheduler);
                }
                None
            }
            InboundEvent::TurnComplete => {
                log::debug!("VoiceSession: turn complete");
                None
            }
            InboundEvent::GoAway { time_left } => {
                log::warn!(
                    "VoiceSession: server will close the session soon (time left: {})",
                    time_left.as_deref().unwrap_or("unknown")
                );
                None
            }
            InboundEvent::Closed { reason } => Some(Event::RemoteClosed {
                id: session_id,
                reason,
            }),
            InboundEvent::Error { message } => {
                self.shared.stats.record_error(
                    "transport",
                    &message,
                    Some(session_id.to_string()),
                );
                Some(Event::TransportFailed {
                    id: session_id,
                    err: message,
                })
            }
        }
    }
}
