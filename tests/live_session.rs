//! Integration tests for the voice session controller
//!
//! Both the audio devices and the live transport are mocks, so these run
//! without hardware or network:
//!
//! ```bash
//! cargo test --test live_session
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use app_lib::audio::codec::{decode_pcm16, encode_samples};
use app_lib::audio::{
    AudioDeviceProvider, AudioError, CaptureFormat, DeviceFaultSender, FrameCallback, InputDevice,
    OutputDevice, PlaybackBuffer, PlaybackFormat, VoiceFinishedSender, VoiceId, CAPTURE_MIME_TYPE,
};
use app_lib::live::{
    InboundEvent, LiveConfig, LiveSink, LiveStream, LiveTransport, MediaBlob, OutboundChunk,
    SessionContext, SessionStatus, SetupConfig, Speaker, VoiceSession,
};
use app_lib::live::{SessionError, StreamingError};

// ============================================================================
// Mock audio devices
// ============================================================================

#[derive(Default)]
struct DeviceLog {
    input_opens: usize,
    input_closes: usize,
    output_opens: usize,
    output_closes: usize,
    fail_input: bool,
    /// Device clock of the mock speaker (seconds)
    clock: f64,
    scheduled: Vec<(VoiceId, f64, f64)>,
    stopped: Vec<VoiceId>,
    on_frame: Option<FrameCallback>,
    finished: Option<VoiceFinishedSender>,
    faults: Option<DeviceFaultSender>,
}

#[derive(Clone, Default)]
struct MockProvider {
    log: Arc<Mutex<DeviceLog>>,
}

impl MockProvider {
    fn failing_input() -> Self {
        let provider = Self::default();
        provider.log.lock().unwrap().fail_input = true;
        provider
    }

    fn set_clock(&self, secs: f64) {
        self.log.lock().unwrap().clock = secs;
    }

    /// Deliver microphone samples as the audio thread would
    fn feed(&self, samples: &[f32]) {
        let mut log = self.log.lock().unwrap();
        let callback = log.on_frame.as_mut().expect("input device not open");
        callback(samples);
    }

    /// Report a voice as played out, as the output callback would
    fn finish(&self, voice: VoiceId) {
        let log = self.log.lock().unwrap();
        let finished = log.finished.as_ref().expect("output device not open");
        finished.send(voice).unwrap();
    }

    /// Report a stream error, as cpal does when a device is unplugged
    fn lose_device(&self) {
        let log = self.log.lock().unwrap();
        let faults = log.faults.as_ref().expect("devices not open");
        faults
            .send(AudioError::DeviceLost("device unplugged".to_string()))
            .unwrap();
    }

    fn scheduled_voices(&self) -> Vec<VoiceId> {
        let log = self.log.lock().unwrap();
        log.scheduled.iter().map(|(voice, _, _)| *voice).collect()
    }

    fn counts(&self) -> (usize, usize, usize, usize) {
        let log = self.log.lock().unwrap();
        (
            log.input_opens,
            log.input_closes,
            log.output_opens,
            log.output_closes,
        )
    }
}

struct MockInput {
    log: Arc<Mutex<DeviceLog>>,
}

impl InputDevice for MockInput {
    fn close(self: Box<Self>) {
        let mut log = self.log.lock().unwrap();
        log.input_closes += 1;
        log.on_frame = None;
    }
}

struct MockOutput {
    log: Arc<Mutex<DeviceLog>>,
}

impl OutputDevice for MockOutput {
    fn current_time(&self) -> f64 {
        self.log.lock().unwrap().clock
    }

    fn schedule(
        &mut self,
        voice: VoiceId,
        buffer: PlaybackBuffer,
        start_at: f64,
    ) -> Result<(), AudioError> {
        self.log
            .lock()
            .unwrap()
            .scheduled
            .push((voice, start_at, buffer.duration_secs()));
        Ok(())
    }

    fn stop(&mut self, voice: VoiceId) {
        self.log.lock().unwrap().stopped.push(voice);
    }

    fn close(self: Box<Self>) {
        let mut log = self.log.lock().unwrap();
        log.output_closes += 1;
        log.finished = None;
        log.faults = None;
    }
}

impl AudioDeviceProvider for MockProvider {
    fn open_input(
        &self,
        _format: CaptureFormat,
        on_frame: FrameCallback,
        faults: DeviceFaultSender,
    ) -> Result<Box<dyn InputDevice>, AudioError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_input {
            return Err(AudioError::NoInputDevice);
        }
        log.input_opens += 1;
        log.on_frame = Some(on_frame);
        log.faults = Some(faults);
        Ok(Box::new(MockInput {
            log: self.log.clone(),
        }))
    }

    fn open_output(
        &self,
        _format: PlaybackFormat,
        finished: VoiceFinishedSender,
        _faults: DeviceFaultSender,
    ) -> Result<Box<dyn OutputDevice>, AudioError> {
        let mut log = self.log.lock().unwrap();
        log.output_opens += 1;
        log.finished = Some(finished);
        Ok(Box::new(MockOutput {
            log: self.log.clone(),
        }))
    }
}

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Default)]
struct WireLog {
    connects: usize,
    sent: Vec<OutboundChunk>,
    sink_closes: usize,
    events: Option<mpsc::Sender<InboundEvent>>,
    setup: Option<SetupConfig>,
    /// Modes for the next connects, before falling back to the default
    queued_modes: VecDeque<ConnectMode>,
    /// When set, `close` on a sink waits for a permit
    close_gate: Option<Arc<Notify>>,
}

#[derive(Clone, Copy, PartialEq)]
enum ConnectMode {
    Succeed,
    Refuse,
    Hang,
}

#[derive(Clone)]
struct MockTransport {
    mode: ConnectMode,
    log: Arc<Mutex<WireLog>>,
}

impl MockTransport {
    fn new(mode: ConnectMode) -> Self {
        Self {
            mode,
            log: Arc::default(),
        }
    }

    /// Inject an event as if it came from the server
    async fn inject(&self, event: InboundEvent) {
        let tx = self
            .log
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("stream not open");
        tx.send(event).await.expect("inbound loop gone");
    }

    /// Use `modes` for the next connects, in order
    fn then(self, modes: &[ConnectMode]) -> Self {
        self.log.lock().unwrap().queued_modes = modes.iter().copied().collect();
        self
    }

    /// Hold every sink close until the returned gate is notified
    fn gate_closes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.log.lock().unwrap().close_gate = Some(gate.clone());
        gate
    }

    fn sent(&self) -> Vec<OutboundChunk> {
        self.log.lock().unwrap().sent.clone()
    }

    fn sink_closes(&self) -> usize {
        self.log.lock().unwrap().sink_closes
    }

    fn connects(&self) -> usize {
        self.log.lock().unwrap().connects
    }
}

struct RecordingSink {
    log: Arc<Mutex<WireLog>>,
}

#[async_trait]
impl LiveSink for RecordingSink {
    async fn send_audio(&mut self, chunk: &OutboundChunk) -> Result<(), StreamingError> {
        self.log.lock().unwrap().sent.push(chunk.clone());
        Ok(())
    }

    async fn close(&mut self) {
        let gate = self.log.lock().unwrap().close_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.log.lock().unwrap().sink_closes += 1;
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn connect(&self, setup: &SetupConfig) -> Result<LiveStream, StreamingError> {
        let mode = {
            let mut log = self.log.lock().unwrap();
            log.connects += 1;
            log.setup = Some(setup.clone());
            log.queued_modes.pop_front().unwrap_or(self.mode)
        };
        match mode {
            ConnectMode::Refuse => {
                Err(StreamingError::ConnectionFailed("connection refused".to_string()))
            }
            ConnectMode::Hang => std::future::pending().await,
            ConnectMode::Succeed => {
                let (tx, rx) = mpsc::channel(64);
                self.log.lock().unwrap().events = Some(tx);
                Ok(LiveStream {
                    sink: Box::new(RecordingSink {
                        log: self.log.clone(),
                    }),
                    events: rx,
                })
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn session_with(provider: &MockProvider, transport: &MockTransport) -> VoiceSession {
    VoiceSession::new(
        Arc::new(provider.clone()),
        Arc::new(transport.clone()),
        LiveConfig::default(),
    )
}

/// Poll `condition` until it holds or two seconds pass
async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn audio_blob(secs: f64) -> MediaBlob {
    let samples = vec![0.1f32; (24000.0 * secs) as usize];
    MediaBlob {
        mime_type: "audio/pcm;rate=24000".to_string(),
        data: encode_samples(&samples),
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_then_stop_releases_everything() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Active);
    assert!(session.playback().is_some());
    assert_eq!(provider.counts(), (1, 0, 1, 0));

    session.stop().await;
    assert_eq!(session.status(), SessionStatus::Closed);
    assert_eq!(provider.counts(), (1, 1, 1, 1));
    assert_eq!(transport.sink_closes(), 1);
    assert!(session.playback().is_none());

    // Second stop is a no-op
    session.stop().await;
    assert_eq!(provider.counts(), (1, 1, 1, 1));
    assert_eq!(transport.sink_closes(), 1);
}

#[tokio::test]
async fn test_setup_carries_interviewer_instruction() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    let setup = transport.log.lock().unwrap().setup.clone().unwrap();
    assert!(setup.instruction_text().contains("Professional"));

    session.stop().await;
}

#[tokio::test]
async fn test_stop_when_idle_does_nothing() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.stop().await;
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(provider.counts(), (0, 0, 0, 0));
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    let result = session.start(SessionContext::default()).await;
    assert!(matches!(result, Err(SessionError::AlreadyStarted)));
    assert_eq!(transport.connects(), 1);
    assert_eq!(provider.counts(), (1, 0, 1, 0));

    session.stop().await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    let first = session.session_id();
    session.stop().await;

    session.start(SessionContext::default()).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Active);
    assert_ne!(session.session_id(), first);
    session.stop().await;

    assert_eq!(provider.counts(), (2, 2, 2, 2));
    assert_eq!(transport.sink_closes(), 2);
}

#[tokio::test]
async fn test_missing_microphone_never_connects() {
    let provider = MockProvider::failing_input();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    let result = session.start(SessionContext::default()).await;
    assert!(matches!(
        result,
        Err(SessionError::DeviceUnavailable(AudioError::NoInputDevice))
    ));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(transport.connects(), 0);

    // The speaker was opened first and must be given back
    let (_, _, output_opens, output_closes) = provider.counts();
    assert_eq!(output_opens, output_closes);
    assert_eq!(session.errors().len(), 1);
}

#[tokio::test]
async fn test_connection_failure_releases_devices() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Refuse);
    let session = session_with(&provider, &transport);

    let result = session.start(SessionContext::default()).await;
    assert!(matches!(
        result,
        Err(SessionError::ConnectionError(StreamingError::ConnectionFailed(_)))
    ));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(provider.counts(), (1, 1, 1, 1));
}

#[tokio::test]
async fn test_stop_while_connecting_cancels_start() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Hang);
    let session = session_with(&provider, &transport);

    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start(SessionContext::default()).await })
    };

    wait_for(|| transport.connects() == 1).await;
    assert_eq!(session.status(), SessionStatus::Connecting);

    session.stop().await;
    let result = starter.await.unwrap();
    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert_eq!(session.status(), SessionStatus::Closed);
    assert_eq!(provider.counts(), (1, 1, 1, 1));
}

#[tokio::test]
async fn test_late_release_keeps_newer_connect_cancellable() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed).then(&[
        ConnectMode::Succeed,
        ConnectMode::Hang,
    ]);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    let gate = transport.gate_closes();

    // First teardown parks in the sink close
    let stopper = {
        let session = session.clone();
        tokio::spawn(async move { session.stop().await })
    };
    wait_for(|| provider.counts().1 == 1).await;
    assert_eq!(session.status(), SessionStatus::Closed);

    // A new attempt registers its connect token meanwhile
    let starter = {
        let session = session.clone();
        tokio::spawn(async move { session.start(SessionContext::default()).await })
    };
    wait_for(|| transport.connects() == 2).await;
    assert_eq!(session.status(), SessionStatus::Connecting);

    gate.notify_one();
    stopper.await.unwrap();
    assert_eq!(transport.sink_closes(), 1);

    // The finished release must not have taken the new attempt's token
    session.stop().await;
    let result = tokio::time::timeout(Duration::from_secs(2), starter)
        .await
        .expect("connecting start was not cancelled")
        .unwrap();
    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert_eq!(session.status(), SessionStatus::Closed);
    assert_eq!(provider.counts(), (2, 2, 2, 2));
}

#[tokio::test]
async fn test_device_fault_releases_session() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    provider.lose_device();

    wait_for(|| session.status() == SessionStatus::Idle).await;
    wait_for(|| provider.counts() == (1, 1, 1, 1)).await;
    assert_eq!(transport.sink_closes(), 1);
    assert!(session.playback().is_none());
    assert!(session
        .errors()
        .iter()
        .any(|e| e.error_type == "device" && e.message.contains("device unplugged")));

    // A fresh start works after the fault
    session.start(SessionContext::default()).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Active);
    session.stop().await;
    assert_eq!(provider.counts(), (2, 2, 2, 2));
}

#[tokio::test]
async fn test_remote_close_returns_to_idle() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);
    let mut status = session.subscribe_status();

    session.start(SessionContext::default()).await.unwrap();
    transport
        .inject(InboundEvent::Closed {
            reason: Some("session timeout".to_string()),
        })
        .await;

    tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| *s == SessionStatus::Idle),
    )
    .await
    .expect("session did not return to idle")
    .unwrap();

    // Release runs on the inbound task, after the status flips
    wait_for(|| provider.counts() == (1, 1, 1, 1)).await;
    assert_eq!(transport.sink_closes(), 1);

    // User stop afterwards finds nothing to release
    session.stop().await;
    assert_eq!(provider.counts(), (1, 1, 1, 1));
    assert_eq!(transport.sink_closes(), 1);
}

#[tokio::test]
async fn test_transport_error_is_recorded() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    transport
        .inject(InboundEvent::Error {
            message: "connection reset".to_string(),
        })
        .await;

    wait_for(|| session.status() == SessionStatus::Idle).await;
    assert!(session
        .errors()
        .iter()
        .any(|e| e.error_type == "transport" && e.message == "connection reset"));
}

// ============================================================================
// Capture
// ============================================================================

#[tokio::test]
async fn test_one_frame_of_silence_sends_one_chunk() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    provider.feed(&vec![0.0f32; 4096]);

    wait_for(|| transport.sent().len() == 1).await;
    let chunk = &transport.sent()[0];
    assert_eq!(chunk.sequence, 0);
    assert_eq!(chunk.sample_count, 4096);
    assert_eq!(chunk.blob.mime_type, CAPTURE_MIME_TYPE);

    let pcm = decode_pcm16(&chunk.blob.data).unwrap();
    assert_eq!(pcm.len(), 4096);
    assert!(pcm.iter().all(|&s| s == 0));

    session.stop().await;
    assert_eq!(session.stats().chunks_sent, 1);
}

#[tokio::test]
async fn test_partial_frames_are_accumulated_in_order() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    for _ in 0..5 {
        // 5 x 2048 samples = two full frames plus a remainder
        provider.feed(&vec![0.25f32; 2048]);
    }

    wait_for(|| transport.sent().len() == 2).await;
    let sequences: Vec<u64> = transport.sent().iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![0, 1]);

    session.stop().await;
}

// ============================================================================
// Playback and interruption
// ============================================================================

#[tokio::test]
async fn test_fragments_play_back_to_back() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    transport.inject(InboundEvent::AudioFragment(audio_blob(1.0))).await;
    transport.inject(InboundEvent::AudioFragment(audio_blob(0.5))).await;

    wait_for(|| session.playback().map(|p| p.pending) == Some(2)).await;
    let starts: Vec<f64> = provider
        .log
        .lock()
        .unwrap()
        .scheduled
        .iter()
        .map(|(_, start, _)| *start)
        .collect();
    assert_eq!(starts, vec![0.0, 1.0]);

    let snapshot = session.playback().unwrap();
    assert!((snapshot.cursor - 1.5).abs() < 1e-9);

    session.stop().await;
}

#[tokio::test]
async fn test_finished_voice_leaves_pending_set() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    transport.inject(InboundEvent::AudioFragment(audio_blob(1.0))).await;
    transport.inject(InboundEvent::AudioFragment(audio_blob(0.5))).await;
    wait_for(|| session.playback().map(|p| p.pending) == Some(2)).await;

    let voices = provider.scheduled_voices();
    provider.set_clock(1.0);
    provider.finish(voices[0]);

    wait_for(|| session.playback().map(|p| p.pending) == Some(1)).await;
    assert!(provider.log.lock().unwrap().stopped.is_empty());

    // The cursor still follows the remaining voice
    let snapshot = session.playback().unwrap();
    assert!((snapshot.cursor - 1.5).abs() < 1e-9);

    session.stop().await;
}

#[tokio::test]
async fn test_interruption_stops_playback_and_resets_cursor() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    transport.inject(InboundEvent::AudioFragment(audio_blob(1.0))).await;
    transport.inject(InboundEvent::AudioFragment(audio_blob(0.5))).await;
    wait_for(|| session.playback().map(|p| p.pending) == Some(2)).await;

    provider.set_clock(0.3);
    transport.inject(InboundEvent::Interrupted).await;

    wait_for(|| session.playback().map(|p| p.pending) == Some(0)).await;
    let snapshot = session.playback().unwrap();
    assert!((snapshot.cursor - 0.3).abs() < 1e-9);
    assert_eq!(provider.log.lock().unwrap().stopped.len(), 2);
    assert_eq!(session.stats().interruptions, 1);

    // The next response starts right away
    transport.inject(InboundEvent::AudioFragment(audio_blob(0.5))).await;
    wait_for(|| session.playback().map(|p| p.pending) == Some(1)).await;
    let last_start = provider.log.lock().unwrap().scheduled.last().unwrap().1;
    assert!((last_start - 0.3).abs() < 1e-9);

    session.stop().await;
}

#[tokio::test]
async fn test_bad_audio_is_skipped() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    transport
        .inject(InboundEvent::AudioFragment(MediaBlob {
            mime_type: "audio/pcm;rate=24000".to_string(),
            data: "%%% not base64 %%%".to_string(),
        }))
        .await;
    transport.inject(InboundEvent::AudioFragment(audio_blob(0.5))).await;

    wait_for(|| session.playback().map(|p| p.pending) == Some(1)).await;
    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(session.stats().fragments_rejected, 1);

    session.stop().await;
}

// ============================================================================
// Transcript
// ============================================================================

#[tokio::test]
async fn test_transcript_lines_are_published() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);
    let mut lines = session.subscribe_transcript();

    session.start(SessionContext::default()).await.unwrap();
    transport
        .inject(InboundEvent::TranscriptFragment {
            speaker: Speaker::Coach,
            text: "Tell me about yourself.".to_string(),
        })
        .await;
    transport
        .inject(InboundEvent::TranscriptFragment {
            speaker: Speaker::You,
            text: "   ".to_string(),
        })
        .await;
    transport
        .inject(InboundEvent::TranscriptFragment {
            speaker: Speaker::You,
            text: "I build data pipelines.".to_string(),
        })
        .await;

    let first = tokio::time::timeout(Duration::from_secs(2), lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.to_string(), "Coach: Tell me about yourself.");

    let second = tokio::time::timeout(Duration::from_secs(2), lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.speaker, Speaker::You);
    assert_eq!(second.text, "I build data pipelines.");

    assert_eq!(session.transcript().len(), 2);
    session.stop().await;
}

#[tokio::test]
async fn test_transcript_window_keeps_latest_lines() {
    let provider = MockProvider::default();
    let transport = MockTransport::new(ConnectMode::Succeed);
    let session = session_with(&provider, &transport);

    session.start(SessionContext::default()).await.unwrap();
    for i in 0..8 {
        transport
            .inject(InboundEvent::TranscriptFragment {
                speaker: Speaker::Coach,
                text: format!("line {}", i),
            })
            .await;
    }

    wait_for(|| session.stats().transcript_lines == 8).await;
    let texts: Vec<String> = session.transcript().into_iter().map(|l| l.text).collect();
    assert_eq!(texts, vec!["line 3", "line 4", "line 5", "line 6", "line 7"]);

    session.stop().await;
}
