//! Microphone capture pipeline
//!
//! Bridges the audio callback (sync) to the live stream (async).
//!
//! ```text
//! Audio Thread (sync)                 Tokio Runtime (async)
//! ┌──────────────────────┐            ┌─────────────────────┐
//! │ FrameCallback        │            │ run_sender()        │
//! │  ├─ gate check       │──channel──▶│  └─ sink.send_audio │
//! │  ├─ CaptureFramer    │ (bounded)  └─────────────────────┘
//! │  └─ try_send(chunk)  │
//! └──────────────────────┘
//! ```
//!
//! The callback never blocks: if the queue is full the chunk is dropped and
//! counted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::client::LiveSink;
use super::protocol::MediaBlob;
use super::StreamingError;
use crate::audio::codec::{encode_samples, CAPTURE_MIME_TYPE};
use crate::audio::FrameCallback;
use crate::stats::StatsCollector;

/// Samples per outbound chunk (256ms at 16kHz)
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// Default capacity of the outbound queue (about 8 seconds of audio)
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// One encoded microphone chunk ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundChunk {
    /// Capture order, starting at 0 for each session
    pub sequence: u64,
    pub sample_count: usize,
    pub blob: MediaBlob,
}

/// Accumulates callback blocks of arbitrary size into fixed-size chunks
#[derive(Debug)]
pub struct CaptureFramer {
    frame_samples: usize,
    buffer: Vec<f32>,
    next_sequence: u64,
}

impl Default for CaptureFramer {
    fn default() -> Self {
        Self::new(CAPTURE_FRAME_SAMPLES)
    }
}

impl CaptureFramer {
    pub fn new(frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            buffer: Vec::with_capacity(frame_samples * 2),
            next_sequence: 0,
        }
    }

    /// Add samples and return every chunk completed by them, in order
    pub fn push(&mut self, samples: &[f32]) -> Vec<OutboundChunk> {
        self.buffer.extend_from_slice(samples);

        let mut chunks = Vec::new();
        while self.buffer.len() >= self.frame_samples {
            let frame: Vec<f32> = self.buffer.drain(..self.frame_samples).collect();
            chunks.push(OutboundChunk {
                sequence: self.next_sequence,
                sample_count: frame.len(),
                blob: MediaBlob {
                    mime_type: CAPTURE_MIME_TYPE.to_string(),
                    data: encode_samples(&frame),
                },
            });
            self.next_sequence += 1;
        }
        chunks
    }

    /// Samples waiting for the next full chunk
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Capture side of a session: the gate plus the queue feeding the sender
pub struct CapturePipeline {
    gate: Arc<AtomicBool>,
}

impl CapturePipeline {
    /// Create a closed pipeline.
    ///
    /// Returns the pipeline, the callback to hand to the input device and
    /// the receiving end of the outbound queue.
    pub fn new(
        frame_samples: usize,
        queue_capacity: usize,
        stats: Arc<StatsCollector>,
    ) -> (Self, FrameCallback, mpsc::Receiver<OutboundChunk>) {
        let gate = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));

        let callback_gate = gate.clone();
        let mut framer = CaptureFramer::new(frame_samples);
        let callback: FrameCallback = Box::new(move |samples: &[f32]| {
            if !callback_gate.load(Ordering::SeqCst) {
                return;
            }
            for chunk in framer.push(samples) {
                stats.chunk_captured();
                match tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(TrySendError::Full(chunk)) => {
                        stats.chunk_dropped();
                        log::debug!("Capture: queue full, dropped chunk {}", chunk.sequence);
                    }
                    // Sender task gone, session is tearing down
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        });

        (Self { gate }, callback, rx)
    }

    /// Start forwarding microphone audio
    pub fn open(&self) {
        self.gate.store(true, Ordering::SeqCst);
        log::info!("Capture: gate opened");
    }

    /// Stop forwarding. Samples arriving afterwards are discarded.
    pub fn close(&self) {
        if self.gate.swap(false, Ordering::SeqCst) {
            log::info!("Capture: gate closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }
}

/// Drain the outbound queue onto the stream until cancelled.
///
/// This is the only writer of the stream. Cancellation is observed between
/// sends, so an in-flight send always completes. Returns the sink so the
/// caller can close it afterwards. A send failure is reported on `fault_tx`.
pub async fn run_sender(
    mut rx: mpsc::Receiver<OutboundChunk>,
    mut sink: Box<dyn LiveSink>,
    cancel: CancellationToken,
    fault_tx: mpsc::UnboundedSender<StreamingError>,
    stats: Arc<StatsCollector>,
) -> Box<dyn LiveSink> {
    log::info!("Capture: sender task started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(chunk) => {
                    if let Err(e) = sink.send_audio(&chunk).await {
                        log::warn!("Capture: send failed at chunk {}: {}", chunk.sequence, e);
                        let _ = fault_tx.send(e);
                        break;
                    }
                    let sent = stats.chunk_sent();
                    if sent % 50 == 0 {
                        log::debug!("Capture: sent {} chunks", sent);
                    }
                }
                None => break,
            },
        }
    }

    log::info!("Capture: sender task exiting");
    sink
}
