//! Device boundary for the voice session
//!
//! The session never talks to audio hardware directly. It asks an
//! [`AudioDeviceProvider`] for one input and one output device, and releases
//! both through their `close` methods. The cpal backend implements these
//! traits for real hardware; tests implement them with counting mocks.

use tokio::sync::mpsc;

/// Errors that can occur while acquiring or driving an audio device.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoOutputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    DeviceClosed,
    /// A running stream failed (device unplugged, backend error)
    DeviceLost(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoOutputDevice => write!(f, "No audio output device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::DeviceClosed => write!(f, "Audio device already closed"),
            AudioError::DeviceLost(e) => write!(f, "Audio device lost: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

/// Identifier of one scheduled playback buffer.
///
/// Ids are allocated by the playback scheduler and are unique for the
/// lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(pub u64);

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Decoded mono audio ready to be scheduled on an output device
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Requested capture format (mono)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
}

/// Requested playback format (mono)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackFormat {
    pub sample_rate: u32,
}

/// Callback invoked from the audio thread with mono samples at the
/// requested capture rate. Must not block.
pub type FrameCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Channel on which an output device reports voices that finished playing
pub type VoiceFinishedSender = mpsc::UnboundedSender<VoiceId>;

/// Channel on which an open device reports that its stream failed
pub type DeviceFaultSender = mpsc::UnboundedSender<AudioError>;

/// An open microphone. Capture stops once `close` returns.
pub trait InputDevice: Send {
    fn close(self: Box<Self>);
}

/// An open speaker with a monotonic clock and a voice scheduler.
pub trait OutputDevice: Send {
    /// Current position of the device clock in seconds
    fn current_time(&self) -> f64;

    /// Start playing `buffer` at `start_at` seconds on the device clock
    fn schedule(
        &mut self,
        voice: VoiceId,
        buffer: PlaybackBuffer,
        start_at: f64,
    ) -> Result<(), AudioError>;

    /// Stop a scheduled or playing voice immediately. Unknown ids are ignored.
    fn stop(&mut self, voice: VoiceId);

    /// Release the device. Pending voices are discarded.
    fn close(self: Box<Self>);
}

/// Factory for the two devices a session owns.
pub trait AudioDeviceProvider: Send + Sync {
    fn open_input(
        &self,
        format: CaptureFormat,
        on_frame: FrameCallback,
        faults: DeviceFaultSender,
    ) -> Result<Box<dyn InputDevice>, AudioError>;

    fn open_output(
        &self,
        format: PlaybackFormat,
        finished: VoiceFinishedSender,
        faults: DeviceFaultSender,
    ) -> Result<Box<dyn OutputDevice>, AudioError>;
}
