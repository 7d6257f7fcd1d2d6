//! Audio device layer for the live voice session
//!
//! Microphone capture and speaker playback go through the traits in
//! [`device`]. The cpal backend drives real hardware, with a software
//! [`mixer`] providing timed playback on top of cpal's pull callback.

pub mod codec;
mod cpal_backend;
pub mod device;
pub mod mixer;
pub mod resample;

pub use codec::{DecodeError, CAPTURE_MIME_TYPE, DEFAULT_PLAYBACK_RATE};
pub use cpal_backend::CpalAudioProvider;
pub use device::{
    AudioDeviceProvider, AudioError, CaptureFormat, DeviceFaultSender, FrameCallback, InputDevice,
    OutputDevice, PlaybackBuffer, PlaybackFormat, VoiceFinishedSender, VoiceId,
};
