//! cpal-backed audio devices
//!
//! cpal streams are not `Send`, so each device lives on its own thread: the
//! thread builds and plays the stream, reports success back through a
//! handshake channel and then parks until the owning handle asks it to stop.
//! Dropping the stream on that thread releases the hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use super::device::{
    AudioDeviceProvider, AudioError, CaptureFormat, DeviceFaultSender, FrameCallback, InputDevice,
    OutputDevice, PlaybackBuffer, PlaybackFormat, VoiceFinishedSender, VoiceId,
};
use super::mixer::Mixer;
use super::resample::{mix_to_mono, resample};

/// Opens the host's default input and output devices.
#[derive(Debug, Default, Clone)]
pub struct CpalAudioProvider;

impl CpalAudioProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDeviceProvider for CpalAudioProvider {
    fn open_input(
        &self,
        format: CaptureFormat,
        on_frame: FrameCallback,
        faults: DeviceFaultSender,
    ) -> Result<Box<dyn InputDevice>, AudioError> {
        let active = Arc::new(AtomicBool::new(true));
        let thread_active = active.clone();

        let worker = DeviceThread::spawn("kazilens-capture", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or(AudioError::NoInputDevice)?;
            log::info!("Capture: using input device {:?}", device.name());

            let (config, sample_format) = pick_input_config(&device, format.sample_rate)?;
            log::info!(
                "Capture: device config {} Hz, {} channels, {:?} (target {} Hz mono)",
                config.sample_rate.0,
                config.channels,
                sample_format,
                format.sample_rate
            );

            let ctx = InputContext {
                on_frame,
                active: thread_active,
                channels: config.channels as usize,
                device_rate: config.sample_rate.0,
                target_rate: format.sample_rate,
            };

            let stream = match sample_format {
                SampleFormat::I16 => build_input_typed::<i16>(&device, &config, ctx, faults),
                SampleFormat::U16 => build_input_typed::<u16>(&device, &config, ctx, faults),
                SampleFormat::F32 => build_input_typed::<f32>(&device, &config, ctx, faults),
                _ => Err(AudioError::NoSupportedConfig),
            }?;

            stream.play().map_err(|e| {
                AudioError::StreamCreationFailed(format!("Failed to start input stream: {}", e))
            })?;
            Ok(stream)
        })?;

        Ok(Box::new(CpalInput { active, worker }))
    }

    fn open_output(
        &self,
        format: PlaybackFormat,
        finished: VoiceFinishedSender,
        faults: DeviceFaultSender,
    ) -> Result<Box<dyn OutputDevice>, AudioError> {
        // Rate is fixed once the device config is known; start with the request
        let mixer = Arc::new(Mutex::new(Mixer::new(format.sample_rate)));
        let thread_mixer = mixer.clone();

        let worker = DeviceThread::spawn("kazilens-playback", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(AudioError::NoOutputDevice)?;
            log::info!("Playback: using output device {:?}", device.name());

            let (config, sample_format) = pick_output_config(&device, format.sample_rate)?;
            log::info!(
                "Playback: device config {} Hz, {} channels, {:?}",
                config.sample_rate.0,
                config.channels,
                sample_format
            );
            *lock(&thread_mixer) = Mixer::new(config.sample_rate.0);

            let ctx = OutputContext {
                mixer: thread_mixer,
                finished,
                channels: config.channels as usize,
            };

            let stream = match sample_format {
                SampleFormat::I16 => build_output_typed::<i16>(&device, &config, ctx, faults),
                SampleFormat::U16 => build_output_typed::<u16>(&device, &config, ctx, faults),
                SampleFormat::F32 => build_output_typed::<f32>(&device, &config, ctx, faults),
                _ => Err(AudioError::NoSupportedConfig),
            }?;

            stream.play().map_err(|e| {
                AudioError::StreamCreationFailed(format!("Failed to start output stream: {}", e))
            })?;
            Ok(stream)
        })?;

        Ok(Box::new(CpalOutput {
            mixer,
            worker: Some(worker),
        }))
    }
}

/// Recover the guard even if an audio callback panicked while holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Thread owning one cpal stream
struct DeviceThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceThread {
    fn spawn<F>(name: &str, build: F) -> Result<Self, AudioError>
    where
        F: FnOnce() -> Result<Stream, AudioError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), AudioError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || match build() {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Park until the handle is closed or dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::StreamCreationFailed(
                    "Audio thread exited during setup".to_string(),
                ))
            }
        }
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Audio device thread panicked");
            }
        }
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct CpalInput {
    active: Arc<AtomicBool>,
    worker: DeviceThread,
}

impl InputDevice for CpalInput {
    fn close(mut self: Box<Self>) {
        self.active.store(false, Ordering::SeqCst);
        self.worker.shutdown();
        log::info!("Capture: input device released");
    }
}

struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    worker: Option<DeviceThread>,
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        lock(&self.mixer).current_time()
    }

    fn schedule(
        &mut self,
        voice: VoiceId,
        buffer: PlaybackBuffer,
        start_at: f64,
    ) -> Result<(), AudioError> {
        if self.worker.is_none() {
            return Err(AudioError::DeviceClosed);
        }
        lock(&self.mixer).add(voice, buffer, start_at);
        Ok(())
    }

    fn stop(&mut self, voice: VoiceId) {
        lock(&self.mixer).remove(voice);
    }

    fn close(mut self: Box<Self>) {
        lock(&self.mixer).clear();
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        log::info!("Playback: output device released");
    }
}

struct InputContext {
    on_frame: FrameCallback,
    active: Arc<AtomicBool>,
    channels: usize,
    device_rate: u32,
    target_rate: u32,
}

struct OutputContext {
    mixer: Arc<Mutex<Mixer>>,
    finished: VoiceFinishedSender,
    channels: usize,
}

fn pick_input_config(
    device: &Device,
    target_rate: u32,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let rate = SampleRate(target_rate);
    if let Ok(mut ranges) = device.supported_input_configs() {
        if let Some(range) = ranges.find(|r| {
            r.channels() == 1 && r.min_sample_rate() <= rate && r.max_sample_rate() >= rate
        }) {
            let supported = range.with_sample_rate(rate);
            return Ok((supported.config(), supported.sample_format()));
        }
    }

    let supported = device
        .default_input_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;
    Ok((supported.config(), supported.sample_format()))
}

fn pick_output_config(
    device: &Device,
    target_rate: u32,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let rate = SampleRate(target_rate);
    if let Ok(mut ranges) = device.supported_output_configs() {
        if let Some(range) = ranges.find(|r| {
            r.channels() == 1 && r.min_sample_rate() <= rate && r.max_sample_rate() >= rate
        }) {
            let supported = range.with_sample_rate(rate);
            return Ok((supported.config(), supported.sample_format()));
        }
    }

    let supported = device
        .default_output_config()
        .map_err(|_| AudioError::NoSupportedConfig)?;
    Ok((supported.config(), supported.sample_format()))
}

fn build_input_typed<T>(
    device: &Device,
    config: &StreamConfig,
    mut ctx: InputContext,
    faults: DeviceFaultSender,
) -> Result<Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Capture: stream error: {}", err);
        // Receiver gone means the session already tore down
        let _ = faults.send(AudioError::DeviceLost(err.to_string()));
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !ctx.active.load(Ordering::SeqCst) || data.is_empty() {
                    return;
                }
                let interleaved: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                let mono = mix_to_mono(&interleaved, ctx.channels);
                let samples = resample(&mono, ctx.device_rate, ctx.target_rate);
                (ctx.on_frame)(&samples);
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))
}

fn build_output_typed<T>(
    device: &Device,
    config: &StreamConfig,
    ctx: OutputContext,
    faults: DeviceFaultSender,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Playback: stream error: {}", err);
        let _ = faults.send(AudioError::DeviceLost(err.to_string()));
    };
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.clear();
                scratch.resize(data.len(), 0.0);

                let finished = lock(&ctx.mixer).render(&mut scratch, ctx.channels);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
                for voice in finished {
                    // Receiver gone means the session already tore down
                    let _ = ctx.finished.send(voice);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))
}
