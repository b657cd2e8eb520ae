//! cpal-backed capture on the default input device.
//! The cpal stream is not `Send` on every platform, so it lives on a
//! dedicated thread that owns it until `stop()` signals.

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{AudioCapture, AudioFormat, AudioFrame, FrameTap};
use crate::error::ListenerError;

struct RunningCapture {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// `start` waits for the capture thread to open the device and `stop` joins
/// it; both return within the device's open/close latency.
#[derive(Default)]
pub struct CpalCapture {
    running: Mutex<Option<RunningCapture>>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioCapture for CpalCapture {
    fn is_available(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    fn input_format(&self) -> AudioFormat {
        cpal::default_host()
            .default_input_device()
            .and_then(|device| device.default_input_config().ok())
            .map(|config| AudioFormat::new(config.sample_rate().0, config.channels()))
            .unwrap_or(AudioFormat::new(0, 0))
    }

    fn start(&self, tap: FrameTap) -> Result<(), ListenerError> {
        self.stop();

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), ListenerError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || match build_stream(tap) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Hold the stream until told to stop (or the sender is dropped).
                    let _ = stop_rx.recv();
                    drop(stream);
                    info!("audio capture stream stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| ListenerError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *self.running.lock() = Some(RunningCapture { stop_tx, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(ListenerError::CaptureFailed("capture thread exited".into()))
            }
        }
    }

    fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            let _ = running.stop_tx.send(());
            if running.thread.join().is_err() {
                warn!("audio capture thread panicked");
            }
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream(tap: FrameTap) -> Result<cpal::Stream, ListenerError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(ListenerError::UnsupportedEnvironment)?;
    let supported = device
        .default_input_config()
        .map_err(|e| ListenerError::CaptureFailed(e.to_string()))?;
    let format = AudioFormat::new(supported.sample_rate().0, supported.channels()).validate()?;
    let stream_config = supported.config();
    let started = Instant::now();
    let on_error = |err: cpal::StreamError| error!(error = %err, "audio capture error");

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                tap(AudioFrame {
                    samples: data.to_vec(),
                    format,
                    timestamp: started.elapsed(),
                });
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                tap(AudioFrame {
                    samples: data.iter().map(|&s| f32::from(s) / f32::from(i16::MAX)).collect(),
                    format,
                    timestamp: started.elapsed(),
                });
            },
            on_error,
            None,
        ),
        other => {
            return Err(ListenerError::CaptureFailed(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| ListenerError::CaptureFailed(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| ListenerError::CaptureFailed(format!("failed to start audio stream: {e}")))?;
    info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        "audio capture stream started"
    );
    Ok(stream)
}
