use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::capture::{AudioFrame, CaptureBackend, CaptureConfig, CaptureState, PermissionDenied};

/// Microphone backend over cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread; the
/// backend talks to that thread through channels only. The device callback
/// folds interleaved input to mono, decimates to the target rate, and
/// re-frames into fixed-size [`AudioFrame`]s.
pub struct MicBackend {
    config: CaptureConfig,
    state: CaptureState,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicBackend {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        Ok(Self {
            config,
            state: CaptureState::Idle,
            stop_tx: None,
            thread: None,
        })
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.state = CaptureState::Requesting;

        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(32);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let config = self.config.clone();
        let thread = std::thread::spawn(move || {
            run_capture_thread(config, frame_tx, stop_rx, ready_tx);
        });

        // The stream thread reports once the device is open (or refused).
        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .context("capture thread startup interrupted")?;

        match ready {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                self.state = CaptureState::Capturing;
                info!("microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                self.state = if e.is::<PermissionDenied>() {
                    CaptureState::PermissionDenied
                } else {
                    CaptureState::Idle
                };
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                self.state = CaptureState::Idle;
                Err(anyhow!("capture thread exited before reporting ready"))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            info!("microphone capture stopped");
        }
        if self.state != CaptureState::PermissionDenied {
            self.state = CaptureState::Idle;
        }
        Ok(())
    }

    fn state(&self) -> CaptureState {
        self.state
    }

    fn name(&self) -> &str {
        "cpal-mic"
    }
}

impl Drop for MicBackend {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_capture_thread(
    config: CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    stop_rx: std::sync::mpsc::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<Result<()>>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            // No device usually means access was refused at the OS level
            let _ = ready_tx.send(Err(anyhow::Error::new(PermissionDenied)));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(supported) => supported,
        Err(e) => {
            let _ = ready_tx.send(Err(anyhow!(e).context("no usable input configuration")));
            return;
        }
    };

    let device_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let stream_config: cpal::StreamConfig = supported.config();

    let failed = Arc::new(AtomicBool::new(false));
    let framer = Framer::new(config, device_rate, channels, frame_tx);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, framer, &failed),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, framer, &failed),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, framer, &failed),
        other => Err(anyhow!("unsupported input sample format: {:?}", other)),
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(anyhow!(e).context("failed to start input stream")));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Park until stop is requested or the device errors out. Dropping the
    // stream at the end of this scope releases the device track.
    loop {
        match stop_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if failed.load(Ordering::Acquire) {
                    warn!("input device lost, tearing down capture");
                    break;
                }
            }
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut framer: Framer,
    failed: &Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let failed = Arc::clone(failed);
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                framer.push(data);
            },
            move |err| {
                warn!("input stream error: {}", err);
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => anyhow::Error::new(PermissionDenied),
            other => anyhow!(other).context("failed to open input stream"),
        })?;

    Ok(stream)
}

/// Accumulates device samples into fixed-size frames at the target rate.
struct Framer {
    target_rate: u32,
    frame_size: usize,
    decimation: usize,
    channels: usize,
    pending: Vec<f32>,
    skip: usize,
    emitted_samples: u64,
    frame_tx: mpsc::Sender<AudioFrame>,
}

impl Framer {
    fn new(
        config: CaptureConfig,
        device_rate: u32,
        channels: usize,
        frame_tx: mpsc::Sender<AudioFrame>,
    ) -> Self {
        // Decimate by an integer ratio; never upsample
        let decimation = (device_rate / config.sample_rate).max(1) as usize;
        Self {
            target_rate: config.sample_rate,
            frame_size: config.frame_size,
            decimation,
            channels: channels.max(1),
            pending: Vec::with_capacity(config.frame_size),
            skip: 0,
            emitted_samples: 0,
            frame_tx,
        }
    }

    fn push<T>(&mut self, data: &[T])
    where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        for group in data.chunks_exact(self.channels) {
            // Fold interleaved channels to mono
            let mut sum = 0.0f32;
            for &sample in group {
                let normalized: f32 = cpal::Sample::from_sample(sample);
                sum += normalized;
            }
            let mono = sum / self.channels as f32;

            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            self.skip = self.decimation - 1;

            self.pending.push(mono);
            if self.pending.len() >= self.frame_size {
                let samples = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_size),
                );
                let timestamp_ms = self.emitted_samples * 1000 / self.target_rate as u64;
                self.emitted_samples += samples.len() as u64;

                let frame = AudioFrame {
                    samples,
                    sample_rate: self.target_rate,
                    timestamp_ms,
                };

                // Never block the device callback; drop on backpressure
                if self.frame_tx.try_send(frame).is_err() {
                    warn!("frame channel full, dropping captured frame");
                }
            }
        }
    }
}
