//! Microphone capture worker
//!
//! Owns the lifecycle of the audio input device. A dedicated worker thread
//! blocking-reads chunks from the device, runs them through the
//! [`FrameAssembler`](crate::audio::FrameAssembler), and hands each completed
//! frame to a registered callback. Stopping flips a run flag and joins the
//! worker with a bounded timeout; the device is released when the worker
//! drops its stream handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::audio::assembler::FrameAssembler;
use crate::config::MicConfig;
use crate::constants::JOIN_TIMEOUT_MS;
use crate::diag::DiagnosticsSink;
use crate::error::AudioError;
use crate::util::join_timeout;

/// How long `start` waits for the worker to bring the device up
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

/// A source of raw interleaved 16-bit PCM.
///
/// `read` blocks for a bounded internal wait; `Ok(0)` means no data arrived
/// in that window and the caller should re-check its run flag and retry.
/// Sources are created on the capture worker and never leave it.
pub trait AudioSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;
}

/// Factory for audio sources, with synchronous format validation.
///
/// `validate` runs on the caller of `start` so format problems surface as
/// errors there; `open` runs on the capture worker, where the platform
/// stream handle must live.
pub trait InputDevice: Send + Sync {
    fn validate(&self, config: &MicConfig) -> Result<(), AudioError>;
    fn open(&self, config: &MicConfig) -> Result<Box<dyn AudioSource>, AudioError>;
}

/// Callback invoked on the capture worker for every completed PCM frame
pub type FrameCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Handle to a running capture worker
pub struct MicCapture {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MicCapture {
    /// Validate the configured format, open the device on a dedicated
    /// worker, and start delivering frames to `on_frame`.
    ///
    /// The shared `running` flag doubles as the worker's run flag: the
    /// orchestrator clears it to pause capture, and the worker clears it
    /// when the device dies out-of-band so the rest of the pipeline can
    /// observe the capture as inactive.
    pub fn start(
        device: Arc<dyn InputDevice>,
        config: &MicConfig,
        running: Arc<AtomicBool>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        mut on_frame: FrameCallback,
    ) -> Result<Self, AudioError> {
        device.validate(config)?;

        let config = config.clone();
        let run = Arc::clone(&running);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        running.store(true, Ordering::SeqCst);

        let worker: std::io::Result<JoinHandle<()>> = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let mut source = match device.open(&config) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut assembler = FrameAssembler::new(&config);
                let mut chunk = vec![0u8; config.capture_chunk_bytes()];
                tracing::info!(
                    "microphone capture started, {} byte reads",
                    chunk.len()
                );

                while run.load(Ordering::Relaxed) {
                    match source.read(&mut chunk) {
                        Ok(0) => continue,
                        Ok(n) => {
                            assembler.push_bytes(&chunk[..n], &mut |frame| {
                                diagnostics.frame_captured();
                                on_frame(frame);
                            });
                        }
                        Err(AudioError::PermissionDenied(msg)) => {
                            tracing::error!("microphone permission denied: {}", msg);
                            break;
                        }
                        Err(AudioError::DeviceStopped) => {
                            tracing::warn!("capture device stopped out-of-band");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!("capture read failed: {}", e);
                            break;
                        }
                    }
                }

                // Mark capture inactive for the orchestrator and sender,
                // whether we exited on request or on a device error.
                run.store(false, Ordering::SeqCst);
                tracing::info!("microphone capture worker exited");
            });

        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                return Err(AudioError::DeviceInitFailed(e.to_string()));
            }
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                running,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                Err(AudioError::DeviceInitFailed(
                    "timed out waiting for the device to open".into(),
                ))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the worker and release the device.
    ///
    /// Joins with a bounded timeout; a worker stuck in a device read is
    /// left to exit on its own at the next loop iteration.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if !join_timeout(worker, Duration::from_millis(JOIN_TIMEOUT_MS)) {
                tracing::warn!("capture worker did not exit within the join timeout");
            }
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = join_timeout(worker, Duration::from_millis(JOIN_TIMEOUT_MS));
        }
    }
}

/// Map a chunk-channel receive result onto the source contract
pub(crate) fn map_recv_timeout<T>(
    result: Result<T, RecvTimeoutError>,
) -> Result<Option<T>, AudioError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(AudioError::DeviceStopped),
    }
}
