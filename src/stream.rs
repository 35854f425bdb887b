//! Stream orchestrator
//!
//! The top-level state machine for one microphone streaming session. Owns
//! the capture, sender, and host-request-poller workers and the shared
//! flags they coordinate through. Capture (with its encoder) starts and
//! stops as the host asks for microphone input; the sender and poller
//! live for the whole session so a pause never renegotiates the port.
//!
//! ```text
//!  Idle ──start()──► WaitingForHostRequest ◄──poller──► CaptureActive
//!                              │                            ▲  │
//!                              │              resume()/poll │  │ pause()/poll
//!                              │                            │  ▼
//!                              │                       CapturePaused
//!                              └───────────stop()──► Stopped (terminal)
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::capture::{InputDevice, MicCapture};
use crate::audio::cpal_input::CpalInput;
use crate::audio::queue::BoundedFrameQueue;
use crate::codec::{EncoderFactory, FrameEncoder, OpusEncoderFactory};
use crate::config::MicConfig;
use crate::constants::{DEFAULT_MIC_PORT, JOIN_TIMEOUT_MS};
use crate::diag::{DiagnosticsSink, StreamDiagnostics};
use crate::error::{Error, Result};
use crate::network::sender::{self, SenderContext, SenderHandle};
use crate::session::StreamSession;
use crate::util::join_timeout;

/// Poller sleeps in short slices so teardown never waits a full interval
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Lifecycle of one streaming session.
///
/// Owned exclusively by the orchestrator; workers observe it only through
/// atomic flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Never started
    Idle,
    /// Running, capture suspended, polling for a host request
    WaitingForHostRequest,
    /// Device open, encoder open, sender draining
    CaptureActive,
    /// Device and encoder released; sender and poller still alive
    CapturePaused,
    /// Terminal; all resources released
    Stopped,
}

/// Bridges capture and network: encodes each PCM frame and inserts the
/// result into the bounded queue with the drop-oldest policy.
///
/// Runs on the capture worker, so it must stay fast and must never touch
/// the network. A failed encode drops that one frame and nothing else.
pub struct EncodeStage {
    encoder: Box<dyn FrameEncoder>,
    queue: Arc<BoundedFrameQueue>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl EncodeStage {
    pub fn new(
        encoder: Box<dyn FrameEncoder>,
        queue: Arc<BoundedFrameQueue>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            encoder,
            queue,
            diagnostics,
        }
    }

    pub fn process(&mut self, pcm: &[u8]) {
        let payload = match self.encoder.encode(pcm) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                self.diagnostics.encoding_error();
                tracing::warn!("frame encode failed: {}", e);
                return;
            }
        };

        self.diagnostics.frame_encoded();
        if self.queue.push(payload).is_some() {
            self.diagnostics.frame_dropped();
            tracing::warn!("outbound queue full, dropped oldest frame");
        }
    }
}

/// Control-plane state; one mutex so transitions are serialized
struct Control {
    state: PipelineState,
    capture: Option<MicCapture>,
    sender: Option<SenderHandle>,
    poller: Option<JoinHandle<()>>,
}

struct Inner {
    config: MicConfig,
    session: Arc<dyn StreamSession>,
    input: Arc<dyn InputDevice>,
    codec: Arc<dyn EncoderFactory>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    queue: Arc<BoundedFrameQueue>,
    /// Session is live: sender and poller keep running
    running: Arc<AtomicBool>,
    /// Capture worker is (or should be) feeding frames
    capture_active: Arc<AtomicBool>,
    /// Host currently wants microphone input
    host_requested: Arc<AtomicBool>,
    control: Mutex<Control>,
}

/// Microphone streaming pipeline for one session.
///
/// `stop` is terminal for an instance; a new session is a new `MicStream`.
pub struct MicStream {
    inner: Arc<Inner>,
}

impl MicStream {
    /// Build a stream on the default input device and Opus encoder
    pub fn new(config: MicConfig, session: Arc<dyn StreamSession>) -> Self {
        Self::with_parts(
            config,
            session,
            Arc::new(CpalInput),
            Arc::new(OpusEncoderFactory),
            Arc::new(StreamDiagnostics::new()),
        )
    }

    /// Build a stream from explicit collaborators
    pub fn with_parts(
        config: MicConfig,
        session: Arc<dyn StreamSession>,
        input: Arc<dyn InputDevice>,
        codec: Arc<dyn EncoderFactory>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let queue = Arc::new(BoundedFrameQueue::new(config.queue_capacity.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                session,
                input,
                codec,
                diagnostics,
                queue,
                running: Arc::new(AtomicBool::new(false)),
                capture_active: Arc::new(AtomicBool::new(false)),
                host_requested: Arc::new(AtomicBool::new(false)),
                control: Mutex::new(Control {
                    state: PipelineState::Idle,
                    capture: None,
                    sender: None,
                    poller: None,
                }),
            }),
        }
    }

    /// Start the session.
    ///
    /// On first start this spawns the host-request poller and, if the host
    /// already wants microphone input, goes straight to capture; otherwise
    /// the stream waits for a request. On a later start with capture
    /// inactive, capture is re-entered directly.
    pub fn start(&self) -> Result<()> {
        self.inner.config.validate()?;

        {
            let mut control = self.inner.control.lock();
            match control.state {
                PipelineState::Stopped => return Err(Error::Stopped),
                PipelineState::CaptureActive
                    if self.inner.capture_active.load(Ordering::SeqCst) =>
                {
                    return Ok(())
                }
                PipelineState::Idle => {
                    self.inner.diagnostics.reset();
                    self.inner.running.store(true, Ordering::SeqCst);

                    let inner = Arc::clone(&self.inner);
                    control.poller = Some(
                        thread::Builder::new()
                            .name("mic-host-poll".into())
                            .spawn(move || run_poller(inner))?,
                    );
                    // A failed capture attempt below leaves the session in
                    // this state: running, polling, capture down.
                    control.state = PipelineState::WaitingForHostRequest;

                    if self.inner.session.microphone_requested() {
                        self.inner.host_requested.store(true, Ordering::SeqCst);
                        tracing::info!("host already requesting microphone, starting capture");
                        // fall through to start_capture below
                    } else {
                        tracing::info!("waiting for host microphone request");
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        self.inner.start_capture()
    }

    /// Suspend capture, releasing the device and encoder but keeping the
    /// sender and poller alive so resumption is cheap.
    pub fn pause(&self) {
        self.inner.pause_capture();
    }

    /// Re-enter capture after a pause
    pub fn resume(&self) -> Result<()> {
        {
            let control = self.inner.control.lock();
            if control.state == PipelineState::Stopped {
                return Err(Error::Stopped);
            }
        }
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }
        self.inner.start_capture()
    }

    /// Tear the whole session down. Terminal: the instance cannot be
    /// restarted afterwards.
    pub fn stop(&self) {
        let (capture, sender_handle, poller) = {
            let mut control = self.inner.control.lock();
            if control.state == PipelineState::Stopped {
                return;
            }
            self.inner.running.store(false, Ordering::SeqCst);
            self.inner.capture_active.store(false, Ordering::SeqCst);
            self.inner.host_requested.store(false, Ordering::SeqCst);
            control.state = PipelineState::Stopped;
            (
                control.capture.take(),
                control.sender.take(),
                control.poller.take(),
            )
        };

        // Joins happen outside the lock; a worker stuck mid-iteration is
        // left to exit on its own once it observes the cleared flags.
        if let Some(capture) = capture {
            capture.stop();
        }
        if let Some(sender_handle) = sender_handle {
            sender_handle.join(Duration::from_millis(JOIN_TIMEOUT_MS));
        }
        if let Some(poller) = poller {
            if !join_timeout(poller, Duration::from_millis(JOIN_TIMEOUT_MS)) {
                tracing::warn!("host poller did not exit within the join timeout");
            }
        }
        self.inner.queue.clear();
        tracing::info!("microphone stream stopped");
    }

    /// Current pipeline state.
    ///
    /// If the capture worker died out-of-band (device stopped, permission
    /// revoked) the stream reports `CapturePaused` rather than a stale
    /// `CaptureActive`.
    pub fn state(&self) -> PipelineState {
        let control = self.inner.control.lock();
        if control.state == PipelineState::CaptureActive
            && !self.inner.capture_active.load(Ordering::SeqCst)
        {
            return PipelineState::CapturePaused;
        }
        control.state
    }

    /// Whether the pipeline is actively capturing and sending
    pub fn is_active(&self) -> bool {
        self.state() == PipelineState::CaptureActive
    }

    /// The observability sink this stream reports into
    pub fn diagnostics(&self) -> Arc<dyn DiagnosticsSink> {
        Arc::clone(&self.inner.diagnostics)
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        // The poller and sender hold clones of the shared state; without a
        // stop they would outlive the handle.
        self.stop();
    }
}

impl Inner {
    /// Bring up the sender (first time only), encoder, and capture worker
    fn start_capture(&self) -> Result<()> {
        let mut control = self.control.lock();
        if !self.running.load(Ordering::SeqCst) {
            // stop() raced us; nothing to do
            return Ok(());
        }
        if self.capture_active.load(Ordering::SeqCst)
            && control.capture.as_ref().is_some_and(|c| c.is_running())
        {
            return Ok(());
        }

        if control.sender.is_none() {
            let port = match self.session.microphone_port() {
                0 => {
                    tracing::warn!(
                        "no negotiated microphone port, using default {}",
                        DEFAULT_MIC_PORT
                    );
                    DEFAULT_MIC_PORT
                }
                port => port,
            };
            let target = SocketAddr::new(self.session.host_addr(), port);
            tracing::info!("microphone sender targeting {}", target);

            control.sender = Some(sender::spawn(SenderContext {
                target,
                queue: Arc::clone(&self.queue),
                running: Arc::clone(&self.running),
                capture_active: Arc::clone(&self.capture_active),
                host_requested: Arc::clone(&self.host_requested),
                diagnostics: Arc::clone(&self.diagnostics),
                send_interval: self.config.frame_interval(),
            })?);
        }

        let encoder = self.codec.create(&self.config)?;
        let mut stage = EncodeStage::new(
            encoder,
            Arc::clone(&self.queue),
            Arc::clone(&self.diagnostics),
        );

        let capture = MicCapture::start(
            Arc::clone(&self.input),
            &self.config,
            Arc::clone(&self.capture_active),
            Arc::clone(&self.diagnostics),
            Box::new(move |frame| stage.process(frame)),
        )?;

        control.capture = Some(capture);
        control.state = PipelineState::CaptureActive;
        tracing::info!("microphone capture active");
        Ok(())
    }

    /// Release the device and encoder; sender and poller stay up
    fn pause_capture(&self) {
        let capture = {
            let mut control = self.control.lock();
            if control.capture.is_none() && !self.capture_active.load(Ordering::SeqCst) {
                return;
            }
            self.capture_active.store(false, Ordering::SeqCst);
            control.state = PipelineState::CapturePaused;
            control.capture.take()
        };

        if let Some(capture) = capture {
            capture.stop();
        }
        // Stale frames are useless to a host that just stopped listening
        self.queue.clear();
        tracing::info!("microphone capture paused");
    }
}

/// Periodically poll the session for the host's microphone request and
/// drive capture on/off on transitions.
fn run_poller(inner: Arc<Inner>) {
    tracing::info!("host request poller started");

    while inner.running.load(Ordering::Relaxed) {
        let requested = inner.session.microphone_requested();
        let previous = inner.host_requested.load(Ordering::Relaxed);

        if requested && !previous {
            inner.host_requested.store(true, Ordering::SeqCst);
            tracing::info!("host requested microphone, starting capture");
            if let Err(e) = inner.start_capture() {
                tracing::warn!("failed to start capture on host request: {}", e);
            }
        } else if !requested && previous {
            inner.host_requested.store(false, Ordering::SeqCst);
            tracing::info!("host released microphone, pausing capture");
            inner.pause_capture();
        }

        let interval = inner.config.host_poll_interval();
        let mut waited = Duration::ZERO;
        while waited < interval && inner.running.load(Ordering::Relaxed) {
            thread::sleep(POLL_SLICE.min(interval - waited));
            waited += POLL_SLICE;
        }
    }

    tracing::info!("host request poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use bytes::Bytes;

    /// Encoder that tags each frame with a running index
    struct TaggingEncoder {
        count: u8,
        fail_on: Option<u8>,
    }

    impl FrameEncoder for TaggingEncoder {
        fn encode(&mut self, _pcm: &[u8]) -> std::result::Result<Option<Bytes>, CodecError> {
            let index = self.count;
            self.count = self.count.wrapping_add(1);
            if self.fail_on == Some(index) {
                return Err(CodecError::EncodingFailed("scripted failure".into()));
            }
            Ok(Some(Bytes::from(vec![index; 4])))
        }
    }

    #[test]
    fn encode_stage_applies_drop_oldest_backpressure() {
        let queue = Arc::new(BoundedFrameQueue::new(5));
        let diagnostics = Arc::new(StreamDiagnostics::new());
        let mut stage = EncodeStage::new(
            Box::new(TaggingEncoder {
                count: 0,
                fail_on: None,
            }),
            Arc::clone(&queue),
            Arc::clone(&diagnostics) as Arc<dyn DiagnosticsSink>,
        );

        // 8 frames into a capacity-5 queue with no sends: 3 drops
        let pcm = vec![0u8; 16];
        for _ in 0..8 {
            stage.process(&pcm);
        }

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.frames_encoded, 8);
        assert_eq!(snapshot.frames_dropped, 3);
        assert_eq!(queue.len(), 5);
        for tag in 3u8..8 {
            assert_eq!(queue.pop(), Some(Bytes::from(vec![tag; 4])));
        }
    }

    #[test]
    fn encode_stage_swallows_per_frame_failures() {
        let queue = Arc::new(BoundedFrameQueue::new(5));
        let diagnostics = Arc::new(StreamDiagnostics::new());
        let mut stage = EncodeStage::new(
            Box::new(TaggingEncoder {
                count: 0,
                fail_on: Some(1),
            }),
            Arc::clone(&queue),
            Arc::clone(&diagnostics) as Arc<dyn DiagnosticsSink>,
        );

        let pcm = vec![0u8; 16];
        for _ in 0..3 {
            stage.process(&pcm);
        }

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.frames_encoded, 2);
        assert_eq!(snapshot.encoding_errors, 1);
        assert_eq!(queue.len(), 2);
    }
}
