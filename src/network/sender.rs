//! Paced UDP sender worker
//!
//! The only component that touches the network. Runs independently of
//! whether capture is active, so a capture pause never costs the
//! negotiated port. Frames are drained from the bounded queue no faster
//! than one per frame interval, framed, and fired at the host; a failed
//! send is counted and retried-past, never fatal.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

use crate::audio::queue::BoundedFrameQueue;
use crate::constants::{SENDER_IDLE_SLEEP_MS, SENDER_RETRY_SLEEP_MS};
use crate::diag::DiagnosticsSink;
use crate::error::{Error, NetworkError};
use crate::network::packet;
use crate::util::{join_timeout, wall_clock_ms};

/// Sleep while waiting out the inter-send interval or an empty queue
const PACING_SLEEP: Duration = Duration::from_millis(1);

/// UDP send buffer requested at bind time
const SEND_BUFFER_SIZE: usize = 256 * 1024;

/// Everything the sender worker needs, bundled for the spawn
pub(crate) struct SenderContext {
    pub target: SocketAddr,
    pub queue: Arc<BoundedFrameQueue>,
    pub running: Arc<AtomicBool>,
    pub capture_active: Arc<AtomicBool>,
    pub host_requested: Arc<AtomicBool>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    /// Minimum interval between sends; the configured frame duration
    pub send_interval: Duration,
}

/// Handle to a running sender worker
pub(crate) struct SenderHandle {
    worker: JoinHandle<()>,
}

impl SenderHandle {
    /// Join the worker after the orchestrator has cleared the run flag
    pub(crate) fn join(self, timeout: Duration) {
        if !join_timeout(self.worker, timeout) {
            tracing::warn!("sender worker did not exit within the join timeout");
        }
    }
}

/// Bind a socket and start the sender worker
pub(crate) fn spawn(context: SenderContext) -> Result<SenderHandle, Error> {
    let socket = bind_socket(context.target)?;
    let worker = thread::Builder::new()
        .name("mic-sender".into())
        .spawn(move || run(socket, context))?;
    Ok(SenderHandle { worker })
}

fn bind_socket(target: SocketAddr) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_send_buffer_size(SEND_BUFFER_SIZE)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    let bind_addr: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket
        .bind(&bind_addr.into())
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket.into())
}

fn run(socket: UdpSocket, context: SenderContext) {
    let SenderContext {
        target,
        queue,
        running,
        capture_active,
        host_requested,
        diagnostics,
        send_interval,
    } = context;

    let mut sequence: u16 = 0;
    let mut last_send: Option<Instant> = None;
    tracing::info!("sender worker started, target {}", target);

    while running.load(Ordering::Relaxed) {
        // Nothing to do while capture is off or the host does not want us
        if !capture_active.load(Ordering::Relaxed) || !host_requested.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(SENDER_IDLE_SLEEP_MS));
            continue;
        }

        if let Some(last) = last_send {
            if last.elapsed() < send_interval {
                thread::sleep(PACING_SLEEP);
                continue;
            }
        }

        let Some(payload) = queue.pop() else {
            // An empty queue is not an error; frames may simply not be due
            thread::sleep(PACING_SLEEP);
            continue;
        };

        let datagram = packet::encode_packet(sequence, wall_clock_ms() as u32, &payload);
        match socket.send_to(&datagram, target) {
            Ok(_) => {
                sequence = sequence.wrapping_add(1);
                last_send = Some(Instant::now());
                diagnostics.frame_sent();
            }
            Err(e) => {
                diagnostics.send_error();
                tracing::warn!("failed to send microphone packet: {}", e);
                thread::sleep(Duration::from_millis(SENDER_RETRY_SLEEP_MS));
            }
        }
    }

    tracing::info!("sender worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::StreamDiagnostics;
    use bytes::Bytes;
    use crate::network::packet::MicPacket;

    struct Harness {
        receiver: UdpSocket,
        queue: Arc<BoundedFrameQueue>,
        running: Arc<AtomicBool>,
        capture_active: Arc<AtomicBool>,
        host_requested: Arc<AtomicBool>,
        diagnostics: Arc<StreamDiagnostics>,
        handle: SenderHandle,
    }

    fn start_harness(send_interval: Duration) -> Harness {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let target = receiver.local_addr().unwrap();

        let queue = Arc::new(BoundedFrameQueue::new(16));
        let running = Arc::new(AtomicBool::new(true));
        let capture_active = Arc::new(AtomicBool::new(true));
        let host_requested = Arc::new(AtomicBool::new(true));
        let diagnostics = Arc::new(StreamDiagnostics::new());

        let handle = spawn(SenderContext {
            target,
            queue: Arc::clone(&queue),
            running: Arc::clone(&running),
            capture_active: Arc::clone(&capture_active),
            host_requested: Arc::clone(&host_requested),
            diagnostics: Arc::clone(&diagnostics) as Arc<dyn DiagnosticsSink>,
            send_interval,
        })
        .unwrap();

        Harness {
            receiver,
            queue,
            running,
            capture_active,
            host_requested,
            diagnostics,
            handle,
        }
    }

    fn recv_packet(receiver: &UdpSocket) -> Option<MicPacket> {
        let mut buf = [0u8; 2048];
        let (n, _) = receiver.recv_from(&mut buf).ok()?;
        Some(MicPacket::parse(&buf[..n]).unwrap())
    }

    #[test]
    fn sends_queued_frames_with_consecutive_sequences() {
        let harness = start_harness(Duration::from_millis(1));
        for tag in 0u8..4 {
            harness.queue.push(Bytes::from(vec![tag; 10]));
        }

        let mut packets = Vec::new();
        while packets.len() < 4 {
            match recv_packet(&harness.receiver) {
                Some(p) => packets.push(p),
                None => break,
            }
        }
        harness.running.store(false, Ordering::SeqCst);
        harness.handle.join(Duration::from_millis(500));

        assert_eq!(packets.len(), 4);
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.sequence, i as u16);
            assert_eq!(packet.packet_type, packet::PACKET_TYPE_OPUS);
            assert_eq!(packet.ssrc, packet::PACKET_SSRC);
            assert_eq!(&packet.payload[..], &vec![i as u8; 10][..]);
        }
        assert_eq!(harness.diagnostics.snapshot().frames_sent, 4);
    }

    #[test]
    fn idles_until_the_host_requests() {
        let harness = start_harness(Duration::from_millis(1));
        harness.host_requested.store(false, Ordering::SeqCst);
        harness.queue.push(Bytes::from_static(b"held"));

        assert!(recv_packet(&harness.receiver).is_none());
        assert_eq!(harness.queue.len(), 1);

        harness.host_requested.store(true, Ordering::SeqCst);
        let packet = recv_packet(&harness.receiver).expect("packet after request");
        assert_eq!(&packet.payload[..], b"held");

        harness.running.store(false, Ordering::SeqCst);
        harness.handle.join(Duration::from_millis(500));
    }

    #[test]
    fn idles_while_capture_is_paused() {
        let harness = start_harness(Duration::from_millis(1));
        harness.capture_active.store(false, Ordering::SeqCst);
        harness.queue.push(Bytes::from_static(b"paused"));

        assert!(recv_packet(&harness.receiver).is_none());

        harness.running.store(false, Ordering::SeqCst);
        harness.handle.join(Duration::from_millis(500));
    }

    #[test]
    fn paces_sends_to_the_frame_interval() {
        let interval = Duration::from_millis(20);
        let harness = start_harness(interval);
        for tag in 0u8..3 {
            harness.queue.push(Bytes::from(vec![tag; 4]));
        }

        let start = Instant::now();
        let mut received = 0;
        while received < 3 && recv_packet(&harness.receiver).is_some() {
            received += 1;
        }
        // Three packets need at least two full inter-send gaps
        assert_eq!(received, 3);
        assert!(start.elapsed() >= interval * 2 - Duration::from_millis(2));

        harness.running.store(false, Ordering::SeqCst);
        harness.handle.join(Duration::from_millis(500));
    }
}
