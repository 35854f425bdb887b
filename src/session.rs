//! Connection-session boundary
//!
//! The streaming pipeline does not negotiate anything itself; it consumes an
//! already-established session that knows the remote host, whether that host
//! currently wants microphone input, and which UDP port was negotiated for it.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// What the pipeline needs to know about an established connection
pub trait StreamSession: Send + Sync {
    /// Resolved address of the remote host
    fn host_addr(&self) -> IpAddr;

    /// Whether the host currently wants microphone input; polled periodically
    fn microphone_requested(&self) -> bool;

    /// Negotiated microphone UDP port; 0 means "use the default port"
    fn microphone_port(&self) -> u16;
}

/// A session with a fixed host and port, with a toggleable request flag.
///
/// Used by the demo sender binary; tests use it to script host-request
/// transitions.
pub struct StaticSession {
    host: IpAddr,
    port: u16,
    requested: AtomicBool,
}

impl StaticSession {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            requested: AtomicBool::new(true),
        }
    }

    pub fn set_requested(&self, requested: bool) {
        self.requested.store(requested, Ordering::SeqCst);
    }
}

impl StreamSession for StaticSession {
    fn host_addr(&self) -> IpAddr {
        self.host
    }

    fn microphone_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn microphone_port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn static_session_toggles_request() {
        let session = StaticSession::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 47_000);
        assert!(session.microphone_requested());
        session.set_requested(false);
        assert!(!session.microphone_requested());
        assert_eq!(session.microphone_port(), 47_000);
    }
}
