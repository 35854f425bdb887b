//! Stream diagnostics
//!
//! Counters for every stage of the pipeline, behind a sink trait so tests can
//! substitute a fake and assert exact counts. The default implementation logs
//! a continuity summary at most every five seconds, driven from the increment
//! paths rather than a timer thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::constants::REPORT_INTERVAL_MS;

/// Observability sink for pipeline counters
pub trait DiagnosticsSink: Send + Sync {
    fn frame_captured(&self);
    fn frame_encoded(&self);
    fn frame_sent(&self);
    fn frame_dropped(&self);
    fn encoding_error(&self);
    fn send_error(&self);

    /// Zero all counters; called when a stream session starts
    fn reset(&self);
}

/// Default counter-based sink with periodic summary logging
pub struct StreamDiagnostics {
    frames_captured: AtomicU64,
    frames_encoded: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    encoding_errors: AtomicU64,
    send_errors: AtomicU64,
    started: Instant,
    last_report_ms: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_captured: u64,
    pub frames_encoded: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub encoding_errors: u64,
    pub send_errors: u64,
}

impl StreamDiagnostics {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            encoding_errors: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            started: Instant::now(),
            last_report_ms: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            encoding_errors: self.encoding_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }

    /// Log a continuity summary derived from the counter ratios
    pub fn report(&self) {
        let s = self.snapshot();
        let encode_ratio = ratio(s.frames_encoded, s.frames_captured);
        let send_ratio = ratio(s.frames_sent, s.frames_encoded);
        let continuity = ratio(s.frames_sent, s.frames_captured);

        tracing::info!(
            "mic stream stats: captured={} encoded={} sent={} dropped={} \
             encode_errors={} send_errors={} continuity={:.1}%",
            s.frames_captured,
            s.frames_encoded,
            s.frames_sent,
            s.frames_dropped,
            s.encoding_errors,
            s.send_errors,
            continuity * 100.0
        );

        if s.frames_captured > 0 && encode_ratio < 0.95 {
            tracing::warn!("encode continuity low: {:.1}%", encode_ratio * 100.0);
        }
        if s.frames_encoded > 0 && send_ratio < 0.95 {
            tracing::warn!("send continuity low: {:.1}%", send_ratio * 100.0);
        }
        if s.frames_dropped > 0 {
            tracing::warn!("{} frames dropped to backpressure", s.frames_dropped);
        }
    }

    /// Emit a report when enough time has passed since the last one
    fn tick(&self) {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let last = self.last_report_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < REPORT_INTERVAL_MS {
            return;
        }
        // One increment path wins the race to report
        if self
            .last_report_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.report();
        }
    }
}

impl Default for StreamDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl DiagnosticsSink for StreamDiagnostics {
    fn frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn frame_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn encoding_error(&self) {
        self.encoding_errors.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_encoded.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.encoding_errors.store(0, Ordering::Relaxed);
        self.send_errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_reset() {
        let diag = StreamDiagnostics::new();
        diag.frame_captured();
        diag.frame_captured();
        diag.frame_encoded();
        diag.frame_sent();
        diag.frame_dropped();
        diag.encoding_error();
        diag.send_error();

        let s = diag.snapshot();
        assert_eq!(s.frames_captured, 2);
        assert_eq!(s.frames_encoded, 1);
        assert_eq!(s.frames_sent, 1);
        assert_eq!(s.frames_dropped, 1);
        assert_eq!(s.encoding_errors, 1);
        assert_eq!(s.send_errors, 1);

        diag.reset();
        assert_eq!(diag.snapshot(), DiagnosticsSnapshot::default());
    }
}
