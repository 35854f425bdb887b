//! Small shared helpers for worker teardown and timestamps

use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Join a worker thread, giving up after `timeout`.
///
/// Returns `false` when the worker did not exit in time; the handle is
/// dropped and the thread left detached. Detached workers still observe
/// their run flag and exit at the next loop iteration.
pub(crate) fn join_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    handle.join().is_ok()
}

/// Milliseconds since the Unix epoch; the packet timestamp carries the low
/// 32 bits of this value.
pub(crate) fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_timeout_reports_prompt_exit() {
        let handle = std::thread::spawn(|| {});
        assert!(join_timeout(handle, Duration::from_millis(500)));
    }

    #[test]
    fn join_timeout_gives_up_on_stuck_worker() {
        let handle = std::thread::spawn(|| std::thread::sleep(Duration::from_secs(5)));
        let start = Instant::now();
        assert!(!join_timeout(handle, Duration::from_millis(50)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
