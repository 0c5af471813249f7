//! Upload progress reporting
//!
//! Progress is reported as the share of file bytes handed to the HTTP body.
//! Reported percentages only ever increase, and nothing is reported once the
//! upload has produced its outcome.

use parking_lot::Mutex;
use std::sync::Arc;

/// A single progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes of the file sent so far
    pub bytes_sent: u64,
    /// Size of the file
    pub total_bytes: u64,
    /// Whole percentage, 0..=100
    pub percent: u8,
}

/// Callback invoked with each progress notification.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Returns a callback that ignores progress.
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Turns byte counts into deduplicated, non-decreasing percentage callbacks.
pub(crate) struct ProgressTracker {
    total_bytes: u64,
    bytes_sent: u64,
    last_percent: Option<u8>,
    callback: ProgressCallback,
    closed: Arc<Mutex<bool>>,
}

impl ProgressTracker {
    pub(crate) fn new(total_bytes: u64, callback: ProgressCallback) -> (Self, ProgressGate) {
        let closed = Arc::new(Mutex::new(false));
        let tracker = Self {
            total_bytes,
            bytes_sent: 0,
            last_percent: None,
            callback,
            closed: closed.clone(),
        };
        (tracker, ProgressGate { closed })
    }

    /// Records `n` more bytes sent and notifies if the percentage moved.
    ///
    /// The gate lock is held across the callback, so closing the gate waits
    /// for a notification already in flight.
    pub(crate) fn advance(&mut self, n: u64) {
        let closed = self.closed.lock();
        if *closed {
            return;
        }

        self.bytes_sent = self.bytes_sent.saturating_add(n).min(self.total_bytes);
        let percent = percent_of(self.bytes_sent, self.total_bytes);

        if self.last_percent.map_or(true, |last| percent > last) {
            self.last_percent = Some(percent);
            (self.callback)(UploadProgress {
                bytes_sent: self.bytes_sent,
                total_bytes: self.total_bytes,
                percent,
            });
        }
    }
}

/// Stops a tracker from reporting; closed right before the outcome is returned.
pub(crate) struct ProgressGate {
    closed: Arc<Mutex<bool>>,
}

impl ProgressGate {
    pub(crate) fn close(&self) {
        *self.closed.lock() = true;
    }
}

impl Drop for ProgressGate {
    fn drop(&mut self) {
        self.close();
    }
}

fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as u128 * 100) / total as u128) as u8
}
