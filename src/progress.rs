//! Build progress as a single observable value.
//!
//! `-1` means no build is running. During a build the value is a percentage
//! in `[0, 100]` that only moves forward; workers racing to publish can only
//! raise it.

use std::sync::Arc;
use tokio::sync::watch;

pub const IDLE: i32 = -1;

pub type ProgressReceiver = watch::Receiver<i32>;

#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: Arc<watch::Sender<i32>>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IDLE);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.tx.subscribe()
    }

    pub fn current(&self) -> i32 {
        *self.tx.borrow()
    }

    pub fn is_idle(&self) -> bool {
        self.current() == IDLE
    }

    pub(crate) fn begin(&self) {
        self.tx.send_replace(0);
    }

    /// Publishes `percent` unless an equal or higher value is already out.
    pub(crate) fn advance(&self, percent: i32) {
        let percent = percent.clamp(0, 100);
        self.tx.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn finish(&self) {
        self.tx.send_replace(IDLE);
    }
}

/// `round(completed / total * 100)` with halves rounding up.
pub(crate) fn percent(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 100;
    }
    let scaled = (completed as u128 * 200 + total as u128) / (2 * total as u128);
    scaled.min(100) as i32
}
