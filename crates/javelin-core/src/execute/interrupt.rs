//! Cell interruption.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Handle for interrupting the cell a session is running.
///
/// Cloneable and usable from any task or thread. Interrupting while no cell
/// runs has no effect on later cells: the flag is cleared when the next cell
/// starts.
///
/// ```
/// use javelin_core::execute::InterruptHandle;
///
/// let handle = InterruptHandle::new();
/// let other = handle.clone();
/// other.interrupt();
/// assert!(handle.is_interrupted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    interrupted: AtomicBool,
    notify: Notify,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request interruption of the running cell.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new cell starts.
    pub fn reset(&self) {
        self.inner.interrupted.store(false, Ordering::SeqCst);
    }

    /// Resolve once an interrupt has been requested.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }
}
