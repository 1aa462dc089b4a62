//! CPU-GPU synchronization primitives.
//!
//! Every fence of a device shares the device's [`FenceNotifier`], so a single
//! condition variable wakes both single-fence waits and
//! [`GraphicsDevice::wait_for_fences`](crate::GraphicsDevice::wait_for_fences).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// Wakes threads waiting on fences.
#[derive(Debug, Default)]
pub(crate) struct FenceNotifier {
    lock: Mutex<()>,
    condvar: Condvar,
}

impl FenceNotifier {
    /// Run `update` under the lock, then wake every waiter.
    fn notify(&self, update: impl FnOnce()) {
        let _guard = self.lock.lock();
        update();
        self.condvar.notify_all();
    }

    /// Block until `ready` returns true or the timeout elapses.
    ///
    /// Returns the last value of `ready`.
    pub(crate) fn wait_until(&self, timeout: Option<Duration>, mut ready: impl FnMut() -> bool) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut guard = self.lock.lock();
        loop {
            if ready() {
                return true;
            }
            match deadline {
                None => self.condvar.wait(&mut guard),
                Some(deadline) => {
                    if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                        return ready();
                    }
                }
            }
        }
    }
}

/// Binary CPU-GPU synchronization primitive.
///
/// A fence is signaled once by the submission it guards and stays signaled
/// until [`reset`](Self::reset). Submitting with an already signaled fence is
/// a usage error.
///
/// # Example
///
/// ```ignore
/// let fence = device.create_fence(false);
/// device.submit_commands(&mut list, Some(&fence))?;
/// fence.wait();
/// assert_eq!(fence.status(), FenceStatus::Signaled);
/// ```
#[derive(Debug, Clone)]
pub struct Fence {
    signaled: Arc<AtomicBool>,
    notifier: Arc<FenceNotifier>,
}

impl Fence {
    pub(crate) fn new(signaled: bool, notifier: Arc<FenceNotifier>) -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(signaled)),
            notifier,
        }
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) {
        self.notifier.wait_until(None, || self.is_signaled());
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.notifier.wait_until(Some(timeout), || self.is_signaled())
    }

    /// Re-arm the fence.
    ///
    /// Must only be called when no submitted work is pending on this fence.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Signal the fence and wake waiters.
    pub(crate) fn signal(&self) {
        self.notifier
            .notify(|| self.signaled.store(true, Ordering::Release));
    }

    pub(crate) fn shares_notifier(&self, notifier: &Arc<FenceNotifier>) -> bool {
        Arc::ptr_eq(&self.notifier, notifier)
    }
}

// Ensure Fence is Send + Sync
static_assertions::assert_impl_all!(Fence: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn fence(signaled: bool) -> Fence {
        Fence::new(signaled, Arc::new(FenceNotifier::default()))
    }

    #[test]
    fn test_fence_unsignaled() {
        let fence = fence(false);
        assert_eq!(fence.status(), FenceStatus::Unsignaled);
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = fence(false);

        // Signal from another thread
        let fence_clone = fence.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            fence_clone.signal();
        });

        fence.wait();
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = fence(false);
        assert!(!fence.wait_timeout(Duration::from_millis(10)));
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_reset() {
        let fence = fence(true);
        assert!(fence.wait_timeout(Duration::ZERO));

        fence.reset();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_fence_clone_shares_state() {
        let fence1 = fence(false);
        let fence2 = fence1.clone();
        fence1.signal();
        assert!(fence2.is_signaled());
    }
}
