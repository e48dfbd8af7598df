//! One-shot deferred tasks on dedicated threads.
//!
//! Backs the lock watchdog and the deferred effectiveness checks. Each
//! `OneShot` owns exactly one thread that either fires after the delay or
//! wakes early on cancellation; dropping the handle cancels and joins, so
//! no timer thread outlives its owner.

use crossbeam_channel as xch;
use std::thread;
use std::time::Duration;

pub struct OneShot {
    cancel: xch::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OneShot {
    /// Run `task` after `delay` unless cancelled first.
    pub fn spawn<F>(delay: Duration, task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, rx) = xch::bounded::<()>(1);
        let handle = thread::spawn(move || {
            match rx.recv_timeout(delay) {
                Err(xch::RecvTimeoutError::Timeout) => task(),
                // Explicit cancel or owner dropped mid-shutdown.
                _ => {}
            }
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// True once the deferred task has run (or been cancelled) and its
    /// thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(thread::JoinHandle::is_finished)
    }

    /// Cancel without waiting for the drop.
    pub fn cancel(self) {
        // Drop impl performs the actual cancel + join.
    }
}

impl Drop for OneShot {
    fn drop(&mut self) {
        let _ = self.cancel.try_send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            // Task panicked; log but don't propagate from Drop.
            tracing::warn!("deferred task panicked during shutdown");
        }
    }
}
