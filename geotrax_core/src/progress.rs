//! Progress reporting and cancellation plumbing shared by the DEM batch
//! loader and the acquire worker. The worker owns no GUI handles; it only
//! talks to a `ProgressSink` and polls a `CancelToken` at its suspension
//! points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Receives one-line status messages from long-running operations.
pub trait ProgressSink: Send + Sync {
    fn status(&self, line: &str);
}

/// A sink that drops everything, for callers that do not care.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn status(&self, _line: &str) {}
}

/// Something that can be terminated early, typically a child process.
pub trait Kill: Send + Sync {
    fn kill(&self);
}

/// Cooperative cancellation token. Long-running operations poll
/// [`CancelToken::is_cancelled`] between blocking steps; operations that
/// spawn a child process register it so that [`CancelToken::cancel`] can
/// terminate it while the worker is blocked on its output.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    killable: Arc<Mutex<Option<Arc<dyn Kill>>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Raise the flag and terminate any registered child.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(guard) = self.killable.lock() {
            if let Some(k) = guard.as_ref() {
                k.kill();
            }
        }
    }

    /// Register the currently-running child so a later `cancel` reaches it.
    /// Kills it immediately if cancellation already happened.
    pub fn register_kill(&self, k: Arc<dyn Kill>) {
        if let Ok(mut guard) = self.killable.lock() {
            *guard = Some(k.clone());
        }
        if self.is_cancelled() {
            k.kill();
        }
    }

    pub fn clear_kill(&self) {
        if let Ok(mut guard) = self.killable.lock() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingKill(AtomicUsize);

    impl Kill for CountingKill {
        fn kill(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn cancel_reaches_registered_kill() {
        let token = CancelToken::new();
        let k = Arc::new(CountingKill(AtomicUsize::new(0)));
        token.register_kill(k.clone());
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(k.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_registration_is_killed_at_once() {
        let token = CancelToken::new();
        token.cancel();
        let k = Arc::new(CountingKill(AtomicUsize::new(0)));
        token.register_kill(k.clone());
        assert_eq!(k.0.load(Ordering::SeqCst), 1);
    }
}
