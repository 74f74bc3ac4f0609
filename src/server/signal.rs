use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One-way stop flag that sleepers can wait on.
///
/// Response pauses wait on this instead of sleeping outright, so raising it
/// cuts a delay short from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter. Idempotent.
    pub fn raise(&self) {
        let (_, cvar) = &*self.inner;
        *self.lock() = true;
        cvar.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.lock()
    }

    /// Blocks for up to `timeout`. Returns `true` if the flag was raised
    /// before (or while) waiting.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (_, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut raised = self.lock();

        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            raised = cvar
                .wait_timeout(raised, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        true
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_runs_full_timeout_when_not_raised() {
        let signal = StopSignal::new();
        let started = Instant::now();

        assert!(!signal.wait_timeout(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn raise_cuts_wait_short() {
        let signal = StopSignal::new();
        let raiser = signal.clone();

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            raiser.raise();
        });

        let started = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(signal.is_raised());
        thread.join().unwrap();
    }

    #[test]
    fn raised_signal_returns_immediately() {
        let signal = StopSignal::new();
        signal.raise();
        signal.raise();

        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }
}
