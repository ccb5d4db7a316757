//! Deferred signal handling during transaction execution.
//!
//! While a transaction executes, SIGINT/SIGTERM must not kill the process
//! mid-action: the current action finishes, then rollback runs. A second
//! signal abandons the rollback. The guard installs a counting handler for
//! the duration of the transaction and restores the previous handlers on
//! drop.

use std::sync::atomic::{AtomicUsize, Ordering};

static SIGNAL_COUNT: AtomicUsize = AtomicUsize::new(0);

#[cfg(unix)]
extern "C" fn count_signal(_signal: libc::c_int) {
    SIGNAL_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Guard that defers termination signals while it is alive.
pub(crate) struct SignalGuard {
    baseline: usize,
    #[cfg(unix)]
    previous: [(libc::c_int, libc::sighandler_t); 2],
}

impl SignalGuard {
    /// Installs the deferring signal handlers.
    pub fn install() -> Self {
        #[cfg(unix)]
        {
            let handler = count_signal as libc::sighandler_t;
            let previous = [
                (libc::SIGINT, unsafe { libc::signal(libc::SIGINT, handler) }),
                (libc::SIGTERM, unsafe {
                    libc::signal(libc::SIGTERM, handler)
                }),
            ];
            Self {
                baseline: SIGNAL_COUNT.load(Ordering::SeqCst),
                previous,
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                baseline: SIGNAL_COUNT.load(Ordering::SeqCst),
            }
        }
    }

    /// Returns true once at least one signal arrived since installation.
    pub fn interrupted(&self) -> bool {
        SIGNAL_COUNT.load(Ordering::SeqCst) > self.baseline
    }

    /// Returns true once a second signal arrived; rollback is abandoned at
    /// that point.
    pub fn interrupted_twice(&self) -> bool {
        SIGNAL_COUNT.load(Ordering::SeqCst) >= self.baseline + 2
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        for (signal, previous) in self.previous {
            unsafe {
                libc::signal(signal, previous);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::SignalGuard;

    // No test raises real signals or pokes the counter: the disposition and
    // the counter are process-wide and tests run in parallel.
    #[test]
    fn install_and_restore() {
        let guard = SignalGuard::install();
        assert!(!guard.interrupted());
        drop(guard);
    }
}
