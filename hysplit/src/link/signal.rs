use parking_lot::{Condvar, Mutex};

/// One-shot broadcast: fired once, observed by any number of waiters.
///
/// Firing says "phase 1 is over" and nothing about whether it succeeded.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Firing again has no effect.
    pub fn fire(&self) {
        let mut fired = self.fired.lock();
        if !*fired {
            *fired = true;
            self.condvar.notify_all();
        }
    }

    pub fn is_fired(&self) -> bool {
        *self.fired.lock()
    }

    /// Guard that fires the signal when dropped, unwinding included.
    pub fn fire_on_drop(&self) -> FireGuard<'_> {
        FireGuard { signal: self }
    }

    /// Block until the signal has fired.
    pub fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.condvar.wait(&mut fired);
        }
    }
}

/// See [`CompletionSignal::fire_on_drop`].
pub struct FireGuard<'a> {
    signal: &'a CompletionSignal,
}

impl Drop for FireGuard<'_> {
    fn drop(&mut self) {
        self.signal.fire();
    }
}
