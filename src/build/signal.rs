//! Single-fire completion signal.

use std::sync::{Arc, Condvar, Mutex};

/// Fired once when a resident pipeline finishes its first run.
///
/// Clones share the same state. Firing more than once has no further
/// effect, and waiting after the signal fired returns immediately.
#[derive(Debug, Clone, Default)]
pub struct FirstRun {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl FirstRun {
    /// Create an unfired signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, waking every waiter.
    pub fn fire(&self) {
        let (lock, cvar) = &*self.state;
        let mut fired = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !*fired {
            *fired = true;
            cvar.notify_all();
        }
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.state;
        let Ok(mut fired) = lock.lock() else { return };
        while !*fired {
            fired = match cvar.wait(fired) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}
