use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Cancellation signal shared between the caller of an operation and every process the
/// operation spawns. Clones share the same state, so cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Context(Arc<(Mutex<bool>, Condvar)>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation signal. All threads waiting on a clone of this [`Context`] are
    /// notified so they can terminate the processes they are supervising.
    pub fn cancel(&self) {
        let (lck, cvar) = &*self.0;
        *lock(lck) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lck, _) = &*self.0;
        *lock(lck)
    }

    /// Blocks until the context is cancelled or the timeout elapses, whichever happens first.
    /// Returns true if the context was cancelled.
    pub fn is_cancelled_with_timeout(&self, timeout: Duration) -> bool {
        let (lck, cvar) = &*self.0;
        let guard = lock(lck);
        let (cancelled, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}

// the flag is a plain bool, a poisoned lock still holds a meaningful value
fn lock(lck: &Mutex<bool>) -> MutexGuard<'_, bool> {
    lck.lock().unwrap_or_else(PoisonError::into_inner)
}
