//! System for cooperatively interrupting in-flight mesh builds.

use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        AtomicU32,
        Ordering,
    },
};


/// Handle for marking a mesh build as interrupted. Really just some shared
/// atomics.
///
/// Interruption is cooperative: the build loop checks `is_aborted` at safe
/// points and bails. While a `shield` guard is live the abort is recorded
/// but not observable, so a short critical section can finish mutating
/// shared structures before the interrupt takes effect.
#[derive(Default, Debug, Clone)]
pub struct AbortHandle(Arc<State>);

#[derive(Default, Debug)]
struct State {
    aborted: AtomicBool,
    requeue: AtomicBool,
    shields: AtomicU32,
}

impl AbortHandle {
    /// Construct not aborted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether interruption has taken effect. Deferred while any shield is
    /// held.
    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::SeqCst)
            && self.0.shields.load(Ordering::SeqCst) == 0
    }

    /// Mark as interrupted. Idempotent.
    ///
    /// `requeue` records that the section should be queued again once the
    /// interrupted build reports back; once set it stays set.
    pub fn abort(&self, requeue: bool) {
        if requeue {
            self.0.requeue.store(true, Ordering::SeqCst);
        }
        self.0.aborted.store(true, Ordering::SeqCst);
    }

    /// Whether any abort asked for the section to be queued again.
    pub fn requeue_requested(&self) -> bool {
        self.0.requeue.load(Ordering::SeqCst)
    }

    /// Enter a non-interruptible critical section, ended when the guard
    /// drops.
    pub fn shield(&self) -> AbortShield {
        self.0.shields.fetch_add(1, Ordering::SeqCst);
        AbortShield(Arc::clone(&self.0))
    }
}


/// See `AbortHandle::shield`.
#[must_use]
#[derive(Debug)]
pub struct AbortShield(Arc<State>);

impl Drop for AbortShield {
    fn drop(&mut self) {
        self.0.shields.fetch_sub(1, Ordering::SeqCst);
    }
}


#[test]
fn test_abort_is_idempotent() {
    let handle = AbortHandle::new();
    assert!(!handle.is_aborted());
    handle.abort(false);
    handle.abort(false);
    assert!(handle.is_aborted());
    assert!(!handle.requeue_requested());
    handle.abort(true);
    assert!(handle.requeue_requested());
}

#[test]
fn test_shield_defers_abort() {
    let handle = AbortHandle::new();
    let shield = handle.shield();
    handle.abort(false);
    assert!(!handle.is_aborted());
    let inner = handle.shield();
    drop(shield);
    assert!(!handle.is_aborted());
    drop(inner);
    assert!(handle.is_aborted());
}
