//! Process-wide target for driver callbacks.
//!
//! The driver entry points carry no context pointer, so at most one sink per
//! process may own the callbacks. A sink claims the slot before creating
//! buffers and installs its [`Dispatcher`] before starting the clock.

use super::dispatch::Dispatcher;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::thread;

static CLAIMED: AtomicBool = AtomicBool::new(false);
static ACTIVE: AtomicPtr<Dispatcher> = AtomicPtr::new(ptr::null_mut());
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// Exclusive ownership of the callback slot. Dropping it uninstalls any
/// dispatcher and frees the slot for the next sink.
#[derive(Debug)]
pub struct SlotClaim {
    _private: (),
}

pub fn claim() -> Option<SlotClaim> {
    CLAIMED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .ok()
        .map(|_| SlotClaim { _private: () })
}

pub fn is_claimed() -> bool {
    CLAIMED.load(Ordering::Acquire)
}

impl SlotClaim {
    pub fn install(&mut self, dispatcher: Box<Dispatcher>) {
        let old = ACTIVE.swap(Box::into_raw(dispatcher), Ordering::SeqCst);
        if !old.is_null() {
            wait_idle();
            // SAFETY: produced by Box::into_raw above and no callback holds it.
            drop(unsafe { Box::from_raw(old) });
        }
    }

    /// Detach the dispatcher, waiting for a callback that is still using it.
    pub fn uninstall(&mut self) -> Option<Box<Dispatcher>> {
        let old = ACTIVE.swap(ptr::null_mut(), Ordering::SeqCst);
        if old.is_null() {
            return None;
        }
        wait_idle();
        // SAFETY: produced by Box::into_raw in `install`; unreachable for new
        // callbacks after the swap and no in-flight callback remains.
        Some(unsafe { Box::from_raw(old) })
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        self.uninstall();
        CLAIMED.store(false, Ordering::Release);
    }
}

fn wait_idle() {
    while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        thread::yield_now();
    }
}

/// Run `f` on the installed dispatcher, if any. Called from the driver's
/// callback thread only.
pub(super) fn with_active<R>(f: impl FnOnce(&mut Dispatcher) -> R) -> Option<R> {
    IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    let active = ACTIVE.load(Ordering::SeqCst);
    let out = if active.is_null() {
        None
    } else {
        // SAFETY: the driver serializes callbacks, and `uninstall` waits for
        // IN_FLIGHT to drop before freeing.
        Some(f(unsafe { &mut *active }))
    };
    IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    out
}

#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
