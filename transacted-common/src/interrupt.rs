//! Cooperative cancellation for blocking waits.
//!
//! An [`Interrupt`] is a cloneable handle: one side waits with
//! [`Interrupt::sleep`], any other holder can cut the wait short with
//! [`Interrupt::interrupt`]. The flag is sticky until [`Interrupt::clear`].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::error::Interrupted;

#[derive(Debug, Default)]
struct Inner {
    interrupted: Mutex<bool>,
    condvar: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter
    pub fn interrupt(&self) {
        let mut interrupted = self.inner.interrupted.lock();
        *interrupted = true;
        self.inner.condvar.notify_all();
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        *self.inner.interrupted.lock()
    }

    /// Lower the flag, returning whether it was raised
    pub fn clear(&self) -> bool {
        std::mem::take(&mut *self.inner.interrupted.lock())
    }

    /// Block the current thread for `duration`, or until interrupted.
    ///
    /// # Errors
    /// [`Interrupted`] if the flag was raised before or during the wait. The
    /// flag is left raised.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;
        let mut interrupted = self.inner.interrupted.lock();

        while !*interrupted {
            if self
                .inner
                .condvar
                .wait_until(&mut interrupted, deadline)
                .timed_out()
            {
                break;
            }
        }

        if *interrupted { Err(Interrupted) } else { Ok(()) }
    }
}
