//! Implementation of a simple spinlock whose whole state is a single integer.
//!
//! `0` means unlocked, `1` means locked. Nothing records which thread holds the
//! lock, so unlocking is only correct from the thread that locked it.
//!
//! ```
//! use csemutex::CseMutex;
//!
//! static LOCK: CseMutex = CseMutex::new();
//!
//! LOCK.init();
//! LOCK.lock();
//! //critical section
//! LOCK.unlock();
//! ```
use std::sync::atomic::{fence, AtomicI32, Ordering};

use lock_api::{GuardSend, RawMutex};
use log::trace;
use nix::sched;

use crate::cas::cas;

pub const UNLOCKED: i32 = 0;
pub const LOCKED: i32 = 1;

/// Spinlock over a single atomic integer. The cell is owned by the caller and
/// must not be moved while other threads may contend on it.
#[derive(Debug, Default)]
pub struct CseMutex {
    state: AtomicI32,
}

impl CseMutex {
    /// Returns an unlocked mutex
    pub const fn new() -> Self {
        CseMutex {
            state: AtomicI32::new(UNLOCKED),
        }
    }

    /// Reset the mutex to unlocked. Any later acquire-ordered read of the cell by
    /// another thread happens after this store. Must not be called while other
    /// threads may be contending on the mutex.
    pub fn init(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    /// Spin until this thread has moved the cell from unlocked to locked.
    /// Yields the rest of the timeslice after every failed attempt.
    pub fn lock(&self) {
        let attempts = self.spin();
        trace!("acquired {:p} after {} attempt(s)", &self.state, attempts);
    }

    /// Single acquisition attempt. Returns true if the lock is now held by the caller.
    pub fn try_lock(&self) -> bool {
        if !cas(&self.state, UNLOCKED, LOCKED) {
            return false;
        }
        fence(Ordering::Acquire);
        true
    }

    /// Release the mutex. Only the thread currently holding the lock may call this;
    /// misuse is not detected in release builds.
    pub fn unlock(&self) {
        let released = cas(&self.state, LOCKED, UNLOCKED);
        debug_assert!(released, "unlock called on an unlocked CseMutex");

        // must stay the last statement
        fence(Ordering::Release);
    }

    /// Relaxed snapshot of the cell. Not a synchronization point.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == LOCKED
    }

    /// Acquires the lock and returns the number of CAS attempts it took.
    pub(crate) fn spin(&self) -> usize {
        let mut attempts = 1;
        while !cas(&self.state, UNLOCKED, LOCKED) {
            // sched_yield(2) always succeeds on Linux
            let _ = sched::sched_yield();
            attempts += 1;
        }

        // must stay the last statement
        fence(Ordering::Acquire);
        attempts
    }
}

unsafe impl RawMutex for CseMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: CseMutex = CseMutex::new();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        CseMutex::lock(self)
    }

    fn try_lock(&self) -> bool {
        CseMutex::try_lock(self)
    }

    unsafe fn unlock(&self) {
        CseMutex::unlock(self)
    }

    fn is_locked(&self) -> bool {
        CseMutex::is_locked(self)
    }
}

/// Guard based mutex protecting a `T` with a [`CseMutex`]
pub type Mutex<T> = lock_api::Mutex<CseMutex, T>;
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, CseMutex, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_lock_unlock_leaves_unlocked() {
        let m = CseMutex::new();
        m.init();
        assert!(!m.is_locked());

        m.lock();
        assert!(m.is_locked());
        m.unlock();
        assert!(!m.is_locked());
    }

    #[test]
    fn uncontended_lock_takes_one_attempt() {
        let m = CseMutex::new();
        m.init();
        assert_eq!(m.spin(), 1);
        m.unlock();
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = CseMutex::new();
        m.init();
        assert!(m.try_lock());
        assert!(!m.try_lock());
        assert!(m.is_locked());
        m.unlock();
        assert!(m.try_lock());
        m.unlock();
    }

    #[test]
    fn init_resets_a_locked_cell() {
        let m = CseMutex::new();
        m.lock();
        m.init();
        assert!(!m.is_locked());
    }

    #[test]
    fn guard_drop_releases() {
        let m: Mutex<u32> = Mutex::new(0);
        {
            let mut g = m.lock();
            *g += 1;
            assert!(m.is_locked());
        }
        assert!(!m.is_locked());
        assert_eq!(*m.lock(), 1);
    }
}
