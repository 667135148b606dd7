//! # Readers-Writer Lock.
//!
//! A **readers-writer lock** lets any number of readers hold the lock
//! concurrently, but guarantees a writer exclusive access. It generalizes
//! [`Mutex`], which only ever allows a single holder, to the common case
//! where most accesses only read shared data and concurrent reads are safe.
//!
//! Unlike [`keos::sync::RwLock`], which spins, this lock is a **monitor**:
//! both readers and writers sleep on a [`ConditionVariable`] while the lock
//! is unavailable, built entirely out of the primitives already implemented
//! in this crate ([`Mutex`] + [`ConditionVariable`]).
//!
//! ## Writer preference
//!
//! Once a writer starts waiting, new readers are not allowed to jump the
//! queue ahead of it: a reader acquires the lock only when there is no
//! active or waiting writer. This avoids writer starvation under a steady
//! stream of readers, at the cost of letting a single waiting writer delay
//! readers that arrive after it.
//!
//! ## Release order
//!
//! - A writer releasing the lock wakes the next waiting writer if one
//!   exists; otherwise it wakes every waiting reader.
//! - A reader releasing the lock only matters when it is the *last* active
//!   reader, in which case it wakes one waiting writer.
//!
//! [`Mutex`]: crate::sync::mutex::Mutex
//! [`ConditionVariable`]: crate::sync::condition_variable::ConditionVariable

use super::{condition_variable::ConditionVariable, mutex::Mutex};
use core::ops::{Deref, DerefMut};

struct State {
    active_readers: usize,
    waiting_readers: usize,
    active_writers: usize,
    waiting_writers: usize,
}

impl State {
    const fn new() -> Self {
        Self {
            active_readers: 0,
            waiting_readers: 0,
            active_writers: 0,
            waiting_writers: 0,
        }
    }
}

/// A reader-writer lock protecting `T`, with writer preference.
///
/// Multiple readers may hold this lock at once via [`RwLock::read`], but
/// [`RwLock::write`] always grants the caller exclusive access. Guards are
/// released explicitly via their `unlock` method, matching [`Mutex`]'s own
/// scoped-unlock discipline rather than `Drop`.
///
/// [`Mutex`]: crate::sync::mutex::Mutex
pub struct RwLock<T> {
    state: Mutex<State>,
    read: ConditionVariable,
    write: ConditionVariable,
    data: core::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new reader-writer lock in an unlocked state.
    pub const fn new(t: T) -> Self {
        Self {
            state: Mutex::new(State::new()),
            read: ConditionVariable::new(),
            write: ConditionVariable::new(),
            data: core::cell::UnsafeCell::new(t),
        }
    }

    /// Acquires this lock for shared read access, blocking while a writer
    /// is active or waiting.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        let mut st = self
            .read
            .wait_while(&self.state, |st| st.active_writers > 0 || st.waiting_writers > 0);
        st.active_readers += 1;
        st.unlock();
        RwLockReadGuard { lock: self }
    }

    /// Acquires this lock with exclusive write access, blocking while any
    /// reader or writer is active.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        {
            let mut st = self.state.lock();
            st.waiting_writers += 1;
            st.unlock();
        }
        let mut st = self
            .write
            .wait_while(&self.state, |st| st.active_readers > 0 || st.active_writers > 0);
        st.waiting_writers -= 1;
        st.active_writers += 1;
        st.unlock();
        RwLockWriteGuard { lock: self }
    }

    fn unlock_read(&self) {
        let mut st = self.state.lock();
        st.active_readers -= 1;
        let wake_writer = st.active_readers == 0 && st.waiting_writers > 0;
        if wake_writer {
            self.write.signal(st);
        } else {
            st.unlock();
        }
    }

    fn unlock_write(&self) {
        let mut st = self.state.lock();
        st.active_writers -= 1;
        if st.waiting_writers > 0 {
            self.write.signal(st);
        } else {
            self.read.broadcast(st);
        }
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> Self {
        RwLock::new(Default::default())
    }
}

/// A guard giving shared read access to an [`RwLock`]'s data.
///
/// Must be released explicitly via [`unlock`](Self::unlock).
pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> !Send for RwLockReadGuard<'_, T> {}
unsafe impl<T: Sync> Sync for RwLockReadGuard<'_, T> {}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> RwLockReadGuard<'_, T> {
    /// Releases the read lock.
    pub fn unlock(self) {
        self.lock.unlock_read();
        core::mem::forget(self);
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        panic!("`.unlock()` must be explicitly called for RwLockReadGuard.");
    }
}

/// A guard giving exclusive write access to an [`RwLock`]'s data.
///
/// Must be released explicitly via [`unlock`](Self::unlock).
pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> !Send for RwLockWriteGuard<'_, T> {}
unsafe impl<T: Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> RwLockWriteGuard<'_, T> {
    /// Releases the write lock.
    pub fn unlock(self) {
        self.lock.unlock_write();
        core::mem::forget(self);
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        panic!("`.unlock()` must be explicitly called for RwLockWriteGuard.");
    }
}
