//! Bounded-free byte channels for interprocess communication.
//!
//! A channel is a pair of handles, a [`Sender`] and a [`Receiver`], that share
//! a queue guarded by a [`SpinLock`]. This is the primitive that backs the
//! `pipe` system call: [`FileKind::Tx`] wraps a [`Sender<u8>`] and
//! [`FileKind::Rx`] wraps a [`Receiver<u8>`].
//!
//! Unlike [`crate::sync::SpinLock`], which only protects data, a channel also
//! has to put a thread to sleep when a [`Receiver::recv`] finds the queue
//! empty, and wake it back up once a [`Sender::send`] has something for it.
//! This mirrors the way [`ConditionVariable`] is built on top of
//! [`crate::thread::Current::park_with`] and a queue of [`ParkHandle`]s: a
//! reader that finds nothing to read parks itself and records a handle; a
//! writer that adds data pops one parked handle and calls [`ParkHandle::unpark`].
//!
//! The channel is not bounded. A pipe in KeOS therefore never blocks the
//! writer; it only ever blocks the reader. Dropping every [`Sender`] makes
//! subsequent `recv` calls observe end-of-file (`None`) once the queue drains;
//! dropping every [`Receiver`] makes subsequent `send` calls fail with
//! [`KernelError::BrokenPipe`].
//!
//! [`FileKind::Tx`]: ../../keos_fdtable/file_struct/enum.FileKind.html#variant.Tx
//! [`FileKind::Rx`]: ../../keos_fdtable/file_struct/enum.FileKind.html#variant.Rx
//! [`ConditionVariable`]: ../../keos_sched/sync/condition_variable/struct.ConditionVariable.html

use crate::{KernelError, sync::SpinLock, thread::ParkHandle, thread::Current};
use alloc::{collections::vec_deque::VecDeque, sync::Arc};

struct Inner<T> {
    queue: VecDeque<T>,
    senders: usize,
    receivers: usize,
    waiters: VecDeque<ParkHandle>,
}

/// The sending half of a channel, created by [`channel`].
pub struct Sender<T> {
    inner: Arc<SpinLock<Inner<T>>>,
}

/// The receiving half of a channel, created by [`channel`].
pub struct Receiver<T> {
    inner: Arc<SpinLock<Inner<T>>>,
}

/// Creates a new unbounded channel, returning the sender/receiver pair.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(SpinLock::new(Inner {
        queue: VecDeque::new(),
        senders: 1,
        receivers: 1,
        waiters: VecDeque::new(),
    }));
    (
        Sender {
            inner: inner.clone(),
        },
        Receiver { inner },
    )
}

impl<T> Sender<T> {
    /// Pushes a value into the channel.
    ///
    /// Wakes one parked reader, if any. Fails with
    /// [`KernelError::BrokenPipe`] if every [`Receiver`] has been dropped.
    pub fn send(&self, val: T) -> Result<(), KernelError> {
        let mut inner = self.inner.lock();
        if inner.receivers == 0 {
            inner.unlock();
            return Err(KernelError::BrokenPipe);
        }
        inner.queue.push_back(val);
        let waiter = inner.waiters.pop_front();
        inner.unlock();
        if let Some(w) = waiter {
            w.unpark();
        }
        Ok(())
    }

    /// Returns whether any [`Receiver`] for this channel is still alive.
    pub fn is_closed(&self) -> bool {
        let inner = self.inner.lock();
        let closed = inner.receivers == 0;
        inner.unlock();
        closed
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        let mut inner = self.inner.lock();
        inner.senders += 1;
        inner.unlock();
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.senders -= 1;
        let wake = if inner.senders == 0 {
            core::mem::take(&mut inner.waiters)
        } else {
            VecDeque::new()
        };
        inner.unlock();
        for w in wake {
            w.unpark();
        }
    }
}

impl<T> Receiver<T> {
    /// Blocks until a value is available, the queue is drained and every
    /// [`Sender`] has been dropped (end-of-file, returns `None`).
    pub fn recv(&self) -> Option<T> {
        loop {
            let mut inner = self.inner.lock();
            if let Some(v) = inner.queue.pop_front() {
                inner.unlock();
                return Some(v);
            }
            if inner.senders == 0 {
                inner.unlock();
                return None;
            }
            Current::park_with(move |handle| {
                inner.waiters.push_back(handle);
                inner.unlock();
            });
        }
    }

    /// Pops a value without blocking.
    ///
    /// Returns `None` immediately if the queue is currently empty, whether or
    /// not any [`Sender`] remains.
    pub fn try_recv(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let v = inner.queue.pop_front();
        inner.unlock();
        v
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        let mut inner = self.inner.lock();
        inner.receivers += 1;
        inner.unlock();
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.receivers -= 1;
        inner.unlock();
    }
}

unsafe impl<T: Send> Send for Sender<T> {}
unsafe impl<T: Send> Sync for Sender<T> {}
unsafe impl<T: Send> Send for Receiver<T> {}
unsafe impl<T: Send> Sync for Receiver<T> {}
