//! Synchronization primitives provided by the kernel.
//!
//! These are the spinning, non-blocking primitives the rest of `keos` and
//! its projects are built on. Blocking synchronization with priority
//! donation lives one layer up, in each project's own scheduler crate.

pub mod atomic;
pub mod rwlock;
pub mod spinlock;

pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spinlock::{SpinLock, SpinLockGuard, WouldBlock};
