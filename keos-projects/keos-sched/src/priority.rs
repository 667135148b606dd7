//! # Nested priority donation registry.
//!
//! [`Mutex`], [`Semaphore`] and [`ConditionVariable`] all need to answer two
//! questions that plain FIFO wait queues cannot: "which waiter should be
//! woken first?" and, for [`Mutex`], "should the current holder's priority be
//! temporarily raised so a higher-priority waiter isn't stuck behind it?".
//!
//! [`Thread`] carries no priority field of its own (KeOS inherited that from
//! its single-threaded-process ancestry), so this module keeps a side table
//! keyed by `tid`, mirroring the `EXIT_CODE_TABLE`/`THREAD_STATE_TABLE`
//! pattern already used in `keos::thread`.
//!
//! A thread waits on at most one lock at a time, so the donation chain
//! `waiter -> lock -> holder -> lock -> holder -> ...` is always a simple
//! path, not a graph: it is walked live from the registry rather than stored
//! as cyclic back-pointers.
//!
//! [`Mutex`]: crate::sync::mutex::Mutex
//! [`Semaphore`]: crate::sync::semaphore::Semaphore
//! [`ConditionVariable`]: crate::sync::condition_variable::ConditionVariable
//! [`Thread`]: keos::thread::Thread

use alloc::{collections::BTreeMap, collections::VecDeque, vec::Vec};
use keos::{sync::SpinLock, thread::Current, thread::ParkHandle};

/// The default base priority given to a thread the registry has not seen
/// before.
pub const DEFAULT_PRIORITY: usize = 31;

/// Identity of a lock, used only to key the donation tables. Any `Mutex` or
/// `Semaphore` can hand out one via its own stable address.
pub type LockId = usize;

/// Turns any synchronization object's address into a stable [`LockId`].
pub fn lock_id_of<T>(lock: *const T) -> LockId {
    lock as usize
}

struct PriorityUnit {
    base: usize,
    /// Donations received through held locks, keyed by the donating lock.
    donations: Vec<(LockId, usize)>,
    /// The lock this thread is currently blocked acquiring, if any.
    waiting_on: Option<LockId>,
}

impl PriorityUnit {
    fn new() -> Self {
        Self {
            base: DEFAULT_PRIORITY,
            donations: Vec::new(),
            waiting_on: None,
        }
    }

    fn effective(&self) -> usize {
        self.donations
            .iter()
            .map(|(_, p)| *p)
            .max()
            .unwrap_or(0)
            .max(self.base)
    }
}

#[derive(Default)]
struct Registry {
    units: BTreeMap<u64, PriorityUnit>,
    /// Current holder of each lock, so the donation walk can hop from a lock
    /// to the thread it should boost.
    holders: BTreeMap<LockId, u64>,
}

impl Registry {
    fn unit_mut(&mut self, tid: u64) -> &mut PriorityUnit {
        self.units.entry(tid).or_insert_with(PriorityUnit::new)
    }
}

static REGISTRY: SpinLock<Registry> = SpinLock::new(Registry {
    units: BTreeMap::new(),
    holders: BTreeMap::new(),
});

/// Sets the calling thread's base priority.
pub fn set_base_priority(priority: usize) {
    let tid = Current::get_tid();
    let mut r = REGISTRY.lock();
    r.unit_mut(tid).base = priority;
    r.unlock();
}

/// Returns `tid`'s current effective priority (`max(base, donations)`),
/// defaulting unknown threads to [`DEFAULT_PRIORITY`].
pub fn effective(tid: u64) -> usize {
    let r = REGISTRY.lock();
    let v = r
        .units
        .get(&tid)
        .map(PriorityUnit::effective)
        .unwrap_or(DEFAULT_PRIORITY);
    r.unlock();
    v
}

/// Records `holder` as the current owner of `lock`.
pub fn record_holder(lock: LockId, holder: u64) {
    let mut r = REGISTRY.lock();
    r.holders.insert(lock, holder);
    r.unlock();
}

/// Clears the holder of `lock` and strips any donations the releasing thread
/// received through it, restoring its priority to `max(base, remaining
/// donations)`.
pub fn release_holder(lock: LockId) {
    let tid = Current::get_tid();
    let mut r = REGISTRY.lock();
    r.holders.remove(&lock);
    r.unit_mut(tid).donations.retain(|(l, _)| *l != lock);
    r.unlock();
}

/// Marks the calling thread as about to block on `lock`, then performs
/// nested donation: walks `holder -> lock-it-waits-on -> its holder -> ...`,
/// raising each blocker's recorded donation for the lock it holds whenever
/// it is lower than the caller's own effective priority.
pub fn begin_wait(lock: LockId) {
    let tid = Current::get_tid();
    let mut r = REGISTRY.lock();
    r.unit_mut(tid).waiting_on = Some(lock);
    let caller_priority = r.unit_mut(tid).effective();

    let mut current_lock = lock;
    let mut guard_against_cycles = 0usize;
    loop {
        guard_against_cycles += 1;
        if guard_against_cycles > 64 {
            break;
        }
        let Some(&holder) = r.holders.get(&current_lock) else {
            break;
        };
        let holder_priority = r.unit_mut(holder).effective();
        if holder_priority >= caller_priority {
            break;
        }
        let hu = r.unit_mut(holder);
        match hu.donations.iter_mut().find(|(l, _)| *l == current_lock) {
            Some((_, p)) => *p = caller_priority,
            None => hu.donations.push((current_lock, caller_priority)),
        }
        hu.donations.sort_by(|a, b| b.1.cmp(&a.1));
        match r.unit_mut(holder).waiting_on {
            Some(next) => current_lock = next,
            None => break,
        }
    }
    r.unlock();
}

/// Clears the calling thread's waiting-lock pointer once it wakes up.
pub fn end_wait() {
    let tid = Current::get_tid();
    let mut r = REGISTRY.lock();
    r.unit_mut(tid).waiting_on = None;
    r.unlock();
}

/// Pops and returns the highest-effective-priority waiter, or `None` if
/// `waiters` is empty. Ties break in FIFO order.
pub fn pop_highest_priority(waiters: &mut VecDeque<ParkHandle>) -> Option<ParkHandle> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, h) in waiters.iter().enumerate() {
        let p = effective(h.tid());
        let is_better = match best {
            Some((_, best_p)) => p > best_p,
            None => true,
        };
        if is_better {
            best = Some((idx, p));
        }
    }
    let (idx, _) = best?;
    waiters.remove(idx)
}
