//! # Frame table
//!
//! The frame table tracks every physical page handed out to user processes
//! and is the thing the page-fault handler asks for memory. Unlike
//! [`keos::mm::Page`], which any kernel subsystem can allocate freely, frames
//! vended through this table are bounded to [`USER_POOL_FRAMES`] and are
//! *evictable*: once the pool is full, acquiring another frame means picking
//! a victim, writing its contents out via the swap device or the owning
//! file, and handing the same physical page to the new owner.
//!
//! A frame never leaves the table once created; `free` only returns it to
//! the table's own free list. This keeps frame identity (and its physical
//! address) stable for the lifetime of the kernel, the same way
//! `keos::mm`'s arenas never shrink.
//!
//! ## Clock eviction
//!
//! [`FrameTable::full_get`] scans frames in index order starting from the
//! clock hand, wrapping around. A frame is reclaimed immediately if it is
//! unused; otherwise its owner's hardware accessed bit is consulted: if set,
//! it is cleared and the hand advances; if already clear, the frame is
//! chosen as a victim. The scan is bounded to twice the pool size, so a pool
//! where every frame is pinned panics rather than spinning forever.
//!
//! Multi-frame requests need a contiguous run of indices; if the run would
//! cross the end of the frame array, the search restarts at index 0 rather
//! than wrapping the run itself, matching the restart rule spelled out for
//! the scan as a whole.

use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use keos::{
    addressing::Pa,
    addressing::Va,
    mm::Page,
    sync::{SpinLock, SpinLockGuard},
};

/// Number of frames tracked by the user pool.
///
/// Kernel-pool pages (page tables, kernel heap, ...) are allocated directly
/// through `keos::mm::Page` and are never registered here; only pages handed
/// to a user address space go through the frame table, so they are the only
/// ones a permanently-pinned "kernel pool" frame would need to model. Since
/// this crate never registers kernel pages with the table, there is nothing
/// further to special-case for them.
pub const USER_POOL_FRAMES: usize = 512;

/// The address space a frame is currently on loan to.
///
/// The frame table never reaches into a page table directly: it asks the
/// owner to report and clear the hardware accessed bit, and to evict,
/// handing back whatever write-back the owner's own paging policy requires
/// (e.g. promoting an anonymous page to swap, or writing a memory-mapped
/// page back to its file).
pub trait FrameOwner: Send + Sync {
    /// Tests and clears the hardware accessed bit for the mapping at `uaddr`,
    /// returning its value before clearing.
    fn test_and_clear_accessed(&self, uaddr: Va) -> bool;

    /// Evicts the mapping at `uaddr`: removes it from the page table and
    /// performs whatever write-back its content kind requires.
    ///
    /// Returns the physical page that was mapped there, now unmapped and
    /// ready to be handed to a new owner.
    fn evict(&self, uaddr: Va) -> Page;
}

struct Frame {
    page: Option<Page>,
    pinned: bool,
    owner: Option<(Arc<dyn FrameOwner>, Va)>,
}

impl Frame {
    fn used(&self) -> bool {
        self.owner.is_some()
    }
}

/// The physical-frame pool backing user address spaces.
pub struct FrameTable {
    frames: Vec<Frame>,
    by_pa: BTreeMap<Pa, usize>,
    free: Vec<usize>,
    clock_hand: usize,
}

impl FrameTable {
    const fn new() -> Self {
        Self {
            frames: Vec::new(),
            by_pa: BTreeMap::new(),
            free: Vec::new(),
            clock_hand: 0,
        }
    }

    fn index_of(&self, kaddr: Pa) -> usize {
        *self
            .by_pa
            .get(&kaddr)
            .expect("kaddr is not a frame-table-tracked physical address")
    }

    /// Registers a freshly allocated page as a new frame, returning its
    /// physical address.
    ///
    /// Called internally whenever the pool needs to grow (up to
    /// [`USER_POOL_FRAMES`]); frames created this way start out unused, on
    /// the free list.
    fn create(&mut self, page: Page, pinned: bool) -> Pa {
        let kaddr = page.pa();
        let idx = self.frames.len();
        self.frames.push(Frame {
            page: Some(page),
            pinned,
            owner: None,
        });
        self.by_pa.insert(kaddr, idx);
        self.free.push(idx);
        kaddr
    }

    /// Assigns an owner to a frame previously taken out of the free list via
    /// [`FrameTable::take`].
    pub fn set_owner(&mut self, kaddr: Pa, owner: Arc<dyn FrameOwner>, uaddr: Va) {
        let idx = self.index_of(kaddr);
        self.frames[idx].owner = Some((owner, uaddr));
    }

    /// Pins or unpins a frame.
    ///
    /// Used around syscall I/O on a user buffer: every page of the buffer is
    /// pinned before the I/O starts and unpinned once it completes, so the
    /// frame can never be chosen as an eviction victim out from under an
    /// in-flight read or write.
    pub fn set_pinned(&mut self, kaddr: Pa, pinned: bool) {
        let idx = self.index_of(kaddr);
        self.frames[idx].pinned = pinned;
    }

    /// Takes the physical page out of a free frame so it can be mapped into
    /// a page table. The frame remains tracked but ownerless until
    /// [`FrameTable::set_owner`] is called.
    pub fn take(&mut self, kaddr: Pa) -> Page {
        let idx = self.index_of(kaddr);
        self.frames[idx]
            .page
            .take()
            .expect("frame is still owned; evict or unmap it first")
    }

    /// Returns an owned frame to the free pool.
    ///
    /// `page` must be the same physical page this frame was created with;
    /// the caller obtains it by unmapping the owner's page table entry.
    pub fn free(&mut self, page: Page) {
        let idx = self.index_of(page.pa());
        let frame = &mut self.frames[idx];
        frame.owner = None;
        frame.pinned = false;
        frame.page = Some(page);
        self.free.push(idx);
    }

    /// Pulls `n` frames from the free pool, growing the pool with freshly
    /// allocated pages while it is under [`USER_POOL_FRAMES`] capacity.
    ///
    /// Returns `None` if fewer than `n` frames are available even after
    /// growing; the caller should fall back to [`FrameTable::full_get`].
    pub fn get_multiple(&mut self, n: usize) -> Option<Vec<Pa>> {
        while self.free.len() < n && self.frames.len() < USER_POOL_FRAMES {
            let page = Page::new();
            self.create(page, false);
        }
        if self.free.len() < n {
            return None;
        }
        Some(
            (0..n)
                .map(|_| {
                    let idx = self.free.pop().unwrap();
                    self.frames[idx].page.as_ref().unwrap().pa()
                })
                .collect(),
        )
    }

    /// Evicts `n` contiguous frames via the clock algorithm and returns
    /// their physical addresses.
    ///
    /// Panics if no victim can be found within twice the pool size of scan
    /// steps; a pool where every frame is pinned is a kernel bug, not a
    /// recoverable condition.
    pub fn full_get(&mut self, n: usize) -> Vec<Pa> {
        assert!(
            n <= self.frames.len(),
            "requested more contiguous frames than the pool holds"
        );
        let budget = self.frames.len() * 2;
        let mut scanned = 0;
        loop {
            if self.clock_hand + n > self.frames.len() {
                self.clock_hand = 0;
            }
            if let Some(run) = self.try_evict_run(self.clock_hand, n) {
                return run;
            }
            self.clock_hand = (self.clock_hand + 1) % self.frames.len();
            scanned += 1;
            assert!(scanned <= budget, "clock eviction found no victim");
        }
    }

    /// Attempts to evict the `n` frames starting at `start`, advancing each
    /// candidate's accessed bit as the clock algorithm requires. Returns
    /// `None` (without side effects beyond clearing accessed bits) if any
    /// frame in the run is currently pinned or still in its second chance.
    fn try_evict_run(&mut self, start: usize, n: usize) -> Option<Vec<Pa>> {
        let mut victims = Vec::with_capacity(n);
        for i in start..start + n {
            let frame = &self.frames[i];
            if frame.pinned {
                return None;
            }
            if !frame.used() {
                continue;
            }
            let (owner, uaddr) = frame.owner.clone().unwrap();
            if owner.test_and_clear_accessed(uaddr) {
                return None;
            }
            victims.push(i);
        }
        for &idx in &victims {
            let (owner, uaddr) = self.frames[idx].owner.take().unwrap();
            let page = owner.evict(uaddr);
            self.frames[idx].page = Some(page);
        }
        Some(
            (start..start + n)
                .map(|i| self.frames[i].page.as_ref().unwrap().pa())
                .collect(),
        )
    }
}

static FRAME_TABLE: SpinLock<FrameTable> = SpinLock::new(FrameTable::new());

/// Locks the global frame table.
pub fn lock() -> SpinLockGuard<'static, FrameTable> {
    FRAME_TABLE.lock()
}
