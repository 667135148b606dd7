//! # A sparse, multi-chunk on-disk file system.
//!
//! `simple_fs` lays files out as a chain of fixed-size *chunks*: contiguous
//! runs of sectors, allocated one 4 KiB page at a time as a file grows. A
//! file that would otherwise need one enormous contiguous extent (and fail
//! to grow once the disk fragments) instead only ever needs 8 contiguous
//! sectors per page, which is far easier for the free-sector map to satisfy.
//!
//! The crate is split into:
//! - [`free_map`]: the free-sector bitmap.
//! - [`inode`]: the on-disk, chunked inode and its in-memory handle.
//! - [`directory`]: directory entries stored as regular inode data.
//! - [`file`]: the page-granular read/write surface used by regular files.
//! - [`keos_binder`] (behind the `keos_binder` feature): glues the engine to
//!   `keos::fs::traits`.
//!
//! This crate is `no_std` and has no required dependency on `keos`/`abyss`;
//! the `keos_binder` feature is the only thing that pulls them in, which lets
//! the engine be exercised by host-side tests against an in-memory [`Disk`].
#![no_std]
#![deny(rustdoc::broken_intra_doc_links)]

extern crate alloc;

pub mod directory;
pub mod file;
pub mod free_map;
pub mod inode;
#[cfg(feature = "keos_binder")]
pub mod keos_binder;

mod lock;

use alloc::sync::Arc;
use free_map::FreeMap;
use inode::{Inode, InodeHandle};
use lock::RawSpinLock;

/// Sector size of the underlying block device, in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Number of sectors in a single 4 KiB page, the unit files grow by.
pub const PAGE_SECTORS: usize = 4096 / SECTOR_SIZE;

macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    };
}
pub(crate) use const_assert;

/// A sector index on the backing [`Disk`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Sector(pub usize);

impl Sector {
    /// Casts into a plain `usize`.
    #[inline]
    pub fn into_usize(self) -> usize {
        self.0
    }
}

impl core::ops::Add<usize> for Sector {
    type Output = Self;
    fn add(self, rhs: usize) -> Self {
        Self(self.0 + rhs)
    }
}

/// Errors the engine can report; translated to [`keos::KernelError`] at the
/// `keos_binder` boundary.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Error {
    /// The backing disk rejected a read or write.
    DiskError,
    /// On-disk metadata was inconsistent (bad magic, out-of-range sector, or
    /// corrupt chain).
    FsError,
    /// No entry by that name exists in a directory.
    NotFound,
    /// An entry by that name already exists.
    AlreadyExists,
    /// Expected a directory, found a regular file.
    NotDirectory,
    /// Expected a regular file, found a directory.
    IsDirectory,
    /// Tried to remove a directory that still has entries besides `.`/`..`.
    DirectoryNotEmpty,
    /// The free map has no run of sectors big enough left.
    NoSpace,
    /// A name exceeded the per-component length limit.
    NameTooLong,
    /// Operation refused (e.g. unlinking the root directory).
    Busy,
}

/// A raw block device addressed in 512-byte [`Sector`]s.
pub trait Disk: Send + Sync {
    /// Total number of sectors this device exposes.
    fn size(&self) -> usize;
    /// Reads a single sector.
    fn read(&self, sector: Sector, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), Error>;
    /// Writes a single sector.
    fn write(&self, sector: Sector, buf: &[u8; SECTOR_SIZE]) -> Result<(), Error>;
}

const MAGIC: u32 = 0x5350_4653; // "SPFS" little-endian-ish tag, not an ASCII string on purpose.

#[repr(C)]
#[derive(Clone, Copy)]
struct RawSuperBlock {
    magic: u64,
    total_sectors: u64,
    free_map_start: u64,
    free_map_sectors: u64,
    root_sector: u64,
    _pad: [u8; SECTOR_SIZE - 8 * 5],
}
const_assert!(core::mem::size_of::<RawSuperBlock>() == SECTOR_SIZE);

impl RawSuperBlock {
    fn to_bytes(self) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.total_sectors.to_le_bytes());
        buf[16..24].copy_from_slice(&self.free_map_start.to_le_bytes());
        buf[24..32].copy_from_slice(&self.free_map_sectors.to_le_bytes());
        buf[32..40].copy_from_slice(&self.root_sector.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Self {
        Self {
            magic: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            total_sectors: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            free_map_start: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            free_map_sectors: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            root_sector: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            _pad: [0; SECTOR_SIZE - 8 * 5],
        }
    }
}

/// A mounted instance of the file system.
///
/// Every [`Inode`] handle and [`Directory`](directory::Directory)/[`File`](file::File)
/// object holds an `Arc` back to this struct, so it stays alive for as long
/// as anything from the mount is open.
pub struct SimpleFs<D: Disk> {
    disk: D,
    free_map_start: Sector,
    free_map_sectors: usize,
    root_sector: Sector,
    free_map: RawSpinLock<FreeMap>,
    open_inodes: RawSpinLock<alloc::collections::BTreeMap<usize, alloc::sync::Weak<InodeHandle<D>>>>,
}

impl<D: Disk> SimpleFs<D> {
    /// Mounts `disk`, formatting it fresh if it does not already hold a
    /// valid superblock.
    pub fn load(disk: D) -> Result<Arc<Self>, Error> {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read(Sector(0), &mut buf)?;
        let sb = RawSuperBlock::from_bytes(&buf);
        if sb.magic == MAGIC as u64 {
            let free_map = FreeMap::load(
                &disk,
                Sector(sb.free_map_start as usize),
                sb.free_map_sectors as usize,
                sb.total_sectors as usize,
            )?;
            return Ok(Arc::new(Self {
                disk,
                free_map_start: Sector(sb.free_map_start as usize),
                free_map_sectors: sb.free_map_sectors as usize,
                root_sector: Sector(sb.root_sector as usize),
                free_map: RawSpinLock::new(free_map),
                open_inodes: RawSpinLock::new(alloc::collections::BTreeMap::new()),
            }));
        }
        Self::format(disk)
    }

    fn format(disk: D) -> Result<Arc<Self>, Error> {
        let total_sectors = disk.size();
        if total_sectors < 4 {
            return Err(Error::FsError);
        }
        // Sector 0 is the superblock. The free map follows, sized to cover
        // every sector on the disk (including itself and the superblock,
        // which are simply marked used up front).
        let free_map_start = Sector(1);
        let free_map_sectors = total_sectors.div_ceil(SECTOR_SIZE * 8).max(1);
        let root_sector = free_map_start + free_map_sectors;
        if root_sector.into_usize() >= total_sectors {
            return Err(Error::FsError);
        }

        let mut free_map = FreeMap::new(total_sectors);
        for i in 0..root_sector.into_usize() + 1 {
            free_map.mark_used(i);
        }
        free_map.flush(&disk, free_map_start, free_map_sectors)?;

        inode::format_inode(&disk, root_sector, true)?;

        let sb = RawSuperBlock {
            magic: MAGIC as u64,
            total_sectors: total_sectors as u64,
            free_map_start: free_map_start.into_usize() as u64,
            free_map_sectors: free_map_sectors as u64,
            root_sector: root_sector.into_usize() as u64,
            _pad: [0; SECTOR_SIZE - 8 * 5],
        };
        disk.write(Sector(0), &sb.to_bytes())?;

        Ok(Arc::new(Self {
            disk,
            free_map_start,
            free_map_sectors,
            root_sector,
            free_map: RawSpinLock::new(free_map),
            open_inodes: RawSpinLock::new(alloc::collections::BTreeMap::new()),
        }))
    }

    /// Opens (or reuses, if already open) the inode living at `sector`.
    pub(crate) fn open_inode(self: &Arc<Self>, sector: Sector) -> Result<Inode<D>, Error> {
        {
            let table = self.open_inodes.lock();
            if let Some(weak) = table.get(&sector.into_usize()) {
                if let Some(inner) = weak.upgrade() {
                    return Ok(Inode(inner));
                }
            }
        }
        let inner = Arc::new(InodeHandle::load(self.clone(), sector)?);
        self.open_inodes
            .lock()
            .insert(sector.into_usize(), Arc::downgrade(&inner));
        Ok(Inode(inner))
    }

    pub(crate) fn forget_inode(&self, sector: Sector) {
        self.open_inodes.lock().remove(&sector.into_usize());
    }

    pub(crate) fn disk(&self) -> &D {
        &self.disk
    }

    pub(crate) fn alloc_sectors(&self, n: usize) -> Option<Sector> {
        self.free_map.lock().alloc_contig(n)
    }

    /// Allocates `n` sectors, preferring one contiguous run and falling back
    /// to the longest available runs if the disk is too fragmented for that.
    /// Returns every run making up the allocation, in no particular order.
    pub(crate) fn alloc_sectors_split(&self, n: usize) -> Option<alloc::vec::Vec<(Sector, usize)>> {
        let mut map = self.free_map.lock();
        if let Some(start) = map.alloc_contig(n) {
            return Some(alloc::vec![(start, n)]);
        }
        map.alloc_longest_runs(n)
    }

    pub(crate) fn free_sectors(&self, start: Sector, n: usize) {
        self.free_map.lock().free_contig(start.into_usize(), n);
    }

    pub(crate) fn flush_free_map(&self) -> Result<(), Error> {
        self.free_map
            .lock()
            .flush(&self.disk, self.free_map_start, self.free_map_sectors)
    }

    /// Opens the root directory of the mounted file system.
    pub fn root(self: &Arc<Self>) -> Result<directory::Directory<D>, Error> {
        let inode = self.open_inode(self.root_sector)?;
        Ok(directory::Directory(inode))
    }
}
