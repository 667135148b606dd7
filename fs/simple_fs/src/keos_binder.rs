//! Glue between the portable engine and `keos::fs::traits`.
//!
//! This is the only module in the crate that depends on `keos`/`abyss`; the
//! rest of the engine is exercised directly by the crate's own host-side
//! tests against an in-memory [`Disk`].

use crate::directory::Directory as EngineDirectory;
use crate::inode::Inode;
use crate::{Disk, Error, Sector, SimpleFs};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use keos::{
    KernelError,
    fs::{File, FileBlockNumber, InodeNumber},
    sync::atomic::AtomicBool,
};

fn to_kernel_error(e: Error) -> KernelError {
    match e {
        Error::DiskError => KernelError::IOError,
        Error::FsError => KernelError::FilesystemCorrupted("simple_fs"),
        Error::NotFound => KernelError::NoSuchEntry,
        Error::AlreadyExists => KernelError::FileExist,
        Error::NotDirectory => KernelError::NotDirectory,
        Error::IsDirectory => KernelError::IsDirectory,
        Error::DirectoryNotEmpty => KernelError::DirectoryNotEmpty,
        Error::NoSpace => KernelError::NoSpace,
        Error::NameTooLong => KernelError::NameTooLong,
        Error::Busy => KernelError::Busy,
    }
}

fn to_ino(sector: Sector) -> InodeNumber {
    InodeNumber::new(sector.into_usize() as u32).expect("sector 0 is never a live inode")
}

/// A block device slot backed by `abyss`, addressed in 512-byte sectors.
#[derive(Debug)]
pub struct FsDisk(usize);

impl Disk for FsDisk {
    fn size(&self) -> usize {
        abyss::dev::get_bdev(self.0)
            .map(|d| d.block_cnt())
            .unwrap_or(0)
    }

    fn read(&self, sector: Sector, buf: &mut [u8; 512]) -> Result<(), Error> {
        let dev = abyss::dev::get_bdev(self.0).ok_or(Error::DiskError)?;
        if dev.read(abyss::dev::Sector(sector.into_usize()), buf) {
            Ok(())
        } else {
            Err(Error::DiskError)
        }
    }

    fn write(&self, sector: Sector, buf: &[u8; 512]) -> Result<(), Error> {
        let dev = abyss::dev::get_bdev(self.0).ok_or(Error::DiskError)?;
        if dev.write(abyss::dev::Sector(sector.into_usize()), buf) {
            Ok(())
        } else {
            Err(Error::DiskError)
        }
    }
}

/// A mounted `simple_fs` instance, ready to be handed to `keos`.
#[derive(Clone)]
pub struct FileSystem(Arc<SimpleFs<FsDisk>>);

impl FileSystem {
    /// Loads (formatting if necessary) the file system living on the block
    /// device at `slot_idx`. See `abyss::dev::get_bdev`'s slot convention.
    pub fn load(slot_idx: usize) -> Result<Self, KernelError> {
        abyss::dev::get_bdev(slot_idx).ok_or(KernelError::IOError)?;
        let fs = SimpleFs::load(FsDisk(slot_idx)).map_err(to_kernel_error)?;
        Ok(Self(fs))
    }
}

impl keos::fs::traits::FileSystem for FileSystem {
    fn root(&self) -> Option<keos::fs::Directory> {
        let dir = self.0.root().ok()?;
        Some(keos::fs::Directory::new(Dir {
            fs: self.0.clone(),
            inner: dir,
            removed: AtomicBool::new(false),
        }))
    }
}

/// Bridges [`crate::inode::Inode`] to `keos::fs::traits::RegularFile`.
struct RegularFile {
    inode: Inode<FsDisk>,
}

impl keos::fs::traits::RegularFile for RegularFile {
    fn ino(&self) -> InodeNumber {
        to_ino(self.inode.sector())
    }

    fn size(&self) -> usize {
        self.inode.size()
    }

    fn read(&self, fba: FileBlockNumber, buf: &mut [u8; 4096]) -> Result<bool, KernelError> {
        self.inode.read_page(fba.0, buf).map_err(to_kernel_error)
    }

    fn write(
        &self,
        fba: FileBlockNumber,
        buf: &[u8; 4096],
        min_size: usize,
    ) -> Result<(), KernelError> {
        self.inode
            .write_page(fba.0, buf, min_size)
            .map_err(to_kernel_error)
    }

    fn writeback(&self) -> Result<(), KernelError> {
        self.inode.writeback().map_err(to_kernel_error)
    }
}

/// Bridges [`EngineDirectory`] to `keos::fs::traits::Directory`.
///
/// `removed` is a fresh, per-open flag: it only observes a removal performed
/// through this very handle's own `unlink_entry` call, which is exactly what
/// callers like `chdir` need in order to detect a directory pulled out from
/// under them mid-lookup.
struct Dir {
    fs: Arc<SimpleFs<FsDisk>>,
    inner: EngineDirectory<FsDisk>,
    removed: AtomicBool,
}

impl Dir {
    fn wrap_child(&self, sector: Sector, is_dir: bool, inode: Inode<FsDisk>) -> File {
        if is_dir {
            File::Directory(keos::fs::Directory::new(Dir {
                fs: self.fs.clone(),
                inner: EngineDirectory(inode),
                removed: AtomicBool::new(false),
            }))
        } else {
            let _ = sector;
            File::RegularFile(keos::fs::RegularFile::new(RegularFile { inode }))
        }
    }
}

impl keos::fs::traits::Directory for Dir {
    fn ino(&self) -> InodeNumber {
        to_ino(self.inner.sector())
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn link_count(&self) -> usize {
        self.inner.link_count(&self.fs)
    }

    fn open_entry(&self, entry: &str) -> Result<File, KernelError> {
        let sector = self.inner.lookup(entry).map_err(to_kernel_error)?;
        let inode = self.fs.open_inode(sector).map_err(to_kernel_error)?;
        let is_dir = inode.is_dir();
        Ok(self.wrap_child(sector, is_dir, inode))
    }

    fn create_entry(&self, entry: &str, is_dir: bool) -> Result<File, KernelError> {
        let sector = self
            .inner
            .create(&self.fs, entry, is_dir)
            .map_err(to_kernel_error)?;
        let inode = self.fs.open_inode(sector).map_err(to_kernel_error)?;
        Ok(self.wrap_child(sector, is_dir, inode))
    }

    fn unlink_entry(&self, entry: &str) -> Result<(), KernelError> {
        let root_sector = self.fs.root().map_err(to_kernel_error)?.sector();
        self.inner
            .unlink(&self.fs, entry, |s| s == root_sector)
            .map_err(to_kernel_error)
    }

    fn read_dir(&self) -> Result<Vec<(InodeNumber, String)>, KernelError> {
        Ok(self
            .inner
            .entries()
            .map_err(to_kernel_error)?
            .into_iter()
            .map(|(sector, name)| (to_ino(sector), name))
            .collect())
    }

    fn removed(&self) -> Result<&AtomicBool, KernelError> {
        Ok(&self.removed)
    }
}
