//! Directories: entries stored as plain data inside a directory-flagged inode.
//!
//! Every directory, including the root, starts life with `.` and `..`
//! entries already present — the same convention Pintos directories use, and
//! the reason an empty directory's entry count is `2`, not `0`.

use crate::inode::Inode;
use crate::{Disk, Error, Sector, SimpleFs};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

const MAX_NAME_LEN: usize = 26;
const ENTRY_SIZE: usize = 32;
const ENTRIES_PER_PAGE: usize = 4096 / ENTRY_SIZE;

#[repr(C)]
#[derive(Clone, Copy)]
struct RawDirEntry {
    ino: u32,
    in_use: u8,
    name_len: u8,
    name: [u8; MAX_NAME_LEN],
}
crate::const_assert!(core::mem::size_of::<RawDirEntry>() == ENTRY_SIZE);

impl RawDirEntry {
    const EMPTY: Self = Self {
        ino: 0,
        in_use: 0,
        name_len: 0,
        name: [0; MAX_NAME_LEN],
    };

    fn new(ino: Sector, name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > MAX_NAME_LEN {
            return None;
        }
        let mut buf = [0u8; MAX_NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            ino: ino.into_usize() as u32,
            in_use: 1,
            name_len: bytes.len() as u8,
            name: buf,
        })
    }

    fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.ino.to_le_bytes());
        buf[4] = self.in_use;
        buf[5] = self.name_len;
        buf[6..6 + MAX_NAME_LEN].copy_from_slice(&self.name);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let mut name = [0u8; MAX_NAME_LEN];
        name.copy_from_slice(&buf[6..6 + MAX_NAME_LEN]);
        Self {
            ino: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            in_use: buf[4],
            name_len: buf[5],
            name,
        }
    }
}

/// A handle to an open directory.
pub struct Directory<D: Disk>(pub Inode<D>);

impl<D: Disk> Directory<D> {
    pub fn sector(&self) -> Sector {
        self.0.sector()
    }

    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn is_removed(&self) -> bool {
        self.0.is_removed()
    }

    fn for_each_page<F: FnMut(&[u8; 4096]) -> bool>(&self, mut f: F) -> Result<(), Error> {
        let pages = self.0.size().div_ceil(4096);
        for page in 0..pages {
            let mut buf = [0u8; 4096];
            self.0.read_page(page, &mut buf)?;
            if !f(&buf) {
                break;
            }
        }
        Ok(())
    }

    /// Lists every live entry, `.`/`..` included.
    pub fn entries(&self) -> Result<Vec<(Sector, String)>, Error> {
        let mut out = Vec::new();
        self.for_each_page(|buf| {
            for slot in 0..ENTRIES_PER_PAGE {
                let raw = RawDirEntry::from_bytes(&buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
                if raw.in_use != 0 {
                    out.push((Sector(raw.ino as usize), String::from(raw.name())));
                }
            }
            true
        })?;
        Ok(out)
    }

    /// Resolves a single path component to its inode sector.
    pub fn lookup(&self, name: &str) -> Result<Sector, Error> {
        let mut found = None;
        self.for_each_page(|buf| {
            for slot in 0..ENTRIES_PER_PAGE {
                let raw = RawDirEntry::from_bytes(&buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
                if raw.in_use != 0 && raw.name() == name {
                    found = Some(Sector(raw.ino as usize));
                    return false;
                }
            }
            true
        })?;
        found.ok_or(Error::NotFound)
    }

    fn write_entry_at(&self, page: usize, slot: usize, entry: RawDirEntry) -> Result<(), Error> {
        let mut buf = [0u8; 4096];
        if page * 4096 < self.0.size() {
            self.0.read_page(page, &mut buf)?;
        }
        buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        let min_size = self.0.size().max((page + 1) * 4096);
        self.0.write_page(page, &buf, min_size)
    }

    /// Adds a `(name, ino)` mapping, reusing a freed slot if one exists.
    fn add_raw(&self, name: &str, ino: Sector) -> Result<(), Error> {
        let entry = RawDirEntry::new(ino, name).ok_or(Error::NameTooLong)?;
        let pages = self.0.size().div_ceil(4096).max(1);
        for page in 0..pages {
            let mut buf = [0u8; 4096];
            if page * 4096 < self.0.size() {
                self.0.read_page(page, &mut buf)?;
            }
            for slot in 0..ENTRIES_PER_PAGE {
                let raw = RawDirEntry::from_bytes(&buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
                if raw.in_use == 0 {
                    return self.write_entry_at(page, slot, entry);
                }
            }
        }
        // No free slot anywhere: grow by one page and use its first slot.
        self.write_entry_at(pages, 0, entry)
    }

    fn remove_raw(&self, name: &str) -> Result<Sector, Error> {
        let mut result = None;
        let pages = self.0.size().div_ceil(4096);
        'outer: for page in 0..pages {
            let mut buf = [0u8; 4096];
            self.0.read_page(page, &mut buf)?;
            for slot in 0..ENTRIES_PER_PAGE {
                let raw = RawDirEntry::from_bytes(&buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
                if raw.in_use != 0 && raw.name() == name {
                    result = Some(Sector(raw.ino as usize));
                    buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]
                        .copy_from_slice(&RawDirEntry::EMPTY.to_bytes());
                    self.0.write_page(page, &buf, self.0.size())?;
                    break 'outer;
                }
            }
        }
        result.ok_or(Error::NotFound)
    }

    /// Counts entries that are themselves directories, for `link_count`.
    fn child_directory_count(&self, fs: &Arc<SimpleFs<D>>) -> usize {
        let mut count = 0;
        let _ = self.for_each_page(|buf| {
            for slot in 0..ENTRIES_PER_PAGE {
                let raw = RawDirEntry::from_bytes(&buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
                if raw.in_use != 0 && raw.name() != "." && raw.name() != ".." {
                    if let Ok(child) = fs.open_inode(Sector(raw.ino as usize)) {
                        if child.is_dir() {
                            count += 1;
                        }
                    }
                }
            }
            true
        });
        count
    }

    pub fn link_count(&self, fs: &Arc<SimpleFs<D>>) -> usize {
        2 + self.child_directory_count(fs)
    }

    /// Opens `name` as a regular file.
    pub fn open_file(&self, fs: &Arc<SimpleFs<D>>, name: &str) -> Result<crate::file::File<D>, Error> {
        let sector = self.lookup(name)?;
        let inode = fs.open_inode(sector)?;
        if inode.is_dir() {
            return Err(Error::IsDirectory);
        }
        Ok(crate::file::File(inode))
    }

    /// Opens `name` as a subdirectory.
    pub fn open_dir(&self, fs: &Arc<SimpleFs<D>>, name: &str) -> Result<Directory<D>, Error> {
        let sector = self.lookup(name)?;
        let inode = fs.open_inode(sector)?;
        if !inode.is_dir() {
            return Err(Error::NotDirectory);
        }
        Ok(Directory(inode))
    }

    /// Creates a fresh directory (already populated with `.`/`..`) or a fresh
    /// empty regular file, links it into `self` under `name`. If anything
    /// after the initial allocation fails, the allocated inode sector (and
    /// any data it had already accumulated) is freed before returning.
    pub fn create(&self, fs: &Arc<SimpleFs<D>>, name: &str, is_dir: bool) -> Result<Sector, Error> {
        if self.is_removed() {
            return Err(Error::NotFound);
        }
        if self.lookup(name).is_ok() {
            return Err(Error::AlreadyExists);
        }
        let sector = fs.alloc_sectors(1).ok_or(Error::NoSpace)?;

        if let Err(err) = crate::inode::format_inode(fs.disk(), sector, is_dir) {
            fs.free_sectors(sector, 1);
            let _ = fs.flush_free_map();
            return Err(err);
        }
        if let Err(err) = fs.flush_free_map() {
            fs.free_sectors(sector, 1);
            return Err(err);
        }

        // The block is valid on disk from here on, so `open_inode` can load
        // it; any later failure is cleaned up by marking it removed and
        // letting the handle's own drop free its chunks and metadata chain.
        let setup: Result<(), Error> = (|| {
            if is_dir {
                let child = fs.open_inode(sector)?;
                let child_dir = Directory(child);
                child_dir.add_raw(".", sector)?;
                child_dir.add_raw("..", self.sector())?;
            }
            self.add_raw(name, sector)
        })();

        if let Err(err) = setup {
            match fs.open_inode(sector) {
                Ok(child) => child.mark_removed(),
                Err(_) => fs.free_sectors(sector, 1),
            }
            return Err(err);
        }
        Ok(sector)
    }

    /// Unlinks `name`. Refuses non-empty directories, directories still open
    /// elsewhere, and (via `is_root`) the root directory itself.
    pub fn unlink(
        &self,
        fs: &Arc<SimpleFs<D>>,
        name: &str,
        is_root: impl Fn(Sector) -> bool,
    ) -> Result<(), Error> {
        let child_sector = self.lookup(name)?;
        if is_root(child_sector) {
            return Err(Error::Busy);
        }
        let child = fs.open_inode(child_sector)?;
        if child.is_dir() {
            let entry_count = Directory(child.clone()).entries()?.len();
            if entry_count != 2 {
                return Err(Error::DirectoryNotEmpty);
            }
            // `child` itself is our only strong reference at this point (the
            // clone used for `entries` above was already dropped); any count
            // above 1 means some other handle still has the directory open.
            if Arc::strong_count(&child.0) > 1 {
                return Err(Error::Busy);
            }
        }
        self.remove_raw(name)?;
        child.mark_removed();
        Ok(())
    }
}
