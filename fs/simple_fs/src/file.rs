//! The regular-file view of an inode.
//!
//! Mirrors the relationship between Pintos's `file.c` and `inode.c`: all the
//! actual storage logic lives in [`crate::inode`], and `File` just exposes it
//! at the page granularity `keos::fs::traits::RegularFile` wants.

use crate::inode::Inode;
use crate::{Disk, Error};

/// A handle to an open regular file.
pub struct File<D: Disk>(pub Inode<D>);

impl<D: Disk> File<D> {
    pub fn size(&self) -> usize {
        self.0.size()
    }

    pub fn read_page(&self, page_idx: usize, buf: &mut [u8; 4096]) -> Result<bool, Error> {
        self.0.read_page(page_idx, buf)
    }

    pub fn write_page(&self, page_idx: usize, buf: &[u8; 4096], min_size: usize) -> Result<(), Error> {
        self.0.write_page(page_idx, buf, min_size)
    }

    pub fn writeback(&self) -> Result<(), Error> {
        self.0.writeback()
    }
}
