//! On-disk inodes laid out as a chain of sparse chunks.
//!
//! Every inode occupies one 512-byte [`RawInodeBlock`]. That block holds up
//! to [`CHUNKS_PER_BLOCK`] `(start, length)` sector runs describing where the
//! file's data lives. A file that grows past that many chunks links to a
//! continuation block through [`RawInodeBlock::next`] — the same trick
//! `next_sector` plays in the Pintos inode this design is modeled on.
//!
//! A chunk with `start == 0` is lazy: its sectors count toward the file's
//! logical length but have no physical backing yet. Writing past the
//! current end first extends the chunk list with a lazy chunk covering the
//! hole, then materializes only the page actually being written — allocating
//! real, zeroed sectors for it (splitting the lazy chunk around that page if
//! necessary) — so a `seek`-then-`write` far past EOF costs one page of real
//! storage, not the whole intervening range.

use crate::{const_assert, Disk, Error, Sector, SimpleFs, PAGE_SECTORS, SECTOR_SIZE};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

/// Number of `(start, len)` chunk entries a single inode block can hold.
pub const CHUNKS_PER_BLOCK: usize = 58;

const INODE_MAGIC: u32 = 0x494e_4f44; // "INOD"

#[repr(C)]
#[derive(Clone, Copy)]
struct RawChunk {
    start: u32,
    len: u32,
}

#[repr(C)]
struct RawInodeBlock {
    /// Valid (and meaningful) only in the head block of the chain.
    length: u64,
    magic: u32,
    /// Valid only in the head block.
    is_dir: u32,
    /// Sector of the continuation block, or `0` if this is the tail.
    next: u32,
    chunk_count: u32,
    _pad: [u8; 24],
    chunks: [RawChunk; CHUNKS_PER_BLOCK],
}
const_assert!(core::mem::size_of::<RawInodeBlock>() == SECTOR_SIZE);

impl RawInodeBlock {
    fn empty(is_head: bool, length: u64, is_dir: bool) -> Self {
        Self {
            length: if is_head { length } else { 0 },
            magic: INODE_MAGIC,
            is_dir: if is_head && is_dir { 1 } else { 0 },
            next: 0,
            chunk_count: 0,
            _pad: [0; 24],
            chunks: [RawChunk { start: 0, len: 0 }; CHUNKS_PER_BLOCK],
        }
    }

    fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.magic.to_le_bytes());
        buf[12..16].copy_from_slice(&self.is_dir.to_le_bytes());
        buf[16..20].copy_from_slice(&self.next.to_le_bytes());
        buf[20..24].copy_from_slice(&self.chunk_count.to_le_bytes());
        for (i, chunk) in self.chunks.iter().enumerate() {
            let off = 48 + i * 8;
            buf[off..off + 4].copy_from_slice(&chunk.start.to_le_bytes());
            buf[off + 4..off + 8].copy_from_slice(&chunk.len.to_le_bytes());
        }
        buf
    }

    fn from_bytes(buf: &[u8; SECTOR_SIZE]) -> Result<Self, Error> {
        let magic = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if magic != INODE_MAGIC {
            return Err(Error::FsError);
        }
        let mut chunks = [RawChunk { start: 0, len: 0 }; CHUNKS_PER_BLOCK];
        for (i, chunk) in chunks.iter_mut().enumerate() {
            let off = 48 + i * 8;
            chunk.start = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            chunk.len = u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap());
        }
        Ok(Self {
            length: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            magic,
            is_dir: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            next: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            chunk_count: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            _pad: [0; 24],
            chunks,
        })
    }
}

/// Writes a fresh, empty inode block at `sector`. Used both at mkfs time for
/// the root directory and whenever a directory creates a new child entry.
pub(crate) fn format_inode<D: Disk>(disk: &D, sector: Sector, is_dir: bool) -> Result<(), Error> {
    let block = RawInodeBlock::empty(true, 0, is_dir);
    disk.write(sector, &block.to_bytes())
}

pub(crate) struct InodeState {
    length: usize,
    is_dir: bool,
    /// Sectors of the chain's metadata blocks, head first.
    blocks: Vec<Sector>,
    /// Data chunks in logical order: `(start_sector, len_in_sectors)`.
    chunks: Vec<(Sector, usize)>,
}

impl InodeState {
    fn total_sectors(&self) -> usize {
        self.chunks.iter().map(|(_, len)| *len).sum()
    }

    /// Maps a logical sector index into a physical disk sector. Returns
    /// `None` both past the end of the chunk list and inside a lazy
    /// (`start == 0`) extent — in both cases the sector is a hole that reads
    /// back as zero and has no real backing yet.
    fn physical_sector(&self, logical: usize) -> Option<Sector> {
        let mut base = 0usize;
        for (start, len) in &self.chunks {
            if logical < base + len {
                if start.into_usize() == 0 {
                    return None;
                }
                return Some(*start + (logical - base));
            }
            base += len;
        }
        None
    }
}

pub(crate) struct InodeHandle<D: Disk> {
    fs: Arc<SimpleFs<D>>,
    sector: Sector,
    state: crate::lock::RawSpinLock<InodeState>,
    removed: AtomicBool,
}

/// A reference-counted, deduplicated handle to an open inode.
///
/// Cloning is cheap (an `Arc` bump); every [`super::directory::Directory`]
/// and [`super::file::File`] built from the same on-disk sector shares the
/// one `InodeHandle`, which is how concurrent opens of the same entry stay
/// consistent and how the last close of a removed inode knows to free it.
pub struct Inode<D: Disk>(pub(crate) Arc<InodeHandle<D>>);

impl<D: Disk> Clone for Inode<D> {
    fn clone(&self) -> Self {
        Inode(self.0.clone())
    }
}

impl<D: Disk> InodeHandle<D> {
    pub(crate) fn load(fs: Arc<SimpleFs<D>>, sector: Sector) -> Result<Self, Error> {
        let mut buf = [0u8; SECTOR_SIZE];
        fs.disk().read(sector, &mut buf)?;
        let head = RawInodeBlock::from_bytes(&buf)?;
        let mut blocks = alloc::vec![sector];
        let mut chunks: Vec<(Sector, usize)> = head.chunks[..head.chunk_count as usize]
            .iter()
            .map(|c| (Sector(c.start as usize), c.len as usize))
            .collect();
        let mut next = head.next;
        while next != 0 {
            let next_sector = Sector(next as usize);
            fs.disk().read(next_sector, &mut buf)?;
            let block = RawInodeBlock::from_bytes(&buf)?;
            blocks.push(next_sector);
            chunks.extend(
                block.chunks[..block.chunk_count as usize]
                    .iter()
                    .map(|c| (Sector(c.start as usize), c.len as usize)),
            );
            next = block.next;
        }
        Ok(Self {
            fs,
            sector,
            state: crate::lock::RawSpinLock::new(InodeState {
                length: head.length as usize,
                is_dir: head.is_dir != 0,
                blocks,
                chunks,
            }),
            removed: AtomicBool::new(false),
        })
    }

    /// Rewrites the whole metadata chain, allocating or freeing continuation
    /// blocks so the chain has exactly as many blocks as `chunks` needs.
    fn flush(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        let needed = state.chunks.len().div_ceil(CHUNKS_PER_BLOCK).max(1);
        while state.blocks.len() < needed {
            let sector = self.fs.alloc_sectors(1).ok_or(Error::NoSpace)?;
            state.blocks.push(sector);
        }
        while state.blocks.len() > needed {
            let sector = state.blocks.pop().unwrap();
            self.fs.free_sectors(sector, 1);
        }
        let block_count = state.blocks.len();
        for i in 0..block_count {
            let segment = &state.chunks[(i * CHUNKS_PER_BLOCK).min(state.chunks.len())
                ..((i + 1) * CHUNKS_PER_BLOCK).min(state.chunks.len())];
            let mut block = RawInodeBlock::empty(i == 0, state.length as u64, state.is_dir);
            block.chunk_count = segment.len() as u32;
            for (slot, (start, len)) in block.chunks.iter_mut().zip(segment.iter()) {
                slot.start = start.into_usize() as u32;
                slot.len = *len as u32;
            }
            block.next = if i + 1 < block_count {
                state.blocks[i + 1].into_usize() as u32
            } else {
                0
            };
            self.fs.disk().write(state.blocks[i], &block.to_bytes())?;
        }
        self.fs.flush_free_map()
    }

    fn zero_sectors(&self, start: Sector, len: usize) -> Result<(), Error> {
        let zero = [0u8; SECTOR_SIZE];
        for i in 0..len {
            self.fs.disk().write(start + i, &zero)?;
        }
        Ok(())
    }

    /// Ensures the logical sector range `[start, start+len)` is real: backed
    /// by physically allocated, zeroed sectors, extending the logical length
    /// with a lazy descriptor first if the range runs past the current end.
    ///
    /// A lazy descriptor overlapping the range is split into up to three
    /// pieces (untouched lazy prefix, newly materialized real middle,
    /// untouched lazy suffix); a real descriptor already covering part of the
    /// range is left as-is. On any failure every sector allocated during this
    /// call is freed and the chunk list is restored to what it was before.
    fn materialize(&self, start: usize, len: usize) -> Result<(), Error> {
        if len == 0 {
            return Ok(());
        }
        let mut state = self.state.lock();
        let original_chunks = state.chunks.clone();
        let total = state.total_sectors();
        if start + len > total {
            state.chunks.push((Sector(0), start + len - total));
        }

        let mut base = 0usize;
        let mut rebuilt: Vec<(Sector, usize)> = Vec::with_capacity(state.chunks.len() + 2);
        let mut allocated: Vec<(Sector, usize)> = Vec::new();
        let mut outcome: Result<(), Error> = Ok(());

        for (cstart, clen) in state.chunks.iter().copied() {
            let cend = base + clen;
            let ov_start = start.max(base);
            let ov_end = (start + len).min(cend);
            if outcome.is_err() || cstart.into_usize() != 0 || ov_start >= ov_end {
                rebuilt.push((cstart, clen));
                base = cend;
                continue;
            }
            let pre = ov_start - base;
            let mid = ov_end - ov_start;
            let post = cend - ov_end;
            if pre > 0 {
                rebuilt.push((Sector(0), pre));
            }
            match self.fs.alloc_sectors_split(mid) {
                Some(runs) => {
                    for (rstart, rlen) in runs {
                        allocated.push((rstart, rlen));
                        if outcome.is_ok() {
                            outcome = self.zero_sectors(rstart, rlen);
                        }
                        if let Some(last) = rebuilt.last_mut() {
                            if last.0.into_usize() != 0 && last.0 + last.1 == rstart {
                                last.1 += rlen;
                                continue;
                            }
                        }
                        rebuilt.push((rstart, rlen));
                    }
                }
                None => outcome = Err(Error::NoSpace),
            }
            if post > 0 {
                rebuilt.push((Sector(0), post));
            }
            base = cend;
        }

        if let Err(err) = outcome {
            for (start, len) in &allocated {
                self.fs.free_sectors(*start, *len);
            }
            state.chunks = original_chunks;
            drop(state);
            let _ = self.fs.flush_free_map();
            return Err(err);
        }

        state.chunks = rebuilt;
        drop(state);
        self.flush()
    }

    pub(crate) fn size(&self) -> usize {
        self.state.lock().length
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.state.lock().is_dir
    }

    pub(crate) fn sector(&self) -> Sector {
        self.sector
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Relaxed)
    }

    pub(crate) fn read_page(&self, page_idx: usize, buf: &mut [u8; 4096]) -> Result<bool, Error> {
        let length = self.state.lock().length;
        if page_idx * 4096 >= length {
            buf.fill(0);
            return Ok(true);
        }
        buf.fill(0);
        for i in 0..PAGE_SECTORS {
            let sector = self.state.lock().physical_sector(page_idx * PAGE_SECTORS + i);
            let Some(sector) = sector else {
                continue;
            };
            let mut sector_buf = [0u8; SECTOR_SIZE];
            self.fs.disk().read(sector, &mut sector_buf)?;
            buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(&sector_buf);
        }
        Ok(true)
    }

    pub(crate) fn write_page(
        &self,
        page_idx: usize,
        buf: &[u8; 4096],
        min_size: usize,
    ) -> Result<(), Error> {
        self.materialize(page_idx * PAGE_SECTORS, PAGE_SECTORS)?;
        for i in 0..PAGE_SECTORS {
            let sector = self
                .state
                .lock()
                .physical_sector(page_idx * PAGE_SECTORS + i)
                .ok_or(Error::FsError)?;
            let mut sector_buf = [0u8; SECTOR_SIZE];
            sector_buf.copy_from_slice(&buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
            self.fs.disk().write(sector, &sector_buf)?;
        }
        let mut state = self.state.lock();
        if min_size > state.length {
            state.length = min_size;
        }
        drop(state);
        self.flush()
    }

    /// Frees every sector owned by this inode: its data chunks and the
    /// metadata chain itself. Only ever called from [`Drop`], once the last
    /// handle to a removed inode goes away. Lazy (`start == 0`) chunks have no
    /// physical backing and must not be freed — doing so would mark sector 0
    /// (the superblock) and whatever follows it free.
    fn free_all(&self) {
        let state = self.state.lock();
        for (start, len) in &state.chunks {
            if start.into_usize() != 0 {
                self.fs.free_sectors(*start, *len);
            }
        }
        for block in &state.blocks {
            self.fs.free_sectors(*block, 1);
        }
        drop(state);
        let _ = self.fs.flush_free_map();
    }
}

impl<D: Disk> Drop for InodeHandle<D> {
    fn drop(&mut self) {
        self.fs.forget_inode(self.sector);
        if self.is_removed() {
            self.free_all();
        }
    }
}

impl<D: Disk> Inode<D> {
    pub(crate) fn sector(&self) -> Sector {
        self.0.sector()
    }

    pub(crate) fn size(&self) -> usize {
        self.0.size()
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.0.is_dir()
    }

    pub(crate) fn mark_removed(&self) {
        self.0.mark_removed()
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.0.is_removed()
    }

    pub(crate) fn read_page(&self, page_idx: usize, buf: &mut [u8; 4096]) -> Result<bool, Error> {
        self.0.read_page(page_idx, buf)
    }

    pub(crate) fn write_page(
        &self,
        page_idx: usize,
        buf: &[u8; 4096],
        min_size: usize,
    ) -> Result<(), Error> {
        self.0.write_page(page_idx, buf, min_size)
    }

    pub(crate) fn writeback(&self) -> Result<(), Error> {
        self.0.flush()
    }
}
