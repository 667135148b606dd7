//! The free-sector bitmap.
//!
//! Bit `i` is set when sector `i` is in use. Persisted starting at a fixed
//! sector range reserved by the superblock, and rewritten wholesale after
//! every allocation or free — there is no journal for this file system, so
//! durability of the free map is best-effort, matching the rest of the
//! engine's synchronous-metadata design.

use crate::{Disk, Error, Sector, SECTOR_SIZE};
use alloc::vec;
use alloc::vec::Vec;

pub(crate) struct FreeMap {
    /// One bit per sector; `bits[i/8]` bit `i%8`.
    bits: Vec<u8>,
    total: usize,
}

impl FreeMap {
    pub(crate) fn new(total_sectors: usize) -> Self {
        Self {
            bits: vec![0u8; total_sectors.div_ceil(8)],
            total: total_sectors,
        }
    }

    pub(crate) fn load<D: Disk>(
        disk: &D,
        start: Sector,
        sectors: usize,
        total_sectors: usize,
    ) -> Result<Self, Error> {
        let mut bits = vec![0u8; total_sectors.div_ceil(8)];
        let mut buf = [0u8; SECTOR_SIZE];
        for i in 0..sectors {
            disk.read(start + i, &mut buf)?;
            let dst_start = i * SECTOR_SIZE;
            if dst_start >= bits.len() {
                break;
            }
            let n = (bits.len() - dst_start).min(SECTOR_SIZE);
            bits[dst_start..dst_start + n].copy_from_slice(&buf[..n]);
        }
        Ok(Self {
            bits,
            total: total_sectors,
        })
    }

    pub(crate) fn flush<D: Disk>(&self, disk: &D, start: Sector, sectors: usize) -> Result<(), Error> {
        let mut buf = [0u8; SECTOR_SIZE];
        for i in 0..sectors {
            buf.fill(0);
            let src_start = i * SECTOR_SIZE;
            if src_start < self.bits.len() {
                let n = (self.bits.len() - src_start).min(SECTOR_SIZE);
                buf[..n].copy_from_slice(&self.bits[src_start..src_start + n]);
            }
            disk.write(start + i, &buf)?;
        }
        Ok(())
    }

    fn is_used(&self, idx: usize) -> bool {
        (self.bits[idx / 8] >> (idx % 8)) & 1 != 0
    }

    pub(crate) fn mark_used(&mut self, idx: usize) {
        self.bits[idx / 8] |= 1 << (idx % 8);
    }

    fn mark_free(&mut self, idx: usize) {
        self.bits[idx / 8] &= !(1 << (idx % 8));
    }

    /// Finds and marks used the first contiguous run of `n` free sectors.
    pub(crate) fn alloc_contig(&mut self, n: usize) -> Option<Sector> {
        if n == 0 || n > self.total {
            return None;
        }
        let mut run_start = None;
        let mut run_len = 0;
        for i in 0..self.total {
            if self.is_used(i) {
                run_start = None;
                run_len = 0;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(i);
            }
            run_len += 1;
            if run_len == n {
                let start = run_start.unwrap();
                for j in start..start + n {
                    self.mark_used(j);
                }
                return Some(Sector(start));
            }
        }
        None
    }

    pub(crate) fn free_contig(&mut self, start: usize, n: usize) {
        for j in start..start + n {
            self.mark_free(j);
        }
    }

    /// Greedily satisfies a request for `n` sectors out of the longest free
    /// runs available, for when no single contiguous run is big enough.
    /// Marks every returned sector used; returns `None` (no bits touched) if
    /// fewer than `n` sectors are free in total.
    pub(crate) fn alloc_longest_runs(&mut self, n: usize) -> Option<Vec<(Sector, usize)>> {
        if n == 0 || n > self.total {
            return None;
        }
        let mut runs: Vec<(usize, usize)> = Vec::new();
        let mut run_start = None;
        for i in 0..self.total {
            if self.is_used(i) {
                if let Some(start) = run_start.take() {
                    runs.push((start, i - start));
                }
            } else if run_start.is_none() {
                run_start = Some(i);
            }
        }
        if let Some(start) = run_start {
            runs.push((start, self.total - start));
        }
        if runs.iter().map(|(_, len)| *len).sum::<usize>() < n {
            return None;
        }
        runs.sort_by(|a, b| b.1.cmp(&a.1));
        let mut out = Vec::new();
        let mut remaining = n;
        for (start, len) in runs {
            if remaining == 0 {
                break;
            }
            let take = len.min(remaining);
            for j in start..start + take {
                self.mark_used(j);
            }
            out.push((Sector(start), take));
            remaining -= take;
        }
        Some(out)
    }
}
