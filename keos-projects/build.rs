// Shared by every project's grader/build.rs via `include!("../../build.rs")`.
use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::Path;

const M: u64 = 1024 * 1024;

struct FileDisk {
    file: std::fs::File,
    sectors: usize,
}

impl simple_fs::Disk for FileDisk {
    fn size(&self) -> usize {
        self.sectors
    }

    fn read(
        &self,
        sector: simple_fs::Sector,
        buf: &mut [u8; simple_fs::SECTOR_SIZE],
    ) -> Result<(), simple_fs::Error> {
        self.file
            .read_at(buf, (sector.into_usize() * simple_fs::SECTOR_SIZE) as u64)
            .map_err(|_| simple_fs::Error::DiskError)
            .and_then(|n| {
                if n == buf.len() {
                    Ok(())
                } else {
                    Err(simple_fs::Error::DiskError)
                }
            })
    }

    fn write(
        &self,
        sector: simple_fs::Sector,
        buf: &[u8; simple_fs::SECTOR_SIZE],
    ) -> Result<(), simple_fs::Error> {
        self.file
            .write_at(buf, (sector.into_usize() * simple_fs::SECTOR_SIZE) as u64)
            .map_err(|_| simple_fs::Error::DiskError)
            .and_then(|n| {
                if n == buf.len() {
                    Ok(())
                } else {
                    Err(simple_fs::Error::DiskError)
                }
            })
    }
}

/// Creates and formats a fresh `simple_fs` disk image at `disk_name`, sized
/// to a whole number of megabytes.
fn build_simple_fs(disk_name: &str) {
    let _ = std::fs::remove_file(disk_name);

    let size: u64 = 16 * M;
    let disk_size = size.div_ceil(M) * M;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(disk_name)
        .expect("Failed to create disk image.");
    file.set_len(disk_size).unwrap();

    let disk = FileDisk {
        file,
        sectors: disk_size as usize / simple_fs::SECTOR_SIZE,
    };
    simple_fs::SimpleFs::load(disk).expect("Failed to format disk image.");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={disk_name}");
}
