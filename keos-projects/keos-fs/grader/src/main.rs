// This is test & bootstrap implementation.
// This file will be overwritten when grading.
#![no_std]
#![no_main]
#![allow(clippy::missing_safety_doc)]
#![feature(slice_as_array)]

extern crate alloc;
extern crate grading;
extern crate keos;
extern crate keos_fdtable;
extern crate keos_addrspace;
extern crate keos_paging;
extern crate keos_sched;
extern crate keos_fs;

pub mod syscall_part_2;
pub mod userprog;

use keos::SystemConfigurationBuilder;
use keos_sched::round_robin::RoundRobin;
use keos_fs::Thread;

#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub unsafe fn main(config_builder: SystemConfigurationBuilder) {
    config_builder.set_scheduler(RoundRobin::new());
    if let Ok(fs) = simple_fs::FileSystem::load(2) {
        keos::info!("Filesystem: use `SimpleFS`.");
        keos::fs::FileSystem::register(fs)
    } else {
        panic!("SimpleFS is not available");
    }
    keos::TestDriver::<Thread>::start([
        /* FS1 Directory primitive syscall tests */
        &syscall_part_2::open_dir,
        &syscall_part_2::dir_rw,
        &syscall_part_2::dir_seek,
        /* Directory system call tests (basic) */
        &syscall_part_2::create,
        &syscall_part_2::mkdir,
        &syscall_part_2::unlink,
        &syscall_part_2::chdir,
        /* User Program */
        &userprog::sha256sum,
        &userprog::ls,
        &userprog::tar,
        &userprog::tar_gen,
    ]);
}

#[unsafe(no_mangle)]
pub unsafe fn ap_main() {}
