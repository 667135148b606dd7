//! The process model for project2.
//!
//! This file defines the process model used while the address space and
//! eager-paged loader are under construction.

use keos::{KernelError, thread::Current};
use keos_fdtable::{file_struct::FileStruct, syscall::SyscallAbi};

use crate::{eager_pager::EagerPager, mm_struct::MmStruct};

/// A process state of project 2, which contains file struct and mm struct.
pub struct Process {
    pub file_struct: FileStruct,
    pub mm_struct: MmStruct<EagerPager>,
}

impl Default for Process {
    fn default() -> Self {
        Self {
            file_struct: FileStruct::new(),
            mm_struct: MmStruct::new(),
        }
    }
}

impl Process {
    /// Create a process with given [`MmStruct`].
    pub fn from_mm_struct(mm_struct: MmStruct<EagerPager>) -> Self {
        Self {
            mm_struct,
            ..Default::default()
        }
    }

    /// Exit a process.
    ///
    /// # Syscall API
    /// ```c
    /// int exit(int status);
    /// ```
    /// - `status`: The thread's exit code.
    pub fn exit(&self, abi: &SyscallAbi) -> Result<usize, KernelError> {
        Current::exit(abi.arg1 as i32)
    }
}
