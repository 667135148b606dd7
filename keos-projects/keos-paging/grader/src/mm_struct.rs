use keos::{KernelError, addressing::Va, mm::page_table::Permission};
use keos_addrspace::mm_struct::MmStruct;
use keos_paging::lazy_pager::LazyPager;

pub fn do_mmap() {
    let mut mm: MmStruct<LazyPager> = MmStruct::new();

    let small_va = Va::new(0x1000).unwrap();
    let big_va = Va::new(0x0000_7FFF_4746_0000).unwrap();

    assert_eq!(
        mm.do_mmap(small_va, 0x1000, Permission::READ, None, 0),
        Ok(0x1000),
        "mmap() to valid Virtual Address should succeed"
    );

    assert_eq!(
        mm.do_mmap(big_va, 0x2000, Permission::READ, None, 0),
        Ok(0x0000_7FFF_4746_0000),
        "mmap() to valid Virtual Address should succeed"
    );

    // Lazy paging records only the area metadata at mmap() time; callers
    // should see the mapping through access_ok() without a page fault.
    assert!(mm.access_ok(small_va..small_va + 0xfff, false));
    assert!(mm.access_ok(big_va..big_va + 0x1fff, false));
}

pub fn bad_addr_0() {
    let mut mm: MmStruct<LazyPager> = MmStruct::new();
    let null_va = Va::new(0).unwrap();
    let small_va = Va::new(0x1000).unwrap();
    let misaligned = Va::new(0x1337).unwrap();
    let kern_percpu = Va::new(0xFFFF_FF00_0090_0000).unwrap();

    assert_eq!(
        mm.do_mmap(null_va, 0x1000, Permission::READ, None, 0),
        Err(KernelError::InvalidArgument),
        "mmap() to NULL should result in InvalidArgument"
    );

    assert_eq!(
        mm.do_mmap(kern_percpu, 0x1000, Permission::READ, None, 0),
        Err(KernelError::InvalidArgument),
        "mmap() to Kernel Virtual Address should result in InvalidArgument"
    );

    assert_eq!(
        mm.do_mmap(small_va, -0x2000isize as usize, Permission::READ, None, 0),
        Err(KernelError::InvalidArgument),
        "mmap() with a wraparound size should result in InvalidArgument"
    );

    assert_eq!(
        mm.do_mmap(misaligned, 0x1000, Permission::READ, None, 0),
        Err(KernelError::InvalidArgument),
        "Misaligned mmap() should result in InvalidArgument"
    );
}

pub fn access_ok_normal() {
    let mut mm: MmStruct<LazyPager> = MmStruct::new();
    let ro = Va::new(0x1000).unwrap();
    let rw = Va::new(0x2000).unwrap();

    assert_eq!(
        mm.do_mmap(ro, 0x1000, Permission::READ, None, 0),
        Ok(0x1000),
        "mmap() to valid Virtual Address should succeed"
    );

    assert!(
        mm.access_ok(ro..ro + 0xfff, false),
        "access_ok() with allocated memory area should return true"
    );

    assert_eq!(
        mm.do_mmap(rw, 0x1000, Permission::READ | Permission::WRITE, None, 0),
        Ok(0x2000),
        "mmap() to valid Virtual Address should succeed"
    );

    assert!(
        mm.access_ok(rw..rw + 0xfff, true),
        "access_ok() with write attempt to read-write memory area should return true"
    );

    let rw_addr = rw.into_usize();
    for byte in [1, 2, 4, 8] {
        for addr in (rw_addr..rw_addr + 0x1000).step_by(byte) {
            let va = Va::new(addr).unwrap();
            assert!(
                mm.access_ok(va..va + byte, true),
                "access_ok() with write attempt to read-write memory area should return true"
            );
        }
    }
}

pub fn access_ok_invalid() {
    let mut mm: MmStruct<LazyPager> = MmStruct::new();
    let null_va = Va::new(0).unwrap();
    let misaligned = Va::new(0x42).unwrap();
    let kern_percpu = Va::new(0xFFFF_FF00_0090_0000).unwrap();

    assert!(
        !mm.access_ok(kern_percpu..kern_percpu + 0xfff, false),
        "access_ok() with Kernel Virtual Address should return false"
    );

    assert!(
        !mm.access_ok(null_va..null_va + 0xfff, false),
        "access_ok() with NULL pointer should return false"
    );

    assert!(
        !mm.access_ok(misaligned..misaligned + 1, false),
        "access_ok() with unmapped address should return false"
    );

    let non_allocated = Va::new(0xDEADBEEF).unwrap();
    assert!(
        !mm.access_ok(non_allocated..non_allocated + 1, false),
        "access_ok() with unallocated memory area should return false"
    );

    let ro = Va::new(0x1000).unwrap();

    assert_eq!(
        mm.do_mmap(ro, 0x1000, Permission::READ, None, 0),
        Ok(0x1000),
        "mmap() to valid Virtual Address should succeed"
    );

    assert!(
        !mm.access_ok(ro..ro + 0xfff, true),
        "access_ok() with write attempt to read-only memory area should return false"
    );
}
