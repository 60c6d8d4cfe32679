//! `std`-backed collaborator mocks, in the spirit of `buddy_allocator`'s
//! `AlignedHeap` test fixture: real allocations standing in for the
//! device-visible memory and TLB hardware this crate never touches
//! directly.

use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::tree::{PageAllocator, TlbOps};

pub struct MockAlloc {
    layouts: RefCell<HashMap<u64, Layout>>,
}

impl MockAlloc {
    pub fn new() -> Self {
        Self {
            layouts: RefCell::new(HashMap::new()),
        }
    }

    pub fn live_tables(&self) -> usize {
        self.layouts.borrow().len()
    }
}

impl PageAllocator for MockAlloc {
    fn alloc_table(&self, size: usize) -> Option<(u64, NonNull<u8>)> {
        let layout = Layout::from_size_align(size, size).ok()?;
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)?;
        let pa = ptr.as_ptr() as u64;
        self.layouts.borrow_mut().insert(pa, layout);
        Some((pa, ptr))
    }

    fn free_table(&self, phys: u64, ptr: NonNull<u8>, _size: usize) {
        if let Some(layout) = self.layouts.borrow_mut().remove(&phys) {
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }

    fn phys_to_ptr(&self, phys: u64) -> Option<NonNull<u8>> {
        if self.layouts.borrow().contains_key(&phys) {
            NonNull::new(phys as *mut u8)
        } else {
            None
        }
    }
}

impl Drop for MockAlloc {
    fn drop(&mut self) {
        for (pa, layout) in self.layouts.borrow_mut().drain() {
            unsafe { dealloc(pa as *mut u8, layout) };
        }
    }
}

#[derive(Default)]
pub struct MockTlb {
    pub flushes: RefCell<Vec<(usize, usize)>>,
    pub tlb_flush_all_calls: RefCell<u32>,
    pub range_flushes: RefCell<Vec<(u64, u64, bool)>>,
    pub syncs: RefCell<u32>,
}

impl TlbOps for MockTlb {
    fn flush_pgtable(&self, ptr: *const u8, len: usize, _cookie: usize) {
        self.flushes.borrow_mut().push((ptr as usize, len));
    }

    fn tlb_flush_all(&self, _cookie: usize) {
        *self.tlb_flush_all_calls.borrow_mut() += 1;
    }

    fn tlb_add_flush(&self, iova: u64, size: u64, leaf: bool, _cookie: usize) {
        self.range_flushes.borrow_mut().push((iova, size, leaf));
    }

    fn tlb_sync(&self, _cookie: usize) {
        *self.syncs.borrow_mut() += 1;
    }
}
