//! Root/table storage: allocation, publishing and recursive teardown.
//!
//! The tree never shares tables across domains and owns every table it
//! creates for the lifetime of the `PageTable` handle that owns this store.

use core::ptr::NonNull;

use crate::descriptor::Descriptor;
use crate::descriptor::DESCRIPTOR_SIZE;
use crate::geometry::{Geometry, Quirks};
use crate::PgtableError;

/// Cache/coherency handshake the tree calls into. Implementations never
/// block the allocator; they are expected to be synchronous.
pub trait TlbOps {
    /// Publishes descriptor writes in `[ptr, ptr+len)` so the device's table
    /// walker can observe them.
    fn flush_pgtable(&self, ptr: *const u8, len: usize, cookie: usize);
    /// Invalidates every TLB entry belonging to this domain.
    fn tlb_flush_all(&self, cookie: usize);
    /// Range invalidation hint; collaborators that don't support it may
    /// treat this as a no-op and rely on the closing `tlb_flush_all`.
    fn tlb_add_flush(&self, iova: u64, size: u64, leaf: bool, cookie: usize);
    /// Barrier after a run of `tlb_add_flush` calls.
    fn tlb_sync(&self, cookie: usize);
}

/// Zeroed, physically contiguous, naturally aligned table storage.
pub trait PageAllocator {
    /// Returns both the physical address (for descriptors) and a usable
    /// pointer (for software access) of a fresh, zero-filled, `size`-byte,
    /// `size`-aligned block, or `None` on exhaustion.
    fn alloc_table(&self, size: usize) -> Option<(u64, NonNull<u8>)>;
    fn free_table(&self, phys: u64, ptr: NonNull<u8>, size: usize);
    /// Resolves a physical address previously handed out by `alloc_table`
    /// back to a usable pointer. Lets the tree walk a table descriptor's
    /// output address without reconstructing it via pointer arithmetic on a
    /// sibling slot.
    fn phys_to_ptr(&self, phys: u64) -> Option<NonNull<u8>>;
}

/// Owns the root table and knows how to allocate/free interior tables of
/// the geometry's granule size.
pub struct TreeStore<A: PageAllocator, T: TlbOps> {
    pub geometry: Geometry,
    pub root_pa: u64,
    pub root_ptr: NonNull<Descriptor>,
    pub root_len: usize,
    pub alloc: A,
    pub tlb: T,
    pub cookie: usize,
}

impl<A: PageAllocator, T: TlbOps> TreeStore<A, T> {
    pub fn new(geometry: Geometry, alloc: A, tlb: T, cookie: usize) -> Result<Self, PgtableError> {
        let root_entries = geometry
            .concatenated_root_entries()
            .unwrap_or(geometry.root_entries);
        let root_len = root_entries * DESCRIPTOR_SIZE;
        let (root_pa, root_ptr) = alloc
            .alloc_table(root_len)
            .ok_or(PgtableError::OutOfMemory)?;
        tlb.flush_pgtable(root_ptr.as_ptr(), root_len, cookie);
        Ok(Self {
            geometry,
            root_pa,
            root_ptr: root_ptr.cast(),
            root_len,
            alloc,
            tlb,
            cookie,
        })
    }

    #[inline]
    pub fn granule(&self) -> usize {
        1usize << self.geometry.pg_shift
    }

    /// Slot `idx` within the table rooted at `base` (the root for
    /// `level == geometry.start_level`, otherwise an interior table).
    ///
    /// # Safety
    /// `base` must point at a live table of at least `idx + 1` entries.
    #[inline]
    pub unsafe fn slot(base: NonNull<Descriptor>, idx: usize) -> NonNull<Descriptor> {
        unsafe { NonNull::new_unchecked(base.as_ptr().add(idx)) }
    }

    pub fn root_table(&self) -> NonNull<Descriptor> {
        self.root_ptr
    }

    /// Allocates a fresh interior table, zero-filled by the collaborator,
    /// and publishes it before any descriptor can point at it.
    pub fn alloc_child_table(&self) -> Result<(u64, NonNull<Descriptor>), PgtableError> {
        let size = self.granule();
        let (pa, ptr) = self.alloc.alloc_table(size).ok_or(PgtableError::OutOfMemory)?;
        self.tlb.flush_pgtable(ptr.as_ptr(), size, self.cookie);
        Ok((pa, ptr.cast()))
    }

    pub fn free_child_table(&self, pa: u64, ptr: NonNull<Descriptor>) {
        self.alloc.free_table(pa, ptr.cast(), self.granule());
    }

    pub fn publish(&self, slot: NonNull<Descriptor>, count: usize) {
        self.tlb
            .flush_pgtable(slot.as_ptr().cast(), count * DESCRIPTOR_SIZE, self.cookie);
    }

    pub fn quirks(&self) -> Quirks {
        self.geometry.quirks
    }

    /// Resolves a table descriptor's output address back to a live pointer.
    /// The collaborator owns the address space this allocator runs in, so
    /// this always reconstructs the pointer through the same allocator that
    /// handed the address out rather than through pointer arithmetic on a
    /// sibling slot.
    pub fn child_table_ptr(&self, d: Descriptor) -> Option<NonNull<Descriptor>> {
        self.alloc.phys_to_ptr(d.output_addr()).map(NonNull::cast)
    }

    /// Tears the whole tree down, freeing every interior table reachable
    /// from the root; the root itself is freed by the owning `PageTable`.
    pub fn teardown(&self) {
        self.teardown_table(self.root_ptr, self.root_len / DESCRIPTOR_SIZE, self.geometry.start_level);
    }

    pub(crate) fn teardown_table(&self, table: NonNull<Descriptor>, entries: usize, level: u8) {
        if level == 3 {
            return;
        }
        for i in 0..entries {
            let slot = unsafe { Self::slot(table, i) };
            let d = unsafe { *slot.as_ptr() };
            if d.is_table(level) {
                if let Some(child) = self.child_table_ptr(d) {
                    self.teardown_table(child, self.geometry.entries_per_table, level + 1);
                    self.free_child_table(d.output_addr(), child);
                }
            }
        }
    }
}
