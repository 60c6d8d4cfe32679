#![cfg_attr(not(any(test, doctest)), no_std)]
//! ARM LPAE I/O page-table allocator: builds and mutates the multi-level
//! translation tree an IOMMU driver points its hardware table walker at.
//!
//! The crate never touches CPU MMU state, never owns a DMA API, and never
//! decides TLB invalidation *policy* — it only knows how to keep one
//! IOVA→PA tree correct and hand the driver the register values that follow
//! from its shape. Callers supply cache coherency (`TlbOps`) and table
//! storage (`PageAllocator`); the tree assumes single-writer access and does
//! no internal locking, mirroring every other hardware-facing crate in this
//! workspace.

mod descriptor;
mod geometry;
mod mapper;
mod sg;
#[cfg(test)]
mod testutil;
mod translate;
mod tree;
mod unmapper;

pub use descriptor::{Descriptor, Prot};
pub use geometry::{Format, Geometry, Quirks, Registers};
pub use sg::SgChunk;
pub use tree::{PageAllocator, TlbOps, TreeStore};

use core::ptr::NonNull;

#[cfg(all(not(feature = "debug-assertions"), not(test)))]
#[macro_export]
macro_rules! pr_debug {
    ($($arg:tt)*) => {};
}

#[cfg(test)]
#[macro_export]
macro_rules! pr_debug {
    ($($arg:tt)*) => (std::println!("[info] (lpae_pgtable) {} ({}:{})", format_args!($($arg)*), file!(), line!()));
}

#[cfg(all(feature = "debug-assertions", not(test)))]
#[macro_export]
macro_rules! pr_debug {
    ($($arg:tt)*) => {};
}

/// The three ways a call into this crate can fail. `unmap`/`iova_to_phys`
/// never produce one — §7's "never fails loudly" contract for removal —
/// and instead return plain byte/address integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgtableError {
    /// Alignment, size, or range-geometry violation detected eagerly,
    /// before any descriptor is touched.
    InvalidArgument,
    /// A `map` targeted a region that already holds a valid descriptor.
    AlreadyMapped,
    /// A `PageAllocator::alloc_table` call returned `None`.
    OutOfMemory,
}

/// Everything needed to derive a tree's `Geometry` and drive its hardware
/// registers: input/output address widths, the page sizes the collaborator
/// supports, the translation regime, quirks, and an opaque cookie threaded
/// through every `TlbOps` call (commonly an ASID or a VMID).
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub ias: u32,
    pub oas: u32,
    pub pgsize_bitmap: u64,
    pub fmt: Format,
    pub quirks: Quirks,
    pub cookie: usize,
}

/// A page table bound to its root: the handle a driver allocates once per
/// domain and calls `map`/`map_sg`/`unmap`/`iova_to_phys` against for as
/// long as that domain lives.
pub struct PageTable<A: PageAllocator, T: TlbOps> {
    tree: TreeStore<A, T>,
}

impl<A: PageAllocator, T: TlbOps> PageTable<A, T> {
    /// Derives a `Geometry` from `cfg`, allocates a fresh (possibly
    /// Stage-2-concatenated) root table, and returns the handle alongside
    /// the register values the driver programs to point hardware at it.
    pub fn alloc(cfg: Config, alloc: A, tlb: T) -> Result<(Self, Registers), PgtableError> {
        let geometry = Geometry::new(cfg.ias, cfg.oas, cfg.pgsize_bitmap, cfg.fmt, cfg.quirks)?;
        let tree = TreeStore::new(geometry, alloc, tlb, cfg.cookie)?;
        let registers = geometry.registers(tree.root_pa);
        Ok((Self { tree }, registers))
    }

    /// Installs a single contiguous mapping (§4.3).
    pub fn map(&self, iova: u64, pa: u64, size: u64, prot: Prot) -> Result<(), PgtableError> {
        mapper::map(&self.tree, iova, pa, size, prot)
    }

    /// Installs a run of scatter-gather chunks (§4.4), returning the number
    /// of bytes actually mapped before the first failure (or all of them).
    pub fn map_sg(&self, iova: u64, chunks: &[SgChunk], prot: Prot) -> u64 {
        sg::map_sg(&self.tree, iova, chunks, prot)
    }

    /// Removes up to `size` bytes starting at `iova` (§4.5/§4.6), returning
    /// the number of bytes actually removed. Never fails loudly.
    pub fn unmap(&self, iova: u64, size: u64) -> u64 {
        unmapper::unmap(&self.tree, iova, size)
    }

    /// Looks up the physical address `iova` currently translates to, or `0`
    /// if unmapped (§4.6/§9 open question: a legitimate mapping to PA 0 is
    /// indistinguishable from "unmapped" with this return type).
    pub fn iova_to_phys(&self, iova: u64) -> u64 {
        translate::iova_to_phys(&self.tree, iova)
    }

    /// The geometry this table was built with, for drivers that need to
    /// re-derive register values without re-running `alloc`.
    pub fn geometry(&self) -> &Geometry {
        &self.tree.geometry
    }

    /// Root table entry count after Stage-2 concatenation, if this table's
    /// geometry concatenates; `None` otherwise. Lets a driver size any
    /// wrapper structure it keeps around the root without recomputing the
    /// concatenation rule itself (§11).
    pub fn concatenated_root_entries(&self) -> Option<usize> {
        self.tree.geometry.concatenated_root_entries()
    }

    /// Tears down every table reachable from the root, then frees the root
    /// itself and hands the collaborators back to the caller.
    pub fn free(self) -> (A, T) {
        self.tree.teardown();
        let root_ptr: NonNull<u8> = self.tree.root_ptr.cast();
        self.tree.alloc.free_table(self.tree.root_pa, root_ptr, self.tree.root_len);
        (self.tree.alloc, self.tree.tlb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockAlloc, MockTlb};

    fn stage1_cfg() -> Config {
        Config {
            ias: 48,
            oas: 48,
            pgsize_bitmap: (1 << 12) | (1 << 21) | (1 << 30),
            fmt: Format::Stage1_64,
            quirks: Quirks::NONE,
            cookie: 0,
        }
    }

    #[test]
    fn distinct_granules_round_trip() {
        let (pt, _) = PageTable::alloc(stage1_cfg(), MockAlloc::new(), MockTlb::default()).unwrap();
        let prot = Prot::READ | Prot::WRITE | Prot::EXEC | Prot::CACHE;
        for (k, size) in [(0u64, 1 << 12), (1, 1 << 21), (2, 1 << 30)] {
            let iova = k * (1 << 30);
            pt.map(iova, iova, size, prot).unwrap();
            assert_eq!(pt.iova_to_phys(iova + 42), iova + 42);
            assert_eq!(pt.unmap(iova, size), size);
            assert_eq!(pt.iova_to_phys(iova + 42), 0);
        }
    }

    #[test]
    fn overlap_is_rejected_and_leaves_tree_unchanged() {
        let (pt, _) = PageTable::alloc(stage1_cfg(), MockAlloc::new(), MockTlb::default()).unwrap();
        pt.map(0, 0, 0x1000, Prot::READ | Prot::WRITE).unwrap();
        let err = pt.map(0, 0x1000, 0x1000, Prot::READ).unwrap_err();
        assert_eq!(err, PgtableError::AlreadyMapped);
        assert_eq!(pt.iova_to_phys(42), 42);
    }

    #[test]
    fn partial_unmap_then_remap_through_the_public_api() {
        let (pt, _) = PageTable::alloc(stage1_cfg(), MockAlloc::new(), MockTlb::default()).unwrap();
        pt.map(1 << 30, 1 << 30, 1 << 21, Prot::READ).unwrap();

        assert_eq!(pt.unmap((1 << 30) + 0x1000, 0x1000), 0x1000);
        assert_eq!(pt.iova_to_phys((1 << 30) + 0x1000 + 42), 0);
        assert_eq!(pt.iova_to_phys((1 << 30) + 42), (1 << 30) + 42);

        pt.map((1 << 30) + 0x1000, 0x1000, 0x1000, Prot::READ).unwrap();
        assert_eq!(pt.iova_to_phys((1 << 30) + 0x1000 + 42), 0x1000 + 42);
    }

    #[test]
    fn mixed_block_and_page_unmap_leaves_nothing_translatable() {
        let (pt, _) = PageTable::alloc(stage1_cfg(), MockAlloc::new(), MockTlb::default()).unwrap();
        pt.map(0, 0, 1 << 21, Prot::READ).unwrap();
        pt.map(1 << 21, 1 << 21, 0x1000, Prot::READ).unwrap();
        assert_eq!(pt.unmap(0, (1 << 21) + 0x1000), (1 << 21) + 0x1000);
        assert_eq!(pt.iova_to_phys(42), 0);
        assert_eq!(pt.iova_to_phys((1 << 21) + 42), 0);
    }

    #[test]
    fn scatter_gather_batching_round_trips_through_unmap() {
        let (pt, _) = PageTable::alloc(stage1_cfg(), MockAlloc::new(), MockTlb::default()).unwrap();
        let chunks: Vec<SgChunk> = (0..20).map(|i| SgChunk { page: 0, offset: i * 0x1000, len: 0x1000 }).collect();
        let mapped = pt.map_sg(0, &chunks, Prot::READ | Prot::WRITE);
        assert_eq!(mapped, 20 * 0x1000);
        for i in 0..20u64 {
            assert_eq!(pt.iova_to_phys(i * 0x1000 + 7), i * 0x1000 + 7);
        }
        assert_eq!(pt.unmap(0, 20 * 0x1000), 20 * 0x1000);
        for i in 0..20u64 {
            assert_eq!(pt.iova_to_phys(i * 0x1000 + 7), 0);
        }
    }

    #[test]
    fn stage2_concatenation_shortens_the_walk_and_widens_the_root() {
        // A full-depth 4-level walk at ias=43/4K would leave a 4-bit root —
        // 16 entries, comfortably foldable into the table one level down
        // (§4.2): the walk shortens to 3 levels and the root widens to
        // 16 concatenated granules (16 x 4 KiB = 64 KiB).
        let cfg = Config {
            ias: 43,
            oas: 48,
            pgsize_bitmap: 1 << 12,
            fmt: Format::Stage2_64,
            quirks: Quirks::NONE,
            cookie: 0,
        };
        let (pt, regs) = PageTable::alloc(cfg, MockAlloc::new(), MockTlb::default()).unwrap();
        assert_eq!(pt.geometry().levels, 3);
        assert_eq!(pt.geometry().start_level, 1);
        assert_eq!(pt.concatenated_root_entries(), Some(16 * pt.geometry().entries_per_table));
        match regs {
            Registers::Stage2 { vtcr, .. } => {
                assert_eq!(vtcr.get(geometry::VtcrEl2::sl0), (3 - (pt.geometry().start_level as u64 - 1)) & 0b11);
            }
            Registers::Stage1 { .. } => panic!("expected stage2 registers"),
        }
    }

    #[test]
    fn free_tears_down_every_table_but_the_driver_keeps_the_collaborators() {
        let (pt, _) = PageTable::alloc(stage1_cfg(), MockAlloc::new(), MockTlb::default()).unwrap();
        pt.map(0, 0, 0x1000, Prot::READ).unwrap();
        pt.map(1 << 30, 1 << 30, 1 << 30, Prot::READ).unwrap();
        let (alloc, _tlb) = pt.free();
        assert_eq!(alloc.live_tables(), 0);
    }
}
