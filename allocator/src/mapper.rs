//! Single-range installer (§4.3): walks down from the root, creating
//! interior tables as needed, and writes one leaf descriptor.

use core::ptr::NonNull;

use crate::descriptor::{Descriptor, Prot};
use crate::tree::{PageAllocator, TlbOps, TreeStore};
use crate::PgtableError;

pub fn map<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    iova: u64,
    pa: u64,
    size: u64,
    prot: Prot,
) -> Result<(), PgtableError> {
    if !prot.contains(Prot::READ) && !prot.contains(Prot::WRITE) {
        return Ok(());
    }
    let pg_mask = (1u64 << tree.geometry.pg_shift) - 1;
    if iova & pg_mask != 0 || pa & pg_mask != 0 {
        return Err(PgtableError::InvalidArgument);
    }
    if tree.geometry.pgsize_bitmap & size == 0 {
        return Err(PgtableError::InvalidArgument);
    }
    if size == 0 || (iova | pa) & (size - 1) != 0 {
        return Err(PgtableError::InvalidArgument);
    }
    install(tree, tree.geometry.start_level, tree.root_table(), iova, pa, size, prot)
}

/// The slot a leaf of a given size would occupy, plus (when that slot sits
/// at the terminal level) the penultimate-level table descriptor whose
/// hidden use-counter tracks it. Shared by the single-range mapper and the
/// scatter-gather batcher so both walk the tree the same way.
pub(crate) struct LeafSite {
    pub slot: NonNull<Descriptor>,
    pub parent_slot: Option<NonNull<Descriptor>>,
    pub level: u8,
    pub table: NonNull<Descriptor>,
}

/// Walks the tree from `(level, table)`, allocating interior tables on
/// demand, until `size` matches a block/page size at the current level.
/// Does not inspect or write the terminal slot itself.
///
/// `parent_slot` always names the descriptor, one level up, that points at
/// `table` — its hidden use-counter tracks how many valid entries `table`
/// currently holds, whatever their kind. The root has no such descriptor
/// and is never freed through this mechanism.
pub(crate) fn resolve_leaf_site<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    start_level: u8,
    start_table: NonNull<Descriptor>,
    iova: u64,
    size: u64,
) -> Result<LeafSite, PgtableError> {
    let mut level = start_level;
    let mut table = start_table;
    let mut parent_slot: Option<NonNull<Descriptor>> = None;

    loop {
        let idx = tree.geometry.index(iova, level);
        let slot = unsafe { TreeStore::<A, T>::slot(table, idx) };
        let current = unsafe { *slot.as_ptr() };
        let blk = tree.geometry.block_size(level);

        if size == blk {
            return Ok(LeafSite { slot, parent_slot, level, table });
        }
        if level == 3 {
            return Err(PgtableError::InvalidArgument);
        }

        let child = if !current.is_valid() {
            let (child_pa, child_ptr) = tree.alloc_child_table()?;
            let table_desc = Descriptor::encode_table(child_pa, tree.quirks());
            unsafe {
                *slot.as_ptr() = table_desc;
            }
            tree.publish(slot, 1);
            if let Some(parent) = parent_slot {
                bump_parent(tree, parent, 1);
            }
            child_ptr
        } else if current.is_table(level) {
            tree.child_table_ptr(current).ok_or(PgtableError::InvalidArgument)?
        } else {
            return Err(PgtableError::AlreadyMapped);
        };

        parent_slot = Some(slot);
        level += 1;
        table = child;
    }
}

/// Writes a leaf descriptor into an already-resolved site, enforcing
/// unmap-before-remap, and bumps the penultimate-level counter.
pub(crate) fn install<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    start_level: u8,
    start_table: NonNull<Descriptor>,
    iova: u64,
    pa: u64,
    size: u64,
    prot: Prot,
) -> Result<(), PgtableError> {
    let site = resolve_leaf_site(tree, start_level, start_table, iova, size)?;
    let current = unsafe { *site.slot.as_ptr() };
    if current.is_valid() {
        return Err(PgtableError::AlreadyMapped);
    }
    let leaf = Descriptor::encode_leaf(site.level, pa, prot, tree.geometry.format, tree.quirks())
        .expect("map() already rejected protection with neither read nor write");
    unsafe {
        *site.slot.as_ptr() = leaf;
    }
    tree.publish(site.slot, 1);
    if let Some(parent) = site.parent_slot {
        bump_parent(tree, parent, 1);
    }
    Ok(())
}

pub(crate) fn bump_parent<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    parent_slot: NonNull<Descriptor>,
    delta: i32,
) {
    let updated = unsafe { (*parent_slot.as_ptr()).tblcnt_add(delta) };
    unsafe {
        *parent_slot.as_ptr() = updated;
    }
    tree.publish(parent_slot, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockAlloc, MockTlb};
    use crate::geometry::{Format, Geometry, Quirks};

    #[test]
    fn map_creates_intermediate_tables_and_a_page_leaf() {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        let alloc = MockAlloc::new();
        let tlb = MockTlb::default();
        let tree = TreeStore::new(geo, alloc, tlb, 0).unwrap();

        map(&tree, 0x1000, 0x2000, 0x1000, Prot::READ | Prot::WRITE).unwrap();
        assert!(tree.tlb.flushes.borrow().len() >= 2);

        let err = map(&tree, 0x1000, 0x2000, 0x1000, Prot::READ).unwrap_err();
        assert_eq!(err, PgtableError::AlreadyMapped);
    }
}
