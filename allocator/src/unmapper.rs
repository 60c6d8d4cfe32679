//! Leaf/table removal (§4.5) and block split on partial unmap (§4.6).
//!
//! The outer [`unmap`] loop repeatedly asks `iommu_pgsize` for the largest
//! chunk the geometry's `pgsize_bitmap` supports at the current alignment
//! without overrunning what's left, and recurses into the tree once per
//! chunk. Unlike the scatter-gather mapper's 2 MiB batching window (§4.4,
//! which bounds how far a *publish* can be deferred), nothing here bounds a
//! single chunk to a fixed size: an unmap that exactly covers an existing
//! block is removed in one step regardless of how large that block is, so a
//! whole-domain unmap collapses the tree down to an empty root instead of
//! leaving behind block-split tables nobody asked for. A single
//! `tlb_flush_all` closes the whole operation; per-chunk `tlb_add_flush`
//! calls let collaborators that support range invalidation use it instead.

use core::ptr::NonNull;

use crate::descriptor::Descriptor;
use crate::mapper::bump_parent;
use crate::tree::{PageAllocator, TlbOps, TreeStore};

/// Unmaps up to `size` bytes starting at `iova`, returning the number of
/// bytes actually removed (0 if `iova` was already unmapped). Never fails
/// loudly: any inability to make progress just ends the loop early.
pub fn unmap<A: PageAllocator, T: TlbOps>(tree: &TreeStore<A, T>, iova: u64, size: u64) -> u64 {
    let mut cur = iova;
    let mut remaining = size;
    let mut total = 0u64;

    while remaining > 0 {
        let Some(chunk) = tree.geometry.iommu_pgsize(cur, cur, remaining) else {
            break;
        };
        let removed = remove(tree, tree.geometry.start_level, tree.root_table(), None, cur, chunk);
        if removed == 0 {
            break;
        }
        tree.tlb.tlb_add_flush(cur, removed, true, tree.cookie);
        total += removed;
        cur += removed;
        remaining -= removed;
    }

    if total > 0 {
        tree.tlb.tlb_sync(tree.cookie);
        tree.tlb.tlb_flush_all(tree.cookie);
    }
    total
}

/// `parent_slot` names the descriptor, one level up, whose hidden use-count
/// tracks how many valid entries `table` holds — `None` at the root, which
/// nothing counts. Mirrors the threading `mapper::resolve_leaf_site` uses on
/// the install side, so every increment there has a matching decrement here.
fn remove<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    level: u8,
    table: NonNull<Descriptor>,
    parent_slot: Option<NonNull<Descriptor>>,
    iova: u64,
    size: u64,
) -> u64 {
    let idx = tree.geometry.index(iova, level);
    let slot = unsafe { TreeStore::<A, T>::slot(table, idx) };
    let d = unsafe { *slot.as_ptr() };
    if !d.is_valid() {
        return 0;
    }

    let blk = tree.geometry.block_size(level);
    if size == blk {
        unsafe {
            *slot.as_ptr() = Descriptor::INVALID;
        }
        tree.publish(slot, 1);
        if let Some(parent) = parent_slot {
            bump_parent(tree, parent, -1);
        }
        if d.is_table(level) {
            free_subtree(tree, d, level);
        }
        return size;
    }

    if level == 2 && d.is_table(level) {
        return bulk_clear(tree, slot, parent_slot, d, iova, size);
    }

    if d.is_leaf(level) {
        return split_block(tree, slot, level, d, iova, size);
    }

    if d.is_table(level) {
        let Some(child) = tree.child_table_ptr(d) else {
            return 0;
        };
        let removed = remove(tree, level + 1, child, Some(slot), iova, size);
        if removed > 0 {
            cascade_if_empty(tree, slot, d, child, parent_slot);
        }
        return removed;
    }

    0
}

/// After removing something from `child` (pointed to by `slot`, whose
/// hidden use-count tracks `child`'s occupancy, generalized by the mapper
/// to every level rather than just the penultimate one — see
/// `mapper::resolve_leaf_site`), check whether `child` is now entirely
/// empty and, if so, free it and clear `slot`. This is what lets a
/// whole-domain unmap collapse the tree back down to an empty root instead
/// of leaving behind tables that lost their last entry through a deeper
/// call (a bulk-clear at level 2, or a cascade from a level below this
/// one) but were never told to disappear: the check composes naturally up
/// the recursion, one level per returning call, mirroring the increments
/// `resolve_leaf_site` performs one level per descent.
fn cascade_if_empty<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    slot: NonNull<Descriptor>,
    d: Descriptor,
    child: NonNull<Descriptor>,
    parent_slot: Option<NonNull<Descriptor>>,
) {
    let now = unsafe { *slot.as_ptr() };
    if now.tblcnt_get() != 0 {
        return;
    }
    unsafe {
        *slot.as_ptr() = Descriptor::INVALID;
    }
    tree.publish(slot, 1);
    tree.free_child_table(d.output_addr(), child);
    if let Some(parent) = parent_slot {
        bump_parent(tree, parent, -1);
    }
}

fn free_subtree<A: PageAllocator, T: TlbOps>(tree: &TreeStore<A, T>, d: Descriptor, level: u8) {
    if let Some(child) = tree.child_table_ptr(d) {
        tree.teardown_table(child, tree.geometry.entries_per_table, level + 1);
        tree.free_child_table(d.output_addr(), child);
    }
}

/// Case (b): `slot` is a table descriptor at the penultimate level (2);
/// clears a contiguous run of its child's page leaves without visiting each
/// one individually, then decrements the hidden use-count by the run length.
fn bulk_clear<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    slot: NonNull<Descriptor>,
    parent_slot: Option<NonNull<Descriptor>>,
    d: Descriptor,
    iova: u64,
    size: u64,
) -> u64 {
    let Some(child) = tree.child_table_ptr(d) else {
        return 0;
    };
    let granule = tree.granule() as u64;
    let child_offset = tree.geometry.index(iova, 3);
    let max_entries = tree.geometry.entries_per_table;
    let entries = core::cmp::min(size / granule, (max_entries - child_offset) as u64) as usize;
    if entries == 0 {
        return 0;
    }

    let first = unsafe { TreeStore::<A, T>::slot(child, child_offset) };
    unsafe {
        core::ptr::write_bytes(first.as_ptr(), 0, entries);
    }
    tree.publish(first, entries);

    let remaining_count = d.tblcnt_add(-(entries as i32));
    if remaining_count.tblcnt_get() == 0 {
        unsafe {
            *slot.as_ptr() = Descriptor::INVALID;
        }
        tree.publish(slot, 1);
        if let Some(parent) = parent_slot {
            bump_parent(tree, parent, -1);
        }
        tree.free_child_table(d.output_addr(), child);
    } else {
        unsafe {
            *slot.as_ptr() = remaining_count;
        }
        tree.publish(slot, 1);
    }

    entries as u64 * granule
}

/// Case (c): `d` is a leaf strictly larger than `size`. Replaces it with a
/// fresh table whose leaves cover the surviving portion of the original
/// block at the same protection, omitting the requested sub-range. On any
/// sub-leaf encode failure the new table is discarded and the original
/// descriptor is left exactly as it was (P5's "full block still
/// translatable" clause) rather than torn down half-built.
fn split_block<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    slot: NonNull<Descriptor>,
    level: u8,
    d: Descriptor,
    iova: u64,
    size: u64,
) -> u64 {
    let blk_size = tree.geometry.block_size(level);
    let blk_start = iova & !(blk_size - 1);
    let original_pa = d.output_addr();
    let child_level = level + 1;
    let child_size = tree.geometry.block_size(child_level);
    let prot = d.attrs(tree.geometry.format);

    let Ok((child_pa, child_ptr)) = tree.alloc_child_table() else {
        return 0;
    };

    let mut b = blk_start;
    let mut count = 0u32;
    let mut ok = true;
    while b < blk_start + blk_size {
        if b != iova {
            let sub_pa = original_pa + (b - blk_start);
            let sub_idx = tree.geometry.index(b, child_level);
            let sub_slot = unsafe { TreeStore::<A, T>::slot(child_ptr, sub_idx) };
            match Descriptor::encode_leaf(child_level, sub_pa, prot, tree.geometry.format, tree.quirks()) {
                Some(leaf) => {
                    unsafe {
                        *sub_slot.as_ptr() = leaf;
                    }
                    count += 1;
                }
                None => {
                    ok = false;
                    break;
                }
            }
        }
        b += child_size;
    }

    if !ok {
        tree.free_child_table(child_pa, child_ptr);
        return 0;
    }

    tree.publish(child_ptr, tree.geometry.entries_per_table);
    let table_desc = Descriptor::encode_table(child_pa, tree.quirks()).tblcnt_set(count);
    unsafe {
        *slot.as_ptr() = table_desc;
    }
    tree.publish(slot, 1);
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Prot;
    use crate::geometry::{Format, Geometry, Quirks};
    use crate::mapper::map;
    use crate::testutil::{MockAlloc, MockTlb};
    use crate::translate::iova_to_phys;

    fn fresh_tree() -> TreeStore<MockAlloc, MockTlb> {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        TreeStore::new(geo, MockAlloc::new(), MockTlb::default(), 0).unwrap()
    }

    #[test]
    fn full_block_unmap_restores_empty_tree() {
        let tree = fresh_tree();
        map(&tree, 0, 0, 1 << 30, Prot::READ | Prot::WRITE).unwrap();
        assert_eq!(unmap(&tree, 0, 1 << 30), 1 << 30);
        assert_eq!(iova_to_phys(&tree, 42), 0);
        assert_eq!(tree.alloc.live_tables(), 1);
        assert_eq!(*tree.tlb.tlb_flush_all_calls.borrow(), 1);
    }

    #[test]
    fn partial_unmap_splits_block_and_preserves_remainder() {
        let tree = fresh_tree();
        map(&tree, 1 << 30, 1 << 30, 1 << 21, Prot::READ).unwrap();

        let removed = unmap(&tree, (1 << 30) + 0x1000, 0x1000);
        assert_eq!(removed, 0x1000);
        assert_eq!(iova_to_phys(&tree, (1 << 30) + 0x1000 + 42), 0);
        assert_eq!(iova_to_phys(&tree, (1 << 30) + 42), (1 << 30) + 42);

        map(&tree, (1 << 30) + 0x1000, 0x1000, 0x1000, Prot::READ).unwrap();
        assert_eq!(iova_to_phys(&tree, (1 << 30) + 0x1000 + 42), 0x1000 + 42);
    }

    #[test]
    fn mixed_block_and_page_unmap_clears_both() {
        let tree = fresh_tree();
        map(&tree, 0, 0, 1 << 21, Prot::READ).unwrap();
        map(&tree, 1 << 21, 1 << 21, 0x1000, Prot::READ).unwrap();
        assert_eq!(iova_to_phys(&tree, 42), 42);
        assert_eq!(iova_to_phys(&tree, (1 << 21) + 42), (1 << 21) + 42);

        let removed = unmap(&tree, 0, (1 << 21) + 0x1000);
        assert_eq!(removed, (1 << 21) + 0x1000);
        assert_eq!(iova_to_phys(&tree, 42), 0);
        assert_eq!(iova_to_phys(&tree, (1 << 21) + 42), 0);
    }

    #[test]
    fn unmap_of_unmapped_range_is_silent() {
        let tree = fresh_tree();
        assert_eq!(unmap(&tree, 0x5000, 0x1000), 0);
        assert_eq!(*tree.tlb.tlb_flush_all_calls.borrow(), 0);
    }

    #[test]
    fn bulk_clear_decrements_table_counter_without_freeing_a_partial_run() {
        let tree = fresh_tree();
        for i in 0..4u64 {
            map(&tree, i * 0x1000, i * 0x1000, 0x1000, Prot::READ).unwrap();
        }
        let before = tree.alloc.live_tables();

        assert_eq!(unmap(&tree, 0, 2 * 0x1000), 2 * 0x1000);
        assert_eq!(tree.alloc.live_tables(), before, "two of four leaves remain; the level-3 table stays live");
        assert_eq!(iova_to_phys(&tree, 2 * 0x1000 + 1), 2 * 0x1000 + 1);
        assert_eq!(iova_to_phys(&tree, 3 * 0x1000 + 1), 3 * 0x1000 + 1);

        assert_eq!(unmap(&tree, 2 * 0x1000, 2 * 0x1000), 2 * 0x1000);
        for i in 0..4u64 {
            assert_eq!(iova_to_phys(&tree, i * 0x1000 + 1), 0);
        }
    }

    #[test]
    fn splitting_a_1gib_block_tracks_the_surviving_leaf_count() {
        // A block split one level above the penultimate one (level 1, child
        // leaves at level 2) must carry the same use-counter bookkeeping as
        // a penultimate-level split, or a later unmap of a surviving
        // sub-block underflows the counter instead of decrementing it.
        let tree = fresh_tree();
        map(&tree, 0, 0, 1 << 30, Prot::READ).unwrap();

        let hole = 2 * (1 << 21);
        assert_eq!(unmap(&tree, hole, 1 << 21), 1 << 21);

        let root = tree.root_table();
        let l0_slot = unsafe { TreeStore::<MockAlloc, MockTlb>::slot(root, tree.geometry.index(0, 0)) };
        let l0 = unsafe { *l0_slot.as_ptr() };
        let l1_table = tree.child_table_ptr(l0).unwrap();
        let l1_slot = unsafe { TreeStore::<MockAlloc, MockTlb>::slot(l1_table, tree.geometry.index(0, 1)) };
        let l1 = unsafe { *l1_slot.as_ptr() };
        assert_eq!(l1.tblcnt_get(), 511, "511 of the 512 level-2 sub-blocks survived the split");

        for i in 0..512u64 {
            if i * (1 << 21) == hole {
                continue;
            }
            assert_eq!(unmap(&tree, i * (1 << 21), 1 << 21), 1 << 21);
        }
        assert_eq!(tree.alloc.live_tables(), 1, "the split table collapses once its last leaf is gone");
        assert_eq!(iova_to_phys(&tree, 42), 0);
    }

    #[test]
    fn fully_unmapped_domain_collapses_every_intermediate_table() {
        let tree = fresh_tree();
        for i in 0..4u64 {
            map(&tree, i * 0x1000, i * 0x1000, 0x1000, Prot::READ).unwrap();
        }
        assert_eq!(unmap(&tree, 0, 4 * 0x1000), 4 * 0x1000);
        // Nothing maps to anything below this single mapping, so the whole
        // chain of tables the four pages pulled into existence — down to
        // and including the level-0 entry off the root — cascades away,
        // leaving only the root allocation behind (P2).
        assert_eq!(tree.alloc.live_tables(), 1);
        for i in 0..4u64 {
            assert_eq!(iova_to_phys(&tree, i * 0x1000 + 1), 0);
        }
    }
}
