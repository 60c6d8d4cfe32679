//! IOVA-to-physical-address lookup (§4.6): a plain walk with no side
//! effects, sharing the descriptor layout with `mapper`/`unmapper` but none
//! of their mutation.

use crate::tree::{PageAllocator, TlbOps, TreeStore};

/// Returns the physical address `iova` currently translates to, or `0` if
/// `iova` is unmapped. A mapped page whose physical address happens to be
/// `0` is indistinguishable from "unmapped" to this call, matching every
/// other `iova_to_phys` implementation in this family.
pub fn iova_to_phys<A: PageAllocator, T: TlbOps>(tree: &TreeStore<A, T>, iova: u64) -> u64 {
    let mut level = tree.geometry.start_level;
    let mut table = tree.root_table();

    loop {
        let idx = tree.geometry.index(iova, level);
        let slot = unsafe { TreeStore::<A, T>::slot(table, idx) };
        let d = unsafe { *slot.as_ptr() };

        if d.is_leaf(level) {
            let block_mask = tree.geometry.block_size(level) - 1;
            return d.output_addr() | (iova & block_mask);
        }
        if !d.is_table(level) {
            return 0;
        }
        let Some(child) = tree.child_table_ptr(d) else {
            return 0;
        };
        level += 1;
        table = child;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Prot;
    use crate::geometry::{Format, Geometry, Quirks};
    use crate::mapper::map;
    use crate::testutil::{MockAlloc, MockTlb};

    #[test]
    fn unmapped_iova_translates_to_zero() {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        let tree = TreeStore::new(geo, MockAlloc::new(), MockTlb::default(), 0).unwrap();
        assert_eq!(iova_to_phys(&tree, 0x1234), 0);
    }

    #[test]
    fn mapped_block_translates_with_offset() {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        let tree = TreeStore::new(geo, MockAlloc::new(), MockTlb::default(), 0).unwrap();
        map(&tree, 0x4000_0000, 0x8000_0000, 1 << 30, Prot::READ | Prot::WRITE).unwrap();
        assert_eq!(iova_to_phys(&tree, 0x4000_0000 + 0x1234), 0x8000_0000 + 0x1234);
    }
}
