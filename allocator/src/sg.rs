//! Scatter-gather mapper (§4.4): installs a run of chunks, batching
//! consecutive page leaves that share a penultimate-level table into one
//! publish instead of one per leaf.

use core::ptr::NonNull;

use crate::descriptor::{Descriptor, Prot};
use crate::mapper::{bump_parent, resolve_leaf_site};
use crate::tree::{PageAllocator, TlbOps, TreeStore};

/// One scatter-gather entry: a physical page, a byte offset into it, and a
/// length. The effective physical address is `page + offset`.
#[derive(Clone, Copy, Debug)]
pub struct SgChunk {
    pub page: u64,
    pub offset: u64,
    pub len: u64,
}

struct MapState {
    iova_end: u64,
    table: NonNull<Descriptor>,
    batch_first: NonNull<Descriptor>,
    batch_count: usize,
}

/// Installs `chunks` starting at `iova` and returns the number of bytes
/// successfully mapped. On any failure mid-stream the already-installed
/// prefix is left mapped; the caller is expected to `unmap` exactly that
/// many bytes if it wants to undo the attempt.
pub fn map_sg<A: PageAllocator, T: TlbOps>(
    tree: &TreeStore<A, T>,
    iova: u64,
    chunks: &[SgChunk],
    prot: Prot,
) -> u64 {
    if !prot.contains(Prot::READ) && !prot.contains(Prot::WRITE) {
        return 0;
    }
    let pg_mask = (1u64 << tree.geometry.pg_shift) - 1;
    if chunks.iter().any(|c| c.offset & pg_mask != 0) {
        return 0;
    }

    let mut cur_iova = iova;
    let mut mapped = 0u64;
    let mut state: Option<MapState> = None;

    'chunks: for chunk in chunks {
        let mut pa = chunk.page + chunk.offset;
        let mut remaining = chunk.len;
        while remaining > 0 {
            let Some(size) = tree.geometry.iommu_pgsize(cur_iova, pa, remaining) else {
                break 'chunks;
            };

            let site = match resolve_leaf_site(tree, tree.geometry.start_level, tree.root_table(), cur_iova, size)
            {
                Ok(site) => site,
                Err(_) => {
                    flush_batch(tree, &mut state);
                    break 'chunks;
                }
            };

            let existing = unsafe { *site.slot.as_ptr() };
            if existing.is_valid() {
                flush_batch(tree, &mut state);
                break 'chunks;
            }
            let Some(leaf) = Descriptor::encode_leaf(site.level, pa, prot, tree.geometry.format, tree.quirks())
            else {
                flush_batch(tree, &mut state);
                break 'chunks;
            };

            let can_batch = site.level == 3
                && state
                    .as_ref()
                    .is_some_and(|s| s.table == site.table && cur_iova < s.iova_end);

            if can_batch {
                let s = state.as_mut().unwrap();
                unsafe {
                    *site.slot.as_ptr() = leaf;
                }
                s.batch_count += 1;
                if let Some(parent) = site.parent_slot {
                    bump_parent(tree, parent, 1);
                }
            } else {
                flush_batch(tree, &mut state);
                unsafe {
                    *site.slot.as_ptr() = leaf;
                }
                if site.level == 3 {
                    tree.publish(site.slot, 1);
                    if let Some(parent) = site.parent_slot {
                        bump_parent(tree, parent, 1);
                    }
                    state = Some(MapState {
                        iova_end: round_down(cur_iova, TWO_MIB) + TWO_MIB,
                        table: site.table,
                        batch_first: site.slot,
                        batch_count: 1,
                    });
                } else {
                    tree.publish(site.slot, 1);
                }
            }

            mapped += size;
            cur_iova += size;
            pa += size;
            remaining -= size;
        }
    }

    flush_batch(tree, &mut state);
    mapped
}

const TWO_MIB: u64 = 1 << 21;

#[inline]
fn round_down(v: u64, align: u64) -> u64 {
    v & !(align - 1)
}

fn flush_batch<A: PageAllocator, T: TlbOps>(tree: &TreeStore<A, T>, state: &mut Option<MapState>) {
    if let Some(s) = state.take() {
        tree.publish(s.batch_first, s.batch_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Format, Geometry, Quirks};
    use crate::testutil::{MockAlloc, MockTlb};
    use crate::translate::iova_to_phys;

    #[test]
    fn batches_consecutive_page_leaves_into_one_publish() {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        let alloc = MockAlloc::new();
        let tlb = MockTlb::default();
        let tree = TreeStore::new(geo, alloc, tlb, 0).unwrap();

        let chunks: Vec<SgChunk> = (0..20)
            .map(|i| SgChunk { page: 0x1000 * i, offset: 0, len: 0x1000 })
            .collect();
        let mapped = map_sg(&tree, 0, &chunks, Prot::READ | Prot::WRITE);
        assert_eq!(mapped, 20 * 0x1000);
        for i in 0..20u64 {
            assert_eq!(iova_to_phys(&tree, i * 0x1000 + 42), i * 0x1000 + 42);
        }
    }

    #[test]
    fn unaligned_offset_maps_nothing() {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        let alloc = MockAlloc::new();
        let tlb = MockTlb::default();
        let tree = TreeStore::new(geo, alloc, tlb, 0).unwrap();

        let chunks = [SgChunk { page: 0x1000, offset: 7, len: 0x1000 }];
        assert_eq!(map_sg(&tree, 0, &chunks, Prot::READ), 0);
    }
}
